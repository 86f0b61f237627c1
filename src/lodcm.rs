//! The composite LODCM device.
//!
//! Aggregates the two crystal towers, the diagnostic tower, and every motor
//! axis, and derives the quantities the beamline actually cares about: which
//! downstream branch receives light, which crystal material is engaged, and
//! the photon energy implied by the crystal angle.
//!
//! The device is assembled by explicit composition: the constructor takes an
//! immutable [`LodcmConfig`](crate::config::LodcmConfig) plus a
//! [`LodcmParts`] record of already-constructed axes, positioners, and
//! reflection registers. Nothing is auto-wired from field declarations.
//!
//! # Scope
//!
//! The device reports; it does not align. The pseudo-position transform
//! between the logical energy axis and the real motors is exposed as a
//! contract ([`Lodcm::forward`] / [`Lodcm::inverse`]), but commanding motion
//! from a target energy is a stubbed extension point pending the alignment
//! feature.

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::axis::Axis;
use crate::calc::{self, Material, Reflection};
use crate::config::LodcmConfig;
use crate::error::{LodcmError, LodcmResult};
use crate::hardware::{AxisReadback, MoveHandle};
use crate::positioner::StatePositioner;
use crate::status::StatusSnapshot;
use crate::tower::CrystalTower;

/// The diagnostic-tower state positioners.
///
/// The yag screen, detector slide, and filter foil block the mono beam path
/// when inserted; the PIPS diode is transmissive and never blocks.
pub struct DiagnosticPositioners {
    /// Imaging screen (yag + slit positions).
    pub yag: StatePositioner,
    /// Detector insertion slide.
    pub dectris: StatePositioner,
    /// Transmissive PIPS diode.
    pub diode: StatePositioner,
    /// Filter-foil wheel.
    pub foil: StatePositioner,
}

/// Per-material theta and z offset readback axes.
///
/// These are derived hardware records, one per tower and material; the
/// energy readback is computed from the offset axis matching the engaged
/// material.
pub struct OffsetAxes {
    /// Tower 1 theta offset for silicon.
    pub th1_si: Axis,
    /// Tower 1 theta offset for diamond.
    pub th1_c: Axis,
    /// Tower 2 theta offset for silicon.
    pub th2_si: Axis,
    /// Tower 2 theta offset for diamond.
    pub th2_c: Axis,
    /// Tower 1 z offset for silicon.
    pub z1_si: Axis,
    /// Tower 1 z offset for diamond.
    pub z1_c: Axis,
    /// Tower 2 z offset for silicon.
    pub z2_si: Axis,
    /// Tower 2 z offset for diamond.
    pub z2_c: Axis,
}

/// Already-constructed components handed to the [`Lodcm`] constructor.
pub struct LodcmParts {
    /// Crystal tower 1 (the beam-splitting tower).
    pub tower_1: CrystalTower,
    /// Crystal tower 2 (the beam-restoring tower).
    pub tower_2: CrystalTower,
    /// Diagnostic-tower positioners.
    pub diagnostics: DiagnosticPositioners,
    /// Catalog motor axes, keyed by role name.
    pub motors: HashMap<String, Axis>,
    /// Per-material offset readback axes.
    pub offsets: OffsetAxes,
}

/// Readback of the pseudo (derived) quantities, produced by the inverse
/// transform.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PseudoReadback {
    /// Material the derivation used.
    pub material: Material,
    /// Reflection the derivation used.
    pub reflection: Reflection,
    /// Photon energy in keV.
    pub energy_kev: f64,
    /// Bragg angle for that energy, degrees.
    pub theta_deg: f64,
    /// Tower 1 crystal translation offset, mm (towers translate opposite).
    pub z1_offset_mm: f64,
    /// Tower 2 crystal translation offset, mm.
    pub z2_offset_mm: f64,
}

/// Large Offset Dual Crystal Monochromator.
///
/// Two crystals steer/split the beam with a set of diagnostics between
/// them. Beam can continue onto the main line, the mono line, both, or
/// neither; this device derives which from the lead positioner and the
/// diagnostic states.
pub struct Lodcm {
    config: LodcmConfig,
    tower_1: CrystalTower,
    tower_2: CrystalTower,
    diagnostics: DiagnosticPositioners,
    motors: HashMap<String, Axis>,
    offsets: OffsetAxes,
}

impl Lodcm {
    /// Assemble the device. The motor map must cover every required
    /// catalog role.
    pub fn new(config: LodcmConfig, parts: LodcmParts) -> LodcmResult<Self> {
        config.validate()?;
        let missing: Vec<&str> = crate::config::REQUIRED_MOTOR_ROLES
            .iter()
            .filter(|role| !parts.motors.contains_key(**role))
            .copied()
            .collect();
        if !missing.is_empty() {
            return Err(LodcmError::Configuration(format!(
                "missing axes for roles: {}",
                missing.join(", ")
            )));
        }
        Ok(Self {
            config,
            tower_1: parts.tower_1,
            tower_2: parts.tower_2,
            diagnostics: parts.diagnostics,
            motors: parts.motors,
            offsets: parts.offsets,
        })
    }

    /// Device configuration.
    pub fn config(&self) -> &LodcmConfig {
        &self.config
    }

    /// Crystal tower 1.
    pub fn tower_1(&self) -> &CrystalTower {
        &self.tower_1
    }

    /// Crystal tower 2.
    pub fn tower_2(&self) -> &CrystalTower {
        &self.tower_2
    }

    /// Diagnostic-tower positioners.
    pub fn diagnostics(&self) -> &DiagnosticPositioners {
        &self.diagnostics
    }

    /// Catalog axis by role name.
    pub fn axis(&self, role: &str) -> LodcmResult<&Axis> {
        self.motors.get(role).ok_or_else(|| {
            LodcmError::Configuration(format!("no axis constructed for role '{role}'"))
        })
    }

    // =========================================================================
    // Beam path
    // =========================================================================

    /// True if either crystal of the lead positioner is in the beam.
    pub async fn inserted(&self) -> LodcmResult<bool> {
        self.tower_1.lead().is_inserted().await
    }

    /// True if no crystal of the lead positioner is in the beam.
    pub async fn removed(&self) -> LodcmResult<bool> {
        self.tower_1.lead().is_removed().await
    }

    /// Move the lead crystal out of the beam.
    pub async fn remove(&self, wait: bool, timeout: Option<Duration>) -> LodcmResult<MoveHandle> {
        self.tower_1.lead().remove(wait, timeout).await
    }

    /// Beam transmission of the lead positioner's current state.
    pub async fn transmission(&self) -> LodcmResult<Option<f64>> {
        self.tower_1.lead().transmission().await
    }

    /// All candidate downstream branches.
    pub fn branches(&self) -> Vec<String> {
        vec![self.config.main_line.clone(), self.config.mono_line.clone()]
    }

    /// Which beamline(s) the light is reaching.
    ///
    /// Lead OUT passes the main line; Si diverts everything to the mono
    /// line; diamond splits onto both. Indeterminate states read as fully
    /// blocked. Diagnostics sitting in the mono path strip the mono line
    /// from the result.
    pub async fn destination(&self) -> LodcmResult<Vec<String>> {
        let lead = self.tower_1.lead().current_state().await?;
        let mut dest = match lead.as_known() {
            Some("OUT") => vec![self.config.main_line.clone()],
            Some("Si") => vec![self.config.mono_line.clone()],
            Some("C") => vec![
                self.config.main_line.clone(),
                self.config.mono_line.clone(),
            ],
            _ => Vec::new(),
        };

        if !self.diagnostics_clear().await? {
            dest.retain(|line| line != &self.config.mono_line);
        }

        Ok(dest)
    }

    /// Check if the diagnostics are clear. All but the diode may prevent
    /// beam; the diode is transmissive and is deliberately excluded.
    pub async fn diagnostics_clear(&self) -> LodcmResult<bool> {
        let yag_clear = self.diagnostics.yag.is_removed().await?;
        let dectris_clear = self.diagnostics.dectris.is_removed().await?;
        let foil_clear = self.diagnostics.foil.is_removed().await?;
        Ok(yag_clear && dectris_clear && foil_clear)
    }

    /// Remove all diagnostic components concurrently.
    ///
    /// Every sub-command is issued before anything is awaited; the returned
    /// handle resolves once all of them have. A timeout fails the wait but
    /// does not recall commands already in flight.
    pub async fn remove_all_diagnostics(
        &self,
        wait: bool,
        timeout: Option<Duration>,
    ) -> LodcmResult<MoveHandle> {
        debug!("removing {} diagnostics", self.config.name);
        let mut handles = Vec::with_capacity(4);
        for positioner in [
            &self.diagnostics.yag,
            &self.diagnostics.dectris,
            &self.diagnostics.diode,
            &self.diagnostics.foil,
        ] {
            handles.push(positioner.remove(false, None).await?);
        }
        let joined = MoveHandle::join("diagnostics removal", handles);
        if wait {
            joined.wait_opt(timeout).await?;
            return Ok(MoveHandle::completed("diagnostics removal"));
        }
        Ok(joined)
    }

    // =========================================================================
    // Material / reflection
    // =========================================================================

    /// Material engaged in tower 1. `check` turns indeterminacy into an
    /// error.
    pub async fn first_tower_material(&self, check: bool) -> LodcmResult<Option<Material>> {
        self.tower_1.material(check).await
    }

    /// Material engaged in tower 2.
    pub async fn second_tower_material(&self, check: bool) -> LodcmResult<Option<Material>> {
        self.tower_2.material(check).await
    }

    /// Material agreed by both towers.
    ///
    /// Disagreement between the towers is a physically invalid crystal
    /// arrangement and always fails with [`LodcmError::Mismatch`],
    /// regardless of `check`; only per-tower indeterminacy is suppressed by
    /// `check = false`.
    pub async fn material(&self, check: bool) -> LodcmResult<Option<Material>> {
        let m_1 = self.first_tower_material(check).await?;
        let m_2 = self.second_tower_material(check).await?;
        if m_1 != m_2 {
            warn!("crystals do not match: tower 1: {m_1:?}, tower 2: {m_2:?}");
            return Err(LodcmError::Mismatch {
                tower_1: fmt_material(m_1),
                tower_2: fmt_material(m_2),
            });
        }
        Ok(m_1)
    }

    /// Reflection of tower 1.
    pub async fn first_tower_reflection(&self, check: bool) -> LodcmResult<Option<Reflection>> {
        self.tower_1.reflection(check).await
    }

    /// Reflection of tower 2.
    pub async fn second_tower_reflection(&self, check: bool) -> LodcmResult<Option<Reflection>> {
        self.tower_2.reflection(check).await
    }

    /// Reflection agreed by both towers. Disagreement always fails with
    /// [`LodcmError::Mismatch`], as for [`Lodcm::material`].
    pub async fn reflection(&self, check: bool) -> LodcmResult<Option<Reflection>> {
        let r_1 = self.first_tower_reflection(check).await?;
        let r_2 = self.second_tower_reflection(check).await?;
        if r_1 != r_2 {
            warn!("crystals do not match: tower 1: {r_1:?}, tower 2: {r_2:?}");
            return Err(LodcmError::Mismatch {
                tower_1: fmt_reflection(r_1),
                tower_2: fmt_reflection(r_2),
            });
        }
        Ok(r_1)
    }

    /// The agreed reflection rendered as a concatenated index string
    /// (`(1, 1, 1)` renders as `"111"`), for display.
    pub async fn reflection_compact(&self, check: bool) -> LodcmResult<Option<String>> {
        Ok(self.reflection(check).await?.map(|r| r.compact()))
    }

    // =========================================================================
    // Energy
    // =========================================================================

    /// Photon energy in keV derived from tower 1.
    ///
    /// Material and reflection default to the live tower-1 inference (in
    /// strict mode); the Bragg angle is read from the offset axis matching
    /// the material.
    pub async fn first_tower_energy(
        &self,
        material: Option<Material>,
        reflection: Option<Reflection>,
    ) -> LodcmResult<f64> {
        let material = match material {
            Some(m) => m,
            None => require(self.tower_1.material(true).await?, "tower 1 material")?,
        };
        let reflection = match reflection {
            Some(r) => r,
            None => require(self.tower_1.reflection(true).await?, "tower 1 reflection")?,
        };
        let theta_axis = match material {
            Material::Silicon => &self.offsets.th1_si,
            Material::Diamond => &self.offsets.th1_c,
        };
        tower_energy_kev(theta_axis, material, reflection).await
    }

    /// Photon energy in keV derived from tower 2, for cross-checks. Not
    /// reconciled with tower 1 automatically.
    pub async fn second_tower_energy(
        &self,
        material: Option<Material>,
        reflection: Option<Reflection>,
    ) -> LodcmResult<f64> {
        let material = match material {
            Some(m) => m,
            None => require(self.tower_2.material(true).await?, "tower 2 material")?,
        };
        let reflection = match reflection {
            Some(r) => r,
            None => require(self.tower_2.reflection(true).await?, "tower 2 reflection")?,
        };
        let theta_axis = match material {
            Material::Silicon => &self.offsets.th2_si,
            Material::Diamond => &self.offsets.th2_c,
        };
        tower_energy_kev(theta_axis, material, reflection).await
    }

    /// Photon energy in keV. Energy is determined by the first crystal.
    pub async fn energy(
        &self,
        material: Option<Material>,
        reflection: Option<Reflection>,
    ) -> LodcmResult<f64> {
        self.first_tower_energy(material, reflection).await
    }

    /// Motor angle and z offset needed to reach an energy (keV).
    ///
    /// Material and reflection default to the live cross-tower agreement
    /// (strict mode). Returns `(theta_deg, z_offset_mm, material)`.
    pub async fn calc_energy(
        &self,
        energy_kev: f64,
        material: Option<Material>,
        reflection: Option<Reflection>,
    ) -> LodcmResult<(f64, f64, Material)> {
        let reflection = match reflection {
            Some(r) => r,
            None => require(self.reflection(true).await?, "agreed reflection")?,
        };
        let material = match material {
            Some(m) => m,
            None => require(self.material(true).await?, "agreed material")?,
        };
        let (theta, z) = calc::energy_to_geometry(energy_kev * 1000.0, material, reflection)?;
        Ok((theta, z, material))
    }

    // =========================================================================
    // Pseudo-position transform
    // =========================================================================

    /// Forward transform: logical energy to real axis targets.
    ///
    /// The energy-to-motion coupling is not wired up; the device reports
    /// energy but does not drive it. This is the declared extension point
    /// for the future alignment feature.
    pub fn forward(&self, _energy_kev: f64) -> LodcmResult<PseudoReadback> {
        Err(LodcmError::NotSupported(
            "live motion from a target energy is not supported yet; \
             the LODCM reports material/energy only"
                .to_string(),
        ))
    }

    /// Inverse transform: real axis readbacks to the derived pseudo
    /// quantities (energy plus the per-material theta/z offsets).
    pub async fn inverse(&self) -> LodcmResult<PseudoReadback> {
        let material = require(self.material(true).await?, "agreed material")?;
        let reflection = require(self.reflection(true).await?, "agreed reflection")?;
        let energy_kev = self
            .first_tower_energy(Some(material), Some(reflection))
            .await?;
        let (theta, z) = calc::energy_to_geometry(energy_kev * 1000.0, material, reflection)?;
        Ok(PseudoReadback {
            material,
            reflection,
            energy_kev,
            theta_deg: theta,
            // The towers translate in opposite directions.
            z1_offset_mm: -z,
            z2_offset_mm: z,
        })
    }

    // =========================================================================
    // Status
    // =========================================================================

    /// Collect a status snapshot of every axis plus the derived summary.
    ///
    /// Individual readback failures degrade to placeholders; the snapshot
    /// itself never fails.
    pub async fn status(&self) -> StatusSnapshot {
        let mut motors: HashMap<String, Option<AxisReadback>> = HashMap::new();
        for (role, axis) in &self.motors {
            motors.insert(role.clone(), axis.read().await.ok());
        }

        let material = self.material(false).await.ok().flatten();
        let energy_kev = self.energy(None, None).await.ok();
        let reflection = self.reflection(false).await.ok().flatten();

        StatusSnapshot {
            timestamp: chrono::Utc::now(),
            hutch: self.config.hutch.tag().to_string(),
            name: self.config.name.clone(),
            material,
            energy_kev,
            reflection,
            motors,
        }
    }
}

async fn tower_energy_kev(
    theta_axis: &Axis,
    material: Material,
    reflection: Reflection,
) -> LodcmResult<f64> {
    let theta = theta_axis.position().await?;
    let d = calc::d_spacing(material, reflection)?;
    let wavelength = calc::bragg_angle_to_wavelength(theta, d)?;
    Ok(calc::wavelength_to_energy(wavelength)? / 1000.0)
}

fn require<T>(value: Option<T>, what: &str) -> LodcmResult<T> {
    value.ok_or_else(|| {
        LodcmError::IndeterminateState(format!("unable to determine the {what}"))
    })
}

fn fmt_material(m: Option<Material>) -> String {
    m.map_or_else(|| "None".to_string(), |m| m.label().to_string())
}

fn fmt_reflection(r: Option<Reflection>) -> String {
    r.map_or_else(|| "None".to_string(), |r| r.compact())
}
