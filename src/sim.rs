//! Fully simulated LODCM.
//!
//! [`SimLodcm`] wires a complete [`Lodcm`] out of the mock hardware
//! backends and keeps clones of every backend handle so tests (and the
//! status CLI) can poke hardware states directly. The default arrangement
//! is the silicon configuration with the lead crystal out of the beam and
//! all diagnostics removed, sitting at roughly 10 keV on Si(111).

use std::collections::HashMap;
use std::sync::Arc;

use crate::axis::Axis;
use crate::calc::Reflection;
use crate::config::LodcmConfig;
use crate::error::LodcmResult;
use crate::hardware::mock::{SimAxis, SimReflection, SimState};
use crate::lodcm::{DiagnosticPositioners, Lodcm, LodcmParts, OffsetAxes};
use crate::positioner::{
    crystal_state_spec, dectris_spec, diode_spec, foil_spec, h1n_spec, yag_screen_spec,
    StatePositioner,
};
use crate::tower::CrystalTower;

/// Si(111) Bragg angle for ~10 keV, used as the simulated rest angle.
const SIM_THETA_SI_DEG: f64 = 11.4027;

/// Knobs for non-default simulated hardware.
#[derive(Clone, Copy, Debug, Default)]
pub struct SimOptions {
    /// Make the yag screen's commanded moves never complete.
    pub stuck_yag: bool,
}

/// A [`Lodcm`] over mock backends, with the backend handles exposed.
pub struct SimLodcm {
    /// The assembled device.
    pub device: Lodcm,

    /// Tower 1 lead positioner backend.
    pub h1n: SimState,
    /// Tower 1 y crystal-state backend.
    pub y1: SimState,
    /// Tower 1 chi crystal-state backend.
    pub chi1: SimState,
    /// Tower 2 lead positioner backend.
    pub h2n: SimState,
    /// Tower 2 y crystal-state backend.
    pub y2: SimState,
    /// Tower 2 chi crystal-state backend.
    pub chi2: SimState,

    /// Imaging screen backend.
    pub yag: SimState,
    /// Detector slide backend.
    pub dectris: SimState,
    /// Diode backend.
    pub diode: SimState,
    /// Foil wheel backend.
    pub foil: SimState,

    /// Tower 1 silicon theta-offset axis backend.
    pub th1_si: SimAxis,
    /// Tower 1 diamond theta-offset axis backend.
    pub th1_c: SimAxis,
    /// Tower 2 silicon theta-offset axis backend.
    pub th2_si: SimAxis,
    /// Tower 2 diamond theta-offset axis backend.
    pub th2_c: SimAxis,

    /// Tower 1 diamond reflection register.
    pub t1_c_ref: SimReflection,
    /// Tower 1 silicon reflection register.
    pub t1_si_ref: SimReflection,
    /// Tower 2 diamond reflection register.
    pub t2_c_ref: SimReflection,
    /// Tower 2 silicon reflection register.
    pub t2_si_ref: SimReflection,
}

impl SimLodcm {
    /// Build the default simulated device.
    pub fn new(config: LodcmConfig) -> LodcmResult<Self> {
        Self::with_options(config, SimOptions::default())
    }

    /// Build with non-default simulated hardware.
    pub fn with_options(config: LodcmConfig, options: SimOptions) -> LodcmResult<Self> {
        let h1n = SimState::new("OUT");
        let y1 = SimState::new("Si");
        let chi1 = SimState::new("Si");
        let h2n = SimState::new("Si");
        let y2 = SimState::new("Si");
        let chi2 = SimState::new("Si");

        let yag = if options.stuck_yag {
            SimState::stuck("YAG")
        } else {
            SimState::new("OUT")
        };
        let dectris = SimState::new("OUT");
        let diode = SimState::new("OUT");
        let foil = SimState::new("OUT");

        let t1_c_ref = SimReflection::new(Reflection(2, 2, 0));
        let t1_si_ref = SimReflection::new(Reflection(1, 1, 1));
        let t2_c_ref = SimReflection::new(Reflection(2, 2, 0));
        let t2_si_ref = SimReflection::new(Reflection(1, 1, 1));

        let tower_1 = CrystalTower::new(
            1,
            StatePositioner::new("h1n", h1n_spec(), Arc::new(h1n.clone()))?,
            StatePositioner::new("y1_state", crystal_state_spec(), Arc::new(y1.clone()))?,
            StatePositioner::new("chi1_state", crystal_state_spec(), Arc::new(chi1.clone()))?,
            Arc::new(t1_c_ref.clone()),
            Arc::new(t1_si_ref.clone()),
        );
        let tower_2 = CrystalTower::new(
            2,
            StatePositioner::new("h2n_state", crystal_state_spec(), Arc::new(h2n.clone()))?,
            StatePositioner::new("y2_state", crystal_state_spec(), Arc::new(y2.clone()))?,
            StatePositioner::new("chi2_state", crystal_state_spec(), Arc::new(chi2.clone()))?,
            Arc::new(t2_c_ref.clone()),
            Arc::new(t2_si_ref.clone()),
        );

        let diagnostics = DiagnosticPositioners {
            yag: StatePositioner::new("yag", yag_screen_spec(), Arc::new(yag.clone()))?,
            dectris: StatePositioner::new("dectris", dectris_spec(), Arc::new(dectris.clone()))?,
            diode: StatePositioner::new("diode", diode_spec(), Arc::new(diode.clone()))?,
            foil: StatePositioner::new(
                "foil",
                foil_spec(config.hutch),
                Arc::new(foil.clone()),
            )?,
        };

        let mut motors = HashMap::new();
        for (role, motor) in &config.motors {
            let units = if role.starts_with("th") || role.starts_with("ch") || role == "dr" {
                "deg"
            } else {
                "mm"
            };
            let axis = Axis::new(
                role,
                &motor.description,
                Arc::new(SimAxis::new(0.0, units)),
            )
            .with_soft_limits(-100.0, 100.0);
            motors.insert(role.clone(), axis);
        }

        let th1_si = SimAxis::new(SIM_THETA_SI_DEG, "deg");
        let th1_c = SimAxis::new(0.0, "deg");
        let th2_si = SimAxis::new(SIM_THETA_SI_DEG, "deg");
        let th2_c = SimAxis::new(0.0, "deg");
        let offsets = OffsetAxes {
            th1_si: Axis::new("th1_si", "Th1 motor offset for Si", Arc::new(th1_si.clone())),
            th1_c: Axis::new("th1_c", "Th1 motor offset for C", Arc::new(th1_c.clone())),
            th2_si: Axis::new("th2_si", "Th2 motor offset for Si", Arc::new(th2_si.clone())),
            th2_c: Axis::new("th2_c", "Th2 motor offset for C", Arc::new(th2_c.clone())),
            z1_si: Axis::new("z1_si", "Z1 motor offset for Si", Arc::new(SimAxis::new(0.0, "mm"))),
            z1_c: Axis::new("z1_c", "Z1 motor offset for C", Arc::new(SimAxis::new(0.0, "mm"))),
            z2_si: Axis::new("z2_si", "Z2 motor offset for Si", Arc::new(SimAxis::new(0.0, "mm"))),
            z2_c: Axis::new("z2_c", "Z2 motor offset for C", Arc::new(SimAxis::new(0.0, "mm"))),
        };

        let device = Lodcm::new(
            config,
            LodcmParts {
                tower_1,
                tower_2,
                diagnostics,
                motors,
                offsets,
            },
        )?;

        Ok(Self {
            device,
            h1n,
            y1,
            chi1,
            h2n,
            y2,
            chi2,
            yag,
            dectris,
            diode,
            foil,
            th1_si,
            th1_c,
            th2_si,
            th2_c,
            t1_c_ref,
            t1_si_ref,
            t2_c_ref,
            t2_si_ref,
        })
    }

    /// Put both towers into the given material arrangement.
    pub async fn set_arrangement(&self, lead: &str, material: &str) {
        self.h1n.set_state(lead).await;
        for state in [&self.y1, &self.chi1, &self.h2n, &self.y2, &self.chi2] {
            state.set_state(material).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calc::Material;

    #[tokio::test]
    async fn test_default_sim_is_silicon_out_and_clear() {
        let sim = SimLodcm::new(LodcmConfig::default()).unwrap();
        assert!(sim.device.removed().await.unwrap());
        assert!(sim.device.diagnostics_clear().await.unwrap());
        assert_eq!(
            sim.device.material(false).await.unwrap(),
            Some(Material::Silicon)
        );
        assert_eq!(sim.device.destination().await.unwrap(), vec!["MAIN"]);
    }

    #[tokio::test]
    async fn test_default_sim_energy_near_10_kev() {
        let sim = SimLodcm::new(LodcmConfig::default()).unwrap();
        let energy = sim.device.energy(None, None).await.unwrap();
        assert!((energy - 10.0).abs() < 0.01, "got {energy} keV");
    }

    #[tokio::test]
    async fn test_set_arrangement() {
        let sim = SimLodcm::new(LodcmConfig::default()).unwrap();
        sim.set_arrangement("C", "C").await;
        assert_eq!(
            sim.device.material(false).await.unwrap(),
            Some(Material::Diamond)
        );
    }
}
