//! Crystal tower state inference.
//!
//! A tower is one physical crystal mount: a lead beam-intercepting
//! positioner plus the y and chi crystal-state axes. The material the tower
//! currently presents to the beam is inferred purely from the constituent
//! state labels: every constituent must agree on the same material, except
//! that a constituent with an explicit OUT state is accepted while OUT
//! (material-agnostic pass-through). Anything else is indeterminate.
//!
//! Classification is split in two: [`CrystalTower::snapshot`] does the
//! hardware polling, and [`classify_material`] is a pure function over the
//! already-fetched labels.

use log::warn;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::calc::{Material, Reflection};
use crate::error::{LodcmError, LodcmResult};
use crate::hardware::ReflectionRegister;
use crate::positioner::{StateLabel, StatePositioner};

/// One constituent's contribution to a tower snapshot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConstituentState {
    /// Positioner name, for diagnostics.
    pub name: String,
    /// Canonical state label at poll time.
    pub label: StateLabel,
    /// Whether this positioner has an explicit OUT state and is therefore
    /// accepted as material-agnostic while OUT.
    pub tolerates_out: bool,
}

/// All constituent states of one tower, fetched in a single pass.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TowerSnapshot {
    /// Tower number (1 or 2).
    pub tower: u8,
    /// Constituent labels, lead positioner first.
    pub constituents: Vec<ConstituentState>,
}

/// Pure material classification over fetched constituent states.
///
/// Returns `Some(material)` iff every constituent reports that material's
/// label, allowing OUT for constituents that tolerate it. Returns `None`
/// when no single material satisfies all constituents.
pub fn classify_material(constituents: &[ConstituentState]) -> Option<Material> {
    for material in [Material::Diamond, Material::Silicon] {
        let all_agree = constituents.iter().all(|c| {
            c.label.is(material.label()) || (c.tolerates_out && c.label.is("OUT"))
        });
        if all_agree && !constituents.is_empty() {
            return Some(material);
        }
    }
    None
}

/// One crystal mount with its state positioners and reflection registers.
#[derive(Clone)]
pub struct CrystalTower {
    tower: u8,
    lead: StatePositioner,
    y_state: StatePositioner,
    chi_state: StatePositioner,
    diamond_ref: Arc<dyn ReflectionRegister>,
    silicon_ref: Arc<dyn ReflectionRegister>,
}

impl CrystalTower {
    /// Assemble a tower from already-constructed parts.
    pub fn new(
        tower: u8,
        lead: StatePositioner,
        y_state: StatePositioner,
        chi_state: StatePositioner,
        diamond_ref: Arc<dyn ReflectionRegister>,
        silicon_ref: Arc<dyn ReflectionRegister>,
    ) -> Self {
        Self {
            tower,
            lead,
            y_state,
            chi_state,
            diamond_ref,
            silicon_ref,
        }
    }

    /// Tower number (1 or 2).
    pub fn number(&self) -> u8 {
        self.tower
    }

    /// The lead beam-intercepting positioner.
    pub fn lead(&self) -> &StatePositioner {
        &self.lead
    }

    /// Poll every constituent once.
    pub async fn snapshot(&self) -> LodcmResult<TowerSnapshot> {
        let mut constituents = Vec::with_capacity(3);
        for p in [&self.lead, &self.y_state, &self.chi_state] {
            constituents.push(ConstituentState {
                name: p.name().to_string(),
                label: p.current_state().await?,
                tolerates_out: p.spec().has_out_state(),
            });
        }
        Ok(TowerSnapshot {
            tower: self.tower,
            constituents,
        })
    }

    /// Infer the engaged material. With `check`, an indeterminate tower is
    /// an error; otherwise it reports `None`.
    pub async fn material(&self, check: bool) -> LodcmResult<Option<Material>> {
        let snapshot = self.snapshot().await?;
        let material = classify_material(&snapshot.constituents);
        if check && material.is_none() {
            return Err(LodcmError::IndeterminateState(format!(
                "unable to determine tower {} crystal material from {:?}",
                self.tower,
                snapshot
                    .constituents
                    .iter()
                    .map(|c| format!("{}={}", c.name, c.label))
                    .collect::<Vec<_>>()
            )));
        }
        Ok(material)
    }

    /// Read the reflection register for the inferred (or given) material.
    /// With `check`, an unresolvable reflection is an error; otherwise it
    /// reports `None`.
    pub async fn reflection(&self, check: bool) -> LodcmResult<Option<Reflection>> {
        let reflection = match self.material(false).await? {
            Some(Material::Diamond) => self.diamond_ref.read_reflection().await?,
            Some(Material::Silicon) => self.silicon_ref.read_reflection().await?,
            None => None,
        };
        if check && reflection.is_none() {
            warn!("tower {} reflection could not be resolved", self.tower);
            return Err(LodcmError::IndeterminateState(format!(
                "unable to determine tower {} crystal reflection",
                self.tower
            )));
        }
        Ok(reflection)
    }
}

impl std::fmt::Debug for CrystalTower {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrystalTower")
            .field("tower", &self.tower)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::mock::{SimReflection, SimState};
    use crate::positioner::{crystal_state_spec, h1n_spec};

    fn constituent(name: &str, label: &str, tolerates_out: bool) -> ConstituentState {
        ConstituentState {
            name: name.to_string(),
            label: if label == "?" {
                StateLabel::Unknown
            } else {
                StateLabel::Known(label.to_string())
            },
            tolerates_out,
        }
    }

    #[test]
    fn test_classify_all_silicon() {
        let states = [
            constituent("h1n", "Si", true),
            constituent("y1", "Si", false),
            constituent("chi1", "Si", false),
        ];
        assert_eq!(classify_material(&states), Some(Material::Silicon));
    }

    #[test]
    fn test_classify_lead_out_passes_through() {
        let states = [
            constituent("h1n", "OUT", true),
            constituent("y1", "C", false),
            constituent("chi1", "C", false),
        ];
        assert_eq!(classify_material(&states), Some(Material::Diamond));
    }

    #[test]
    fn test_classify_out_not_tolerated_on_crystal_state() {
        let states = [
            constituent("h2n", "OUT", false),
            constituent("y2", "C", false),
            constituent("chi2", "C", false),
        ];
        assert_eq!(classify_material(&states), None);
    }

    #[test]
    fn test_classify_mixed_materials_is_indeterminate() {
        let states = [
            constituent("h1n", "C", true),
            constituent("y1", "Si", false),
            constituent("chi1", "C", false),
        ];
        assert_eq!(classify_material(&states), None);
    }

    #[test]
    fn test_classify_unknown_label_is_indeterminate() {
        let states = [
            constituent("h1n", "?", true),
            constituent("y1", "Si", false),
            constituent("chi1", "Si", false),
        ];
        assert_eq!(classify_material(&states), None);
    }

    #[test]
    fn test_classify_empty_is_indeterminate() {
        assert_eq!(classify_material(&[]), None);
    }

    fn sim_tower(lead_raw: &str, y_raw: &str, chi_raw: &str) -> CrystalTower {
        let lead =
            StatePositioner::new("h1n", h1n_spec(), Arc::new(SimState::new(lead_raw))).unwrap();
        let y = StatePositioner::new(
            "y1_state",
            crystal_state_spec(),
            Arc::new(SimState::new(y_raw)),
        )
        .unwrap();
        let chi = StatePositioner::new(
            "chi1_state",
            crystal_state_spec(),
            Arc::new(SimState::new(chi_raw)),
        )
        .unwrap();
        CrystalTower::new(
            1,
            lead,
            y,
            chi,
            Arc::new(SimReflection::new(Reflection(2, 2, 0))),
            Arc::new(SimReflection::new(Reflection(1, 1, 1))),
        )
    }

    #[tokio::test]
    async fn test_tower_material_inference() {
        let tower = sim_tower("Si", "Si", "Si");
        assert_eq!(tower.material(false).await.unwrap(), Some(Material::Silicon));
    }

    #[tokio::test]
    async fn test_tower_indeterminate_soft_and_strict() {
        let tower = sim_tower("C", "Si", "Si");
        assert_eq!(tower.material(false).await.unwrap(), None);
        let err = tower.material(true).await.unwrap_err();
        assert!(matches!(err, LodcmError::IndeterminateState(_)));
    }

    #[tokio::test]
    async fn test_tower_reflection_follows_material() {
        let tower = sim_tower("C", "C", "C");
        assert_eq!(
            tower.reflection(false).await.unwrap(),
            Some(Reflection(2, 2, 0))
        );
        let tower = sim_tower("OUT", "Si", "Si");
        assert_eq!(
            tower.reflection(false).await.unwrap(),
            Some(Reflection(1, 1, 1))
        );
    }

    #[tokio::test]
    async fn test_tower_reflection_strict_mode() {
        let tower = sim_tower("C", "Si", "C");
        assert_eq!(tower.reflection(false).await.unwrap(), None);
        assert!(tower.reflection(true).await.is_err());
    }
}
