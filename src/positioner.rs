//! Discrete multi-state positioners.
//!
//! The original deployment modeled each positioner variant (H1N, YAG screen,
//! Dectris slide, filter foil, crystal-state axes) as its own subtype
//! differing only in the configured state list. Here a single parametric
//! [`StatePositioner`] is configured at construction from a declarative
//! [`StateSpec`]; the variant constructors live in this module as plain
//! functions over specs.
//!
//! A positioner maps the raw label reported by hardware onto exactly one
//! canonical state or the [`StateLabel::Unknown`] sentinel. The "in" and
//! "out" subsets drive `is_inserted`/`is_removed`; either subset may be
//! empty (a crystal-state axis has no true "home", so it can never report
//! removed).

use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Hutch;
use crate::error::{LodcmError, LodcmResult};
use crate::hardware::{MoveHandle, StateBackend};

/// Canonical state label reported after alias resolution.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StateLabel {
    /// One of the configured states.
    Known(String),
    /// The raw value did not map onto any configured state.
    Unknown,
}

impl StateLabel {
    /// The known label, if any.
    pub fn as_known(&self) -> Option<&str> {
        match self {
            StateLabel::Known(s) => Some(s.as_str()),
            StateLabel::Unknown => None,
        }
    }

    /// True when the label equals the given state name.
    pub fn is(&self, state: &str) -> bool {
        matches!(self, StateLabel::Known(s) if s == state)
    }
}

impl std::fmt::Display for StateLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StateLabel::Known(s) => f.write_str(s),
            StateLabel::Unknown => f.write_str("Unknown"),
        }
    }
}

/// Declarative description of a positioner's state machine.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StateSpec {
    /// Ordered list of canonical state names.
    pub states: Vec<String>,
    /// Subset counted as "in the beam".
    pub in_states: Vec<String>,
    /// Subset counted as "out of the beam". When empty, `is_removed` falls
    /// back to "unambiguously not inserted".
    pub out_states: Vec<String>,
    /// Display aliases (alias -> canonical state).
    pub aliases: HashMap<String, String>,
    /// Per-state beam transmission, where known.
    pub transmission: HashMap<String, f64>,
}

impl StateSpec {
    fn strs(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    /// Spec with the given states, in-set, and out-set.
    pub fn new(states: &[&str], in_states: &[&str], out_states: &[&str]) -> Self {
        Self {
            states: Self::strs(states),
            in_states: Self::strs(in_states),
            out_states: Self::strs(out_states),
            aliases: HashMap::new(),
            transmission: HashMap::new(),
        }
    }

    /// Add a display alias.
    pub fn with_alias(mut self, alias: &str, canonical: &str) -> Self {
        self.aliases.insert(alias.to_string(), canonical.to_string());
        self
    }

    /// Add a per-state transmission value.
    pub fn with_transmission(mut self, state: &str, transmission: f64) -> Self {
        self.transmission.insert(state.to_string(), transmission);
        self
    }

    /// Check internal consistency: in/out subsets must name configured
    /// states and must not overlap.
    pub fn validate(&self) -> LodcmResult<()> {
        for s in self.in_states.iter().chain(&self.out_states) {
            if !self.states.contains(s) {
                return Err(LodcmError::Configuration(format!(
                    "state '{s}' named in in/out set but absent from state list"
                )));
            }
        }
        for s in &self.in_states {
            if self.out_states.contains(s) {
                return Err(LodcmError::Configuration(format!(
                    "state '{s}' appears in both the in set and the out set"
                )));
            }
        }
        for canonical in self.aliases.values() {
            if !self.states.contains(canonical) {
                return Err(LodcmError::Configuration(format!(
                    "alias target '{canonical}' is not a configured state"
                )));
            }
        }
        Ok(())
    }

    /// True when the spec declares an explicit OUT state.
    pub fn has_out_state(&self) -> bool {
        self.states.iter().any(|s| s == "OUT")
    }
}

/// A discrete in/out/multi-state device over a hardware backend.
#[derive(Clone)]
pub struct StatePositioner {
    name: String,
    spec: StateSpec,
    backend: Arc<dyn StateBackend>,
}

impl StatePositioner {
    /// New positioner; fails on an inconsistent spec.
    pub fn new(
        name: &str,
        spec: StateSpec,
        backend: Arc<dyn StateBackend>,
    ) -> LodcmResult<Self> {
        spec.validate()?;
        Ok(Self {
            name: name.to_string(),
            spec,
            backend,
        })
    }

    /// Positioner name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The configured state machine.
    pub fn spec(&self) -> &StateSpec {
        &self.spec
    }

    /// Resolve a raw hardware label to a canonical state.
    fn canonicalize(&self, raw: &str) -> StateLabel {
        if let Some(canonical) = self.spec.aliases.get(raw) {
            return StateLabel::Known(canonical.clone());
        }
        if self.spec.states.iter().any(|s| s == raw) {
            return StateLabel::Known(raw.to_string());
        }
        StateLabel::Unknown
    }

    /// Poll the current canonical state.
    pub async fn current_state(&self) -> LodcmResult<StateLabel> {
        let raw = self.backend.read_raw().await?;
        Ok(self.canonicalize(&raw))
    }

    /// True iff the current state is in the "in" set. A positioner with an
    /// empty in set can never report inserted.
    pub async fn is_inserted(&self) -> LodcmResult<bool> {
        let state = self.current_state().await?;
        Ok(match state.as_known() {
            Some(label) => self.spec.in_states.iter().any(|s| s == label),
            None => false,
        })
    }

    /// True iff the current state is in the "out" set. With no explicit out
    /// set the positioner reports removed when it is unambiguously not in
    /// the "in" set; an unknown state is never removed.
    pub async fn is_removed(&self) -> LodcmResult<bool> {
        let state = self.current_state().await?;
        let Some(label) = state.as_known() else {
            return Ok(false);
        };
        if !self.spec.out_states.is_empty() {
            return Ok(self.spec.out_states.iter().any(|s| s == label));
        }
        if self.spec.in_states.is_empty() {
            // No out set and no in set: nothing to be removed from.
            return Ok(false);
        }
        Ok(!self.spec.in_states.iter().any(|s| s == label))
    }

    /// Transmission of the current state, where configured. Out states
    /// transmit fully.
    pub async fn transmission(&self) -> LodcmResult<Option<f64>> {
        let state = self.current_state().await?;
        let Some(label) = state.as_known() else {
            return Ok(None);
        };
        if let Some(t) = self.spec.transmission.get(label) {
            return Ok(Some(*t));
        }
        if self.spec.out_states.iter().any(|s| s == label) {
            return Ok(Some(1.0));
        }
        Ok(None)
    }

    /// Command a move to a named state. The target must be a configured
    /// state (aliases accepted); otherwise the command fails with a
    /// configuration error before touching hardware.
    pub async fn move_to(
        &self,
        state: &str,
        wait: bool,
        timeout: Option<Duration>,
    ) -> LodcmResult<MoveHandle> {
        let canonical = match self.canonicalize(state) {
            StateLabel::Known(s) => s,
            StateLabel::Unknown => {
                return Err(LodcmError::Configuration(format!(
                    "'{state}' is not a configured state of positioner '{}' (states: {})",
                    self.name,
                    self.spec.states.join(", ")
                )))
            }
        };
        debug!("commanding positioner '{}' to '{canonical}'", self.name);
        let handle = self.backend.command_state(&canonical).await?;
        if wait {
            handle.wait_opt(timeout).await?;
            return Ok(MoveHandle::completed(format!(
                "{} -> {canonical}",
                self.name
            )));
        }
        Ok(handle)
    }

    /// Move to the first configured out state. A positioner without an out
    /// state cannot be removed and fails with a configuration error.
    pub async fn remove(&self, wait: bool, timeout: Option<Duration>) -> LodcmResult<MoveHandle> {
        let out = self.spec.out_states.first().cloned().ok_or_else(|| {
            LodcmError::Configuration(format!(
                "positioner '{}' has no out state to remove to",
                self.name
            ))
        })?;
        self.move_to(&out, wait, timeout).await
    }
}

impl std::fmt::Debug for StatePositioner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatePositioner")
            .field("name", &self.name)
            .field("states", &self.spec.states)
            .finish()
    }
}

// =============================================================================
// Variant specs
// =============================================================================

/// H1N: tower 1 lead positioner. OUT, or one of the two crystals in beam.
pub fn h1n_spec() -> StateSpec {
    StateSpec::new(&["OUT", "C", "Si"], &["C", "Si"], &["OUT"])
        .with_alias("IN", "C")
        .with_transmission("C", 0.8)
        .with_transmission("Si", 0.7)
}

/// YAG imaging screen with three slit positions.
pub fn yag_screen_spec() -> StateSpec {
    StateSpec::new(
        &["OUT", "YAG", "SLIT1", "SLIT2", "SLIT3"],
        &["YAG", "SLIT1", "SLIT2", "SLIT3"],
        &["OUT"],
    )
    .with_alias("IN", "YAG")
}

/// Dectris detector slide; has a second low out position.
pub fn dectris_spec() -> StateSpec {
    StateSpec::new(
        &["OUT", "DECTRIS", "SLIT1", "SLIT2", "SLIT3", "OUTLOW"],
        &["DECTRIS", "SLIT1", "SLIT2", "SLIT3"],
        &["OUT", "OUTLOW"],
    )
    .with_alias("IN", "DECTRIS")
}

/// Transmissive PIPS diode; in or out.
pub fn diode_spec() -> StateSpec {
    StateSpec::new(&["OUT", "IN"], &["IN"], &["OUT"])
}

/// Filter-foil wheel. The installed materials depend on the hutch.
pub fn foil_spec(hutch: Hutch) -> StateSpec {
    let materials = hutch.foil_materials();
    let mut states: Vec<&str> = vec!["OUT"];
    states.extend_from_slice(materials);
    StateSpec::new(&states, materials, &["OUT"])
}

/// Crystal-state axis (Y1/CHI1/H2N/Y2/CHI2 pattern): reports which material
/// the axis is aligned for, with no out position at all.
pub fn crystal_state_spec() -> StateSpec {
    StateSpec::new(&["C", "Si"], &["C", "Si"], &[])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::mock::SimState;

    fn positioner(spec: StateSpec, raw: &str) -> StatePositioner {
        StatePositioner::new("test", spec, Arc::new(SimState::new(raw))).unwrap()
    }

    #[tokio::test]
    async fn test_alias_resolves_to_canonical() {
        let p = positioner(h1n_spec(), "IN");
        assert_eq!(p.current_state().await.unwrap(), StateLabel::Known("C".into()));
        assert!(p.is_inserted().await.unwrap());
    }

    #[tokio::test]
    async fn test_unknown_raw_state() {
        let p = positioner(h1n_spec(), "MOVING");
        assert_eq!(p.current_state().await.unwrap(), StateLabel::Unknown);
        assert!(!p.is_inserted().await.unwrap());
        assert!(!p.is_removed().await.unwrap());
    }

    #[tokio::test]
    async fn test_inserted_removed_mutually_exclusive() {
        for raw in ["OUT", "C", "Si"] {
            let p = positioner(h1n_spec(), raw);
            let inserted = p.is_inserted().await.unwrap();
            let removed = p.is_removed().await.unwrap();
            assert!(
                !(inserted && removed),
                "state '{raw}' reported both inserted and removed"
            );
        }
    }

    #[tokio::test]
    async fn test_crystal_state_never_removed() {
        // Empty out set, non-empty in set: "removed" would require a state
        // outside the in set, and no such state exists.
        for raw in ["C", "Si"] {
            let p = positioner(crystal_state_spec(), raw);
            assert!(p.is_inserted().await.unwrap());
            assert!(!p.is_removed().await.unwrap());
        }
        let p = positioner(crystal_state_spec(), "C");
        assert!(p.remove(false, None).await.is_err());
    }

    #[tokio::test]
    async fn test_empty_in_set_never_inserted() {
        let spec = StateSpec::new(&["OUT"], &[], &["OUT"]);
        let p = positioner(spec, "OUT");
        assert!(!p.is_inserted().await.unwrap());
        assert!(p.is_removed().await.unwrap());
    }

    #[tokio::test]
    async fn test_move_to_unlisted_state_is_configuration_error() {
        let p = positioner(diode_spec(), "OUT");
        let err = p.move_to("SIDEWAYS", false, None).await.unwrap_err();
        assert!(matches!(err, LodcmError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_remove_moves_to_out() {
        let p = positioner(yag_screen_spec(), "YAG");
        p.remove(true, Some(Duration::from_secs(1))).await.unwrap();
        assert!(p.is_removed().await.unwrap());
    }

    #[tokio::test]
    async fn test_transmission_metadata() {
        let p = positioner(h1n_spec(), "C");
        assert_eq!(p.transmission().await.unwrap(), Some(0.8));
        let p = positioner(h1n_spec(), "OUT");
        assert_eq!(p.transmission().await.unwrap(), Some(1.0));
        let p = positioner(h1n_spec(), "garbage");
        assert_eq!(p.transmission().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_dectris_outlow_counts_as_removed() {
        let p = positioner(dectris_spec(), "OUTLOW");
        assert!(p.is_removed().await.unwrap());
    }

    #[tokio::test]
    async fn test_foil_states_depend_on_hutch() {
        let p = positioner(foil_spec(Hutch::Xcs), "Ge");
        assert!(p.is_inserted().await.unwrap());
        let p = positioner(foil_spec(Hutch::Xpp), "Ge");
        assert_eq!(p.current_state().await.unwrap(), StateLabel::Unknown);
    }

    #[test]
    fn test_spec_validation_rejects_overlap() {
        let spec = StateSpec::new(&["A", "B"], &["A"], &["A"]);
        assert!(spec.validate().is_err());
        let spec = StateSpec::new(&["A"], &["B"], &[]);
        assert!(spec.validate().is_err());
    }
}
