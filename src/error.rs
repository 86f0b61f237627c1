//! Custom error types for the LODCM device model.
//!
//! This module defines the primary error type, `LodcmError`, for the entire
//! crate. Using the `thiserror` crate, it provides a centralized and
//! consistent way to handle the failure modes of a composite beamline device,
//! from configuration issues to indeterminate hardware states.
//!
//! ## Error Taxonomy
//!
//! - **`Config`**: Wraps errors from the `config` crate, typically related to
//!   file parsing or format issues in the configuration files.
//! - **`Configuration`**: Semantic errors in the configuration or in device
//!   usage, such as commanding a state positioner to a state that is not in
//!   its configured state list, or a catalog missing a required axis role.
//! - **`IndeterminateState`**: A material or reflection could not be resolved
//!   from the current hardware states and the caller demanded certainty
//!   (`check = true`). With `check = false` the same condition is reported as
//!   a `None`/`Unknown` sentinel instead.
//! - **`Mismatch`**: The two crystal towers disagree on material or
//!   reflection. This indicates a physically invalid crystal arrangement and
//!   is always raised, regardless of any `check` flag.
//! - **`InvalidGeometry`**: Degenerate reflection indices or non-physical
//!   inputs to the energy calculator (non-positive energy, angle out of the
//!   reachable range, ...).
//! - **`Timeout`**: A blocking wait on a completion handle exceeded its
//!   bound. The underlying hardware motion is *not* cancelled.
//! - **`Hardware`**: A backend read or command failed. The device-level
//!   communication layer is an external collaborator; its failures surface
//!   through this variant.
//! - **`NotSupported`**: The requested operation is a declared extension
//!   point that is not wired up yet (the energy-to-motion coupling of the
//!   pseudo-position transform).
//!
//! By using `#[from]`, `LodcmError` can be seamlessly created from underlying
//! error types, simplifying error handling throughout the crate with the `?`
//! operator.

use thiserror::Error;

/// Convenience alias for results using the crate error type.
pub type LodcmResult<T> = std::result::Result<T, LodcmError>;

/// Errors produced by the LODCM device model.
#[derive(Error, Debug)]
pub enum LodcmError {
    /// Error from the `config` crate while loading a configuration file.
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Semantic configuration error (invalid state name, malformed catalog).
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// A material/reflection could not be resolved and the caller demanded
    /// certainty.
    #[error("Indeterminate hardware state: {0}")]
    IndeterminateState(String),

    /// The two towers disagree on material or reflection.
    #[error("Invalid crystal arrangement: tower 1 reports {tower_1}, tower 2 reports {tower_2}")]
    Mismatch {
        /// What tower 1 resolved to ("C", "Si", "None", "111", ...).
        tower_1: String,
        /// What tower 2 resolved to.
        tower_2: String,
    },

    /// Non-physical input to the geometry/energy calculator.
    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    /// A blocking wait exceeded its bound. In-flight motion continues.
    #[error("Timed out after {timeout:?} waiting for {operation}")]
    Timeout {
        /// Human-readable description of what was being waited on.
        operation: String,
        /// The bound that was exceeded.
        timeout: std::time::Duration,
    },

    /// A hardware backend read or command failed.
    #[error("Hardware error: {0}")]
    Hardware(String),

    /// Declared but unimplemented extension point.
    #[error("Operation not supported: {0}")]
    NotSupported(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = LodcmError::Hardware("readback lost".to_string());
        assert_eq!(err.to_string(), "Hardware error: readback lost");
    }

    #[test]
    fn test_mismatch_display() {
        let err = LodcmError::Mismatch {
            tower_1: "C".into(),
            tower_2: "Si".into(),
        };
        assert!(err.to_string().contains("tower 1 reports C"));
        assert!(err.to_string().contains("tower 2 reports Si"));
    }

    #[test]
    fn test_timeout_display() {
        let err = LodcmError::Timeout {
            operation: "diagnostics removal".into(),
            timeout: std::time::Duration::from_secs(2),
        };
        assert!(err.to_string().contains("diagnostics removal"));
    }
}
