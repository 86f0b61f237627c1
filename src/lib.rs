//! Device model for a large-offset dual-crystal monochromator (LODCM).
//!
//! The LODCM lets a hutch multiplex with downstream beamlines: two crystal
//! towers steer/split the beam, with a diagnostic tower between them. This
//! crate derives the physical beam path, the engaged crystal material, the
//! reflection in use, and the photon energy from live hardware readbacks,
//! tolerating indeterminate or inconsistent hardware states.
//!
//! The device-communication layer is an external collaborator behind the
//! traits in [`hardware`]; simulated backends in [`hardware::mock`] and the
//! fully wired [`sim::SimLodcm`] allow running without beamline hardware.
//!
//! Alignment is out of scope: the device reports, it does not compute
//! corrective motion.

pub mod axis;
pub mod calc;
pub mod config;
pub mod error;
pub mod hardware;
pub mod lodcm;
pub mod positioner;
pub mod sim;
pub mod status;
pub mod tower;

pub use calc::{Material, Reflection};
pub use config::LodcmConfig;
pub use error::{LodcmError, LodcmResult};
pub use lodcm::Lodcm;
