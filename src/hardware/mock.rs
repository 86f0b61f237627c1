//! Simulated hardware backends.
//!
//! Provides in-memory stand-ins for the external device layer so the full
//! composite device can be exercised without beamline hardware. All mocks use
//! async-safe operations (tokio::time::sleep, never std::thread::sleep).
//!
//! # Available Mocks
//!
//! - [`SimAxis`] - motor axis with optional move delay and readback jitter
//! - [`SimState`] - discrete positioner, with a `stuck()` mode whose
//!   commanded moves never complete (for timeout tests)
//! - [`SimReflection`] - settable reflection register

use async_trait::async_trait;
use log::debug;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};

use crate::calc::Reflection;
use crate::error::LodcmResult;
use crate::hardware::{
    AxisBackend, AxisReadback, MoveHandle, MoveSender, ReflectionRegister, StateBackend,
};

/// Simulated continuous motor axis.
///
/// Moves land after an optional fixed delay. Readbacks can carry a small
/// random jitter to mimic encoder noise; jitter defaults to zero so tests
/// see exact positions.
#[derive(Clone)]
pub struct SimAxis {
    position: Arc<RwLock<f64>>,
    setpoint: Arc<RwLock<f64>>,
    units: String,
    dial_offset: f64,
    move_delay: Duration,
    jitter: f64,
}

impl SimAxis {
    /// New axis at the given position, instant moves, no jitter.
    pub fn new(position: f64, units: &str) -> Self {
        Self {
            position: Arc::new(RwLock::new(position)),
            setpoint: Arc::new(RwLock::new(position)),
            units: units.to_string(),
            dial_offset: 0.0,
            move_delay: Duration::ZERO,
            jitter: 0.0,
        }
    }

    /// Delay applied to every commanded move.
    pub fn with_move_delay(mut self, delay: Duration) -> Self {
        self.move_delay = delay;
        self
    }

    /// Fixed user/dial offset.
    pub fn with_dial_offset(mut self, offset: f64) -> Self {
        self.dial_offset = offset;
        self
    }

    /// Uniform readback jitter amplitude.
    pub fn with_jitter(mut self, amplitude: f64) -> Self {
        self.jitter = amplitude;
        self
    }

    /// Directly set the current position, bypassing the move machinery.
    pub async fn set_position(&self, value: f64) {
        *self.position.write().await = value;
        *self.setpoint.write().await = value;
    }

    /// Jitter-free view of the current position.
    pub async fn read_position(&self) -> f64 {
        *self.position.read().await
    }
}

#[async_trait]
impl AxisBackend for SimAxis {
    async fn read(&self) -> LodcmResult<AxisReadback> {
        let mut value = *self.position.read().await;
        if self.jitter > 0.0 {
            value += rand::thread_rng().gen_range(-self.jitter..self.jitter);
        }
        Ok(AxisReadback {
            value,
            setpoint: *self.setpoint.read().await,
            dial_value: value - self.dial_offset,
            units: self.units.clone(),
        })
    }

    async fn command_move(&self, target: f64) -> LodcmResult<MoveHandle> {
        *self.setpoint.write().await = target;
        let (handle, sender) = MoveHandle::pending(format!("sim axis -> {target}"));
        let position = self.position.clone();
        let delay = self.move_delay;
        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            *position.write().await = target;
            debug!("sim axis settled at {target}");
            sender.complete(Ok(()));
        });
        Ok(handle)
    }
}

/// Simulated discrete state positioner.
#[derive(Clone)]
pub struct SimState {
    state: Arc<RwLock<String>>,
    move_delay: Duration,
    stuck: bool,
    // Senders parked here keep stuck commands pending instead of abandoned.
    parked: Arc<Mutex<Vec<MoveSender>>>,
}

impl SimState {
    /// New positioner reporting the given raw state.
    pub fn new(initial: &str) -> Self {
        Self {
            state: Arc::new(RwLock::new(initial.to_string())),
            move_delay: Duration::ZERO,
            stuck: false,
            parked: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Delay applied to every commanded state change.
    pub fn with_move_delay(mut self, delay: Duration) -> Self {
        self.move_delay = delay;
        self
    }

    /// A positioner whose commanded moves never complete. The hardware keeps
    /// reporting its old state and the completion handle stays pending.
    pub fn stuck(initial: &str) -> Self {
        Self {
            stuck: true,
            ..Self::new(initial)
        }
    }

    /// Directly set the reported raw state.
    pub async fn set_state(&self, label: &str) {
        *self.state.write().await = label.to_string();
    }

    /// The raw state the hardware currently reports.
    pub async fn read_state(&self) -> String {
        self.state.read().await.clone()
    }
}

#[async_trait]
impl StateBackend for SimState {
    async fn read_raw(&self) -> LodcmResult<String> {
        Ok(self.state.read().await.clone())
    }

    async fn command_state(&self, label: &str) -> LodcmResult<MoveHandle> {
        let (handle, sender) = MoveHandle::pending(format!("sim state -> {label}"));
        if self.stuck {
            debug!("sim state stuck, parking command to '{label}'");
            self.parked.lock().await.push(sender);
            return Ok(handle);
        }
        let state = self.state.clone();
        let delay = self.move_delay;
        let label = label.to_string();
        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            *state.write().await = label;
            sender.complete(Ok(()));
        });
        Ok(handle)
    }
}

/// Simulated read-only reflection register.
#[derive(Clone)]
pub struct SimReflection {
    reflection: Arc<RwLock<Option<Reflection>>>,
}

impl SimReflection {
    /// Register holding the given reflection.
    pub fn new(reflection: Reflection) -> Self {
        Self {
            reflection: Arc::new(RwLock::new(Some(reflection))),
        }
    }

    /// Register with nothing stored.
    pub fn empty() -> Self {
        Self {
            reflection: Arc::new(RwLock::new(None)),
        }
    }

    /// Overwrite the stored reflection.
    pub async fn set(&self, reflection: Option<Reflection>) {
        *self.reflection.write().await = reflection;
    }
}

#[async_trait]
impl ReflectionRegister for SimReflection {
    async fn read_reflection(&self) -> LodcmResult<Option<Reflection>> {
        Ok(*self.reflection.read().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sim_axis_move_updates_readback() {
        let axis = SimAxis::new(0.0, "mm");
        let handle = axis.command_move(12.5).await.unwrap();
        handle.wait().await.unwrap();
        let rb = axis.read().await.unwrap();
        assert_eq!(rb.value, 12.5);
        assert_eq!(rb.setpoint, 12.5);
        assert_eq!(rb.units, "mm");
    }

    #[tokio::test]
    async fn test_sim_axis_dial_offset() {
        let axis = SimAxis::new(10.0, "deg").with_dial_offset(2.0);
        let rb = axis.read().await.unwrap();
        assert_eq!(rb.dial_value, 8.0);
    }

    #[tokio::test]
    async fn test_sim_state_move() {
        let state = SimState::new("OUT");
        assert_eq!(state.read_raw().await.unwrap(), "OUT");
        let handle = state.command_state("Si").await.unwrap();
        handle.wait().await.unwrap();
        assert_eq!(state.read_raw().await.unwrap(), "Si");
    }

    #[tokio::test]
    async fn test_stuck_state_never_completes() {
        let state = SimState::stuck("YAG");
        let handle = state.command_state("OUT").await.unwrap();
        let err = handle
            .wait_timeout(Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, crate::error::LodcmError::Timeout { .. }));
        // Hardware still reports the old state.
        assert_eq!(state.read_raw().await.unwrap(), "YAG");
    }

    #[tokio::test]
    async fn test_sim_reflection_register() {
        let reg = SimReflection::new(Reflection(1, 1, 1));
        assert_eq!(
            reg.read_reflection().await.unwrap(),
            Some(Reflection(1, 1, 1))
        );
        let empty = SimReflection::empty();
        assert_eq!(empty.read_reflection().await.unwrap(), None);
    }
}
