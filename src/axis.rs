//! Continuous motor axis.
//!
//! An [`Axis`] pairs a role name and catalog metadata with a hardware
//! backend. It owns no motion logic of its own: reads are idempotent polls,
//! moves are forwarded to the backend and reported through completion
//! handles. Soft limits are carried as data; enforcement belongs to the
//! motion layer, not this model.

use log::debug;
use std::sync::Arc;
use std::time::Duration;

use crate::error::LodcmResult;
use crate::hardware::{AxisBackend, AxisReadback, MoveHandle};

/// A continuous real-valued motor axis.
#[derive(Clone)]
pub struct Axis {
    role: String,
    description: String,
    soft_limits: Option<(f64, f64)>,
    backend: Arc<dyn AxisBackend>,
}

impl Axis {
    /// New axis over the given backend.
    pub fn new(role: &str, description: &str, backend: Arc<dyn AxisBackend>) -> Self {
        Self {
            role: role.to_string(),
            description: description.to_string(),
            soft_limits: None,
            backend,
        }
    }

    /// Attach soft limits (informational only).
    pub fn with_soft_limits(mut self, low: f64, high: f64) -> Self {
        self.soft_limits = Some((low, high));
        self
    }

    /// Role name ("th1", "z2", ...).
    pub fn role(&self) -> &str {
        &self.role
    }

    /// Catalog description.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Soft limits, if configured.
    pub fn soft_limits(&self) -> Option<(f64, f64)> {
        self.soft_limits
    }

    /// Poll the full readback.
    pub async fn read(&self) -> LodcmResult<AxisReadback> {
        self.backend.read().await
    }

    /// Poll just the current user position.
    pub async fn position(&self) -> LodcmResult<f64> {
        Ok(self.backend.read().await?.value)
    }

    /// Command a move. With `wait` the call blocks (honoring `timeout`) and
    /// the returned handle is already resolved; otherwise the handle is
    /// returned immediately.
    pub async fn move_to(
        &self,
        target: f64,
        wait: bool,
        timeout: Option<Duration>,
    ) -> LodcmResult<MoveHandle> {
        debug!("commanding axis '{}' to {target}", self.role);
        let handle = self.backend.command_move(target).await?;
        if wait {
            handle.wait_opt(timeout).await?;
            return Ok(MoveHandle::completed(format!("{} -> {target}", self.role)));
        }
        Ok(handle)
    }
}

impl std::fmt::Debug for Axis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Axis")
            .field("role", &self.role)
            .field("description", &self.description)
            .field("soft_limits", &self.soft_limits)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::mock::SimAxis;

    #[tokio::test]
    async fn test_axis_read_and_position() {
        let axis = Axis::new("th1", "LOM Xtal1 Theta", Arc::new(SimAxis::new(11.4, "deg")));
        assert_eq!(axis.position().await.unwrap(), 11.4);
        let rb = axis.read().await.unwrap();
        assert_eq!(rb.units, "deg");
    }

    #[tokio::test]
    async fn test_axis_move_nonblocking_returns_pending_handle() {
        let backend = SimAxis::new(0.0, "mm").with_move_delay(Duration::from_millis(10));
        let axis = Axis::new("z1", "LOM Xtal1 Z", Arc::new(backend));
        let handle = axis.move_to(5.0, false, None).await.unwrap();
        handle.wait_timeout(Duration::from_secs(1)).await.unwrap();
        assert_eq!(axis.position().await.unwrap(), 5.0);
    }

    #[tokio::test]
    async fn test_axis_move_wait_blocks_until_settled() {
        let backend = SimAxis::new(0.0, "mm").with_move_delay(Duration::from_millis(10));
        let axis = Axis::new("z1", "LOM Xtal1 Z", Arc::new(backend));
        axis.move_to(-3.0, true, Some(Duration::from_secs(1)))
            .await
            .unwrap();
        assert_eq!(axis.position().await.unwrap(), -3.0);
    }

    #[tokio::test]
    async fn test_soft_limits_are_data_only() {
        let axis = Axis::new("y1", "LOM Xtal1 Y", Arc::new(SimAxis::new(0.0, "mm")))
            .with_soft_limits(-100.0, 100.0);
        assert_eq!(axis.soft_limits(), Some((-100.0, 100.0)));
        // A target past the limit is still commanded; enforcement is external.
        axis.move_to(150.0, true, None).await.unwrap();
        assert_eq!(axis.position().await.unwrap(), 150.0);
    }
}
