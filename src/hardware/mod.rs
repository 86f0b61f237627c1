//! Hardware backend seam.
//!
//! The device-communication layer is an external collaborator. This module
//! defines the narrow trait surface the LODCM consumes from it: polled reads
//! per axis and discrete positioner, asynchronous move commands returning
//! completion handles, and read-only reflection registers.
//!
//! # Completion Handles
//!
//! Every commanded move returns a [`MoveHandle`] immediately. The handle can
//! be awaited, awaited with a timeout, joined with other handles into a
//! logical AND, or given a completion callback. A timeout fails the *wait*,
//! not the motion: commands already issued to hardware continue on their own.

pub mod mock;

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::oneshot;

use crate::calc::Reflection;
use crate::error::{LodcmError, LodcmResult};

/// One polled snapshot of a continuous motor axis.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AxisReadback {
    /// Current user position.
    pub value: f64,
    /// Last commanded setpoint.
    pub setpoint: f64,
    /// Dial (raw hardware) position.
    pub dial_value: f64,
    /// Engineering units of the positions.
    pub units: String,
}

/// Backend for a continuous motor axis.
#[async_trait]
pub trait AxisBackend: Send + Sync {
    /// Poll the current readback. Idempotent, non-blocking.
    async fn read(&self) -> LodcmResult<AxisReadback>;

    /// Command a move to an absolute position. Returns immediately with a
    /// completion handle.
    async fn command_move(&self, target: f64) -> LodcmResult<MoveHandle>;
}

/// Backend for a discrete multi-state positioner.
#[async_trait]
pub trait StateBackend: Send + Sync {
    /// Poll the raw state label the hardware currently reports. An empty
    /// string or a label outside the configured state list reads as unknown
    /// at the positioner level.
    async fn read_raw(&self) -> LodcmResult<String>;

    /// Command a move to a named state. Returns immediately with a
    /// completion handle.
    async fn command_state(&self, label: &str) -> LodcmResult<MoveHandle>;
}

/// Read-only register holding a pre-stored reflection tuple.
///
/// One register exists per tower and material; an unset register reads as
/// `None`.
#[async_trait]
pub trait ReflectionRegister: Send + Sync {
    /// Poll the stored reflection, if any.
    async fn read_reflection(&self) -> LodcmResult<Option<Reflection>>;
}

enum HandleInner {
    /// Resolved before the handle was even constructed.
    Ready(LodcmResult<()>),
    /// Waiting on a single command.
    Pending(oneshot::Receiver<LodcmResult<()>>),
    /// Logical AND of several sub-commands.
    Join(Vec<MoveHandle>),
}

/// Completion handle for an asynchronous move command.
pub struct MoveHandle {
    operation: String,
    inner: HandleInner,
}

/// Sender half used by backends to resolve a pending [`MoveHandle`].
pub struct MoveSender {
    tx: oneshot::Sender<LodcmResult<()>>,
}

impl MoveSender {
    /// Resolve the paired handle with the outcome of the motion.
    pub fn complete(self, result: LodcmResult<()>) {
        // A dropped handle means nobody is waiting; that is fine.
        let _ = self.tx.send(result);
    }
}

impl MoveHandle {
    /// Handle for a command that is already done (a null status).
    pub fn completed(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            inner: HandleInner::Ready(Ok(())),
        }
    }

    /// Handle for a command that failed at issue time.
    pub fn failed(operation: impl Into<String>, err: LodcmError) -> Self {
        Self {
            operation: operation.into(),
            inner: HandleInner::Ready(Err(err)),
        }
    }

    /// New unresolved handle plus the sender a backend resolves it with.
    pub fn pending(operation: impl Into<String>) -> (Self, MoveSender) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                operation: operation.into(),
                inner: HandleInner::Pending(rx),
            },
            MoveSender { tx },
        )
    }

    /// Combine several handles into one that resolves once every
    /// sub-command has resolved. The first sub-error is reported; the
    /// remaining sub-commands are still awaited.
    pub fn join(operation: impl Into<String>, handles: Vec<MoveHandle>) -> Self {
        Self {
            operation: operation.into(),
            inner: HandleInner::Join(handles),
        }
    }

    /// Description of the commanded operation.
    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Wait for the command (and any joined sub-commands) to resolve.
    pub fn wait(self) -> BoxFuture<'static, LodcmResult<()>> {
        async move {
            match self.inner {
                HandleInner::Ready(result) => result,
                HandleInner::Pending(rx) => rx.await.map_err(|_| {
                    LodcmError::Hardware(format!("move command '{}' was abandoned", self.operation))
                })?,
                HandleInner::Join(handles) => {
                    // All sub-commands progress independently on hardware;
                    // awaiting them in order still resolves at the slowest one.
                    let mut first_err = None;
                    for handle in handles {
                        if let Err(err) = handle.wait().await {
                            first_err.get_or_insert(err);
                        }
                    }
                    match first_err {
                        Some(err) => Err(err),
                        None => Ok(()),
                    }
                }
            }
        }
        .boxed()
    }

    /// Wait with a bound. On timeout the wait fails with
    /// [`LodcmError::Timeout`]; in-flight hardware motion is not cancelled.
    pub async fn wait_timeout(self, timeout: Duration) -> LodcmResult<()> {
        let operation = self.operation.clone();
        match tokio::time::timeout(timeout, self.wait()).await {
            Ok(result) => result,
            Err(_) => Err(LodcmError::Timeout { operation, timeout }),
        }
    }

    /// Wait with an optional bound; `None` waits indefinitely.
    pub async fn wait_opt(self, timeout: Option<Duration>) -> LodcmResult<()> {
        match timeout {
            Some(t) => self.wait_timeout(t).await,
            None => self.wait().await,
        }
    }

    /// Attach a completion callback. The callback runs on a spawned task
    /// when the command resolves; the returned handle resolves after it.
    pub fn on_complete<F>(self, callback: F) -> MoveHandle
    where
        F: FnOnce(&LodcmResult<()>) + Send + 'static,
    {
        let (handle, sender) = MoveHandle::pending(self.operation.clone());
        let fut = self.wait();
        tokio::spawn(async move {
            let result = fut.await;
            callback(&result);
            sender.complete(result);
        });
        handle
    }
}

impl std::fmt::Debug for MoveHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &self.inner {
            HandleInner::Ready(Ok(())) => "done",
            HandleInner::Ready(Err(_)) => "failed",
            HandleInner::Pending(_) => "pending",
            HandleInner::Join(_) => "join",
        };
        f.debug_struct("MoveHandle")
            .field("operation", &self.operation)
            .field("state", &state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_completed_handle_resolves_immediately() {
        let handle = MoveHandle::completed("noop");
        handle.wait().await.unwrap();
    }

    #[tokio::test]
    async fn test_pending_handle_resolves_on_complete() {
        let (handle, sender) = MoveHandle::pending("move th1");
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            sender.complete(Ok(()));
        });
        handle.wait_timeout(Duration::from_secs(1)).await.unwrap();
    }

    #[tokio::test]
    async fn test_abandoned_sender_is_hardware_error() {
        let (handle, sender) = MoveHandle::pending("move th1");
        drop(sender);
        let err = handle.wait().await.unwrap_err();
        assert!(matches!(err, LodcmError::Hardware(_)));
    }

    #[tokio::test]
    async fn test_timeout_does_not_resolve_pending() {
        let (handle, _sender) = MoveHandle::pending("stuck move");
        let err = handle
            .wait_timeout(Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, LodcmError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_join_waits_for_all() {
        let (h1, s1) = MoveHandle::pending("a");
        let (h2, s2) = MoveHandle::pending("b");
        let joined = MoveHandle::join("a+b", vec![h1, h2, MoveHandle::completed("c")]);
        tokio::spawn(async move {
            s1.complete(Ok(()));
            tokio::time::sleep(Duration::from_millis(10)).await;
            s2.complete(Ok(()));
        });
        joined.wait_timeout(Duration::from_secs(1)).await.unwrap();
    }

    #[tokio::test]
    async fn test_join_reports_first_error() {
        let (h1, s1) = MoveHandle::pending("a");
        let (h2, s2) = MoveHandle::pending("b");
        let joined = MoveHandle::join("a+b", vec![h1, h2]);
        s1.complete(Err(LodcmError::Hardware("limit switch".into())));
        s2.complete(Ok(()));
        let err = joined.wait().await.unwrap_err();
        assert!(matches!(err, LodcmError::Hardware(_)));
    }

    #[tokio::test]
    async fn test_on_complete_callback_fires() {
        let fired = Arc::new(AtomicBool::new(false));
        let fired_clone = fired.clone();
        let (handle, sender) = MoveHandle::pending("cb");
        let chained = handle.on_complete(move |result| {
            assert!(result.is_ok());
            fired_clone.store(true, Ordering::SeqCst);
        });
        sender.complete(Ok(()));
        chained.wait_timeout(Duration::from_secs(1)).await.unwrap();
        assert!(fired.load(Ordering::SeqCst));
    }
}
