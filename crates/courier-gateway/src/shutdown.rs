//! Coordinated teardown: one signal observed by the listener and by every
//! live session, plus a bounded wait for them to drain.

use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// How long [`drain`] waits before aborting the listener task.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Shared shutdown signal.
///
/// Clones go into the listener's graceful-shutdown future and into every
/// WebSocket session; [`ShutdownCoordinator::shutdown`] fires them all at
/// once. Sessions answer by sending a Close frame and returning, which lets
/// the listener finish on its own instead of being aborted.
#[derive(Clone, Default)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    /// A coordinator that has not fired.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire the signal. Idempotent.
    pub fn shutdown(&self) {
        info!("shutdown signalled");
        self.token.cancel();
    }

    /// True once [`ShutdownCoordinator::shutdown`] has been called.
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves when the signal fires. Any number of tasks may wait.
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }
}

/// Wait up to `timeout` for the listener task to finish, then abort it.
///
/// The listener only finishes once every connection has drained; a stuck
/// session would otherwise hold shutdown open indefinitely.
pub async fn drain(mut handle: JoinHandle<()>, timeout: Duration) {
    match tokio::time::timeout(timeout, &mut handle).await {
        Ok(Ok(())) => {}
        Ok(Err(error)) => warn!(%error, "listener task failed during shutdown"),
        Err(_elapsed) => {
            warn!(?timeout, "drain window elapsed, aborting the listener");
            handle.abort();
            let _ = handle.await;
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
