//! Liveness endpoint payload and the session tally behind it.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

/// Body of `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Always `"ok"`; a process that cannot say so is not answering.
    pub status: String,
    /// Seconds since the gateway state was assembled.
    pub uptime_secs: u64,
    /// WebSocket sessions currently streaming.
    pub active_sessions: usize,
}

/// Build the health payload from the gateway's start instant and tally.
#[must_use]
pub fn snapshot(started_at: Instant, active_sessions: usize) -> HealthResponse {
    HealthResponse {
        status: "ok".to_owned(),
        uptime_secs: started_at.elapsed().as_secs(),
        active_sessions,
    }
}

/// Running count of live WebSocket sessions in this process.
///
/// Observability only; no routing decision reads it. Each session holds a
/// [`SessionGuard`] for its lifetime, so the count stays right on every exit
/// path, aborts included.
#[derive(Clone, Default)]
pub struct SessionCounter {
    active: Arc<AtomicUsize>,
}

impl SessionCounter {
    /// A counter starting at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sessions currently counted in.
    #[must_use]
    pub fn active(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }

    /// Count one session in until the returned guard drops.
    #[must_use]
    pub fn track(&self) -> SessionGuard {
        let _ = self.active.fetch_add(1, Ordering::Relaxed);
        SessionGuard {
            active: Arc::clone(&self.active),
        }
    }
}

/// Counts its session back out on drop.
pub struct SessionGuard {
    active: Arc<AtomicUsize>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        let _ = self.active.fetch_sub(1, Ordering::Relaxed);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
