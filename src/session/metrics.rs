use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::info;

/// Process-level counters shared by all sessions
///
/// Constructed once by the host and handed to every [`SessionManager`](super::SessionManager);
/// there is no global instance.
#[derive(Debug, Default)]
pub struct SessionMetrics {
    running: AtomicBool,
    sessions_started: AtomicU64,
    sessions_ended: AtomicU64,
    reconnects: AtomicU64,
    bursts_completed: AtomicU64,
    response_timeouts: AtomicU64,
    errors: AtomicU64,
}

/// Point-in-time copy of [`SessionMetrics`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub sessions_started: u64,
    pub sessions_ended: u64,
    pub reconnects: u64,
    pub bursts_completed: u64,
    pub response_timeouts: u64,
    pub errors: u64,
}

impl SessionMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared counters that are already recording; the default when a host
    /// does not inject its own
    pub fn running() -> Arc<Self> {
        let metrics = Arc::new(Self::new());
        metrics.init();
        metrics
    }

    pub fn init(&self) {
        self.running.store(true, Ordering::SeqCst);
        info!("Session metrics initialized");
    }

    /// Stop recording; later events are ignored
    pub fn shutdown(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            let snapshot = self.snapshot();
            info!(
                "Session metrics shut down: {} sessions, {} bursts, {} reconnects, {} errors",
                snapshot.sessions_started, snapshot.bursts_completed, snapshot.reconnects, snapshot.errors
            );
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn bump(&self, counter: &AtomicU64) {
        if self.is_running() {
            counter.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn session_started(&self) {
        self.bump(&self.sessions_started);
    }

    pub fn session_ended(&self) {
        self.bump(&self.sessions_ended);
    }

    pub fn reconnected(&self) {
        self.bump(&self.reconnects);
    }

    pub fn burst_completed(&self) {
        self.bump(&self.bursts_completed);
    }

    pub fn response_timed_out(&self) {
        self.bump(&self.response_timeouts);
    }

    pub fn error(&self) {
        self.bump(&self.errors);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            sessions_started: self.sessions_started.load(Ordering::Relaxed),
            sessions_ended: self.sessions_ended.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
            bursts_completed: self.bursts_completed.load(Ordering::Relaxed),
            response_timeouts: self.response_timeouts.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}
