use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::state::{Mode, SessionState};

/// Snapshot of a conversation session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    pub state: SessionState,

    pub mode: Mode,

    /// Remote conversation id, once the handshake completed
    pub session_id: Option<String>,

    /// When the session was created
    pub started_at: DateTime<Utc>,

    /// Total duration in seconds
    pub duration_secs: f64,

    /// Audio bursts reassembled so far
    pub bursts_completed: u64,

    /// Transcript entries accumulated so far
    pub transcript_entries: usize,

    /// Successful reconnections after abnormal disconnects
    pub reconnects: u64,

    /// Whether candidate capture is paused
    pub paused: bool,
}
