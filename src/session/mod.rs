//! Conversation session lifecycle
//!
//! This module provides the [`SessionManager`] abstraction that manages:
//! - Channel establishment and reconnection with bounded backoff
//! - Reassembly of out-of-order agent audio into complete bursts
//! - Agent speaking/listening mode tracking
//! - Live transcript assembly and final artifact collection

mod config;
mod driver;
mod manager;
mod metrics;
mod mode;
mod outcome;
mod reconnect;
mod state;
mod stats;
mod transcript;

pub use config::SessionConfig;
pub use manager::SessionManager;
pub use metrics::{MetricsSnapshot, SessionMetrics};
pub use mode::{ModeTracker, ModeTransition};
pub use outcome::{ArtifactOrigin, AudioArtifact, ConversationArtifacts};
pub use reconnect::ReconnectPolicy;
pub use state::{Mode, NoopHooks, SessionHooks, SessionState};
pub use stats::SessionStats;
pub use transcript::{render_entries, Speaker, TranscriptAssembler, TranscriptEntry, TranscriptSource};
