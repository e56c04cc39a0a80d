use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::SessionError;

/// Lifecycle of a conversation session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Connecting,
    Active,
    Reconnecting,
    Ending,
    Closed,
}

impl SessionState {
    /// A channel is open or being (re)established
    pub fn is_live(self) -> bool {
        matches!(
            self,
            SessionState::Connecting | SessionState::Active | SessionState::Reconnecting
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Connecting => "connecting",
            SessionState::Active => "active",
            SessionState::Reconnecting => "reconnecting",
            SessionState::Ending => "ending",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// The agent's turn state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    #[default]
    Listening,
    Speaking,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Listening => f.write_str("listening"),
            Mode::Speaking => f.write_str("speaking"),
        }
    }
}

impl FromStr for Mode {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "listening" => Ok(Mode::Listening),
            "speaking" => Ok(Mode::Speaking),
            other => Err(SessionError::Protocol(format!("unknown mode: {}", other))),
        }
    }
}

/// Callbacks for the layer driving the interview (all optional)
pub trait SessionHooks: Send + Sync {
    fn on_connect(&self, _session_id: &str) {}

    fn on_disconnect(&self, _reason: &str) {}

    fn on_mode_change(&self, _from: Mode, _to: Mode) {}

    fn on_error(&self, _error: &SessionError) {}

    /// A burst completed that no pending message was waiting for
    fn on_unsolicited_audio(&self, _bytes: &[u8]) {}
}

/// Hooks that do nothing
pub struct NoopHooks;

impl SessionHooks for NoopHooks {}
