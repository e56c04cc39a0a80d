use crate::session::SessionState;
use thiserror::Error;

pub type Result<T, E = SessionError> = std::result::Result<T, E>;

/// Errors surfaced by the session lifecycle core
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    /// The channel could not be opened or the handshake was never acknowledged
    #[error("connection failed: {0}")]
    Connection(String),

    /// Abnormal disconnect and every reconnect attempt failed
    #[error("reconnect gave up after {attempts} attempts: {last_error}")]
    ReconnectExhausted { attempts: u32, last_error: String },

    /// No audio burst or interruption arrived for a pending message
    #[error("no response within {timeout_ms}ms")]
    ResponseTimeout { timeout_ms: u64 },

    /// A message is already awaiting its response
    #[error("a message is already pending")]
    Busy,

    /// A chunk or a flushed burst carried no bytes
    #[error("audio burst contained no data")]
    EmptyAudio,

    /// The agent aborted the turn before any audio was buffered
    #[error("turn interrupted: {reason}")]
    Interrupted { reason: String },

    #[error("session is not active (state: {0})")]
    NotActive(SessionState),

    #[error("session is closed")]
    Closed,

    /// A frame from the agent could not be understood
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("artifact retrieval failed: {0}")]
    Artifact(String),

    #[error("storage failed: {0}")]
    Storage(String),
}

impl SessionError {
    /// Whether the error ends the session rather than a single request
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SessionError::Connection(_) | SessionError::ReconnectExhausted { .. } | SessionError::Closed
        )
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for SessionError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        SessionError::Transport(err.to_string())
    }
}

impl From<reqwest::Error> for SessionError {
    fn from(err: reqwest::Error) -> Self {
        SessionError::Artifact(err.to_string())
    }
}

impl From<serde_json::Error> for SessionError {
    fn from(err: serde_json::Error) -> Self {
        SessionError::Protocol(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(SessionError::Closed.is_fatal());
        assert!(SessionError::Connection("refused".into()).is_fatal());
        assert!(SessionError::ReconnectExhausted { attempts: 3, last_error: "x".into() }.is_fatal());

        assert!(!SessionError::Busy.is_fatal());
        assert!(!SessionError::EmptyAudio.is_fatal());
        assert!(!SessionError::ResponseTimeout { timeout_ms: 30_000 }.is_fatal());
        assert!(!SessionError::Interrupted { reason: "user".into() }.is_fatal());
    }

    #[test]
    fn test_display_messages() {
        let err = SessionError::ReconnectExhausted { attempts: 3, last_error: "refused".into() };
        assert_eq!(err.to_string(), "reconnect gave up after 3 attempts: refused");
        assert_eq!(SessionError::NotActive(SessionState::Idle).to_string(), "session is not active (state: idle)");
    }
}
