use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use super::reconnect::ReconnectPolicy;
use crate::audio::BufferConfig;
use crate::protocol::OutboundMessage;

/// Configuration for a conversation session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// How long to wait for the agent to acknowledge the handshake
    /// Default: 10 seconds
    pub handshake_timeout_ms: u64,

    /// How long a sent message may wait for its audio response
    /// Default: 30 seconds
    pub response_timeout_ms: u64,

    /// Silence after the last audio chunk that ends a burst
    pub quiet_period_ms: u64,

    /// How often the audio buffer is checked for a completed burst
    pub poll_interval_ms: u64,

    pub reconnect: ReconnectPolicy,

    /// Overrides sent with the initiation handshake
    pub first_message: Option<String>,
    pub prompt: Option<String>,
    pub language: Option<String>,

    /// Interview metadata made available to the agent (candidate name, role, ...)
    pub dynamic_variables: HashMap<String, String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            handshake_timeout_ms: 10_000,
            response_timeout_ms: 30_000,
            quiet_period_ms: 500,
            poll_interval_ms: 100,
            reconnect: ReconnectPolicy::default(),
            first_message: None,
            prompt: None,
            language: None,
            dynamic_variables: HashMap::new(),
        }
    }
}

impl SessionConfig {
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    pub fn buffer_config(&self) -> BufferConfig {
        BufferConfig {
            quiet_period: Duration::from_millis(self.quiet_period_ms),
            poll_interval: Duration::from_millis(self.poll_interval_ms.max(1)),
        }
    }

    pub fn initiation_message(&self) -> OutboundMessage {
        OutboundMessage::initiation(
            self.first_message.clone(),
            self.prompt.clone(),
            self.language.clone(),
            self.dynamic_variables.clone(),
        )
    }
}
