use base64::Engine;

use super::messages::InboundMessage;
use crate::error::SessionError;
use crate::session::Mode;

/// Validated event from the voice agent
///
/// Produced at the channel boundary from an [`InboundMessage`]; audio is
/// already decoded and modes are already parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentEvent {
    /// Handshake acknowledged; carries the remote conversation id
    SessionStarted {
        session_id: String,
        output_format: Option<String>,
    },
    AudioChunk {
        event_id: u64,
        bytes: Vec<u8>,
    },
    ModeChanged(Mode),
    AgentText(String),
    UserText {
        text: String,
        tentative: bool,
    },
    Interruption {
        reason: String,
    },
    Ping {
        event_id: u64,
    },
    Ignored,
}

impl AgentEvent {
    /// Parse and validate a text frame
    pub fn parse(frame: &str) -> Result<Self, SessionError> {
        let message: InboundMessage = serde_json::from_str(frame)?;
        Self::try_from(message)
    }

    /// Short event name for logging (never includes payloads)
    pub fn kind(&self) -> &'static str {
        match self {
            AgentEvent::SessionStarted { .. } => "session_started",
            AgentEvent::AudioChunk { .. } => "audio",
            AgentEvent::ModeChanged(_) => "mode_change",
            AgentEvent::AgentText(_) => "agent_response",
            AgentEvent::UserText { tentative: false, .. } => "user_transcript",
            AgentEvent::UserText { tentative: true, .. } => "tentative_user_transcript",
            AgentEvent::Interruption { .. } => "interruption",
            AgentEvent::Ping { .. } => "ping",
            AgentEvent::Ignored => "ignored",
        }
    }
}

impl TryFrom<InboundMessage> for AgentEvent {
    type Error = SessionError;

    fn try_from(message: InboundMessage) -> Result<Self, Self::Error> {
        let event = match message {
            InboundMessage::ConversationInitiationMetadata {
                conversation_initiation_metadata_event: meta,
            } => {
                if meta.conversation_id.is_empty() {
                    return Err(SessionError::Protocol("empty conversation_id".into()));
                }
                AgentEvent::SessionStarted {
                    session_id: meta.conversation_id,
                    output_format: meta.agent_output_audio_format,
                }
            }
            InboundMessage::Audio { audio_event } => {
                let bytes = base64::engine::general_purpose::STANDARD
                    .decode(audio_event.audio_base_64.as_bytes())
                    .map_err(|e| {
                        SessionError::Protocol(format!(
                            "invalid audio payload (event {}): {}",
                            audio_event.event_id, e
                        ))
                    })?;
                AgentEvent::AudioChunk {
                    event_id: audio_event.event_id,
                    bytes,
                }
            }
            InboundMessage::ModeChange { mode_change_event } => {
                AgentEvent::ModeChanged(mode_change_event.mode.parse()?)
            }
            InboundMessage::AgentResponse {
                agent_response_event,
            } => AgentEvent::AgentText(agent_response_event.agent_response),
            InboundMessage::UserTranscript {
                user_transcription_event,
            } => AgentEvent::UserText {
                text: user_transcription_event.user_transcript,
                tentative: false,
            },
            InboundMessage::TentativeUserTranscript {
                tentative_user_transcription_event,
            } => AgentEvent::UserText {
                text: tentative_user_transcription_event.user_transcript,
                tentative: true,
            },
            InboundMessage::Interruption { interruption_event } => AgentEvent::Interruption {
                reason: interruption_event
                    .reason
                    .unwrap_or_else(|| "interrupted".to_string()),
            },
            InboundMessage::Ping { ping_event } => AgentEvent::Ping {
                event_id: ping_event.event_id,
            },
            InboundMessage::Unknown => AgentEvent::Ignored,
        };

        Ok(event)
    }
}
