use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Frame received from the voice agent (raw wire shape)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundMessage {
    ConversationInitiationMetadata {
        conversation_initiation_metadata_event: InitiationMetadataEvent,
    },
    Audio {
        audio_event: AudioEvent,
    },
    ModeChange {
        mode_change_event: ModeChangeEvent,
    },
    AgentResponse {
        agent_response_event: AgentResponseEvent,
    },
    UserTranscript {
        user_transcription_event: UserTranscriptionEvent,
    },
    TentativeUserTranscript {
        tentative_user_transcription_event: UserTranscriptionEvent,
    },
    Interruption {
        #[serde(default)]
        interruption_event: InterruptionEvent,
    },
    Ping {
        ping_event: PingEvent,
    },
    /// Event kinds this client does not consume (vad scores, tool calls, ...)
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitiationMetadataEvent {
    pub conversation_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_output_audio_format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_input_audio_format: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioEvent {
    pub audio_base_64: String, // Base64-encoded agent audio
    pub event_id: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModeChangeEvent {
    pub mode: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResponseEvent {
    pub agent_response: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserTranscriptionEvent {
    pub user_transcript: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InterruptionEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PingEvent {
    pub event_id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ping_ms: Option<u64>,
}

/// Frame sent to the voice agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    ConversationInitiationClientData {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        conversation_config_override: Option<ConversationConfigOverride>,
        #[serde(default, skip_serializing_if = "HashMap::is_empty")]
        dynamic_variables: HashMap<String, String>,
    },
    UserMessage {
        text: String,
    },
    Pong {
        event_id: u64,
    },
    UserAudioChunk {
        user_audio_chunk: String, // Base64-encoded PCM16 LE
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationConfigOverride {
    pub agent: AgentOverride,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<PromptOverride>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptOverride {
    pub prompt: String,
}

impl OutboundMessage {
    /// Build the initiation handshake for a new conversation
    pub fn initiation(
        first_message: Option<String>,
        prompt: Option<String>,
        language: Option<String>,
        dynamic_variables: HashMap<String, String>,
    ) -> Self {
        let conversation_config_override =
            if first_message.is_none() && prompt.is_none() && language.is_none() {
                None
            } else {
                Some(ConversationConfigOverride {
                    agent: AgentOverride {
                        first_message,
                        language,
                        prompt: prompt.map(|prompt| PromptOverride { prompt }),
                    },
                })
            };

        OutboundMessage::ConversationInitiationClientData {
            conversation_config_override,
            dynamic_variables,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
