use serde::Serialize;
use tracing::warn;

use super::transcript::{TranscriptEntry, TranscriptSource};
use crate::audio::{encode_wav, AudioFrame};

/// Where the final audio came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactOrigin {
    /// Recording finalized by the agent service
    Remote,
    /// Candidate audio captured by this process
    Local,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioArtifact {
    pub bytes: Vec<u8>,
    pub content_type: String,
    pub origin: ArtifactOrigin,
}

impl AudioArtifact {
    /// File extension matching the content type
    pub fn extension(&self) -> &'static str {
        match self.content_type.as_str() {
            "audio/wav" | "audio/x-wav" | "audio/wave" => "wav",
            "audio/ogg" => "ogg",
            "audio/webm" => "webm",
            _ => "mp3",
        }
    }
}

/// Everything produced by a finished conversation
#[derive(Debug, Clone)]
pub struct ConversationArtifacts {
    pub session_id: String,
    pub audio: Option<AudioArtifact>,
    /// `"<Speaker>: <text>"` lines
    pub transcript: String,
    pub entries: Vec<TranscriptEntry>,
    pub transcript_source: TranscriptSource,
}

/// Candidate audio accumulated while capture was enabled
#[derive(Debug, Default)]
pub(crate) struct LocalRecording {
    samples: Vec<i16>,
    sample_rate: u32,
    channels: u16,
}

impl LocalRecording {
    pub(crate) fn push(&mut self, frame: &AudioFrame) {
        if self.samples.is_empty() {
            self.sample_rate = frame.sample_rate;
            self.channels = frame.channels;
        }
        self.samples.extend_from_slice(&frame.samples);
    }

    pub(crate) fn into_artifact(self) -> Option<AudioArtifact> {
        if self.samples.is_empty() {
            return None;
        }

        match encode_wav(&self.samples, self.sample_rate, self.channels) {
            Ok(bytes) => Some(AudioArtifact {
                bytes,
                content_type: "audio/wav".to_string(),
                origin: ArtifactOrigin::Local,
            }),
            Err(e) => {
                warn!("Failed to encode local recording: {:#}", e);
                None
            }
        }
    }
}

/// What the event driver hands back when it stops
#[derive(Debug)]
pub(crate) struct DriverOutcome {
    pub(crate) session_id: String,
    pub(crate) recording: LocalRecording,
}
