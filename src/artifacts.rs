//! Post-hoc retrieval of conversation artifacts from the agent service
//!
//! After a conversation ends the service finalizes a recording and an
//! authoritative transcript. Both are fetched by conversation id; the
//! transcript endpoint is polled until processing completes.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{Result, SessionError};
use crate::session::{Speaker, TranscriptEntry};

/// Final audio as served by the agent service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteAudio {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

#[async_trait]
pub trait ArtifactSource: Send + Sync {
    async fn fetch_transcript(&self, session_id: &str) -> Result<Vec<TranscriptEntry>>;

    async fn fetch_audio(&self, session_id: &str) -> Result<RemoteAudio>;
}

#[derive(Debug, Deserialize)]
struct ConversationDetails {
    status: String,
    #[serde(default)]
    transcript: Vec<TranscriptTurn>,
}

#[derive(Debug, Deserialize)]
struct TranscriptTurn {
    role: String,
    #[serde(default)]
    message: Option<String>,
}

impl ConversationDetails {
    fn into_entries(self) -> Vec<TranscriptEntry> {
        self.transcript
            .into_iter()
            .filter_map(|turn| {
                let speaker = match turn.role.as_str() {
                    "agent" => Speaker::Agent,
                    "user" => Speaker::User,
                    _ => return None,
                };
                let text = turn.message?.trim().to_string();
                (!text.is_empty()).then_some((speaker, text))
            })
            .enumerate()
            .map(|(order, (speaker, text))| TranscriptEntry { speaker, text, order })
            .collect()
    }
}

/// HTTP client for the conversation history API
pub struct HttpArtifactClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    poll_attempts: u32,
    poll_interval: Duration,
}

impl HttpArtifactClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            poll_attempts: 10,
            poll_interval: Duration::from_secs(2),
        }
    }

    pub fn with_polling(mut self, attempts: u32, interval: Duration) -> Self {
        self.poll_attempts = attempts.max(1);
        self.poll_interval = interval;
        self
    }

    fn conversation_url(&self, session_id: &str) -> String {
        format!("{}/v1/convai/conversations/{}", self.base_url, session_id)
    }

    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        let request = self.client.get(url);
        match &self.api_key {
            Some(key) => request.header("xi-api-key", key),
            None => request,
        }
    }
}

#[async_trait]
impl ArtifactSource for HttpArtifactClient {
    async fn fetch_transcript(&self, session_id: &str) -> Result<Vec<TranscriptEntry>> {
        let url = self.conversation_url(session_id);

        for attempt in 1..=self.poll_attempts {
            let details: ConversationDetails = self
                .get(&url)
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;

            match details.status.as_str() {
                "done" => {
                    let entries = details.into_entries();
                    info!("Fetched transcript for {} ({} entries)", session_id, entries.len());
                    return Ok(entries);
                }
                "failed" => {
                    return Err(SessionError::Artifact(format!(
                        "conversation {} failed processing",
                        session_id
                    )))
                }
                status => {
                    debug!(
                        "Conversation {} still {} (poll {}/{})",
                        session_id, status, attempt, self.poll_attempts
                    );
                    if attempt < self.poll_attempts {
                        tokio::time::sleep(self.poll_interval).await;
                    }
                }
            }
        }

        Err(SessionError::Artifact(format!(
            "transcript for {} not ready after {} polls",
            session_id, self.poll_attempts
        )))
    }

    async fn fetch_audio(&self, session_id: &str) -> Result<RemoteAudio> {
        let url = format!("{}/audio", self.conversation_url(session_id));
        let response = self.get(&url).send().await?.error_for_status()?;

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("audio/mpeg")
            .to_string();
        let bytes = response.bytes().await?.to_vec();

        if bytes.is_empty() {
            return Err(SessionError::Artifact(format!("empty audio for {}", session_id)));
        }

        info!("Fetched audio for {} ({} bytes, {})", session_id, bytes.len(), content_type);
        Ok(RemoteAudio { bytes, content_type })
    }
}
