use super::state::{AppState, Interview};
use crate::audio::PushCapture;
use crate::error::SessionError;
use crate::session::{
    ArtifactOrigin, ConversationArtifacts, MetricsSnapshot, SessionManager, SessionStats,
    TranscriptEntry, TranscriptSource,
};
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct StartInterviewRequest {
    /// Optional interview ID (if not provided, generate UUID)
    pub interview_id: Option<String>,

    /// Candidate/role metadata passed to the agent
    pub dynamic_variables: HashMap<String, String>,

    /// Overrides the agent's opening line
    pub first_message: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StartInterviewResponse {
    pub interview_id: String,
    pub session_id: Option<String>,
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct SendMessageResponse {
    pub chunk_count: usize,
    pub salvaged: bool,
    pub audio_base64: String,
}

#[derive(Debug, Serialize)]
pub struct AudioAcceptedResponse {
    pub accepted: bool,
}

#[derive(Debug, Serialize)]
pub struct CaptureResponse {
    pub interview_id: String,
    pub paused: bool,
}

#[derive(Debug, Serialize)]
pub struct EndInterviewResponse {
    pub interview_id: String,
    pub session_id: Option<String>,
    pub transcript: String,
    pub transcript_source: Option<TranscriptSource>,
    pub transcript_url: Option<String>,
    pub audio_url: Option<String>,
    pub audio_origin: Option<ArtifactOrigin>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug)]
pub enum ApiError {
    Session(SessionError),
    NotFound(String),
    Conflict(String),
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        ApiError::Session(err)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Session(err) => match err {
                SessionError::Busy | SessionError::NotActive(_) => StatusCode::CONFLICT,
                SessionError::ResponseTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
                SessionError::Closed => StatusCode::GONE,
                SessionError::Interrupted { .. } | SessionError::EmptyAudio => {
                    StatusCode::UNPROCESSABLE_ENTITY
                }
                SessionError::Connection(_)
                | SessionError::ReconnectExhausted { .. }
                | SessionError::Protocol(_)
                | SessionError::Transport(_)
                | SessionError::Artifact(_) => StatusCode::BAD_GATEWAY,
                SessionError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ApiError::Session(err) => err.to_string(),
            ApiError::NotFound(msg) | ApiError::Conflict(msg) => msg.clone(),
        };

        if status.is_server_error() {
            error!("{}", message);
        }

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

async fn find(state: &AppState, interview_id: &str) -> Result<Arc<Interview>, ApiError> {
    state
        .interview(interview_id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("Interview {} not found", interview_id)))
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /interviews
/// Open a conversation with the voice agent
pub async fn start_interview(
    State(state): State<AppState>,
    Json(req): Json<StartInterviewRequest>,
) -> Result<Json<StartInterviewResponse>, ApiError> {
    let interview_id = req
        .interview_id
        .unwrap_or_else(|| format!("interview-{}", uuid::Uuid::new_v4()));

    info!("Starting interview: {}", interview_id);

    let mut config = state.session_defaults.clone();
    config.dynamic_variables.extend(req.dynamic_variables);
    if req.first_message.is_some() {
        config.first_message = req.first_message;
    }

    let capture = Arc::new(PushCapture::new(state.capture_config.clone()));
    let mut manager = SessionManager::new(config, Arc::clone(&state.connector))
        .with_capture(capture.clone())
        .with_metrics(Arc::clone(&state.metrics));
    if let Some(artifacts) = &state.artifacts {
        manager = manager.with_artifacts(Arc::clone(artifacts));
    }
    let manager = Arc::new(manager);

    // Reserve the id before the (slow) handshake
    {
        let mut interviews = state.interviews.write().await;
        if interviews.contains_key(&interview_id) {
            return Err(ApiError::Conflict(format!(
                "Interview {} is already running",
                interview_id
            )));
        }
        interviews.insert(
            interview_id.clone(),
            Arc::new(Interview::new(Arc::clone(&manager), capture)),
        );
    }

    if let Err(e) = manager.initialize().await {
        error!("Failed to start interview {}: {}", interview_id, e);
        state.interviews.write().await.remove(&interview_id);
        return Err(e.into());
    }

    info!("Interview {} started", interview_id);

    Ok(Json(StartInterviewResponse {
        interview_id,
        session_id: manager.session_id(),
        status: manager.state().to_string(),
    }))
}

/// POST /interviews/:interview_id/messages
/// Send a message and wait for the agent's spoken reply
pub async fn send_message(
    State(state): State<AppState>,
    Path(interview_id): Path<String>,
    Json(req): Json<SendMessageRequest>,
) -> Result<Json<SendMessageResponse>, ApiError> {
    let interview = find(&state, &interview_id).await?;

    let burst = interview.manager.send_message(req.text).await?;

    Ok(Json(SendMessageResponse {
        chunk_count: burst.chunk_count,
        salvaged: burst.salvaged,
        audio_base64: base64::engine::general_purpose::STANDARD.encode(&burst.bytes),
    }))
}

/// POST /interviews/:interview_id/audio
/// Raw little-endian PCM16 from the candidate's microphone
pub async fn push_audio(
    State(state): State<AppState>,
    Path(interview_id): Path<String>,
    body: Bytes,
) -> Result<(StatusCode, Json<AudioAcceptedResponse>), ApiError> {
    let interview = find(&state, &interview_id).await?;

    let accepted = interview.capture.push_pcm_bytes(&body);

    Ok((StatusCode::ACCEPTED, Json(AudioAcceptedResponse { accepted })))
}

/// POST /interviews/:interview_id/pause
pub async fn pause_interview(
    State(state): State<AppState>,
    Path(interview_id): Path<String>,
) -> Result<Json<CaptureResponse>, ApiError> {
    let interview = find(&state, &interview_id).await?;
    interview.manager.pause()?;

    Ok(Json(CaptureResponse {
        interview_id,
        paused: interview.manager.is_paused(),
    }))
}

/// POST /interviews/:interview_id/resume
pub async fn resume_interview(
    State(state): State<AppState>,
    Path(interview_id): Path<String>,
) -> Result<Json<CaptureResponse>, ApiError> {
    let interview = find(&state, &interview_id).await?;
    interview.manager.resume()?;

    Ok(Json(CaptureResponse {
        interview_id,
        paused: interview.manager.is_paused(),
    }))
}

/// POST /interviews/:interview_id/end
/// End the conversation and store its transcript and audio
pub async fn end_interview(
    State(state): State<AppState>,
    Path(interview_id): Path<String>,
) -> Result<Json<EndInterviewResponse>, ApiError> {
    info!("Ending interview: {}", interview_id);

    let interview = find(&state, &interview_id).await?;

    // Held across storage so a concurrent end waits for this one
    let mut unstored = interview.unstored.lock().await;
    let artifacts = match unstored.take() {
        Some(artifacts) => {
            info!("Retrying artifact storage for interview {}", interview_id);
            artifacts
        }
        None => match interview.manager.end_conversation().await? {
            Some(artifacts) => artifacts,
            None => {
                state.interviews.write().await.remove(&interview_id);
                return Ok(Json(EndInterviewResponse {
                    interview_id,
                    session_id: interview.manager.session_id(),
                    transcript: String::new(),
                    transcript_source: None,
                    transcript_url: None,
                    audio_url: None,
                    audio_origin: None,
                }));
            }
        },
    };

    let response = match store_artifacts(&state, &interview_id, &artifacts).await {
        Ok(response) => response,
        Err(e) => {
            // Kept for the next end request
            *unstored = Some(artifacts);
            return Err(e.into());
        }
    };

    state.interviews.write().await.remove(&interview_id);
    info!("Interview {} ended", interview_id);
    Ok(Json(response))
}

async fn store_artifacts(
    state: &AppState,
    interview_id: &str,
    artifacts: &ConversationArtifacts,
) -> Result<EndInterviewResponse, SessionError> {
    let transcript_url = state
        .storage
        .upload(
            artifacts.transcript.as_bytes(),
            &format!("{}/transcript.txt", interview_id),
            "text/plain",
        )
        .await?;

    let (audio_url, audio_origin) = match &artifacts.audio {
        Some(audio) => {
            let path = format!("{}/audio.{}", interview_id, audio.extension());
            match state.storage.upload(&audio.bytes, &path, &audio.content_type).await {
                Ok(url) => (Some(url), Some(audio.origin)),
                Err(e) => {
                    // Transcript is already stored; report the interview without audio
                    warn!("Failed to store audio for {}: {}", interview_id, e);
                    (None, None)
                }
            }
        }
        None => {
            warn!("Interview {} produced no audio", interview_id);
            (None, None)
        }
    };

    Ok(EndInterviewResponse {
        interview_id: interview_id.to_string(),
        session_id: Some(artifacts.session_id.clone()),
        transcript: artifacts.transcript.clone(),
        transcript_source: Some(artifacts.transcript_source),
        transcript_url: Some(transcript_url),
        audio_url,
        audio_origin,
    })
}

/// GET /interviews/:interview_id/status
pub async fn get_interview_status(
    State(state): State<AppState>,
    Path(interview_id): Path<String>,
) -> Result<Json<SessionStats>, ApiError> {
    let interview = find(&state, &interview_id).await?;
    Ok(Json(interview.manager.stats()))
}

/// GET /interviews/:interview_id/transcript
/// Transcript accumulated so far
pub async fn get_interview_transcript(
    State(state): State<AppState>,
    Path(interview_id): Path<String>,
) -> Result<Json<Vec<TranscriptEntry>>, ApiError> {
    let interview = find(&state, &interview_id).await?;
    Ok(Json(interview.manager.live_transcript()))
}

/// GET /metrics
pub async fn get_metrics(State(state): State<AppState>) -> Json<MetricsSnapshot> {
    Json(state.metrics.snapshot())
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
