//! HTTP API server for the interview page
//!
//! This module provides a REST API for driving interviews:
//! - POST /interviews - Open a conversation with the voice agent
//! - POST /interviews/:id/messages - Send a message, returns the spoken reply
//! - POST /interviews/:id/audio - Candidate microphone PCM
//! - POST /interviews/:id/pause, /resume - Pause or resume candidate capture
//! - POST /interviews/:id/end - End and store transcript/audio
//! - GET /interviews/:id/status - Query session status
//! - GET /interviews/:id/transcript - Get accumulated transcript
//! - GET /metrics, GET /health

mod handlers;
mod routes;
mod state;

pub use handlers::ApiError;
pub use routes::create_router;
pub use state::{AppState, Interview};
