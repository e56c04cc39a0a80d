use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::get_metrics))
        // Interview control
        .route("/interviews", post(handlers::start_interview))
        .route(
            "/interviews/:interview_id/messages",
            post(handlers::send_message),
        )
        .route("/interviews/:interview_id/audio", post(handlers::push_audio))
        .route(
            "/interviews/:interview_id/pause",
            post(handlers::pause_interview),
        )
        .route(
            "/interviews/:interview_id/resume",
            post(handlers::resume_interview),
        )
        .route("/interviews/:interview_id/end", post(handlers::end_interview))
        // Interview queries
        .route(
            "/interviews/:interview_id/status",
            get(handlers::get_interview_status),
        )
        .route(
            "/interviews/:interview_id/transcript",
            get(handlers::get_interview_transcript),
        )
        // The interview page is served from another origin
        .layer(CorsLayer::permissive())
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
