use crate::artifacts::ArtifactSource;
use crate::audio::{CaptureConfig, PushCapture};
use crate::protocol::Connector;
use crate::session::{ConversationArtifacts, SessionConfig, SessionManager, SessionMetrics};
use crate::storage::Storage;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// A running interview: the conversation plus the capture the browser feeds
pub struct Interview {
    pub manager: Arc<SessionManager>,
    pub capture: Arc<PushCapture>,
    /// Artifacts of an ended conversation whose upload failed
    pub unstored: Mutex<Option<ConversationArtifacts>>,
}

impl Interview {
    pub fn new(manager: Arc<SessionManager>, capture: Arc<PushCapture>) -> Self {
        Self {
            manager,
            capture,
            unstored: Mutex::new(None),
        }
    }
}

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Interviews in progress (interview_id → interview)
    pub interviews: Arc<RwLock<HashMap<String, Arc<Interview>>>>,

    /// Opens voice agent channels for new interviews
    pub connector: Arc<dyn Connector>,

    pub artifacts: Option<Arc<dyn ArtifactSource>>,

    pub storage: Arc<dyn Storage>,

    pub metrics: Arc<SessionMetrics>,

    /// Base configuration each interview starts from
    pub session_defaults: SessionConfig,

    pub capture_config: CaptureConfig,
}

impl AppState {
    pub fn new(connector: Arc<dyn Connector>, storage: Arc<dyn Storage>) -> Self {
        Self {
            interviews: Arc::new(RwLock::new(HashMap::new())),
            connector,
            artifacts: None,
            storage,
            metrics: SessionMetrics::running(),
            session_defaults: SessionConfig::default(),
            capture_config: CaptureConfig::default(),
        }
    }

    pub fn with_artifacts(mut self, artifacts: Arc<dyn ArtifactSource>) -> Self {
        self.artifacts = Some(artifacts);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<SessionMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_session_defaults(mut self, config: SessionConfig) -> Self {
        self.session_defaults = config;
        self
    }

    pub fn with_capture_config(mut self, config: CaptureConfig) -> Self {
        self.capture_config = config;
        self
    }

    pub async fn interview(&self, interview_id: &str) -> Option<Arc<Interview>> {
        self.interviews.read().await.get(interview_id).cloned()
    }
}
