pub mod artifacts;
pub mod audio;
pub mod config;
pub mod error;
pub mod http;
pub mod protocol;
pub mod session;
pub mod storage;

pub use artifacts::{ArtifactSource, HttpArtifactClient, RemoteAudio};
pub use audio::{
    AudioBurst, AudioChunkBuffer, AudioFile, AudioFrame, BufferConfig, CaptureConfig,
    CaptureDevice, PushCapture,
};
pub use config::Config;
pub use error::{Result, SessionError};
pub use http::{create_router, AppState};
pub use protocol::{AgentEvent, ChannelEvent, CloseInfo, Connection, Connector, WsConnector};
pub use session::{
    ConversationArtifacts, Mode, ReconnectPolicy, SessionConfig, SessionHooks, SessionManager,
    SessionMetrics, SessionState, SessionStats, TranscriptEntry,
};
pub use storage::{LocalStorage, Storage};
