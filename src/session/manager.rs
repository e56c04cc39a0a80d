use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::config::SessionConfig;
use super::driver::{establish, Command, Driver};
use super::metrics::SessionMetrics;
use super::mode::ModeTracker;
use super::outcome::{ArtifactOrigin, AudioArtifact, ConversationArtifacts, DriverOutcome};
use super::state::{Mode, NoopHooks, SessionHooks, SessionState};
use super::stats::SessionStats;
use super::transcript::{render_entries, Speaker, TranscriptAssembler, TranscriptEntry};
use crate::artifacts::ArtifactSource;
use crate::audio::{AudioBurst, AudioChunkBuffer, CaptureDevice};
use crate::error::{Result, SessionError};
use crate::protocol::Connector;

/// State visible to both the handle and the event loop
pub(crate) struct Shared {
    pub(crate) state: watch::Sender<SessionState>,
    pub(crate) session_id: watch::Sender<Option<String>>,
    /// Set once the caller asked to end; suppresses reconnection
    pub(crate) closing: AtomicBool,
    pub(crate) started_at: DateTime<Utc>,
    pub(crate) bursts: AtomicU64,
    pub(crate) reconnects: AtomicU64,
    pub(crate) transcript: Mutex<TranscriptAssembler>,
}

impl Shared {
    fn new() -> Self {
        Self {
            state: watch::channel(SessionState::Idle).0,
            session_id: watch::channel(None).0,
            closing: AtomicBool::new(false),
            started_at: Utc::now(),
            bursts: AtomicU64::new(0),
            reconnects: AtomicU64::new(0),
            transcript: Mutex::new(TranscriptAssembler::new()),
        }
    }

    pub(crate) fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub(crate) fn append_transcript(&self, speaker: Speaker, text: &str) {
        let mut transcript = self.transcript.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(entry) = transcript.append(speaker, text) {
            debug!("Transcript #{}: {}", entry.order, entry.speaker);
        }
    }

    fn transcript(&self) -> TranscriptAssembler {
        self.transcript
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

struct DriverHandle {
    commands: mpsc::Sender<Command>,
    task: JoinHandle<DriverOutcome>,
}

/// Owns one conversation with the voice agent
///
/// The handle is cheap to share behind an `Arc`; all channel work happens on
/// a single background task started by [`SessionManager::initialize`].
///
/// ```text
/// idle -> connecting -> active <-> reconnecting
///                         |            |
///                         v            v
///                       ending ----> closed
/// ```
pub struct SessionManager {
    config: SessionConfig,
    connector: Arc<dyn Connector>,
    artifacts: Option<Arc<dyn ArtifactSource>>,
    capture: Option<Arc<dyn CaptureDevice>>,
    hooks: Arc<dyn SessionHooks>,
    metrics: Arc<SessionMetrics>,
    shared: Arc<Shared>,
    mode_rx: watch::Receiver<Mode>,
    tracker: Mutex<Option<ModeTracker>>,
    driver: tokio::sync::Mutex<Option<DriverHandle>>,
}

impl SessionManager {
    pub fn new(config: SessionConfig, connector: Arc<dyn Connector>) -> Self {
        let tracker = ModeTracker::new();
        let mode_rx = tracker.subscribe();

        Self {
            config,
            connector,
            artifacts: None,
            capture: None,
            hooks: Arc::new(NoopHooks),
            metrics: SessionMetrics::running(),
            shared: Arc::new(Shared::new()),
            mode_rx,
            tracker: Mutex::new(Some(tracker)),
            driver: tokio::sync::Mutex::new(None),
        }
    }

    /// Where final audio and transcript are fetched from after the conversation
    pub fn with_artifacts(mut self, artifacts: Arc<dyn ArtifactSource>) -> Self {
        self.artifacts = Some(artifacts);
        self
    }

    /// Candidate audio streamed to the agent and kept as fallback recording
    pub fn with_capture(mut self, capture: Arc<dyn CaptureDevice>) -> Self {
        self.capture = Some(capture);
        self
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn SessionHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<SessionMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Arc<SessionMetrics> {
        &self.metrics
    }

    /// Open the conversation
    ///
    /// Returns once the agent acknowledged the handshake. Calling this on a
    /// session that is already connecting or active does nothing.
    pub async fn initialize(&self) -> Result<()> {
        let claimed = self.shared.state.send_if_modified(|state| {
            if *state == SessionState::Idle {
                *state = SessionState::Connecting;
                true
            } else {
                false
            }
        });

        if !claimed {
            let state = self.state();
            if state.is_live() {
                debug!("initialize() ignored: session already {}", state);
                return Ok(());
            }
            return Err(SessionError::Closed);
        }

        info!("Connecting to voice agent via {}", self.connector.name());

        let initiation = self.config.initiation_message();
        let handshake_timeout = self.config.handshake_timeout();
        let connector = Arc::clone(&self.connector);

        let established = self
            .config
            .reconnect
            .connect(
                |_| establish(Arc::clone(&connector), initiation.clone(), handshake_timeout),
                &self.shared.closing,
            )
            .await;

        let (connection, session_id) = match established {
            Ok(established) => established,
            Err(e) => {
                let e = match e {
                    SessionError::ReconnectExhausted { last_error, .. } => {
                        SessionError::Connection(last_error)
                    }
                    other => other,
                };
                if e != SessionError::Closed {
                    error!("Failed to open conversation: {}", e);
                    self.metrics.error();
                    self.hooks.on_error(&e);
                }
                self.shared.state.send_replace(SessionState::Closed);
                return Err(e);
            }
        };

        let capture_rx = match &self.capture {
            Some(capture) => match capture.start().await {
                Ok(rx) => {
                    info!("Candidate capture started ({})", capture.name());
                    Some(rx)
                }
                Err(e) => {
                    warn!("Candidate capture unavailable, continuing without it: {:#}", e);
                    None
                }
            },
            None => None,
        };

        let mut driver = self.driver.lock().await;

        // end_conversation() ran while the handshake was in flight
        if self.shared.closing.load(Ordering::SeqCst) {
            info!("Conversation {} ended before it became active", session_id);
            drop(connection);
            self.stop_capture().await;
            self.shared.state.send_replace(SessionState::Closed);
            return Err(SessionError::Closed);
        }

        let tracker = self
            .tracker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .unwrap_or_default();

        let (commands_tx, commands_rx) = mpsc::channel(16);
        let event_loop = Driver {
            config: self.config.clone(),
            connector: Arc::clone(&self.connector),
            hooks: Arc::clone(&self.hooks),
            metrics: Arc::clone(&self.metrics),
            shared: Arc::clone(&self.shared),
            capture: self.capture.clone(),
            capture_rx,
            connection: Some(connection),
            session_id: session_id.clone(),
            buffer: AudioChunkBuffer::new(self.config.buffer_config()),
            tracker,
        };

        self.shared.session_id.send_replace(Some(session_id.clone()));
        self.shared.state.send_replace(SessionState::Active);

        let task = tokio::spawn(event_loop.run(commands_rx));
        *driver = Some(DriverHandle {
            commands: commands_tx,
            task,
        });
        drop(driver);

        self.metrics.session_started();
        self.hooks.on_connect(&session_id);
        info!("Conversation {} active", session_id);

        Ok(())
    }

    /// Send a user message and wait for the agent's complete spoken reply
    ///
    /// Only one message may be outstanding; a second concurrent call fails
    /// with [`SessionError::Busy`].
    pub async fn send_message(&self, text: impl Into<String>) -> Result<AudioBurst> {
        self.ensure_active()?;

        let commands = {
            let driver = self.driver.lock().await;
            match driver.as_ref() {
                Some(handle) => handle.commands.clone(),
                None => return Err(SessionError::Closed),
            }
        };

        let (reply_tx, reply_rx) = oneshot::channel();
        commands
            .send(Command::SendMessage {
                text: text.into(),
                reply: reply_tx,
            })
            .await
            .map_err(|_| SessionError::Closed)?;

        reply_rx.await.map_err(|_| SessionError::Closed)?
    }

    /// Stop forwarding candidate audio without leaving the conversation
    pub fn pause(&self) -> Result<()> {
        self.set_capture_enabled(false)
    }

    pub fn resume(&self) -> Result<()> {
        self.set_capture_enabled(true)
    }

    fn set_capture_enabled(&self, enabled: bool) -> Result<()> {
        self.ensure_active()?;

        match &self.capture {
            Some(capture) => {
                capture.set_enabled(enabled);
                info!("Candidate capture {}", if enabled { "resumed" } else { "paused" });
            }
            None => debug!("No capture device; pause/resume has no effect"),
        }
        Ok(())
    }

    fn ensure_active(&self) -> Result<()> {
        match self.state() {
            SessionState::Active | SessionState::Reconnecting => Ok(()),
            state @ (SessionState::Idle | SessionState::Connecting) => {
                Err(SessionError::NotActive(state))
            }
            SessionState::Ending | SessionState::Closed => Err(SessionError::Closed),
        }
    }

    /// End the conversation and collect its artifacts
    ///
    /// Returns `None` when there was no conversation to collect (never
    /// started, or already ended). The final transcript and audio come from
    /// the agent service when available, otherwise from what this session
    /// saw and captured itself.
    pub async fn end_conversation(&self) -> Result<Option<ConversationArtifacts>> {
        let handle = self.driver.lock().await.take();

        let Some(handle) = handle else {
            self.shared.closing.store(true, Ordering::SeqCst);
            let previous = self.shared.state.send_replace(SessionState::Closed);
            if previous != SessionState::Closed {
                info!("Conversation closed from {} state", previous);
            }
            return Ok(None);
        };

        self.shared.closing.store(true, Ordering::SeqCst);
        self.shared.state.send_if_modified(|state| {
            if state.is_live() {
                *state = SessionState::Ending;
                true
            } else {
                false
            }
        });

        // The loop may already have stopped on its own
        let _ = handle.commands.send(Command::End).await;
        let outcome = handle.task.await;

        self.stop_capture().await;
        self.shared.state.send_replace(SessionState::Closed);

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Session event loop failed: {}", e);
                self.metrics.error();
                return Err(SessionError::Transport(format!("event loop failed: {}", e)));
            }
        };
        self.metrics.session_ended();

        Ok(Some(self.collect_artifacts(outcome).await))
    }

    async fn collect_artifacts(&self, outcome: DriverOutcome) -> ConversationArtifacts {
        let session_id = outcome.session_id;
        let live = self.shared.transcript();

        let (remote_entries, remote_audio) = match &self.artifacts {
            Some(source) => {
                // The recording is only published once the transcript is ready
                let entries = source
                    .fetch_transcript(&session_id)
                    .await
                    .map_err(|e| warn!("Remote transcript unavailable for {}: {}", session_id, e))
                    .ok();
                let audio = source
                    .fetch_audio(&session_id)
                    .await
                    .map_err(|e| warn!("Remote audio unavailable for {}: {}", session_id, e))
                    .ok();
                (entries, audio)
            }
            None => (None, None),
        };

        let (entries, transcript_source) = live.resolve(remote_entries);

        let audio = match remote_audio {
            Some(remote) => Some(AudioArtifact {
                bytes: remote.bytes,
                content_type: remote.content_type,
                origin: ArtifactOrigin::Remote,
            }),
            None => outcome.recording.into_artifact(),
        };

        info!(
            "Conversation {} artifacts: {} transcript entries ({:?}), audio: {}",
            session_id,
            entries.len(),
            transcript_source,
            audio
                .as_ref()
                .map(|a| format!("{} bytes {:?}", a.bytes.len(), a.origin))
                .unwrap_or_else(|| "none".to_string())
        );

        ConversationArtifacts {
            session_id,
            transcript: render_entries(&entries),
            audio,
            entries,
            transcript_source,
        }
    }

    async fn stop_capture(&self) {
        if let Some(capture) = &self.capture {
            if capture.is_capturing() {
                if let Err(e) = capture.stop().await {
                    warn!("Failed to release capture device: {:#}", e);
                }
            }
        }
    }

    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    pub fn mode(&self) -> Mode {
        *self.mode_rx.borrow()
    }

    /// Remote conversation id; follows reconnections
    pub fn session_id(&self) -> Option<String> {
        self.shared.session_id.borrow().clone()
    }

    pub fn subscribe_mode(&self) -> watch::Receiver<Mode> {
        self.mode_rx.clone()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.shared.state.subscribe()
    }

    pub fn is_paused(&self) -> bool {
        self.capture.as_ref().is_some_and(|c| !c.is_enabled())
    }

    /// Transcript entries finalized so far in this session
    pub fn live_transcript(&self) -> Vec<TranscriptEntry> {
        self.shared.transcript().entries().to_vec()
    }

    pub fn stats(&self) -> SessionStats {
        let now = Utc::now();
        let duration = now.signed_duration_since(self.shared.started_at);

        SessionStats {
            state: self.state(),
            mode: self.mode(),
            session_id: self.session_id(),
            started_at: self.shared.started_at,
            duration_secs: duration.num_milliseconds() as f64 / 1000.0,
            bursts_completed: self.shared.bursts.load(Ordering::SeqCst),
            transcript_entries: self.shared.transcript().len(),
            reconnects: self.shared.reconnects.load(Ordering::SeqCst),
            paused: self.is_paused(),
        }
    }
}
