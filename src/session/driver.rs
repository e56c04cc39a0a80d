//! Per-session event loop
//!
//! One task owns the channel, the audio buffer, the mode tracker and the
//! pending request. Commands from the [`SessionManager`](super::SessionManager)
//! handle, channel events, captured frames, the buffer poll tick and the
//! response deadline are all dispatched from a single `select!`, so events are
//! processed strictly in arrival order. Reconnection after an abnormal close is
//! one more branch of that `select!`: commands and the response deadline keep
//! being served while the backoff and handshake run.

use base64::Engine;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::config::SessionConfig;
use super::manager::Shared;
use super::metrics::SessionMetrics;
use super::mode::ModeTracker;
use super::outcome::{DriverOutcome, LocalRecording};
use super::state::{SessionHooks, SessionState};
use super::transcript::Speaker;
use crate::audio::{AudioBurst, AudioChunkBuffer, AudioFrame, CaptureDevice};
use crate::error::{Result, SessionError};
use crate::protocol::{AgentEvent, ChannelEvent, CloseInfo, Connection, Connector, OutboundMessage};

pub(crate) enum Command {
    SendMessage {
        text: String,
        reply: oneshot::Sender<Result<AudioBurst>>,
    },
    End,
}

/// An in-flight `send_message` awaiting its audio
struct PendingRequest {
    reply: oneshot::Sender<Result<AudioBurst>>,
    issued_at: Instant,
    deadline: Instant,
    /// Accepted while reconnecting; sent once the new channel is up
    unsent: Option<String>,
}

type Reconnection = Pin<Box<dyn Future<Output = Result<(Connection, String)>> + Send>>;

enum Wake {
    Command(Option<Command>),
    Channel(Option<ChannelEvent>),
    Frame(Option<AudioFrame>),
    Tick,
    Deadline,
    Reconnected(Result<(Connection, String)>),
}

enum Flow {
    Continue,
    Stop,
}

/// Open a channel, send the initiation handshake and wait for the session id
pub(crate) async fn establish(
    connector: Arc<dyn Connector>,
    initiation: OutboundMessage,
    handshake_timeout: Duration,
) -> Result<(Connection, String)> {
    let mut connection = connector.connect().await?;

    connection
        .outbound
        .send(initiation)
        .await
        .map_err(|_| SessionError::Connection("channel closed before handshake".into()))?;

    let handshake = async {
        loop {
            match connection.inbound.recv().await {
                Some(ChannelEvent::Event(AgentEvent::SessionStarted {
                    session_id,
                    output_format,
                })) => {
                    info!(
                        "Handshake acknowledged: session {} (output format: {})",
                        session_id,
                        output_format.as_deref().unwrap_or("unspecified")
                    );
                    return Ok(session_id);
                }
                Some(ChannelEvent::Event(AgentEvent::Ping { event_id })) => {
                    let _ = connection.outbound.send(OutboundMessage::Pong { event_id }).await;
                }
                Some(ChannelEvent::Event(other)) => {
                    debug!("Ignoring {} before handshake", other.kind());
                }
                Some(ChannelEvent::Closed(close)) => {
                    return Err(SessionError::Connection(format!(
                        "closed during handshake ({}: {})",
                        close.code, close.reason
                    )));
                }
                None => {
                    return Err(SessionError::Connection("channel dropped during handshake".into()));
                }
            }
        }
    };

    let session_id = tokio::time::timeout(handshake_timeout, handshake)
        .await
        .map_err(|_| {
            SessionError::Connection(format!(
                "handshake not acknowledged within {}ms",
                handshake_timeout.as_millis()
            ))
        })??;

    Ok((connection, session_id))
}

pub(crate) struct Driver {
    pub(crate) config: SessionConfig,
    pub(crate) connector: Arc<dyn Connector>,
    pub(crate) hooks: Arc<dyn SessionHooks>,
    pub(crate) metrics: Arc<SessionMetrics>,
    pub(crate) shared: Arc<Shared>,
    pub(crate) capture: Option<Arc<dyn CaptureDevice>>,
    pub(crate) capture_rx: Option<mpsc::Receiver<AudioFrame>>,
    /// `None` while reconnecting
    pub(crate) connection: Option<Connection>,
    pub(crate) session_id: String,
    pub(crate) buffer: AudioChunkBuffer,
    pub(crate) tracker: ModeTracker,
}

impl Driver {
    pub(crate) async fn run(self, commands: mpsc::Receiver<Command>) -> DriverOutcome {
        let mut state = DriverState {
            driver: self,
            pending: None,
            recording: LocalRecording::default(),
            reconnection: None,
        };
        state.run(commands).await
    }
}

struct DriverState {
    driver: Driver,
    pending: Option<PendingRequest>,
    recording: LocalRecording,
    reconnection: Option<Reconnection>,
}

impl DriverState {
    async fn run(mut self, mut commands: mpsc::Receiver<Command>) -> DriverOutcome {
        let mut ticker = tokio::time::interval(self.driver.buffer.config().poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("Session {} event loop started", self.driver.session_id);

        loop {
            let deadline = self.pending.as_ref().map(|p| p.deadline);

            let wake = tokio::select! {
                command = commands.recv() => Wake::Command(command),
                event = next_event(&mut self.driver.connection) => Wake::Channel(event),
                frame = next_frame(&mut self.driver.capture_rx) => Wake::Frame(frame),
                _ = ticker.tick() => Wake::Tick,
                _ = wait_until(deadline) => Wake::Deadline,
                result = next_reconnection(&mut self.reconnection) => Wake::Reconnected(result),
            };

            let flow = match wake {
                Wake::Command(Some(Command::SendMessage { text, reply })) => {
                    self.send_message(text, reply).await;
                    Flow::Continue
                }
                Wake::Command(Some(Command::End)) | Wake::Command(None) => {
                    self.end_by_caller();
                    Flow::Stop
                }
                Wake::Channel(Some(ChannelEvent::Event(event))) => {
                    self.dispatch(event).await;
                    Flow::Continue
                }
                Wake::Channel(Some(ChannelEvent::Closed(close))) => self.on_closed(close),
                Wake::Channel(None) => self.on_closed(CloseInfo::abnormal("channel dropped")),
                Wake::Frame(frame) => {
                    self.forward_frame(frame).await;
                    Flow::Continue
                }
                Wake::Tick => {
                    self.poll_buffer();
                    Flow::Continue
                }
                Wake::Deadline => {
                    self.expire_pending();
                    Flow::Continue
                }
                Wake::Reconnected(result) => {
                    self.reconnection = None;
                    self.on_reconnected(result).await
                }
            };

            if let Flow::Stop = flow {
                break;
            }
        }

        if let Some(text) = self.driver.tracker.take_agent_text() {
            self.driver.shared.append_transcript(Speaker::Agent, &text);
        }

        info!("Session {} event loop stopped", self.driver.session_id);

        DriverOutcome {
            session_id: self.driver.session_id,
            recording: self.recording,
        }
    }

    async fn send_message(&mut self, text: String, reply: oneshot::Sender<Result<AudioBurst>>) {
        if self.pending.is_some() {
            debug!("Rejecting message: a response is still pending");
            let _ = reply.send(Err(SessionError::Busy));
            return;
        }

        let now = Instant::now();
        let deadline = now + self.driver.config.response_timeout();

        if self.reconnection.is_some() {
            debug!("Holding message until the channel is re-established");
            self.pending = Some(PendingRequest {
                reply,
                issued_at: now,
                deadline,
                unsent: Some(text),
            });
            return;
        }

        if !send_on(outbound(&self.driver.connection), OutboundMessage::UserMessage { text }).await {
            let _ = reply.send(Err(SessionError::Transport("channel closed".into())));
            return;
        }

        self.pending = Some(PendingRequest {
            reply,
            issued_at: now,
            deadline,
            unsent: None,
        });
        debug!("Message sent, awaiting response");
    }

    async fn dispatch(&mut self, event: AgentEvent) {
        match event {
            AgentEvent::AudioChunk { event_id, bytes } => {
                let now = Instant::now().into_std();
                if let Err(e) = self.driver.buffer.add_chunk(event_id, bytes, now) {
                    debug!("Audio chunk {} not buffered: {}", event_id, e);
                }
            }
            AgentEvent::ModeChanged(mode) => {
                if let Some(transition) = self.driver.tracker.apply(mode) {
                    if let Some(text) = transition.finalized_agent_text {
                        self.driver.shared.append_transcript(Speaker::Agent, &text);
                    }
                    self.driver.hooks.on_mode_change(transition.from, transition.to);
                }
            }
            AgentEvent::AgentText(text) => self.driver.tracker.agent_fragment(&text),
            AgentEvent::UserText { text, tentative: true } => {
                self.driver.tracker.tentative_user(&text)
            }
            AgentEvent::UserText { text, tentative: false } => {
                self.driver.tracker.user_final();
                self.driver.shared.append_transcript(Speaker::User, &text);
            }
            AgentEvent::Interruption { reason } => {
                info!("Agent turn interrupted: {}", reason);
                self.settle_pending(SessionError::Interrupted { reason });
            }
            AgentEvent::Ping { event_id } => {
                if !send_on(outbound(&self.driver.connection), OutboundMessage::Pong { event_id }).await {
                    debug!("Pong {} not sent: channel closed", event_id);
                }
            }
            AgentEvent::SessionStarted { session_id, .. } => {
                debug!("Ignoring repeated handshake metadata for {}", session_id);
            }
            AgentEvent::Ignored => {}
        }
    }

    fn poll_buffer(&mut self) {
        let started_at = self.driver.buffer.burst_started_at();
        match self.driver.buffer.poll(Instant::now().into_std()) {
            Some(Ok(burst)) => {
                self.complete_burst(burst, started_at);
            }
            Some(Err(e)) => {
                warn!("Discarding burst: {}", e);
                if let Some(pending) = self.pending.take() {
                    let _ = pending.reply.send(Err(e));
                }
            }
            None => {}
        }
    }

    /// Deliver a burst to the pending request if it belongs to it.
    /// Returns whether the pending request was resolved.
    fn complete_burst(&mut self, burst: AudioBurst, started_at: Option<std::time::Instant>) -> bool {
        self.driver.metrics.burst_completed();
        self.driver.shared.bursts.fetch_add(1, Ordering::SeqCst);

        match self.pending.take() {
            // Audio already streaming before the message went out answers something else
            Some(pending) if started_at.map_or(true, |s| s >= pending.issued_at.into_std()) => {
                info!(
                    "Response ready: {} bytes in {} chunks{}",
                    burst.len(),
                    burst.chunk_count,
                    if burst.salvaged { " (salvaged)" } else { "" }
                );
                let _ = pending.reply.send(Ok(burst));
                true
            }
            other => {
                self.pending = other;
                debug!("Unsolicited burst: {} bytes", burst.len());
                self.driver.hooks.on_unsolicited_audio(&burst.bytes);
                false
            }
        }
    }

    /// Salvage buffered audio for the pending request, otherwise fail it with `err`
    fn settle_pending(&mut self, err: SessionError) {
        if !self.driver.buffer.is_empty() {
            let started_at = self.driver.buffer.burst_started_at();
            match self.driver.buffer.salvage() {
                Ok(burst) => {
                    if self.complete_burst(burst, started_at) {
                        return;
                    }
                }
                Err(e) => warn!("Nothing salvageable: {}", e),
            }
        }

        if let Some(pending) = self.pending.take() {
            debug!("Rejecting pending message: {}", err);
            let _ = pending.reply.send(Err(err));
        }
    }

    fn expire_pending(&mut self) {
        if let Some(pending) = self.pending.take() {
            let timeout_ms = self.driver.config.response_timeout_ms;
            warn!("No response within {}ms", timeout_ms);
            self.driver.metrics.response_timed_out();
            let _ = pending.reply.send(Err(SessionError::ResponseTimeout { timeout_ms }));
        }
    }

    async fn forward_frame(&mut self, frame: Option<AudioFrame>) {
        let Some(frame) = frame else {
            debug!("Capture stream ended");
            self.driver.capture_rx = None;
            return;
        };

        // Frames queued before a pause are dropped too
        if let Some(capture) = &self.driver.capture {
            if !capture.is_enabled() {
                return;
            }
        }

        self.recording.push(&frame);

        let chunk = base64::engine::general_purpose::STANDARD.encode(frame.to_pcm_bytes());
        let message = OutboundMessage::UserAudioChunk {
            user_audio_chunk: chunk,
        };
        if !send_on(outbound(&self.driver.connection), message).await {
            debug!("Captured frame not sent: no open channel");
        }
    }

    fn end_by_caller(&mut self) {
        info!("Ending session {}", self.driver.session_id);
        if self.reconnection.take().is_some() {
            info!("Reconnection abandoned: conversation ended by caller");
        }
        self.settle_pending(SessionError::Closed);
        self.driver.hooks.on_disconnect("conversation ended");
    }

    fn on_closed(&mut self, close: CloseInfo) -> Flow {
        let shared = Arc::clone(&self.driver.shared);
        self.driver.connection = None;

        if close.is_normal() || shared.closing.load(Ordering::SeqCst) {
            info!("Voice agent closed the conversation ({}: {})", close.code, close.reason);
            self.settle_pending(SessionError::Closed);
            shared.state.send_replace(SessionState::Closed);
            self.driver.hooks.on_disconnect(&close.reason);
            return Flow::Stop;
        }

        warn!(
            "Voice agent channel dropped ({}: {}), reconnecting",
            close.code, close.reason
        );
        shared.state.send_replace(SessionState::Reconnecting);
        self.driver.hooks.on_disconnect(&close.reason);

        let connector = Arc::clone(&self.driver.connector);
        let initiation = self.driver.config.initiation_message();
        let handshake_timeout = self.driver.config.handshake_timeout();
        let policy = self.driver.config.reconnect;

        self.reconnection = Some(Box::pin(async move {
            policy
                .reconnect(
                    |_| establish(Arc::clone(&connector), initiation.clone(), handshake_timeout),
                    &shared.closing,
                )
                .await
        }));
        Flow::Continue
    }

    async fn on_reconnected(&mut self, result: Result<(Connection, String)>) -> Flow {
        let shared = Arc::clone(&self.driver.shared);

        match result {
            Ok((connection, session_id)) => {
                if session_id != self.driver.session_id {
                    info!("Reconnected as session {} (was {})", session_id, self.driver.session_id);
                } else {
                    info!("Reconnected to session {}", session_id);
                }
                self.driver.connection = Some(connection);
                self.driver.session_id = session_id.clone();
                shared.session_id.send_replace(Some(session_id.clone()));
                shared.reconnects.fetch_add(1, Ordering::SeqCst);
                self.driver.metrics.reconnected();

                if let Some(text) = self.pending.as_mut().and_then(|p| p.unsent.take()) {
                    let message = OutboundMessage::UserMessage { text };
                    if !send_on(outbound(&self.driver.connection), message).await {
                        self.settle_pending(SessionError::Transport("channel closed".into()));
                    }
                }

                let resumed = shared.state.send_if_modified(|state| {
                    if *state == SessionState::Reconnecting {
                        *state = SessionState::Active;
                        true
                    } else {
                        false
                    }
                });
                if !resumed {
                    // end_conversation() arrived while the handshake was in flight
                    return Flow::Continue;
                }

                self.driver.hooks.on_connect(&session_id);
                Flow::Continue
            }
            Err(SessionError::Closed) => {
                info!("Reconnection abandoned: conversation ended by caller");
                self.settle_pending(SessionError::Closed);
                Flow::Stop
            }
            Err(e) => {
                error!("Giving up on session {}: {}", self.driver.session_id, e);
                self.driver.metrics.error();
                shared.state.send_replace(SessionState::Closed);
                self.settle_pending(e.clone());
                self.driver.hooks.on_error(&e);
                self.driver.hooks.on_disconnect(&e.to_string());
                Flow::Stop
            }
        }
    }
}

fn outbound(connection: &Option<Connection>) -> Option<mpsc::Sender<OutboundMessage>> {
    connection.as_ref().map(|c| c.outbound.clone())
}

/// Returns false when there is no open channel to send on
async fn send_on(outbound: Option<mpsc::Sender<OutboundMessage>>, message: OutboundMessage) -> bool {
    match outbound {
        Some(outbound) => outbound.send(message).await.is_ok(),
        None => false,
    }
}

async fn next_event(connection: &mut Option<Connection>) -> Option<ChannelEvent> {
    match connection {
        Some(connection) => connection.inbound.recv().await,
        None => std::future::pending().await,
    }
}

async fn next_reconnection(reconnection: &mut Option<Reconnection>) -> Result<(Connection, String)> {
    match reconnection {
        Some(attempt) => attempt.as_mut().await,
        None => std::future::pending().await,
    }
}

async fn next_frame(rx: &mut Option<mpsc::Receiver<AudioFrame>>) -> Option<AudioFrame> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
