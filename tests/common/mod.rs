#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use voice_interview::artifacts::{ArtifactSource, RemoteAudio};
use voice_interview::protocol::{
    AgentEvent, ChannelEvent, CloseInfo, Connection, Connector, OutboundMessage,
};
use voice_interview::session::{Mode, SessionHooks, TranscriptEntry};
use voice_interview::SessionError;

/// What the scripted agent does on a connection attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    /// Acknowledge the handshake with a fresh conversation id
    Accept,
    /// Fail to connect
    Refuse,
    /// Connect but never acknowledge the handshake
    Silent,
}

/// The agent's side of one scripted connection
pub struct RemoteEnd {
    pub session_id: String,
    to_client: mpsc::Sender<ChannelEvent>,
    from_client: mpsc::Receiver<OutboundMessage>,
}

impl RemoteEnd {
    pub async fn send(&self, event: AgentEvent) {
        self.to_client
            .send(ChannelEvent::Event(event))
            .await
            .expect("session stopped listening");
    }

    pub async fn audio(&self, event_id: u64, bytes: &[u8]) {
        self.send(AgentEvent::AudioChunk {
            event_id,
            bytes: bytes.to_vec(),
        })
        .await;
    }

    pub async fn mode(&self, mode: Mode) {
        self.send(AgentEvent::ModeChanged(mode)).await;
    }

    pub async fn close(&self, close: CloseInfo) {
        let _ = self.to_client.send(ChannelEvent::Closed(close)).await;
    }

    /// Next message sent by the session, or None once it hung up
    pub async fn recv(&mut self) -> Option<OutboundMessage> {
        self.from_client.recv().await
    }

    /// Skip outbound traffic until a user message arrives
    pub async fn expect_user_message(&mut self) -> String {
        loop {
            match self.recv().await {
                Some(OutboundMessage::UserMessage { text }) => return text,
                Some(_) => continue,
                None => panic!("session hung up before sending a message"),
            }
        }
    }
}

/// In-memory voice agent following a per-attempt script
pub struct ScriptedConnector {
    script: Mutex<VecDeque<Behavior>>,
    fallback: Behavior,
    attempts: AtomicU32,
    remotes_tx: mpsc::UnboundedSender<RemoteEnd>,
    remotes_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<RemoteEnd>>,
}

impl ScriptedConnector {
    /// Every attempt behaves the same way
    pub fn new(fallback: Behavior) -> Arc<Self> {
        Self::scripted(Vec::new(), fallback)
    }

    /// Attempts follow `script`, then `fallback`
    pub fn scripted(script: Vec<Behavior>, fallback: Behavior) -> Arc<Self> {
        let (remotes_tx, remotes_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            script: Mutex::new(script.into()),
            fallback,
            attempts: AtomicU32::new(0),
            remotes_tx,
            remotes_rx: tokio::sync::Mutex::new(remotes_rx),
        })
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Agent side of the next established connection
    pub async fn next_remote(&self) -> RemoteEnd {
        self.remotes_rx
            .lock()
            .await
            .recv()
            .await
            .expect("connector dropped")
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self) -> voice_interview::Result<Connection> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        let behavior = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(self.fallback);

        if behavior == Behavior::Refuse {
            return Err(SessionError::Connection(format!("attempt {} refused", attempt)));
        }

        let (out_tx, out_rx) = mpsc::channel(256);
        let (in_tx, in_rx) = mpsc::channel(256);
        let session_id = format!("conv_{}", attempt);

        if behavior == Behavior::Accept {
            in_tx
                .send(ChannelEvent::Event(AgentEvent::SessionStarted {
                    session_id: session_id.clone(),
                    output_format: Some("pcm_16000".into()),
                }))
                .await
                .unwrap();
        }

        let _ = self.remotes_tx.send(RemoteEnd {
            session_id,
            to_client: in_tx,
            from_client: out_rx,
        });

        Ok(Connection {
            outbound: out_tx,
            inbound: in_rx,
        })
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Hook calls in the order they happened
#[derive(Default)]
pub struct RecordingHooks {
    pub calls: Mutex<Vec<String>>,
    pub unsolicited: Mutex<Vec<Vec<u8>>>,
}

impl RecordingHooks {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl SessionHooks for RecordingHooks {
    fn on_connect(&self, session_id: &str) {
        self.calls.lock().unwrap().push(format!("connect:{}", session_id));
    }

    fn on_disconnect(&self, reason: &str) {
        self.calls.lock().unwrap().push(format!("disconnect:{}", reason));
    }

    fn on_mode_change(&self, from: Mode, to: Mode) {
        self.calls.lock().unwrap().push(format!("mode:{}->{}", from, to));
    }

    fn on_error(&self, error: &SessionError) {
        self.calls.lock().unwrap().push(format!("error:{}", error));
    }

    fn on_unsolicited_audio(&self, bytes: &[u8]) {
        self.unsolicited.lock().unwrap().push(bytes.to_vec());
    }
}

/// Artifact source with canned answers
pub struct FakeArtifacts {
    pub transcript: voice_interview::Result<Vec<TranscriptEntry>>,
    pub audio: voice_interview::Result<RemoteAudio>,
}

impl FakeArtifacts {
    pub fn unavailable() -> Arc<Self> {
        Arc::new(Self {
            transcript: Err(SessionError::Artifact("503 Service Unavailable".into())),
            audio: Err(SessionError::Artifact("404 Not Found".into())),
        })
    }
}

#[async_trait]
impl ArtifactSource for FakeArtifacts {
    async fn fetch_transcript(&self, _session_id: &str) -> voice_interview::Result<Vec<TranscriptEntry>> {
        self.transcript.clone()
    }

    async fn fetch_audio(&self, _session_id: &str) -> voice_interview::Result<RemoteAudio> {
        self.audio.clone()
    }
}

/// Artifact source that finishes processing the transcript after a delay;
/// the recording is not published before that
pub struct ProcessingArtifacts {
    pub processing: Duration,
    pub transcript: Vec<TranscriptEntry>,
    pub audio: RemoteAudio,
    ready: AtomicBool,
}

impl ProcessingArtifacts {
    pub fn new(processing: Duration, transcript: Vec<TranscriptEntry>, audio: RemoteAudio) -> Arc<Self> {
        Arc::new(Self {
            processing,
            transcript,
            audio,
            ready: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl ArtifactSource for ProcessingArtifacts {
    async fn fetch_transcript(&self, _session_id: &str) -> voice_interview::Result<Vec<TranscriptEntry>> {
        tokio::time::sleep(self.processing).await;
        self.ready.store(true, Ordering::SeqCst);
        Ok(self.transcript.clone())
    }

    async fn fetch_audio(&self, _session_id: &str) -> voice_interview::Result<RemoteAudio> {
        if self.ready.load(Ordering::SeqCst) {
            Ok(self.audio.clone())
        } else {
            Err(SessionError::Artifact("404 Not Found".into()))
        }
    }
}
