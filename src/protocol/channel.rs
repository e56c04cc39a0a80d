use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use std::borrow::Cow;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::frame::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use super::event::AgentEvent;
use super::messages::OutboundMessage;
use crate::error::{Result, SessionError};

/// WebSocket close code for a normal, caller-initiated closure
pub const NORMAL_CLOSURE: u16 = 1000;
const ABNORMAL_CLOSURE: u16 = 1006;

const CHANNEL_CAPACITY: usize = 256;

/// How the channel was closed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseInfo {
    pub code: u16,
    pub reason: String,
}

impl CloseInfo {
    pub fn normal(reason: impl Into<String>) -> Self {
        Self {
            code: NORMAL_CLOSURE,
            reason: reason.into(),
        }
    }

    pub fn abnormal(reason: impl Into<String>) -> Self {
        Self {
            code: ABNORMAL_CLOSURE,
            reason: reason.into(),
        }
    }

    pub fn is_normal(&self) -> bool {
        self.code == NORMAL_CLOSURE
    }
}

/// Something that arrived on the inbound side of the channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Event(AgentEvent),
    Closed(CloseInfo),
}

/// An open bidirectional channel to the voice agent
///
/// Dropping `outbound` closes the underlying transport with [`NORMAL_CLOSURE`].
pub struct Connection {
    pub outbound: mpsc::Sender<OutboundMessage>,
    pub inbound: mpsc::Receiver<ChannelEvent>,
}

/// Opens channels to the voice agent
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Connection>;

    /// Connector name for logging
    fn name(&self) -> &str;
}

/// WebSocket connector for the hosted conversational agent
pub struct WsConnector {
    url: String,
    api_key: Option<String>,
}

impl WsConnector {
    pub fn new(url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            url: url.into(),
            api_key,
        }
    }

    /// Conversation endpoint for an agent id, e.g. `wss://host/v1/convai/conversation?agent_id=..`
    pub fn for_agent(base_url: &str, agent_id: &str, api_key: Option<String>) -> Self {
        let url = format!(
            "{}/v1/convai/conversation?agent_id={}",
            base_url.trim_end_matches('/'),
            agent_id
        );
        Self::new(url, api_key)
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self) -> Result<Connection> {
        info!("Connecting to voice agent at {}", self.url);

        let mut request = self.url.as_str().into_client_request()?;
        if let Some(key) = &self.api_key {
            let value = HeaderValue::from_str(key)
                .map_err(|e| SessionError::Connection(format!("invalid api key header: {}", e)))?;
            request.headers_mut().insert("xi-api-key", value);
        }

        let (ws_stream, _) = connect_async(request)
            .await
            .map_err(|e| SessionError::Connection(e.to_string()))?;
        let (mut writer, mut reader) = ws_stream.split();

        let (out_tx, mut out_rx) = mpsc::channel::<OutboundMessage>(CHANNEL_CAPACITY);
        let (in_tx, in_rx) = mpsc::channel::<ChannelEvent>(CHANNEL_CAPACITY);

        tokio::spawn(async move {
            while let Some(message) = out_rx.recv().await {
                let json = match message.to_json() {
                    Ok(json) => json,
                    Err(e) => {
                        warn!("Failed to serialize outbound message: {}", e);
                        continue;
                    }
                };
                if let Err(e) = writer.send(Message::Text(json)).await {
                    warn!("Failed to send to voice agent: {}", e);
                    return;
                }
            }

            // Sender dropped: caller-initiated close
            let frame = CloseFrame {
                code: CloseCode::Normal,
                reason: Cow::Borrowed("session ended"),
            };
            if let Err(e) = writer.send(Message::Close(Some(frame))).await {
                debug!("Close frame not delivered: {}", e);
            }
        });

        tokio::spawn(async move {
            let close = loop {
                match reader.next().await {
                    Some(Ok(Message::Text(text))) => match AgentEvent::parse(&text) {
                        Ok(AgentEvent::Ignored) => debug!("Ignoring unhandled event: {}", text),
                        Ok(event) => {
                            if in_tx.send(ChannelEvent::Event(event)).await.is_err() {
                                return;
                            }
                        }
                        Err(e) => warn!("Dropping malformed frame: {}", e),
                    },
                    Some(Ok(Message::Close(frame))) => {
                        break match frame {
                            Some(frame) => CloseInfo {
                                code: u16::from(frame.code),
                                reason: frame.reason.to_string(),
                            },
                            None => CloseInfo::abnormal("closed without close frame"),
                        };
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => break CloseInfo::abnormal(e.to_string()),
                    None => break CloseInfo::abnormal("stream ended"),
                }
            };

            debug!("Voice agent channel closed: {} {}", close.code, close.reason);
            let _ = in_tx.send(ChannelEvent::Closed(close)).await;
        });

        info!("Connected to voice agent");

        Ok(Connection {
            outbound: out_tx,
            inbound: in_rx,
        })
    }

    fn name(&self) -> &str {
        "websocket"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_close_info_classification() {
        assert!(CloseInfo::normal("bye").is_normal());
        assert!(!CloseInfo::abnormal("reset").is_normal());
        assert!(!CloseInfo { code: 1011, reason: "server error".into() }.is_normal());
    }

    #[test]
    fn test_agent_url() {
        let connector = WsConnector::for_agent("wss://api.example.com/", "agent_42", None);
        assert_eq!(connector.url, "wss://api.example.com/v1/convai/conversation?agent_id=agent_42");
    }
}
