//! Voice agent channel: wire messages, typed events and the transport
pub mod channel;
pub mod event;
pub mod messages;

pub use channel::{ChannelEvent, CloseInfo, Connection, Connector, WsConnector, NORMAL_CLOSURE};
pub use event::AgentEvent;
pub use messages::{InboundMessage, OutboundMessage};
