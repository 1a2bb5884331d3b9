//! Link to the remote interview service.

pub mod message;
pub mod websocket;

pub use message::{parse_reply, OutboundMessage, Reply, SessionContext};
pub use websocket::{Transport, TransportCallback, TransportError, TransportEvent, WsTransport};
