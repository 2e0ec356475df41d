//! MebelPlace Socket - WebSocket client for the marketplace realtime channels.
//!
//! This crate provides:
//! - The `{event, data}` envelope codec and typed client/server events
//! - A per-connection event dispatcher with set semantics
//! - A pluggable transport (`tokio-tungstenite`, or in-memory for tests)
//! - The connection manager: idempotent connect/disconnect and fixed-delay,
//!   bounded reconnection after abnormal closes

pub mod connection;
pub mod dispatcher;
pub mod envelope;
pub mod events;
pub mod transport;

// Re-export key types
pub use connection::{Connection, ConnectionState, SocketConfig, WeakConnection};
pub use dispatcher::{handler, EventDispatcher, EventHandler};
pub use envelope::Envelope;
pub use events::{
    Attachment, ChatMessage, ClientEvent, ConnectionStatus, ErrorPayload, NewMessagePayload,
    ServerEvent, ServerEventKind, UserRef, UserStatusPayload,
};
pub use transport::{
    Connector, MemoryConnector, MemoryPeer, OutboundFrame, TransportEvent, TransportHandle,
    WsConnector,
};
