//! Realtime subscriptions over the AppSync WebSocket protocol.
//!
//! [`RealtimeSubscriber`] is the entry point. [`RealtimeOperation`] is the
//! engine underneath it, exposed for callers that need to drive the
//! connect/init/start/stop steps themselves.

mod config;
mod message;
mod operation;
mod subscriber;

pub use config::{DEFAULT_READ_TIMEOUT, GRAPHQL_WS_PROTOCOL, RealtimeConfig};
pub use message::{
    ConnectionAckPayload, DataPayload, ErrorEntry, ErrorPayload, InboundMessage, OutboundMessage,
    StartExtensions, StartPayload,
};
pub use operation::{ConnectionLostCallback, RealtimeOperation, ReceiveCallback, connection_url};
pub use subscriber::{RealtimeSubscriber, RealtimeSubscriberBuilder};
