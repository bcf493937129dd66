//! Frames exchanged on the realtime socket.
//!
//! Every frame is a JSON text message discriminated by its `type` field.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A frame sent by the client.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    /// Opens the protocol session; answered by `connection_ack`.
    ConnectionInit,
    /// Registers a subscription; answered by `start_ack`.
    Start { id: String, payload: StartPayload },
    /// Unregisters a subscription; answered by `complete`.
    Stop { id: String },
}

impl OutboundMessage {
    /// Build a `start` frame for the serialized request and its authorization headers.
    pub fn start(
        id: impl Into<String>,
        request: impl Into<String>,
        authorization: HashMap<String, String>,
    ) -> Self {
        Self::Start {
            id: id.into(),
            payload: StartPayload {
                data: request.into(),
                extensions: StartExtensions { authorization },
            },
        }
    }

    /// Build a `stop` frame for the given subscription.
    pub fn stop(id: impl Into<String>) -> Self {
        Self::Stop { id: id.into() }
    }
}

/// Payload of a `start` frame.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StartPayload {
    /// The GraphQL request, serialized as a JSON string.
    pub data: String,
    pub extensions: StartExtensions,
}

/// Extensions block of a `start` frame.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StartExtensions {
    pub authorization: HashMap<String, String>,
}

/// A frame received from the server.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundMessage {
    /// The server accepted `connection_init`.
    ConnectionAck {
        #[serde(default)]
        payload: ConnectionAckPayload,
    },
    /// Keep-alive.
    Ka,
    /// The server registered a subscription.
    StartAck {
        #[serde(default)]
        id: String,
    },
    /// A subscription event.
    Data {
        #[serde(default)]
        id: String,
        #[serde(default)]
        payload: DataPayload,
    },
    /// The server unregistered a subscription.
    Complete {
        #[serde(default)]
        id: String,
    },
    /// The server rejected an operation.
    Error {
        #[serde(default)]
        id: String,
        #[serde(default)]
        payload: ErrorPayload,
    },
    /// Any frame type this client does not handle.
    #[serde(other)]
    Unknown,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct ConnectionAckPayload {
    #[serde(rename = "connectionTimeoutMs", default)]
    pub connection_timeout_ms: i64,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct DataPayload {
    #[serde(default)]
    pub data: Value,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct ErrorPayload {
    #[serde(default)]
    pub errors: Vec<ErrorEntry>,
}

/// One entry of an `error` frame.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorEntry {
    #[serde(rename = "errorType", default)]
    pub error_type: String,
    #[serde(default)]
    pub message: String,
}

impl ErrorEntry {
    /// Convert into the dynamically-typed form carried by a response.
    pub fn into_value(self) -> Value {
        serde_json::json!({
            "errorType": self.error_type,
            "message": self.message,
        })
    }
}
