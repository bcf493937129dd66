//! Error types for the AppSync client.

use thiserror::Error;

/// Errors produced by the AppSync client and the realtime subscription engine.
#[derive(Debug, Error)]
pub enum Error {
    /// `connect` was called while a connection is already open.
    #[error("already connected")]
    AlreadyConnected,
    /// `connection_init` was called after the connection was acknowledged.
    #[error("connection already initialized")]
    AlreadyInitialized,
    /// `start` was called while a subscription is active.
    #[error("subscription already started")]
    AlreadyStarted,
    /// An operation that needs an open connection was called without one.
    #[error("not connected")]
    NotConnected,
    /// The connection ended before `connection_ack` arrived.
    #[error("connection failed")]
    ConnectionFailed,
    /// The connection ended before `start_ack` arrived.
    #[error("subscription registration failed")]
    SubscriptionRegistrationFailed,
    /// The operation was cancelled.
    #[error("operation cancelled")]
    Cancelled,
    /// No frame arrived within the read deadline.
    #[error("read timed out")]
    Timeout,
    /// The peer closed the connection.
    #[error("connection closed by peer")]
    ConnectionClosed,
    /// WebSocket transport error.
    #[error("WebSocket error: {0}")]
    WebSocket(String),
    /// Request signing failed.
    #[error("signing error: {0}")]
    Signing(String),
    /// Invalid URL provided.
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// Invalid header name or value.
    #[error("invalid header: {0}")]
    InvalidHeader(String),
    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    /// Error from the plain GraphQL transport.
    #[error(transparent)]
    GraphQL(#[from] appsync_graphql::Error),
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::WebSocket(err.to_string())
    }
}

impl From<http::header::InvalidHeaderName> for Error {
    fn from(err: http::header::InvalidHeaderName) -> Self {
        Self::InvalidHeader(err.to_string())
    }
}

impl From<http::header::InvalidHeaderValue> for Error {
    fn from(err: http::header::InvalidHeaderValue) -> Self {
        Self::InvalidHeader(err.to_string())
    }
}

/// A specialized Result type for AppSync client operations.
pub type Result<T> = std::result::Result<T, Error>;
