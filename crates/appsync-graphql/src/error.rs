//! Error types for the GraphQL transport.

use thiserror::Error;

/// Errors produced by the GraphQL envelope and the HTTP transport.
#[derive(Debug, Error)]
pub enum Error {
    /// HTTP request failed before a response was received.
    #[error("HTTP request error: {0}")]
    Request(String),
    /// Connection refused or failed.
    #[error("Connection error: {0}")]
    Connection(String),
    /// The request did not complete within the configured timeout.
    #[error("Request timed out")]
    Timeout,
    /// The request was cancelled through its handle.
    #[error("Request was cancelled")]
    Cancelled,
    /// Invalid header name or value.
    #[error("Invalid header: {0}")]
    InvalidHeader(String),
    /// Proxy configuration error.
    #[error("Proxy error: {0}")]
    Proxy(String),
    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    /// The response data does not have the expected envelope shape.
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_connect() {
            Self::Connection(err.to_string())
        } else {
            Self::Request(err.to_string())
        }
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

/// A specialized Result type for GraphQL transport operations.
pub type Result<T> = std::result::Result<T, Error>;
