//! Configuration for the realtime subscription engine.

use std::time::Duration;

use appsync_graphql::BackoffConfig;

/// Sub-protocol token declared on every realtime dial.
pub const GRAPHQL_WS_PROTOCOL: &str = "graphql-ws";

/// Read deadline used until the server negotiates its own keep-alive timeout.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(300_000);

/// Configuration for a realtime connection.
///
/// # Example
///
/// ```ignore
/// use appsync_client::realtime::RealtimeConfig;
/// use appsync_graphql::BackoffConfig;
///
/// let config = RealtimeConfig::new()
///     .default_read_timeout(Duration::from_secs(60))
///     .reconnect(BackoffConfig::new().max_delay(Duration::from_secs(10)));
/// ```
#[derive(Clone, Debug)]
pub struct RealtimeConfig {
    /// Read deadline before `connection_ack` negotiates one.
    pub default_read_timeout: Duration,
    /// Sub-protocol sent in the `sec-websocket-protocol` upgrade header.
    pub protocol: String,
    /// Backoff between dial attempts. Unlimited attempts by default; dialing
    /// only stops on success or cancellation.
    pub reconnect: BackoffConfig,
    /// Upper bound on sending the close frame during `disconnect`.
    pub close_timeout: Duration,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            default_read_timeout: DEFAULT_READ_TIMEOUT,
            protocol: GRAPHQL_WS_PROTOCOL.to_string(),
            reconnect: BackoffConfig::default(),
            close_timeout: Duration::from_secs(5),
        }
    }
}

impl RealtimeConfig {
    /// Create a configuration with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the read deadline used before the server negotiates one.
    pub fn default_read_timeout(mut self, timeout: Duration) -> Self {
        self.default_read_timeout = timeout;
        self
    }

    /// Set the sub-protocol token.
    pub fn protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = protocol.into();
        self
    }

    /// Set the dial backoff.
    pub fn reconnect(mut self, backoff: BackoffConfig) -> Self {
        self.reconnect = backoff;
        self
    }

    /// Set the bound on closing the socket.
    pub fn close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }
}
