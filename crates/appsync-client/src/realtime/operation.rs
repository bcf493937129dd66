//! The realtime subscription engine.
//!
//! One [`RealtimeOperation`] drives one subscription over one WebSocket
//! connection: `connect` dials and spawns the read loop, `connection_init` and
//! `start` send a frame and wait for the read loop to hand over the matching
//! acknowledgement, `stop` and `disconnect` tear down. Each acknowledgement
//! travels over its own single-slot channel; the read loop owns the senders,
//! so when it exits every pending or future wait on that connection observes
//! a closed channel instead of hanging.

use std::collections::HashMap;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use appsync_graphql::Response;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::{Mutex as AsyncMutex, mpsc};
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::config::RealtimeConfig;
use super::message::{ConnectionAckPayload, ErrorEntry, InboundMessage, OutboundMessage};
use crate::error::{Error, Result};

const TARGET: &str = "appsync_client::realtime";

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// Callback invoked for every `data` and `error` frame.
pub type ReceiveCallback = Arc<dyn Fn(Response) + Send + Sync>;

/// Callback invoked at most once per connection when the read loop fails.
pub type ConnectionLostCallback = Arc<dyn Fn(Error) + Send + Sync>;

/// Build the realtime connection URL from the handshake header and payload.
pub fn connection_url(endpoint: &str, header: &[u8], payload: &[u8]) -> String {
    format!(
        "{endpoint}?header={}&payload={}",
        STANDARD.encode(header),
        STANDARD.encode(payload)
    )
}

/// Receiving ends of the per-connection acknowledgement channels.
struct Waiters {
    connack: AsyncMutex<mpsc::Receiver<ConnectionAckPayload>>,
    start_ack: AsyncMutex<mpsc::Receiver<String>>,
    complete: AsyncMutex<mpsc::Receiver<String>>,
}

/// Sending ends, owned by the read loop.
struct Senders {
    connack: mpsc::Sender<ConnectionAckPayload>,
    start_ack: mpsc::Sender<String>,
    complete: mpsc::Sender<String>,
}

fn ack_channels() -> (Senders, Waiters) {
    let (connack_tx, connack_rx) = mpsc::channel(1);
    let (start_ack_tx, start_ack_rx) = mpsc::channel(1);
    let (complete_tx, complete_rx) = mpsc::channel(1);
    (
        Senders {
            connack: connack_tx,
            start_ack: start_ack_tx,
            complete: complete_tx,
        },
        Waiters {
            connack: AsyncMutex::new(connack_rx),
            start_ack: AsyncMutex::new(start_ack_rx),
            complete: AsyncMutex::new(complete_rx),
        },
    )
}

/// An open connection.
struct Connection {
    sink: Arc<AsyncMutex<WsSink>>,
    waiters: Arc<Waiters>,
    /// Stops the read loop of this connection.
    shutdown: CancellationToken,
}

impl Connection {
    fn handles(&self) -> (Arc<AsyncMutex<WsSink>>, Arc<Waiters>) {
        (self.sink.clone(), self.waiters.clone())
    }
}

#[derive(Default)]
struct OperationState {
    connection: Option<Connection>,
    /// Zero until `connection_ack` negotiates a keep-alive timeout.
    connection_timeout: Duration,
    /// Empty while no subscription is registered.
    subscription_id: String,
}

/// Drives a single subscription over a single realtime connection.
///
/// Methods take `&self`, so [`abort`](Self::abort) can run while another task
/// is blocked in [`connection_init`](Self::connection_init) or
/// [`start`](Self::start); it unblocks them with [`Error::ConnectionFailed`]
/// and [`Error::SubscriptionRegistrationFailed`] respectively. Only one task
/// should drive the connect/init/start/stop sequence.
pub struct RealtimeOperation {
    config: RealtimeConfig,
    cancel: CancellationToken,
    on_receive: ReceiveCallback,
    on_connection_lost: ConnectionLostCallback,
    state: Arc<Mutex<OperationState>>,
}

impl RealtimeOperation {
    /// Create an engine with its own cancellation token.
    pub fn new(
        config: RealtimeConfig,
        on_receive: ReceiveCallback,
        on_connection_lost: ConnectionLostCallback,
    ) -> Self {
        Self::with_cancellation(config, CancellationToken::new(), on_receive, on_connection_lost)
    }

    /// Create an engine governed by the given cancellation token.
    ///
    /// Cancelling the token stops a dial in progress and fails a `start` whose
    /// acknowledgement arrives afterwards. An open connection keeps reading until
    /// [`disconnect`](Self::disconnect) or [`abort`](Self::abort).
    pub fn with_cancellation(
        config: RealtimeConfig,
        cancel: CancellationToken,
        on_receive: ReceiveCallback,
        on_connection_lost: ConnectionLostCallback,
    ) -> Self {
        Self {
            config,
            cancel,
            on_receive,
            on_connection_lost,
            state: Arc::new(Mutex::new(OperationState::default())),
        }
    }

    /// Whether a connection is open.
    pub fn is_connected(&self) -> bool {
        self.state.lock().connection.is_some()
    }

    /// The timeout negotiated by `connection_ack`, or zero.
    pub fn connection_timeout(&self) -> Duration {
        self.state.lock().connection_timeout
    }

    /// The id of the registered subscription, if any.
    pub fn subscription_id(&self) -> Option<String> {
        let state = self.state.lock();
        (!state.subscription_id.is_empty()).then(|| state.subscription_id.clone())
    }

    /// Open the realtime connection and start the read loop.
    ///
    /// Dial failures are retried with backoff until the dial succeeds or the
    /// engine is cancelled, in which case [`Error::Cancelled`] is returned.
    pub async fn connect(&self, endpoint: &str, header: &[u8], payload: &[u8]) -> Result<()> {
        if self.is_connected() {
            return Err(Error::AlreadyConnected);
        }

        let url = connection_url(endpoint, header, payload);
        let stream = self.dial(&url).await?;
        let (sink, source) = stream.split();
        let (senders, waiters) = ack_channels();
        // Engine cancellation governs dialing only; the connection is torn down
        // through `disconnect`.
        let shutdown = CancellationToken::new();

        {
            let mut state = self.state.lock();
            if state.connection.is_some() {
                return Err(Error::AlreadyConnected);
            }
            state.connection = Some(Connection {
                sink: Arc::new(AsyncMutex::new(sink)),
                waiters: Arc::new(waiters),
                shutdown: shutdown.clone(),
            });
        }

        let read_loop = ReadLoop {
            source,
            senders,
            shutdown,
            state: self.state.clone(),
            default_read_timeout: self.config.default_read_timeout,
            on_receive: self.on_receive.clone(),
            on_connection_lost: self.on_connection_lost.clone(),
        };
        tokio::spawn(read_loop.run());

        tracing::debug!(target: TARGET, endpoint, "connected");
        Ok(())
    }

    async fn dial(&self, url: &str) -> Result<WsStream> {
        let backoff = &self.config.reconnect;
        let protocol = HeaderValue::from_str(&self.config.protocol)
            .map_err(|e| Error::InvalidHeader(e.to_string()))?;
        let mut attempt: u32 = 0;

        // wss:// dials need a process-wide crypto provider; one may already be set
        let _ = rustls::crypto::ring::default_provider().install_default();

        loop {
            let mut request = url.into_client_request()?;
            request
                .headers_mut()
                .insert(SEC_WEBSOCKET_PROTOCOL, protocol.clone());

            let result = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(Error::Cancelled),
                result = tokio_tungstenite::connect_async(request) => result,
            };

            let err = match result {
                Ok((stream, _response)) => return Ok(stream),
                Err(e) => e,
            };
            if !backoff.allows_retry(attempt) {
                tracing::warn!(target: TARGET, error = %err, attempt, "giving up dialing");
                return Err(err.into());
            }

            let delay = backoff.delay_for_attempt(attempt);
            tracing::warn!(target: TARGET, error = %err, attempt, ?delay, "dial failed, retrying");
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(Error::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
            attempt = attempt.saturating_add(1);
        }
    }

    /// Send `connection_init` and wait for `connection_ack`.
    pub async fn connection_init(&self) -> Result<()> {
        let (sink, waiters) = {
            let state = self.state.lock();
            if !state.connection_timeout.is_zero() {
                return Err(Error::AlreadyInitialized);
            }
            state
                .connection
                .as_ref()
                .ok_or(Error::NotConnected)?
                .handles()
        };

        send(&sink, &OutboundMessage::ConnectionInit).await?;

        let ack = waiters
            .connack
            .lock()
            .await
            .recv()
            .await
            .ok_or(Error::ConnectionFailed)?;

        let timeout = Duration::from_millis(u64::try_from(ack.connection_timeout_ms).unwrap_or(0));
        self.state.lock().connection_timeout = timeout;
        tracing::debug!(target: TARGET, ?timeout, "connection acknowledged");
        Ok(())
    }

    /// Register a subscription and wait for `start_ack`.
    ///
    /// `request` is the serialized GraphQL request; `authorization` is
    /// embedded in the frame's extensions. An acknowledgement that arrives
    /// after the engine was cancelled or disconnected is discarded and the
    /// call fails with [`Error::SubscriptionRegistrationFailed`].
    pub async fn start(
        &self,
        request: impl Into<String>,
        authorization: HashMap<String, String>,
    ) -> Result<()> {
        let (sink, waiters) = {
            let state = self.state.lock();
            if !state.subscription_id.is_empty() {
                return Err(Error::AlreadyStarted);
            }
            state
                .connection
                .as_ref()
                .ok_or(Error::NotConnected)?
                .handles()
        };

        let id = Uuid::new_v4().to_string();
        send(&sink, &OutboundMessage::start(id.as_str(), request, authorization)).await?;

        let acked = waiters
            .start_ack
            .lock()
            .await
            .recv()
            .await
            .ok_or(Error::SubscriptionRegistrationFailed)?;

        let mut state = self.state.lock();
        if state.connection.is_none() || self.cancel.is_cancelled() {
            tracing::debug!(target: TARGET, subscription = %acked, "acknowledged after teardown");
            return Err(Error::SubscriptionRegistrationFailed);
        }
        tracing::debug!(target: TARGET, subscription = %acked, "subscription registered");
        state.subscription_id = acked;
        Ok(())
    }

    /// Unregister the subscription, if any.
    ///
    /// Failures are logged, never returned, and the subscription id is cleared
    /// either way.
    pub async fn stop(&self) {
        let (id, handles) = {
            let state = self.state.lock();
            if state.subscription_id.is_empty() {
                return;
            }
            (
                state.subscription_id.clone(),
                state.connection.as_ref().map(Connection::handles),
            )
        };

        match handles {
            Some((sink, waiters)) => {
                if let Err(e) = send(&sink, &OutboundMessage::stop(id.as_str())).await {
                    tracing::warn!(target: TARGET, subscription = %id, error = %e, "failed to send stop");
                } else if waiters.complete.lock().await.recv().await.is_none() {
                    tracing::warn!(target: TARGET, subscription = %id, "unsubscribe failed");
                }
            }
            None => {
                tracing::warn!(target: TARGET, subscription = %id, "unsubscribe failed: not connected");
            }
        }

        self.state.lock().subscription_id.clear();
    }

    /// Close the connection, if any.
    ///
    /// The read loop is stopped first, so closing never reports a lost
    /// connection. Close errors are logged.
    pub async fn disconnect(&self) {
        let connection = {
            let mut state = self.state.lock();
            let Some(connection) = state.connection.take() else {
                return;
            };
            state.connection_timeout = Duration::ZERO;
            connection
        };

        connection.shutdown.cancel();

        let close = async { connection.sink.lock().await.close().await };
        match tokio::time::timeout(self.config.close_timeout, close).await {
            Ok(Ok(())) => tracing::debug!(target: TARGET, "disconnected"),
            Ok(Err(e)) => tracing::warn!(target: TARGET, error = %e, "error closing connection"),
            Err(_) => tracing::warn!(target: TARGET, "timed out closing connection"),
        }
    }

    /// Tear down forcibly.
    ///
    /// Cancels any dial in progress, forgets the subscription without sending
    /// `stop`, and disconnects. Blocked `connection_init`/`start` calls return
    /// their handshake error. The engine cannot connect again afterwards.
    pub async fn abort(&self) {
        self.cancel.cancel();
        self.state.lock().subscription_id.clear();
        self.stop().await;
        self.disconnect().await;
    }
}

impl std::fmt::Debug for RealtimeOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("RealtimeOperation")
            .field("connected", &state.connection.is_some())
            .field("connection_timeout", &state.connection_timeout)
            .field("subscription_id", &state.subscription_id)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

async fn send(sink: &AsyncMutex<WsSink>, frame: &OutboundMessage) -> Result<()> {
    let text = serde_json::to_string(frame)?;
    sink.lock().await.send(Message::Text(text.into())).await?;
    Ok(())
}

/// The background task reading one connection.
struct ReadLoop {
    source: WsSource,
    senders: Senders,
    shutdown: CancellationToken,
    state: Arc<Mutex<OperationState>>,
    default_read_timeout: Duration,
    on_receive: ReceiveCallback,
    on_connection_lost: ConnectionLostCallback,
}

impl ReadLoop {
    /// Runs until a terminal frame, a read failure or shutdown. The senders
    /// are dropped on return, closing every acknowledgement channel.
    async fn run(mut self) {
        let mut deadline = Instant::now() + self.default_read_timeout;

        loop {
            let next = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                next = tokio::time::timeout_at(deadline, self.source.next()) => next,
            };

            let decoded = match next {
                Err(_) => {
                    self.connection_lost(Error::Timeout);
                    break;
                }
                Ok(None) => {
                    self.connection_lost(Error::ConnectionClosed);
                    break;
                }
                Ok(Some(Err(e))) => {
                    self.connection_lost(e.into());
                    break;
                }
                Ok(Some(Ok(Message::Text(text)))) => {
                    serde_json::from_str::<InboundMessage>(text.as_str())
                }
                Ok(Some(Ok(Message::Binary(data)))) => serde_json::from_slice(&data),
                Ok(Some(Ok(Message::Close(frame)))) => {
                    tracing::debug!(target: TARGET, ?frame, "close frame received");
                    self.connection_lost(Error::ConnectionClosed);
                    break;
                }
                // Ping, pong and raw frames
                Ok(Some(Ok(_))) => continue,
            };

            let frame = match decoded {
                Ok(frame) => frame,
                Err(e) => {
                    tracing::error!(target: TARGET, error = %e, "undecodable frame, stopping read loop");
                    break;
                }
            };

            if self.dispatch(frame, &mut deadline).is_break() {
                break;
            }
        }

        tracing::debug!(target: TARGET, "read loop finished");
    }

    fn dispatch(&self, frame: InboundMessage, deadline: &mut Instant) -> ControlFlow<()> {
        match frame {
            InboundMessage::ConnectionAck { payload } => {
                hand_off(&self.senders.connack, payload, "connection_ack");
                ControlFlow::Continue(())
            }
            InboundMessage::Ka => {
                *deadline = Instant::now() + self.keep_alive_timeout();
                ControlFlow::Continue(())
            }
            InboundMessage::StartAck { id } => {
                hand_off(&self.senders.start_ack, id, "start_ack");
                ControlFlow::Continue(())
            }
            InboundMessage::Data { payload, .. } => {
                let data = (!payload.data.is_null()).then_some(payload.data);
                (self.on_receive)(Response {
                    data,
                    ..Default::default()
                });
                ControlFlow::Continue(())
            }
            InboundMessage::Complete { id } => {
                hand_off(&self.senders.complete, id, "complete");
                ControlFlow::Break(())
            }
            InboundMessage::Error { id, payload } => {
                tracing::warn!(target: TARGET, subscription = %id, "error frame received");
                let errors = payload
                    .errors
                    .into_iter()
                    .map(ErrorEntry::into_value)
                    .collect();
                (self.on_receive)(Response {
                    errors: Some(errors),
                    ..Default::default()
                });
                ControlFlow::Break(())
            }
            InboundMessage::Unknown => {
                tracing::warn!(target: TARGET, "invalid message received");
                ControlFlow::Continue(())
            }
        }
    }

    fn keep_alive_timeout(&self) -> Duration {
        let negotiated = self.state.lock().connection_timeout;
        if negotiated.is_zero() {
            self.default_read_timeout
        } else {
            negotiated
        }
    }

    fn connection_lost(&self, err: Error) {
        if self.shutdown.is_cancelled() {
            return;
        }
        tracing::warn!(target: TARGET, error = %err, "connection lost");
        (self.on_connection_lost)(err);
    }
}

fn hand_off<T>(sender: &mpsc::Sender<T>, value: T, kind: &str) {
    match sender.try_send(value) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(_)) => {
            tracing::warn!(target: TARGET, kind, "previous acknowledgement still pending, dropping");
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            tracing::debug!(target: TARGET, kind, "no waiter for acknowledgement");
        }
    }
}
