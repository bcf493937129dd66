//! A scripted realtime server for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use appsync_client::Error;
use appsync_graphql::Response;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::{UnboundedReceiver, unbounded_channel};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response as HandshakeResponse};
use tokio_tungstenite::tungstenite::http::HeaderValue;

/// What the server does in reply to a client frame.
pub enum Reply {
    Frame(Value),
    Sleep(Duration),
    Close,
}

type Script = Arc<dyn Fn(&Value) -> Vec<Reply> + Send + Sync>;

/// The upgrade request as seen by the server.
#[derive(Clone, Debug)]
pub struct Handshake {
    pub uri: String,
    pub protocol: Option<String>,
}

impl Handshake {
    fn query_param(&self, name: &str) -> Value {
        let (_, query) = self.uri.split_once('?').expect("query string");
        let encoded = query
            .split('&')
            .find_map(|pair| pair.strip_prefix(&format!("{name}=")))
            .expect("query parameter");
        let decoded = STANDARD.decode(encoded).expect("base64");
        serde_json::from_slice(&decoded).expect("json")
    }

    /// The decoded `header` query parameter.
    pub fn header(&self) -> Value {
        self.query_param("header")
    }

    /// The decoded `payload` query parameter.
    pub fn payload(&self) -> Value {
        self.query_param("payload")
    }
}

pub struct MockServer {
    addr: SocketAddr,
    handshakes: Arc<Mutex<Vec<Handshake>>>,
    received: Arc<Mutex<Vec<Value>>>,
}

impl MockServer {
    /// Start a server that answers every client frame with `script(frame)`.
    pub async fn start<F>(script: F) -> Self
    where
        F: Fn(&Value) -> Vec<Reply> + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handshakes = Arc::new(Mutex::new(Vec::new()));
        let received = Arc::new(Mutex::new(Vec::new()));
        let script: Script = Arc::new(script);

        let server = Self {
            addr,
            handshakes: handshakes.clone(),
            received: received.clone(),
        };

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(serve(
                    stream,
                    script.clone(),
                    handshakes.clone(),
                    received.clone(),
                ));
            }
        });

        server
    }

    /// Start a server that follows the protocol without surprises.
    pub async fn well_behaved() -> Self {
        Self::start(well_behaved).await
    }

    pub fn url(&self) -> String {
        format!("ws://{}/graphql", self.addr)
    }

    pub fn handshakes(&self) -> Vec<Handshake> {
        self.handshakes.lock().clone()
    }

    pub fn received(&self) -> Vec<Value> {
        self.received.lock().clone()
    }

    pub fn received_types(&self) -> Vec<String> {
        self.received
            .lock()
            .iter()
            .filter_map(|frame| frame["type"].as_str().map(str::to_string))
            .collect()
    }

    /// The first received frame of the given type.
    pub fn frame(&self, kind: &str) -> Option<Value> {
        self.received
            .lock()
            .iter()
            .find(|frame| frame["type"] == kind)
            .cloned()
    }

    /// Wait until a frame of the given type has arrived.
    pub async fn wait_for(&self, kind: &str) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while self.frame(kind).is_none() {
            assert!(
                tokio::time::Instant::now() < deadline,
                "no {kind} frame received"
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

async fn serve(
    stream: TcpStream,
    script: Script,
    handshakes: Arc<Mutex<Vec<Handshake>>>,
    received: Arc<Mutex<Vec<Value>>>,
) {
    let callback = move |request: &Request, mut response: HandshakeResponse| {
        let protocol = request
            .headers()
            .get("sec-websocket-protocol")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        handshakes.lock().push(Handshake {
            uri: request.uri().to_string(),
            protocol,
        });
        response
            .headers_mut()
            .insert("sec-websocket-protocol", HeaderValue::from_static("graphql-ws"));
        Ok::<_, ErrorResponse>(response)
    };

    let Ok(ws) = tokio_tungstenite::accept_hdr_async(stream, callback).await else {
        return;
    };
    let (mut sink, mut source) = ws.split();

    while let Some(Ok(message)) = source.next().await {
        let Message::Text(text) = message else {
            continue;
        };
        let Ok(frame) = serde_json::from_str::<Value>(text.as_str()) else {
            continue;
        };
        received.lock().push(frame.clone());

        for reply in script(&frame) {
            match reply {
                Reply::Frame(value) => {
                    if sink.send(Message::Text(value.to_string().into())).await.is_err() {
                        return;
                    }
                }
                Reply::Sleep(duration) => tokio::time::sleep(duration).await,
                Reply::Close => {
                    let _ = sink.close().await;
                    return;
                }
            }
        }
    }
}

pub fn connection_ack(timeout_ms: i64) -> Value {
    json!({"type": "connection_ack", "payload": {"connectionTimeoutMs": timeout_ms}})
}

pub fn start_ack(frame: &Value) -> Value {
    json!({"type": "start_ack", "id": frame["id"]})
}

pub fn complete(frame: &Value) -> Value {
    json!({"type": "complete", "id": frame["id"]})
}

/// Ack `connection_init` with a 300s timeout, ack `start`, complete `stop`.
pub fn well_behaved(frame: &Value) -> Vec<Reply> {
    match frame["type"].as_str() {
        Some("connection_init") => vec![Reply::Frame(connection_ack(300_000))],
        Some("start") => vec![Reply::Frame(start_ack(frame))],
        Some("stop") => vec![Reply::Frame(complete(frame))],
        _ => vec![],
    }
}

/// Callback outputs collected by a test.
pub struct Events {
    pub responses: UnboundedReceiver<Response>,
    pub lost: UnboundedReceiver<Error>,
}

impl Events {
    pub async fn next_response(&mut self) -> Response {
        tokio::time::timeout(Duration::from_secs(5), self.responses.recv())
            .await
            .expect("response within 5s")
            .expect("callback alive")
    }

    pub async fn next_lost(&mut self, within: Duration) -> Option<Error> {
        tokio::time::timeout(within, self.lost.recv())
            .await
            .ok()
            .flatten()
    }
}

/// Receive and connection-lost callbacks feeding an [`Events`].
pub fn callbacks() -> (
    impl Fn(Response) + Send + Sync + 'static,
    impl Fn(Error) + Send + Sync + 'static,
    Events,
) {
    let (response_tx, responses) = unbounded_channel();
    let (lost_tx, lost) = unbounded_channel();
    (
        move |response: Response| {
            let _ = response_tx.send(response);
        },
        move |err: Error| {
            let _ = lost_tx.send(err);
        },
        Events { responses, lost },
    )
}

/// An address nothing listens on.
pub async fn unused_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
