//! The public subscription surface over the realtime engine.

use std::collections::HashMap;
use std::sync::Arc;

use appsync_graphql::{PostRequest, Response};
use url::Url;

use super::config::RealtimeConfig;
use super::operation::RealtimeOperation;
use crate::error::{Error, Result};
use crate::sigv4::{Signer, host_header};

const HANDSHAKE_PAYLOAD: &[u8] = b"{}";

/// Reduce a URL to its `host[:port]`; anything that is not an absolute URL
/// is taken as a host already.
fn sanitize_host(host: &str) -> String {
    match Url::parse(host) {
        Ok(url) if url.has_host() => host_header(&url),
        _ => host.to_string(),
    }
}

/// Builder for a [`RealtimeSubscriber`].
pub struct RealtimeSubscriberBuilder {
    endpoint: String,
    request: PostRequest,
    header: HashMap<String, String>,
    signer: Option<Arc<dyn Signer>>,
    config: RealtimeConfig,
}

impl RealtimeSubscriberBuilder {
    fn new(endpoint: impl Into<String>, request: PostRequest) -> Self {
        Self {
            endpoint: endpoint.into(),
            request,
            header: HashMap::new(),
            signer: None,
            config: RealtimeConfig::default(),
        }
    }

    /// Authorize with an API key for the GraphQL endpoint `host`.
    pub fn api_key(mut self, host: &str, api_key: impl Into<String>) -> Self {
        self.header.insert("host".into(), sanitize_host(host));
        self.header.insert("x-api-key".into(), api_key.into());
        self
    }

    /// Authorize with an OIDC or Cognito token for the GraphQL endpoint `host`.
    /// A leading `Bearer ` is stripped.
    pub fn oidc(mut self, host: &str, jwt: &str) -> Self {
        let token = jwt.strip_prefix("Bearer ").unwrap_or(jwt);
        self.header.insert("host".into(), sanitize_host(host));
        self.header.insert("Authorization".into(), token.to_string());
        self
    }

    /// Authorize by signing every payload. Takes precedence over static headers.
    pub fn iam(mut self, signer: Arc<dyn Signer>) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Set the engine configuration.
    pub fn config(mut self, config: RealtimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the subscriber.
    ///
    /// `on_receive` runs on the read task for every `data` and `error` frame;
    /// `on_connection_lost` runs at most once per connection.
    pub fn build<R, L>(self, on_receive: R, on_connection_lost: L) -> RealtimeSubscriber
    where
        R: Fn(Response) + Send + Sync + 'static,
        L: Fn(Error) + Send + Sync + 'static,
    {
        RealtimeSubscriber {
            endpoint: self.endpoint,
            request: self.request,
            header: self.header,
            signer: self.signer,
            op: RealtimeOperation::new(
                self.config,
                Arc::new(on_receive),
                Arc::new(on_connection_lost),
            ),
        }
    }
}

/// A subscription over the AppSync realtime endpoint.
///
/// # Example
///
/// ```ignore
/// use appsync_client::realtime::RealtimeSubscriber;
/// use appsync_graphql::PostRequest;
///
/// let request = PostRequest::new("subscription { onEcho { value } }");
/// let subscriber = RealtimeSubscriber::builder(realtime_endpoint, request)
///     .api_key(graphql_endpoint, api_key)
///     .build(
///         |response| println!("received: {:?}", response.data),
///         |err| eprintln!("connection lost: {err}"),
///     );
///
/// subscriber.start().await?;
/// // ...
/// subscriber.stop().await;
/// ```
pub struct RealtimeSubscriber {
    endpoint: String,
    request: PostRequest,
    header: HashMap<String, String>,
    signer: Option<Arc<dyn Signer>>,
    op: RealtimeOperation,
}

impl RealtimeSubscriber {
    /// Create a builder for a subscription to `request` on the realtime `endpoint`.
    pub fn builder(endpoint: impl Into<String>, request: PostRequest) -> RealtimeSubscriberBuilder {
        RealtimeSubscriberBuilder::new(endpoint, request)
    }

    /// Create an unauthenticated subscriber with the default configuration.
    pub fn new<R, L>(
        endpoint: impl Into<String>,
        request: PostRequest,
        on_receive: R,
        on_connection_lost: L,
    ) -> Self
    where
        R: Fn(Response) + Send + Sync + 'static,
        L: Fn(Error) + Send + Sync + 'static,
    {
        Self::builder(endpoint, request).build(on_receive, on_connection_lost)
    }

    /// Connect, initialize the connection and register the subscription.
    ///
    /// Returns the first error. A partially opened connection is left open;
    /// call [`stop`](Self::stop) or [`abort`](Self::abort) to release it.
    pub async fn start(&self) -> Result<()> {
        let handshake = self.authorization(HANDSHAKE_PAYLOAD)?;
        let handshake = serde_json::to_vec(&handshake)?;
        self.op
            .connect(&self.endpoint, &handshake, HANDSHAKE_PAYLOAD)
            .await?;
        self.op.connection_init().await?;

        let request = serde_json::to_string(&self.request)?;
        let authorization = self.authorization(request.as_bytes())?;
        self.op.start(request, authorization).await
    }

    /// Unregister the subscription and disconnect. Never fails.
    pub async fn stop(&self) {
        self.op.stop().await;
        self.op.disconnect().await;
    }

    /// Tear down forcibly, unblocking a `start` in progress.
    pub async fn abort(&self) {
        self.op.abort().await;
    }

    /// The underlying engine.
    pub fn operation(&self) -> &RealtimeOperation {
        &self.op
    }

    fn authorization(&self, payload: &[u8]) -> Result<HashMap<String, String>> {
        match &self.signer {
            Some(signer) => signer.sign_ws(payload).inspect_err(|e| {
                tracing::warn!(target: "appsync_client::realtime", error = %e, "failed to sign payload");
            }),
            None => Ok(self.header.clone()),
        }
    }
}

impl std::fmt::Debug for RealtimeSubscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeSubscriber")
            .field("endpoint", &self.endpoint)
            .field("signed", &self.signer.is_some())
            .field("op", &self.op)
            .finish_non_exhaustive()
    }
}
