//! GraphQL-over-HTTP client implementation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use http::header::{CONTENT_TYPE, HeaderName, HeaderValue};
use http::{HeaderMap, StatusCode};
use serde_json::Value;

use crate::backoff::BackoffConfig;
use crate::error::{Error, Result};
use crate::handle::RequestHandle;
use crate::request::PostRequest;
use crate::response::Response;

/// Builder for creating a GraphQL client.
pub struct ClientBuilder {
    endpoint: String,
    default_headers: HashMap<String, String>,
    proxy: Option<String>,
    timeout: Duration,
    max_elapsed_time: Duration,
    backoff: BackoffConfig,
}

impl ClientBuilder {
    /// Create a new builder with the specified GraphQL endpoint URL.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            default_headers: HashMap::new(),
            proxy: None,
            timeout: Duration::from_secs(30),
            max_elapsed_time: Duration::from_secs(20),
            backoff: BackoffConfig::default(),
        }
    }

    /// Send the given API key in the `X-Api-Key` header.
    pub fn api_key(self, api_key: impl Into<String>) -> Self {
        self.header("X-Api-Key", api_key)
    }

    /// Send the given credential verbatim in the `Authorization` header.
    pub fn credential(self, credential: impl Into<String>) -> Self {
        self.header("Authorization", credential)
    }

    /// Add a default header to all requests.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.insert(name.into(), value.into());
        self
    }

    /// Route all requests through the given proxy URL.
    pub fn proxy(mut self, proxy_url: impl Into<String>) -> Self {
        self.proxy = Some(proxy_url.into());
        self
    }

    /// Bound a whole call, retries included.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Stop retrying once this much time has passed since the first attempt.
    pub fn max_elapsed_time(mut self, max_elapsed_time: Duration) -> Self {
        self.max_elapsed_time = max_elapsed_time;
        self
    }

    /// Set the delays used between retried attempts.
    pub fn backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    /// Build the GraphQL client.
    pub fn build(self) -> Result<Client> {
        let mut builder = reqwest::Client::builder();
        if let Some(ref proxy_url) = self.proxy {
            let proxy =
                reqwest::Proxy::all(proxy_url).map_err(|e| Error::Proxy(e.to_string()))?;
            builder = builder.proxy(proxy);
        }
        let http = builder.build()?;

        let mut default_headers = HeaderMap::new();
        for (name, value) in &self.default_headers {
            default_headers.insert(
                HeaderName::try_from(name.as_str())?,
                HeaderValue::try_from(value.as_str())?,
            );
        }

        Ok(Client {
            inner: Arc::new(ClientInner {
                http,
                endpoint: self.endpoint,
                default_headers,
                timeout: self.timeout,
                max_elapsed_time: self.max_elapsed_time,
                backoff: self.backoff,
            }),
        })
    }
}

struct ClientInner {
    http: reqwest::Client,
    endpoint: String,
    default_headers: HeaderMap,
    timeout: Duration,
    max_elapsed_time: Duration,
    backoff: BackoffConfig,
}

/// A GraphQL client that POSTs requests to a single endpoint.
///
/// Responses with status 500 or 503 are retried with exponential backoff
/// until `max_elapsed_time` runs out. Any other non-200 status is returned as
/// a [`Response`] carrying the status code and its canonical reason in
/// `errors`; only transport failures become an [`Error`].
///
/// # Example
///
/// ```ignore
/// use appsync_graphql::{Client, PostRequest};
///
/// let client = Client::builder("https://example.com/graphql")
///     .api_key("da2-xxxx")
///     .build()?;
///
/// let request = PostRequest::new("query { echo(message: \"hi\") }");
/// let response = client.post(&HeaderMap::new(), &request).await?;
/// ```
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Client {
    /// Create a new builder for configuring a GraphQL client.
    pub fn builder(endpoint: impl Into<String>) -> ClientBuilder {
        ClientBuilder::new(endpoint)
    }

    /// Get the endpoint URL.
    pub fn endpoint(&self) -> &str {
        &self.inner.endpoint
    }

    /// Get the overall call timeout.
    pub fn timeout(&self) -> Duration {
        self.inner.timeout
    }

    /// Get the retry budget.
    pub fn max_elapsed_time(&self) -> Duration {
        self.inner.max_elapsed_time
    }

    /// Get the headers sent with every request.
    pub fn default_headers(&self) -> &HeaderMap {
        &self.inner.default_headers
    }

    /// POST a request and wait for the response.
    ///
    /// `header` is applied after the client's default headers and wins on
    /// conflicts.
    pub async fn post(&self, header: &HeaderMap, request: &PostRequest) -> Result<Response> {
        let body = serde_json::to_vec(request)?;
        self.execute(header.clone(), body).await
    }

    /// POST a request in the background and hand the outcome to `callback`.
    ///
    /// The callback runs exactly once: with the response, with the error, or
    /// with [`Error::Cancelled`] if the returned handle is cancelled first.
    /// Must be called from within a Tokio runtime.
    pub fn post_async<F>(
        &self,
        header: &HeaderMap,
        request: &PostRequest,
        callback: F,
    ) -> Result<RequestHandle>
    where
        F: FnOnce(Result<Response>) + Send + 'static,
    {
        let body = serde_json::to_vec(request)?;
        let (handle, cancel_rx) = RequestHandle::new();
        let task_handle = handle.clone();
        let client = self.clone();
        let header = header.clone();

        tokio::spawn(async move {
            tokio::select! {
                result = client.execute(header, body) => {
                    task_handle.complete();
                    callback(result);
                }
                Ok(()) = cancel_rx => {
                    tracing::debug!(
                        target: "appsync_graphql::client",
                        request = ?task_handle.id,
                        "request cancelled"
                    );
                    callback(Err(Error::Cancelled));
                }
            }
        });

        Ok(handle)
    }

    async fn execute(&self, header: HeaderMap, body: Vec<u8>) -> Result<Response> {
        match tokio::time::timeout(self.inner.timeout, self.send_with_retry(&header, &body)).await
        {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    target: "appsync_graphql::client",
                    endpoint = %self.inner.endpoint,
                    timeout = ?self.inner.timeout,
                    "request timed out"
                );
                Err(Error::Timeout)
            }
        }
    }

    async fn send_with_retry(&self, header: &HeaderMap, body: &[u8]) -> Result<Response> {
        let started = Instant::now();
        let mut attempt = 0;

        loop {
            let response = self
                .inner
                .http
                .post(&self.inner.endpoint)
                .header(CONTENT_TYPE, "application/json")
                .headers(self.inner.default_headers.clone())
                .headers(header.clone())
                .body(body.to_vec())
                .send()
                .await
                .inspect_err(|e| {
                    tracing::warn!(target: "appsync_graphql::client", error = %e, "POST failed");
                })?;

            let status = response.status();
            if status == StatusCode::OK {
                let bytes = response.bytes().await?;
                let mut parsed: Response = serde_json::from_slice(&bytes)?;
                parsed.status_code = Some(status.as_u16());
                return Ok(parsed);
            }

            if Self::is_retryable(status) && self.inner.backoff.allows_retry(attempt) {
                let delay = self.inner.backoff.delay_for_attempt(attempt);
                if started.elapsed() + delay <= self.inner.max_elapsed_time {
                    tracing::warn!(
                        target: "appsync_graphql::client",
                        status = status.as_u16(),
                        attempt,
                        ?delay,
                        "retrying GraphQL POST"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                    continue;
                }
            }

            return Ok(Self::status_response(status));
        }
    }

    fn is_retryable(status: StatusCode) -> bool {
        status == StatusCode::INTERNAL_SERVER_ERROR || status == StatusCode::SERVICE_UNAVAILABLE
    }

    fn status_response(status: StatusCode) -> Response {
        let reason = status.canonical_reason().unwrap_or_default();
        Response {
            status_code: Some(status.as_u16()),
            errors: Some(vec![Value::String(reason.to_string())]),
            ..Default::default()
        }
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("endpoint", &self.inner.endpoint)
            .field("timeout", &self.inner.timeout)
            .field("max_elapsed_time", &self.inner.max_elapsed_time)
            .finish()
    }
}
