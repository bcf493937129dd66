//! The AppSync client: subscriber id and request signing on top of a
//! [`GraphQLTransport`].

use std::sync::Arc;

use appsync_graphql::{PostRequest, RequestHandle, Response};
use http::header::{HeaderMap, HeaderName, HeaderValue};

use crate::error::{Error, Result};
use crate::sigv4::Signer;
use crate::transport::GraphQLTransport;

const SUBSCRIBER_ID: HeaderName = HeaderName::from_static("x-amz-subscriber-id");

/// AppSync GraphQL API client.
///
/// # Example
///
/// ```ignore
/// use appsync_client::Client;
/// use appsync_graphql::PostRequest;
///
/// let transport = appsync_graphql::Client::builder(endpoint).api_key(key).build()?;
/// let client = Client::new(transport).subscriber_id("device-1");
///
/// let response = client.post(&PostRequest::new("subscription { onEcho { value } }")).await?;
/// let grant = Extensions::from_response(&response)?.mqtt_grant();
/// ```
pub struct Client<T = appsync_graphql::Client> {
    transport: T,
    subscriber_id: Option<String>,
    signer: Option<Arc<dyn Signer>>,
}

impl<T: GraphQLTransport> Client<T> {
    /// Create a client over the given transport.
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            subscriber_id: None,
            signer: None,
        }
    }

    /// Send `x-amz-subscriber-id` with subscription requests.
    pub fn subscriber_id(mut self, subscriber_id: impl Into<String>) -> Self {
        self.subscriber_id = Some(subscriber_id.into()).filter(|id| !id.is_empty());
        self
    }

    /// Sign every request with the given signer.
    pub fn signer(mut self, signer: Arc<dyn Signer>) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Get the underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// POST a request and wait for the response.
    pub async fn post(&self, request: &PostRequest) -> Result<Response> {
        let header = self.request_headers(request)?;
        Ok(self.transport.post(&header, request).await?)
    }

    /// POST a request in the background; `callback` receives the outcome once.
    pub fn post_async<F>(&self, request: &PostRequest, callback: F) -> Result<RequestHandle>
    where
        F: FnOnce(Result<Response>) + Send + 'static,
    {
        let header = self.request_headers(request)?;
        let handle = self
            .transport
            .post_async(&header, request, move |result| {
                callback(result.map_err(Error::from))
            })?;
        Ok(handle)
    }

    fn request_headers(&self, request: &PostRequest) -> Result<HeaderMap> {
        let mut header = HeaderMap::new();
        if request.is_subscription()
            && let Some(subscriber_id) = &self.subscriber_id
        {
            header.insert(SUBSCRIBER_ID, HeaderValue::from_str(subscriber_id)?);
        }

        if let Some(signer) = &self.signer {
            let body = serde_json::to_vec(request)?;
            let signed = signer.sign_http(&body).inspect_err(|e| {
                tracing::warn!(target: "appsync_client::client", error = %e, "failed to sign request");
            })?;
            header.extend(signed);
        }
        Ok(header)
    }
}

impl<T> std::fmt::Debug for Client<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("subscriber_id", &self.subscriber_id)
            .field("signed", &self.signer.is_some())
            .finish_non_exhaustive()
    }
}
