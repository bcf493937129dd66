//! The plain request/response transport consumed by [`Client`](crate::Client).

use std::future::Future;

use appsync_graphql::{PostRequest, RequestHandle, Response};
use http::HeaderMap;

/// A GraphQL-over-HTTP transport.
///
/// Implemented for [`appsync_graphql::Client`]; other implementations let the
/// outer client run against a different HTTP stack or a test double.
pub trait GraphQLTransport: Send + Sync {
    /// POST a request and wait for the response.
    fn post(
        &self,
        header: &HeaderMap,
        request: &PostRequest,
    ) -> impl Future<Output = appsync_graphql::Result<Response>> + Send;

    /// POST a request in the background; `callback` receives the outcome once.
    fn post_async<F>(
        &self,
        header: &HeaderMap,
        request: &PostRequest,
        callback: F,
    ) -> appsync_graphql::Result<RequestHandle>
    where
        F: FnOnce(appsync_graphql::Result<Response>) + Send + 'static;
}

impl GraphQLTransport for appsync_graphql::Client {
    fn post(
        &self,
        header: &HeaderMap,
        request: &PostRequest,
    ) -> impl Future<Output = appsync_graphql::Result<Response>> + Send {
        appsync_graphql::Client::post(self, header, request)
    }

    fn post_async<F>(
        &self,
        header: &HeaderMap,
        request: &PostRequest,
        callback: F,
    ) -> appsync_graphql::Result<RequestHandle>
    where
        F: FnOnce(appsync_graphql::Result<Response>) + Send + 'static,
    {
        appsync_graphql::Client::post_async(self, header, request, callback)
    }
}
