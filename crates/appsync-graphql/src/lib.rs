//! Generic GraphQL-over-HTTP client.
//!
//! This crate provides the plain request/response side of the AppSync client:
//!
//! - **Envelope**: [`PostRequest`] and [`Response`], with operation-type
//!   classification and [`Response::data_as`] for the single nested result
//! - **Transport**: [`Client`], a retried JSON POST with an awaitable
//!   [`Client::post`] and a callback-based [`Client::post_async`] returning a
//!   cancellable [`RequestHandle`]
//!
//! # Example
//!
//! ```ignore
//! use appsync_graphql::{Client, PostRequest};
//! use http::HeaderMap;
//!
//! let client = Client::builder("https://example.com/graphql")
//!     .api_key("da2-xxxx")
//!     .timeout(Duration::from_secs(10))
//!     .build()?;
//!
//! let request = PostRequest::new("mutation Echo { echo(message: \"hi\") { value } }");
//! let response = client.post(&HeaderMap::new(), &request).await?;
//! let echo: Echo = response.data_as()?;
//!
//! // Fire and forget, with the option to cancel
//! let handle = client.post_async(&HeaderMap::new(), &request, |result| {
//!     println!("{:?}", result);
//! })?;
//! handle.cancel();
//! ```

mod backoff;
mod client;
mod error;
mod handle;
mod request;
mod response;

pub use backoff::BackoffConfig;
pub use client::{Client, ClientBuilder};
pub use error::{Error, Result};
pub use handle::{RequestHandle, RequestId};
pub use request::{OperationType, PostRequest};
pub use response::Response;
