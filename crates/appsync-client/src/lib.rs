//! AppSync GraphQL client.
//!
//! This crate layers AppSync specifics over [`appsync_graphql`]:
//!
//! - **Client**: [`Client`] adds the subscriber id header and SigV4 signing
//!   to any [`GraphQLTransport`]; [`Extensions`] decodes the subscription
//!   grant a subscription request returns
//! - **Signing**: [`Signer`] with [`SignerV1`] and [`SignerV2`]
//! - **Realtime**: [`realtime::RealtimeSubscriber`] delivers subscription
//!   events over the realtime WebSocket endpoint
//!
//! # Example
//!
//! ```ignore
//! use appsync_client::realtime::RealtimeSubscriber;
//! use appsync_client::{Credentials, SignerV1};
//! use appsync_graphql::PostRequest;
//!
//! let signer = SignerV1::new(Credentials::from_env()?, "us-east-1", graphql_endpoint)?;
//! let subscriber = RealtimeSubscriber::builder(realtime_endpoint, PostRequest::new(subscription))
//!     .iam(Arc::new(signer))
//!     .build(
//!         |response| println!("{:?}", response.data),
//!         |err| eprintln!("connection lost: {err}"),
//!     );
//!
//! subscriber.start().await?;
//! ```

mod client;
mod error;
mod extensions;
mod sigv4;
mod transport;

pub mod realtime;

pub use client::Client;
pub use error::{Error, Result};
pub use extensions::{Extensions, MqttConnection, MqttGrant, Subscription, SubscriptionExtension};
pub use sigv4::{Credentials, ProvideCredentials, Signer, SignerV1, SignerV2, sign_request};
pub use transport::GraphQLTransport;
