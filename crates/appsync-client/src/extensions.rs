//! Subscription grants carried in response extensions.
//!
//! A subscription request answered over HTTP returns no data; instead its
//! `extensions.subscription` block names the broker connections and topics
//! the caller may subscribe to.

use std::collections::HashMap;

use appsync_graphql::Response;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// Response extensions of a subscription request.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Extensions {
    #[serde(default)]
    pub subscription: SubscriptionExtension,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionExtension {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub mqtt_connections: Vec<MqttConnection>,
    #[serde(default)]
    pub new_subscriptions: HashMap<String, Subscription>,
}

/// A broker endpoint and the topics it serves.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MqttConnection {
    pub url: String,
    #[serde(default)]
    pub topics: Vec<String>,
    pub client: String,
}

/// A newly granted subscription topic.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub topic: String,
    #[serde(default)]
    pub expire_time: Value,
}

/// Everything needed to connect a broker client for a single subscription.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MqttGrant {
    pub client_id: String,
    pub url: String,
    pub topic: String,
}

impl Extensions {
    /// Decode the extensions of a response.
    pub fn from_response(response: &Response) -> Result<Self> {
        match &response.extensions {
            Some(value @ Value::Object(_)) => Ok(Self::deserialize(value)?),
            _ => Err(Error::GraphQL(appsync_graphql::Error::InvalidData(
                "extensions is invalid".into(),
            ))),
        }
    }

    /// Select the broker connection for the single new subscription.
    ///
    /// Returns `None` when there is no connection, when the response did not
    /// grant exactly one new subscription, or when no connection carries its
    /// topic.
    pub fn mqtt_grant(&self) -> Option<MqttGrant> {
        let subscription = &self.subscription;
        if subscription.mqtt_connections.is_empty() || subscription.new_subscriptions.len() != 1 {
            return None;
        }

        let topic = &subscription.new_subscriptions.values().next()?.topic;
        subscription
            .mqtt_connections
            .iter()
            .find(|connection| connection.topics.iter().any(|t| t == topic))
            .map(|connection| MqttGrant {
                client_id: connection.client.clone(),
                url: connection.url.clone(),
                topic: topic.clone(),
            })
    }
}
