//! GraphQL request types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A GraphQL operation type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    /// A query operation (read-only).
    Query,
    /// A mutation operation (modifies data).
    Mutation,
    /// A subscription operation (real-time updates).
    Subscription,
}

impl OperationType {
    /// The leading keyword that introduces this operation in a document.
    pub fn keyword(self) -> &'static str {
        match self {
            Self::Query => "query",
            Self::Mutation => "mutation",
            Self::Subscription => "subscription",
        }
    }
}

/// A generic GraphQL POST request body.
///
/// Absent optional fields are sent as `null`, which is what the managed
/// backend expects for both the HTTP endpoint and the realtime `start` frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PostRequest {
    /// The GraphQL query string.
    pub query: String,

    /// Optional operation name (for documents with multiple operations).
    #[serde(rename = "operationName", default)]
    pub operation_name: Option<String>,

    /// Optional variables for the query.
    #[serde(default)]
    pub variables: Option<Value>,
}

impl PostRequest {
    /// Create a new request from a query string.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let request = PostRequest::new(r#"
    ///     subscription OnEcho {
    ///         subscribeToEcho { value }
    ///     }
    /// "#);
    /// assert!(request.is_subscription());
    /// ```
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            operation_name: None,
            variables: None,
        }
    }

    /// Set the operation name.
    pub fn operation_name(mut self, name: impl Into<String>) -> Self {
        self.operation_name = Some(name.into());
        self
    }

    /// Set the variables from a serializable value.
    ///
    /// Values that fail to serialize leave the variables unset.
    pub fn variables(mut self, variables: impl Serialize) -> Self {
        self.variables = serde_json::to_value(variables).ok();
        self
    }

    /// Classify the request by the leading keyword of its query text.
    ///
    /// Returns `None` for empty text and for anonymous or unknown documents.
    pub fn operation_type(&self) -> Option<OperationType> {
        let trimmed = self.query.trim();
        [
            OperationType::Query,
            OperationType::Mutation,
            OperationType::Subscription,
        ]
        .into_iter()
        .find(|op| trimmed.starts_with(op.keyword()))
    }

    /// Check if this request is a query.
    pub fn is_query(&self) -> bool {
        self.operation_type() == Some(OperationType::Query)
    }

    /// Check if this request is a mutation.
    pub fn is_mutation(&self) -> bool {
        self.operation_type() == Some(OperationType::Mutation)
    }

    /// Check if this request is a subscription.
    pub fn is_subscription(&self) -> bool {
        self.operation_type() == Some(OperationType::Subscription)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_request_is_nothing() {
        let request = PostRequest::default();
        assert!(!request.is_query());
        assert!(!request.is_mutation());
        assert!(!request.is_subscription());
        assert_eq!(request.operation_type(), None);
    }

    #[test]
    fn test_query_request() {
        let request = PostRequest::new("  query { x }");
        assert!(request.is_query());
        assert!(!request.is_mutation());
        assert!(!request.is_subscription());
    }

    #[test]
    fn test_mutation_request() {
        let request = PostRequest::new("mutation M");
        assert!(request.is_mutation());
        assert!(!request.is_query());
        assert!(!request.is_subscription());
    }

    #[test]
    fn test_subscription_request() {
        let request = PostRequest::new("\n\tsubscription() foo bar baz");
        assert!(request.is_subscription());
        assert!(!request.is_query());
        assert!(!request.is_mutation());
    }

    #[test]
    fn test_classification_is_case_sensitive() {
        assert_eq!(PostRequest::new("Query { x }").operation_type(), None);
        assert_eq!(PostRequest::new("{ users { id } }").operation_type(), None);
    }

    #[test]
    fn test_wire_shape() {
        let request = PostRequest::new("query Q { a }");
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            json!({"query": "query Q { a }", "operationName": null, "variables": null})
        );

        let request = request
            .operation_name("Q")
            .variables(json!({"id": "123"}));
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["operationName"], "Q");
        assert_eq!(value["variables"]["id"], "123");
    }
}
