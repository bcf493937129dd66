//! GraphQL response types.

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::error::{Error, Result};

/// A generic GraphQL response body.
///
/// `data`, the error entries and `extensions` are kept as raw JSON: the
/// transports do not interpret them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// HTTP status code, when the response came from the HTTP transport.
    #[serde(rename = "statusCode", default)]
    pub status_code: Option<u16>,

    /// The data returned by the operation.
    #[serde(default)]
    pub data: Option<Value>,

    /// Errors that occurred during execution.
    #[serde(default)]
    pub errors: Option<Vec<Value>>,

    /// Additional response metadata.
    #[serde(default)]
    pub extensions: Option<Value>,
}

impl Response {
    /// Check if the response contains errors.
    pub fn has_errors(&self) -> bool {
        self.errors.as_ref().is_some_and(|errors| !errors.is_empty())
    }

    /// Decode the single field nested under `data` into `T`.
    ///
    /// GraphQL nests the operation result one level under the field name,
    /// so `{"echo": {"value": "hi"}}` decodes the `{"value": "hi"}` part.
    ///
    /// # Example
    ///
    /// ```ignore
    /// #[derive(Deserialize)]
    /// struct Echo { value: String }
    ///
    /// let echo: Echo = response.data_as()?;
    /// ```
    pub fn data_as<T: DeserializeOwned>(&self) -> Result<T> {
        let Some(Value::Object(map)) = &self.data else {
            return Err(Error::InvalidData("data is invalid".into()));
        };
        if map.len() != 1 {
            return Err(Error::InvalidData(format!(
                "expected a single field in data, found {}",
                map.len()
            )));
        }
        let value = map
            .values()
            .next()
            .cloned()
            .ok_or_else(|| Error::InvalidData("data is invalid".into()))?;
        Ok(serde_json::from_value(value)?)
    }
}
