//! JSON-RPC envelopes carried over the bus.
//!
//! # Responsibilities
//! - Define the request envelope published to backend workers
//! - Define the response envelope consumed from reply channels
//! - Validate the exactly-one-of `result` / `error` rule
//!
//! # Design Decisions
//! - `params` stays a raw `serde_json::Value` (object or array)
//! - A `"result": null` is treated the same as a missing result

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::bus::error::ProtocolError;

/// Protocol tag stamped on every envelope.
pub const JSONRPC_VERSION: &str = "2.0";

/// RPC parameters: a JSON object or an ordered array.
pub type Params = Value;

/// Request envelope published to a routing key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    /// Protocol tag, always [`JSONRPC_VERSION`].
    pub jsonrpc: String,
    /// Correlation identifier. Assigned once when the request is built.
    pub id: String,
    /// Remote operation name.
    pub method: String,
    /// Operation parameters.
    #[serde(default = "empty_params")]
    pub params: Params,
}

fn empty_params() -> Params {
    Value::Object(Default::default())
}

impl RpcRequest {
    /// Build a request envelope for an already minted correlation id.
    pub fn new(id: impl Into<String>, method: impl Into<String>, params: Params) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: id.into(),
            method: method.into(),
            params,
        }
    }

    /// Look up a named parameter when `params` is an object.
    pub fn param(&self, key: &str) -> Option<&Value> {
        self.params.as_object().and_then(|map| map.get(key))
    }

    /// Look up a named string parameter.
    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.param(key).and_then(Value::as_str)
    }
}

/// Error object carried by a failed response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    /// Numeric error code, interpreted through the error code table.
    pub code: i64,
    /// Human readable message.
    #[serde(default)]
    pub message: String,
    /// Optional structured details.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(code: i64, message: impl Into<String>, data: Value) -> Self {
        Self {
            code,
            message: message.into(),
            data: Some(data),
        }
    }
}

impl std::fmt::Display for RpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// Response envelope received on a reply channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    #[serde(default = "default_version")]
    pub jsonrpc: String,
    /// Must equal the id of the request being answered.
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

fn default_version() -> String {
    JSONRPC_VERSION.to_string()
}

/// A validated response: either a result or an application error.
#[derive(Debug, Clone, PartialEq)]
pub enum RpcOutcome {
    Result(Value),
    Error(RpcError),
}

impl RpcResponse {
    /// Create a success response.
    pub fn success(id: impl Into<String>, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: id.into(),
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response.
    pub fn failure(id: impl Into<String>, error: RpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: id.into(),
            result: None,
            error: Some(error),
        }
    }

    /// Check the exactly-one-of rule without consuming the envelope.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        match (&self.result, &self.error) {
            (Some(Value::Null), None) | (None, None) => Err(ProtocolError::Empty {
                id: self.id.clone(),
            }),
            (Some(_), Some(_)) => Err(ProtocolError::Ambiguous {
                id: self.id.clone(),
            }),
            _ => Ok(()),
        }
    }

    /// Consume the envelope into its validated outcome.
    pub fn into_outcome(self) -> Result<RpcOutcome, ProtocolError> {
        self.validate()?;
        match (self.result, self.error) {
            (_, Some(error)) => Ok(RpcOutcome::Error(error)),
            (Some(result), None) => Ok(RpcOutcome::Result(result)),
            (None, None) => Err(ProtocolError::Empty { id: self.id }),
        }
    }
}
