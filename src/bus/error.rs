//! Bus-level error definitions.

use std::time::Duration;
use thiserror::Error;

/// Violations of the request/reply envelope contract.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Reply carried neither `result` nor `error`.
    #[error("response {id} carries neither result nor error")]
    Empty { id: String },

    /// Reply carried both `result` and `error`.
    #[error("response {id} carries both result and error")]
    Ambiguous { id: String },

    /// Reply arrived on a channel that belongs to another request.
    #[error("correlation mismatch: expected {expected}, got {actual}")]
    CorrelationMismatch { expected: String, actual: String },

    /// Reply body was not a decodable envelope.
    #[error("undecodable response: {0}")]
    Malformed(String),
}

/// Errors raised by the bus client and the correlation channel manager.
#[derive(Debug, Error)]
pub enum BusError {
    /// Reply channel could not be declared.
    #[error("transport unavailable: cannot open reply channel {channel}: {reason}")]
    ChannelOpen { channel: String, reason: String },

    /// Request could not be handed to the broker.
    #[error("dispatch failed for routing key {routing_key}: {reason}")]
    Publish { routing_key: String, reason: String },

    /// No reply arrived within the per-call budget.
    #[error("no reply on {routing_key} within {timeout:?}")]
    Timeout {
        routing_key: String,
        timeout: Duration,
    },

    /// Reply channel was torn down before a reply arrived.
    #[error("reply channel {0} closed before a reply arrived")]
    ChannelClosed(String),

    /// The reply broke the envelope contract.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Request envelope could not be encoded.
    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

impl BusError {
    /// True for the Bad-Gateway class (timeouts and unreachable broker).
    pub fn is_bad_gateway(&self) -> bool {
        matches!(
            self,
            BusError::Timeout { .. }
                | BusError::ChannelOpen { .. }
                | BusError::Publish { .. }
                | BusError::ChannelClosed(_)
        )
    }
}

/// Result type for bus operations.
pub type BusResult<T> = Result<T, BusError>;
