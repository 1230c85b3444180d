//! Broker capability consumed by the bus client.
//!
//! # Responsibilities
//! - Declare exclusive, auto-delete reply queues
//! - Publish envelopes with a routing key and a `reply_to` address
//! - Acknowledge and delete queues
//!
//! # Design Decisions
//! - Object safe: the client holds an `Arc<dyn Transport>`
//! - `delete_queue` is synchronous so it can run from `Drop`
//! - One shared transport multiplexes every in-flight request

use futures_util::future::BoxFuture;
use tokio::sync::mpsc;

/// A message handed to the broker.
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    /// Bus-level address of the target worker.
    pub routing_key: String,
    /// Queue the reply must be sent to, if any.
    pub reply_to: Option<String>,
    /// Serialized envelope.
    pub body: Vec<u8>,
}

/// A message delivered from a queue.
#[derive(Debug, Clone)]
pub struct Delivery {
    /// Per-queue delivery tag used for acknowledgement.
    pub delivery_tag: u64,
    /// Queue the message was delivered on.
    pub queue: String,
    /// Routing key the message was published with.
    pub routing_key: String,
    pub reply_to: Option<String>,
    pub body: Vec<u8>,
}

/// Receiving end of a declared queue.
pub type Consumer = mpsc::UnboundedReceiver<Delivery>;

/// Failure reported by a transport implementation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("broker unavailable")]
    Unavailable,
    #[error("queue {0} already exists")]
    QueueExists(String),
    #[error("{0}")]
    Other(String),
}

/// Message bus as a provided capability.
pub trait Transport: Send + Sync + 'static {
    /// Declare an exclusive, auto-delete, non-durable queue and start consuming it.
    fn declare_reply_queue<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<Consumer, TransportError>>;

    /// Publish a message. At-most-once; no retry.
    fn publish(&self, message: OutboundMessage) -> BoxFuture<'_, Result<(), TransportError>>;

    /// Acknowledge a delivery.
    fn ack(&self, queue: &str, delivery_tag: u64);

    /// Remove a queue. Idempotent.
    fn delete_queue(&self, name: &str);
}
