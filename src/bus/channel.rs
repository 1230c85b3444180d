//! Correlation ids and per-request reply channels.
//!
//! # Responsibilities
//! - Mint collision-free correlation ids (UUID v4)
//! - Declare a reply queue named after the id
//! - Guarantee teardown of the reply queue on every exit path
//!
//! # Design Decisions
//! - `ReplyChannel` is a RAII guard: `Drop` deletes the queue
//! - Closing is idempotent; auto-delete on the broker covers crashes
//! - Open failures are never retried here

use std::fmt;
use std::sync::Arc;

use uuid::Uuid;

use crate::bus::error::{BusError, BusResult};
use crate::bus::transport::{Consumer, Delivery, Transport};
use crate::observability::metrics;

/// Prefix used for reply queue names.
pub const REPLY_QUEUE_PREFIX: &str = "response-";

/// Unique token linking a bus request to its single reply.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Generate a fresh random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name of the reply queue owned by this id.
    pub fn reply_queue_name(&self) -> String {
        format!("{}{}", REPLY_QUEUE_PREFIX, self.0)
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Creates and destroys exclusive reply channels.
#[derive(Clone)]
pub struct ReplyChannelManager {
    transport: Arc<dyn Transport>,
}

impl ReplyChannelManager {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Mint a new correlation id.
    pub fn new_id(&self) -> CorrelationId {
        CorrelationId::new()
    }

    /// Declare the reply channel for `id`.
    pub async fn open_reply_channel(&self, id: &CorrelationId) -> BusResult<ReplyChannel> {
        let name = id.reply_queue_name();
        let consumer = self
            .transport
            .declare_reply_queue(&name)
            .await
            .map_err(|e| BusError::ChannelOpen {
                channel: name.clone(),
                reason: e.to_string(),
            })?;

        metrics::reply_channel_opened();
        tracing::debug!(channel = %name, "Reply channel opened");

        Ok(ReplyChannel {
            id: id.clone(),
            name,
            consumer,
            transport: self.transport.clone(),
            closed: false,
        })
    }

    /// Tear down a reply channel. Safe to call more than once.
    pub fn close_reply_channel(&self, channel: &mut ReplyChannel) {
        channel.close();
    }
}

/// An exclusive reply queue owned by exactly one in-flight request.
///
/// Dropping the guard deletes the queue, so a panic, an early return or a
/// cancelled future cannot leak it.
pub struct ReplyChannel {
    id: CorrelationId,
    name: String,
    consumer: Consumer,
    transport: Arc<dyn Transport>,
    closed: bool,
}

impl ReplyChannel {
    pub fn id(&self) -> &CorrelationId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Wait for the next delivery. `None` once the channel is gone.
    pub async fn recv(&mut self) -> Option<Delivery> {
        if self.closed {
            return None;
        }
        self.consumer.recv().await
    }

    /// Acknowledge a delivery received on this channel.
    pub fn ack(&self, delivery: &Delivery) {
        self.transport.ack(&self.name, delivery.delivery_tag);
    }

    /// Close the consumer and delete the queue.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.consumer.close();
        self.transport.delete_queue(&self.name);
        metrics::reply_channel_closed();
        tracing::debug!(channel = %self.name, "Reply channel closed");
    }
}

impl Drop for ReplyChannel {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for ReplyChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplyChannel")
            .field("name", &self.name)
            .field("closed", &self.closed)
            .finish()
    }
}
