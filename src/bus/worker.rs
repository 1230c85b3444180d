//! Backend-side responder.
//!
//! # Responsibilities
//! - Consume requests from a bound work queue
//! - Invoke a service for each request
//! - Publish the correlated response to the request's `reply_to`
//!
//! # Design Decisions
//! - Responses echo the request id; the worker never invents ids
//! - Each delivery is handled on its own task
//! - Undecodable requests are acked and dropped

use std::future::Future;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::broadcast;

use crate::bus::envelope::{RpcError, RpcRequest, RpcResponse};
use crate::bus::memory::MemoryBroker;
use crate::bus::transport::{Consumer, Delivery, OutboundMessage, Transport, TransportError};

/// Send a response to a reply queue through the default exchange.
pub async fn respond(
    transport: &dyn Transport,
    reply_to: &str,
    response: &RpcResponse,
) -> Result<(), TransportError> {
    let body = serde_json::to_vec(response).map_err(|e| TransportError::Other(e.to_string()))?;
    tracing::debug!(id = %response.id, reply_to = %reply_to, "Sending response");
    transport
        .publish(OutboundMessage {
            routing_key: reply_to.to_string(),
            reply_to: None,
            body,
        })
        .await
}

/// Consumes one work queue and answers every request on it.
pub struct Worker {
    transport: Arc<dyn Transport>,
    queue: String,
    consumer: Consumer,
}

impl Worker {
    pub fn new(transport: Arc<dyn Transport>, queue: impl Into<String>, consumer: Consumer) -> Self {
        Self {
            transport,
            queue: queue.into(),
            consumer,
        }
    }

    /// Declare `queue` on an in-process broker, bind it, and wrap it in a worker.
    pub fn bind(broker: &Arc<MemoryBroker>, queue: &str, patterns: &[&str]) -> Result<Self, TransportError> {
        let consumer = broker.declare_work_queue(queue, patterns)?;
        Ok(Self::new(broker.clone(), queue, consumer))
    }

    /// Serve requests until shutdown fires or the queue goes away.
    ///
    /// `service` receives the routing key the request was published with and
    /// the decoded request.
    pub async fn run<S, Fut>(mut self, service: S, mut shutdown: broadcast::Receiver<()>)
    where
        S: Fn(String, RpcRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, RpcError>> + Send + 'static,
    {
        let service = Arc::new(service);
        tracing::info!(queue = %self.queue, "Worker started");

        loop {
            tokio::select! {
                delivery = self.consumer.recv() => {
                    let Some(delivery) = delivery else {
                        tracing::info!(queue = %self.queue, "Work queue closed");
                        break;
                    };
                    let transport = self.transport.clone();
                    let service = service.clone();
                    tokio::spawn(async move {
                        handle_delivery(transport, delivery, service.as_ref()).await;
                    });
                }
                _ = shutdown.recv() => {
                    tracing::info!(queue = %self.queue, "Worker received shutdown signal");
                    break;
                }
            }
        }

        self.transport.delete_queue(&self.queue);
    }
}

async fn handle_delivery<S, Fut>(transport: Arc<dyn Transport>, delivery: Delivery, service: &S)
where
    S: Fn(String, RpcRequest) -> Fut,
    Fut: Future<Output = Result<Value, RpcError>>,
{
    let request: RpcRequest = match serde_json::from_slice(&delivery.body) {
        Ok(request) => request,
        Err(e) => {
            tracing::warn!(queue = %delivery.queue, error = %e, "Dropping undecodable request");
            transport.ack(&delivery.queue, delivery.delivery_tag);
            return;
        }
    };

    let id = request.id.clone();
    let response = match service(delivery.routing_key.clone(), request).await {
        Ok(result) => RpcResponse::success(id, result),
        Err(error) => RpcResponse::failure(id, error),
    };

    transport.ack(&delivery.queue, delivery.delivery_tag);

    match delivery.reply_to.as_deref() {
        Some(reply_to) => {
            if let Err(e) = respond(transport.as_ref(), reply_to, &response).await {
                tracing::error!(reply_to = %reply_to, error = %e, "Failed to send response");
            }
        }
        None => tracing::debug!(id = %response.id, "Request had no reply_to, response discarded"),
    }
}
