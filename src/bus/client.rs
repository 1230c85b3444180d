//! Blocking request/reply over the bus.
//!
//! # Responsibilities
//! - Publish a request envelope tagged with a reply channel
//! - Wait for the single correlated reply, bounded by a timeout
//! - Validate the reply and hand back its result or error object
//!
//! # Design Decisions
//! - One correlation id and one reply channel per call, never reused
//! - No retries: a timeout or publish failure surfaces immediately
//! - The reply channel is torn down before `request` returns, on every path

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::timeout;

use crate::bus::channel::{CorrelationId, ReplyChannelManager};
use crate::bus::envelope::{Params, RpcOutcome, RpcRequest, RpcResponse};
use crate::bus::error::{BusError, BusResult, ProtocolError};
use crate::bus::transport::{OutboundMessage, Transport};
use crate::observability::metrics;

/// Default per-call reply budget.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Client side of the bus. Cheap to clone; all clones share one transport.
#[derive(Clone)]
pub struct BusClient {
    transport: Arc<dyn Transport>,
    channels: ReplyChannelManager,
    default_timeout: Duration,
}

impl BusClient {
    /// Create a client over a shared transport.
    pub fn new(transport: Arc<dyn Transport>, default_timeout: Duration) -> Self {
        Self {
            channels: ReplyChannelManager::new(transport.clone()),
            transport,
            default_timeout,
        }
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// A client sharing this transport with a different default budget.
    pub fn with_timeout(&self, default_timeout: Duration) -> Self {
        Self {
            transport: self.transport.clone(),
            channels: self.channels.clone(),
            default_timeout,
        }
    }

    /// Send a request using the default timeout.
    pub async fn request(&self, routing_key: &str, method: &str, params: Params) -> BusResult<RpcOutcome> {
        self.request_with_timeout(routing_key, method, params, self.default_timeout)
            .await
    }

    /// Send a request and wait up to `budget` for its reply.
    ///
    /// An application error in the reply is returned as
    /// `Ok(RpcOutcome::Error(..))`, not as an `Err`.
    pub async fn request_with_timeout(
        &self,
        routing_key: &str,
        method: &str,
        params: Params,
        budget: Duration,
    ) -> BusResult<RpcOutcome> {
        let start = Instant::now();
        let result = self.round_trip(routing_key, method, params, budget).await;
        metrics::record_bus_request(routing_key, outcome_label(&result), start);
        result
    }

    async fn round_trip(
        &self,
        routing_key: &str,
        method: &str,
        params: Params,
        budget: Duration,
    ) -> BusResult<RpcOutcome> {
        let id = self.channels.new_id();
        let mut channel = self.channels.open_reply_channel(&id).await?;

        let request = RpcRequest::new(id.as_str(), method, params);
        let body = serde_json::to_vec(&request)?;

        tracing::debug!(
            correlation_id = %id,
            routing_key = %routing_key,
            method = %method,
            reply_to = %channel.name(),
            "Publishing bus request"
        );

        self.transport
            .publish(OutboundMessage {
                routing_key: routing_key.to_string(),
                reply_to: Some(channel.name().to_string()),
                body,
            })
            .await
            .map_err(|e| BusError::Publish {
                routing_key: routing_key.to_string(),
                reason: e.to_string(),
            })?;

        let outcome = match timeout(budget, channel.recv()).await {
            Ok(Some(delivery)) => {
                channel.ack(&delivery);
                decode_reply(&id, &delivery.body)
            }
            Ok(None) => Err(BusError::ChannelClosed(channel.name().to_string())),
            Err(_) => {
                tracing::warn!(
                    correlation_id = %id,
                    routing_key = %routing_key,
                    timeout = ?budget,
                    "No reply before timeout"
                );
                Err(BusError::Timeout {
                    routing_key: routing_key.to_string(),
                    timeout: budget,
                })
            }
        };

        self.channels.close_reply_channel(&mut channel);

        if let Err(BusError::Protocol(e)) = &outcome {
            tracing::error!(correlation_id = %id, routing_key = %routing_key, error = %e, "Protocol error on reply");
        }
        outcome
    }
}

impl std::fmt::Debug for BusClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BusClient")
            .field("default_timeout", &self.default_timeout)
            .finish()
    }
}

/// Decode a reply body and check it answers `id`.
fn decode_reply(id: &CorrelationId, body: &[u8]) -> BusResult<RpcOutcome> {
    let response: RpcResponse =
        serde_json::from_slice(body).map_err(|e| ProtocolError::Malformed(e.to_string()))?;

    if response.id != id.as_str() {
        return Err(ProtocolError::CorrelationMismatch {
            expected: id.to_string(),
            actual: response.id,
        }
        .into());
    }
    Ok(response.into_outcome()?)
}

fn outcome_label(result: &BusResult<RpcOutcome>) -> &'static str {
    match result {
        Ok(RpcOutcome::Result(_)) => "result",
        Ok(RpcOutcome::Error(_)) => "error",
        Err(BusError::Timeout { .. }) => "timeout",
        Err(BusError::Protocol(_)) => "protocol_error",
        Err(_) => "transport_error",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::envelope::RpcError;
    use crate::bus::memory::MemoryBroker;
    use crate::bus::transport::{Consumer, TransportError};
    use futures_util::future::BoxFuture;
    use serde_json::{json, Value};

    /// Answer every request on `queue` with whatever `reply` builds.
    fn spawn_responder<F>(broker: Arc<MemoryBroker>, mut queue: Consumer, reply: F)
    where
        F: Fn(&RpcRequest) -> Option<Value> + Send + 'static,
    {
        tokio::spawn(async move {
            while let Some(delivery) = queue.recv().await {
                let request: RpcRequest = serde_json::from_slice(&delivery.body).unwrap();
                if let (Some(body), Some(reply_to)) = (reply(&request), delivery.reply_to.clone()) {
                    broker
                        .publish(OutboundMessage {
                            routing_key: reply_to,
                            reply_to: None,
                            body: serde_json::to_vec(&body).unwrap(),
                        })
                        .await
                        .unwrap();
                }
            }
        });
    }

    fn client(broker: &Arc<MemoryBroker>, budget: Duration) -> BusClient {
        BusClient::new(broker.clone(), budget)
    }

    #[tokio::test]
    async fn test_request_returns_result() {
        let broker = Arc::new(MemoryBroker::new());
        let queue = broker.declare_work_queue("svc", &["simple.#"]).unwrap();
        spawn_responder(broker.clone(), queue, |req| {
            Some(json!({"jsonrpc": "2.0", "id": req.id, "result": req.params}))
        });

        let outcome = client(&broker, Duration::from_secs(1))
            .request("simple.add", "add", json!([10, 20]))
            .await
            .unwrap();
        assert_eq!(outcome, RpcOutcome::Result(json!([10, 20])));
        assert_eq!(broker.open_reply_queues(), 0);
        assert_eq!(broker.acked(), 1);
    }

    #[tokio::test]
    async fn test_request_returns_application_error_verbatim() {
        let broker = Arc::new(MemoryBroker::new());
        let queue = broker.declare_work_queue("svc", &["simple.#"]).unwrap();
        spawn_responder(broker.clone(), queue, |req| {
            Some(json!({"jsonrpc": "2.0", "id": req.id, "error": {"code": 404, "message": "nope", "data": {"k": 1}}}))
        });

        let outcome = client(&broker, Duration::from_secs(1))
            .request("simple.get", "GET", json!({}))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            RpcOutcome::Error(RpcError::with_data(404, "nope", json!({"k": 1})))
        );
    }

    #[tokio::test]
    async fn test_request_times_out_and_cleans_up() {
        let broker = Arc::new(MemoryBroker::new());
        let _queue = broker.declare_work_queue("svc", &["silent.#"]).unwrap();

        let budget = Duration::from_millis(100);
        let start = Instant::now();
        let err = client(&broker, budget)
            .request("silent.call", "PUT", json!({}))
            .await
            .unwrap_err();

        assert!(matches!(err, BusError::Timeout { .. }));
        assert!(err.is_bad_gateway());
        assert!(start.elapsed() < budget + Duration::from_millis(500));
        assert_eq!(broker.reply_queues_declared(), 1);
        assert_eq!(broker.reply_queues_deleted(), 1);
    }

    #[tokio::test]
    async fn test_mismatched_id_is_protocol_error() {
        let broker = Arc::new(MemoryBroker::new());
        let queue = broker.declare_work_queue("svc", &["liar.#"]).unwrap();
        spawn_responder(broker.clone(), queue, |_| {
            Some(json!({"jsonrpc": "2.0", "id": "someone-else", "result": []}))
        });

        let err = client(&broker, Duration::from_secs(1))
            .request("liar.call", "GET", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BusError::Protocol(ProtocolError::CorrelationMismatch { .. })
        ));
        assert_eq!(broker.open_reply_queues(), 0);
    }

    #[tokio::test]
    async fn test_malformed_reply_is_protocol_error() {
        let broker = Arc::new(MemoryBroker::new());
        let queue = broker.declare_work_queue("svc", &["empty.#"]).unwrap();
        spawn_responder(broker.clone(), queue, |req| Some(json!({"jsonrpc": "2.0", "id": req.id})));

        let err = client(&broker, Duration::from_secs(1))
            .request("empty.call", "GET", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, BusError::Protocol(ProtocolError::Empty { .. })));
    }

    /// Declares queues normally but refuses every publish.
    struct RefusingTransport(Arc<MemoryBroker>);

    impl Transport for RefusingTransport {
        fn declare_reply_queue<'a>(
            &'a self,
            name: &'a str,
        ) -> BoxFuture<'a, Result<Consumer, TransportError>> {
            self.0.declare_reply_queue(name)
        }

        fn publish(&self, _message: OutboundMessage) -> BoxFuture<'_, Result<(), TransportError>> {
            Box::pin(async { Err(TransportError::Other("refused".into())) })
        }

        fn ack(&self, queue: &str, delivery_tag: u64) {
            self.0.ack(queue, delivery_tag)
        }

        fn delete_queue(&self, name: &str) {
            self.0.delete_queue(name)
        }
    }

    #[tokio::test]
    async fn test_publish_failure_is_dispatch_error() {
        let broker = Arc::new(MemoryBroker::new());
        let bus = BusClient::new(Arc::new(RefusingTransport(broker.clone())), Duration::from_secs(1));

        let err = bus.request("any.key", "GET", json!({})).await.unwrap_err();
        assert!(matches!(err, BusError::Publish { .. }));
        assert!(err.to_string().starts_with("dispatch failed"));
        assert_eq!(broker.reply_queues_declared(), 1);
        assert_eq!(broker.open_reply_queues(), 0);
    }

    #[tokio::test]
    async fn test_unavailable_broker_fails_before_publish() {
        let broker = Arc::new(MemoryBroker::new());
        broker.set_available(false);

        let err = client(&broker, Duration::from_secs(1))
            .request("any.key", "GET", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, BusError::ChannelOpen { .. }));
        assert_eq!(broker.published(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_requests_balance_channels() {
        let broker = Arc::new(MemoryBroker::new());
        let queue = broker.declare_work_queue("svc", &["echo.#"]).unwrap();
        spawn_responder(broker.clone(), queue, |req| {
            // Every third request goes unanswered.
            let n = req.params.as_u64().unwrap_or(0);
            (n % 3 != 0).then(|| json!({"jsonrpc": "2.0", "id": req.id, "result": n}))
        });

        let bus = client(&broker, Duration::from_millis(200));
        let mut tasks = Vec::new();
        for n in 0..60u64 {
            let bus = bus.clone();
            tasks.push(tokio::spawn(async move { bus.request("echo.n", "GET", json!(n)).await }));
        }

        let mut ok = 0;
        let mut timed_out = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => ok += 1,
                Err(BusError::Timeout { .. }) => timed_out += 1,
                Err(e) => panic!("unexpected error {e}"),
            }
        }
        assert_eq!(ok, 40);
        assert_eq!(timed_out, 20);
        assert_eq!(broker.reply_queues_declared(), 60);
        assert_eq!(broker.reply_queues_deleted(), 60);
        assert_eq!(broker.open_reply_queues(), 0);
    }
}
