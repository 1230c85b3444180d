//! In-process topic broker.
//!
//! # Responsibilities
//! - Hold named queues and topic bindings
//! - Route published messages by routing key (default exchange + topic exchange)
//! - Track reply queue lifecycle for inspection
//!
//! # Design Decisions
//! - Queues live in a `DashMap`; publishers never take a global lock
//! - Unroutable messages are dropped, as a real topic exchange does
//! - `set_available(false)` simulates a broker outage

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use dashmap::DashMap;
use futures_util::future::BoxFuture;
use tokio::sync::mpsc;

use crate::bus::transport::{Consumer, Delivery, OutboundMessage, Transport, TransportError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QueueKind {
    /// Exclusive, auto-delete reply queue.
    Reply,
    /// Worker queue fed through topic bindings.
    Work,
}

#[derive(Debug)]
struct QueueState {
    tx: mpsc::UnboundedSender<Delivery>,
    kind: QueueKind,
    next_tag: AtomicU64,
}

#[derive(Debug, Clone)]
struct Binding {
    pattern: String,
    queue: String,
}

/// A broker living inside the process.
#[derive(Debug)]
pub struct MemoryBroker {
    exchange: String,
    queues: DashMap<String, Arc<QueueState>>,
    bindings: RwLock<Vec<Binding>>,
    available: AtomicBool,
    reply_declared: AtomicUsize,
    reply_deleted: AtomicUsize,
    published: AtomicUsize,
    unroutable: AtomicUsize,
    acked: AtomicUsize,
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBroker {
    /// Create a broker with the default exchange name.
    pub fn new() -> Self {
        Self::with_exchange("gateway")
    }

    /// Create a broker whose topic exchange carries `exchange` as its name.
    pub fn with_exchange(exchange: impl Into<String>) -> Self {
        Self {
            exchange: exchange.into(),
            queues: DashMap::new(),
            bindings: RwLock::new(Vec::new()),
            available: AtomicBool::new(true),
            reply_declared: AtomicUsize::new(0),
            reply_deleted: AtomicUsize::new(0),
            published: AtomicUsize::new(0),
            unroutable: AtomicUsize::new(0),
            acked: AtomicUsize::new(0),
        }
    }

    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    /// Declare a durable work queue bound to the given topic patterns.
    pub fn declare_work_queue(&self, name: &str, patterns: &[&str]) -> Result<Consumer, TransportError> {
        let consumer = self.declare(name, QueueKind::Work)?;
        let mut bindings = self.bindings.write().unwrap_or_else(|e| e.into_inner());
        for pattern in patterns {
            bindings.push(Binding {
                pattern: (*pattern).to_string(),
                queue: name.to_string(),
            });
        }
        tracing::debug!(queue = %name, patterns = ?patterns, exchange = %self.exchange, "Work queue bound");
        Ok(consumer)
    }

    fn declare(&self, name: &str, kind: QueueKind) -> Result<Consumer, TransportError> {
        if !self.is_available() {
            return Err(TransportError::Unavailable);
        }
        let (tx, rx) = mpsc::unbounded_channel();
        match self.queues.entry(name.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                return Err(TransportError::QueueExists(name.to_string()));
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(Arc::new(QueueState {
                    tx,
                    kind,
                    next_tag: AtomicU64::new(1),
                }));
            }
        }
        if kind == QueueKind::Reply {
            self.reply_declared.fetch_add(1, Ordering::Relaxed);
        }
        Ok(rx)
    }

    /// Queue names a routing key resolves to.
    fn route(&self, routing_key: &str) -> Vec<String> {
        let mut targets = Vec::new();
        let mut seen = HashSet::new();

        // Default exchange: a queue is addressable by its own name.
        if self.queues.contains_key(routing_key) {
            seen.insert(routing_key.to_string());
            targets.push(routing_key.to_string());
        }

        let bindings = self.bindings.read().unwrap_or_else(|e| e.into_inner());
        for binding in bindings.iter() {
            if topic_matches(&binding.pattern, routing_key) && seen.insert(binding.queue.clone()) {
                targets.push(binding.queue.clone());
            }
        }
        targets
    }

    fn deliver(&self, message: OutboundMessage) -> Result<(), TransportError> {
        if !self.is_available() {
            return Err(TransportError::Unavailable);
        }
        self.published.fetch_add(1, Ordering::Relaxed);

        let mut delivered = false;
        for queue_name in self.route(&message.routing_key) {
            let Some(queue) = self.queues.get(&queue_name).map(|q| q.value().clone()) else {
                continue;
            };
            let delivery = Delivery {
                delivery_tag: queue.next_tag.fetch_add(1, Ordering::Relaxed),
                queue: queue_name.clone(),
                routing_key: message.routing_key.clone(),
                reply_to: message.reply_to.clone(),
                body: message.body.clone(),
            };
            if queue.tx.send(delivery).is_ok() {
                delivered = true;
            }
        }

        if !delivered {
            self.unroutable.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(routing_key = %message.routing_key, "Unroutable message dropped");
        }
        Ok(())
    }

    /// Toggle broker availability.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    pub fn queue_exists(&self, name: &str) -> bool {
        self.queues.contains_key(name)
    }

    /// Reply queues currently present.
    pub fn open_reply_queues(&self) -> usize {
        self.queues
            .iter()
            .filter(|q| q.value().kind == QueueKind::Reply)
            .count()
    }

    pub fn reply_queues_declared(&self) -> usize {
        self.reply_declared.load(Ordering::Relaxed)
    }

    pub fn reply_queues_deleted(&self) -> usize {
        self.reply_deleted.load(Ordering::Relaxed)
    }

    pub fn published(&self) -> usize {
        self.published.load(Ordering::Relaxed)
    }

    pub fn unroutable(&self) -> usize {
        self.unroutable.load(Ordering::Relaxed)
    }

    pub fn acked(&self) -> usize {
        self.acked.load(Ordering::Relaxed)
    }
}

impl Transport for MemoryBroker {
    fn declare_reply_queue<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<Consumer, TransportError>> {
        Box::pin(async move { self.declare(name, QueueKind::Reply) })
    }

    fn publish(&self, message: OutboundMessage) -> BoxFuture<'_, Result<(), TransportError>> {
        Box::pin(async move { self.deliver(message) })
    }

    fn ack(&self, queue: &str, delivery_tag: u64) {
        self.acked.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(queue = %queue, delivery_tag, "Delivery acknowledged");
    }

    fn delete_queue(&self, name: &str) {
        if let Some((_, queue)) = self.queues.remove(name) {
            if queue.kind == QueueKind::Reply {
                self.reply_deleted.fetch_add(1, Ordering::Relaxed);
            } else {
                let mut bindings = self.bindings.write().unwrap_or_else(|e| e.into_inner());
                bindings.retain(|b| b.queue != name);
            }
        }
    }
}

/// AMQP topic matching: `*` matches one word, `#` zero or more.
pub fn topic_matches(pattern: &str, routing_key: &str) -> bool {
    let pattern: Vec<&str> = pattern.split('.').collect();
    let key: Vec<&str> = routing_key.split('.').collect();
    match_words(&pattern, &key)
}

fn match_words(pattern: &[&str], key: &[&str]) -> bool {
    match pattern.split_first() {
        None => key.is_empty(),
        Some((&"#", rest)) => (0..=key.len()).any(|skip| match_words(rest, &key[skip..])),
        Some((&"*", rest)) => !key.is_empty() && match_words(rest, &key[1..]),
        Some((word, rest)) => key.first() == Some(word) && match_words(rest, &key[1..]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_matching() {
        assert!(topic_matches("clusters.list", "clusters.list"));
        assert!(topic_matches("clusters.*", "clusters.list"));
        assert!(!topic_matches("clusters.*", "clusters.hosts.add"));
        assert!(topic_matches("clusters.#", "clusters.hosts.add"));
        assert!(topic_matches("clusters.#", "clusters"));
        assert!(topic_matches("#", "anything.at.all"));
        assert!(!topic_matches("networks.#", "clusters.list"));
    }

    #[tokio::test]
    async fn test_publish_routes_to_bound_queue() {
        let broker = MemoryBroker::new();
        let mut work = broker.declare_work_queue("inventory", &["clusters.#"]).unwrap();

        broker
            .publish(OutboundMessage {
                routing_key: "clusters.list".into(),
                reply_to: Some("response-1".into()),
                body: b"{}".to_vec(),
            })
            .await
            .unwrap();

        let delivery = work.recv().await.unwrap();
        assert_eq!(delivery.routing_key, "clusters.list");
        assert_eq!(delivery.reply_to.as_deref(), Some("response-1"));
        assert_eq!(delivery.delivery_tag, 1);
        assert_eq!(broker.published(), 1);
    }

    #[tokio::test]
    async fn test_reply_queue_addressed_by_name() {
        let broker = MemoryBroker::new();
        let mut reply = broker.declare_reply_queue("response-abc").await.unwrap();

        broker
            .publish(OutboundMessage {
                routing_key: "response-abc".into(),
                reply_to: None,
                body: b"ok".to_vec(),
            })
            .await
            .unwrap();
        assert_eq!(reply.recv().await.unwrap().body, b"ok".to_vec());
    }

    #[tokio::test]
    async fn test_unroutable_is_dropped() {
        let broker = MemoryBroker::new();
        broker
            .publish(OutboundMessage {
                routing_key: "nobody.home".into(),
                reply_to: None,
                body: Vec::new(),
            })
            .await
            .unwrap();
        assert_eq!(broker.unroutable(), 1);
    }

    #[tokio::test]
    async fn test_unavailable_broker_refuses() {
        let broker = MemoryBroker::new();
        broker.set_available(false);
        let res = broker
            .publish(OutboundMessage {
                routing_key: "clusters.list".into(),
                reply_to: None,
                body: Vec::new(),
            })
            .await;
        assert_eq!(res.unwrap_err(), TransportError::Unavailable);
        assert!(broker.declare_reply_queue("response-x").await.is_err());
    }

    #[tokio::test]
    async fn test_delete_queue_is_idempotent() {
        let broker = MemoryBroker::new();
        let _rx = broker.declare_reply_queue("response-1").await.unwrap();
        broker.delete_queue("response-1");
        broker.delete_queue("response-1");
        assert!(!broker.queue_exists("response-1"));
        assert_eq!(broker.reply_queues_deleted(), 1);
        assert_eq!(broker.open_reply_queues(), 0);
    }
}
