//! Message bus subsystem.
//!
//! # Data Flow
//! ```text
//! BusClient::request(routing_key, method, params)
//!     → channel.rs (mint correlation id, declare response-<id>)
//!     → envelope.rs (RpcRequest { id, method, params })
//!     → transport.rs (publish with reply_to = response-<id>)
//!     → await one delivery on the reply channel (bounded by timeout)
//!     → ack, validate id, tear down channel
//!     → RpcOutcome::Result | RpcOutcome::Error | BusError
//!
//! Worker side (worker.rs):
//!     work queue → decode RpcRequest → service → RpcResponse → reply_to
//! ```
//!
//! # Design Decisions
//! - One shared transport; each request owns its reply channel exclusively
//! - Reply channels are RAII guards, so teardown happens on every exit path
//! - No retries anywhere in the bus layer
//! - Application errors are values (`RpcOutcome::Error`), not `BusError`s

pub mod channel;
pub mod client;
pub mod envelope;
pub mod error;
pub mod memory;
pub mod transport;
pub mod worker;

pub use channel::{CorrelationId, ReplyChannel, ReplyChannelManager, REPLY_QUEUE_PREFIX};
pub use client::{BusClient, DEFAULT_REQUEST_TIMEOUT};
pub use envelope::{RpcError, RpcOutcome, RpcRequest, RpcResponse};
pub use error::{BusError, BusResult, ProtocolError};
pub use memory::MemoryBroker;
pub use transport::{Delivery, OutboundMessage, Transport, TransportError};
pub use worker::Worker;
