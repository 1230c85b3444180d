//! Embedded backend subsystem.
//!
//! # Data Flow
//! ```text
//! bus exchange (clusters.#, networks.#)
//!     → inventory queue
//!     → bus::Worker
//!     → inventory.rs (in-memory store)
//!     → RpcResponse to reply_to
//! ```
//!
//! # Design Decisions
//! - Runs on the same in-process broker as the gateway
//! - Only started when `bus.embedded_backend` is set
//! - Shares the gateway's error code table at startup

pub mod inventory;

pub use inventory::Inventory;
