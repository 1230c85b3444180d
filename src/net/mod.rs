//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → tls.rs (optional TLS handshake via axum-server)
//!     → Hand off to HTTP layer
//! ```
//!
//! # Design Decisions
//! - TLS is optional and configured by `listener.tls`
//! - Plain listeners are bound by the caller and served with `axum::serve`

pub mod tls;

pub use tls::load_tls_config;
