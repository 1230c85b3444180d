//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → auth.rs (Authenticator chosen from config)
//!     → accepted: pass to dispatcher
//!     → refused: 403 Forbidden
//! ```
//!
//! # Design Decisions
//! - Fail closed: a request without usable credentials is refused
//! - Body size limits live in the HTTP layer, not here

pub mod auth;

pub use auth::{auth_middleware, build_authenticator, AllowAll, Authenticator, BearerToken, HttpBasicAuth};
