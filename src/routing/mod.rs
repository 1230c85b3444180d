//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (method, path)
//!     → router.rs (route lookup, first match wins)
//!     → matcher.rs (template segments, capture classes)
//!     → Return: RouteMatch { entry, params } or no match
//!
//! Route Compilation (at startup and on reload):
//!     handlers::register(&mut RouteTable)
//!     → Compile templates into segments
//!     → Freeze as immutable RouteTable behind the dispatcher's swap
//! ```
//!
//! # Design Decisions
//! - Routes compiled once, immutable at runtime
//! - No regex in hot path (segment comparison only)
//! - Deterministic: same input always matches same route
//! - Routes are registered by explicit calls, never discovered

pub mod matcher;
pub mod router;

pub use matcher::{ParamClass, PathParams, PathPattern, PatternError};
pub use router::{RouteEntry, RouteMatch, RouteTable};
