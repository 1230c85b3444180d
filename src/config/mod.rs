//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML) + command line
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!     → shared with the server and dispatcher at startup
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → server swaps the dispatcher's route table, error codes and bus timeout
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Listener, TLS and auth changes need a restart

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    AuthConfig, AuthMode, BusConfig, ErrorCodeConfig, GatewayConfig, ListenerConfig, ObservabilityConfig,
    TimeoutConfig, TlsConfig,
};
