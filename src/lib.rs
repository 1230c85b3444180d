//! HTTP to message-bus gateway library.

pub mod backend;
pub mod bus;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod handlers;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod routing;
pub mod security;

pub use config::schema::GatewayConfig;
pub use dispatcher::Dispatcher;
pub use error::GatewayError;
pub use http::GatewayServer;
pub use lifecycle::Shutdown;
