//! Startup orchestration.
//!
//! # Responsibilities
//! - Connect to the bus named by `bus.uri`
//! - Build the dispatcher with routes and error codes from config
//! - Start the embedded inventory backend when asked to
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Subsystems initialize in order, not concurrently
//! - Listeners are bound by the caller once this returns

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinHandle;

use crate::backend::Inventory;
use crate::bus::client::BusClient;
use crate::bus::memory::MemoryBroker;
use crate::bus::transport::TransportError;
use crate::config::GatewayConfig;
use crate::dispatcher::Dispatcher;
use crate::lifecycle::Shutdown;
use crate::routing::PatternError;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid bus uri '{uri}': {reason}")]
    BusUri { uri: String, reason: String },

    #[error("invalid route table: {0}")]
    Routes(#[from] PatternError),

    #[error("failed to start embedded backend: {0}")]
    Backend(#[from] TransportError),
}

/// Everything `start` brings up.
pub struct Gateway {
    pub dispatcher: Arc<Dispatcher>,
    pub broker: Arc<MemoryBroker>,
    pub backend: Option<JoinHandle<()>>,
}

/// Connect the bus, build the dispatcher and start the embedded backend.
///
/// Must be called inside a Tokio runtime when `bus.embedded_backend` is set.
pub fn start(config: &GatewayConfig, shutdown: &Shutdown) -> Result<Gateway, StartupError> {
    let broker = connect(config)?;
    tracing::info!(
        uri = %config.bus.uri,
        exchange = %broker.exchange(),
        "Connected to message bus"
    );

    let bus = BusClient::new(broker.clone(), Duration::from_secs(config.bus.request_timeout_secs));
    let dispatcher = Arc::new(Dispatcher::from_config(config, bus)?);
    tracing::info!(routes = dispatcher.route_count(), "Dispatcher ready");

    let backend = if config.bus.embedded_backend {
        let inventory = Arc::new(Inventory::new(dispatcher.shared_codes()));
        let handle = inventory.spawn(&broker, shutdown.subscribe())?;
        tracing::info!("Embedded inventory backend started");
        Some(handle)
    } else {
        None
    };

    Ok(Gateway {
        dispatcher,
        broker,
        backend,
    })
}

fn connect(config: &GatewayConfig) -> Result<Arc<MemoryBroker>, StartupError> {
    let uri = &config.bus.uri;
    let parsed = url::Url::parse(uri).map_err(|e| StartupError::BusUri {
        uri: uri.clone(),
        reason: e.to_string(),
    })?;

    match parsed.scheme() {
        "memory" => Ok(Arc::new(MemoryBroker::with_exchange(config.bus.exchange.clone()))),
        other => Err(StartupError::BusUri {
            uri: uri.clone(),
            reason: format!("unsupported scheme '{other}'"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_start_with_embedded_backend() {
        let shutdown = Shutdown::new();
        let mut config = GatewayConfig::default();
        config.bus.exchange = "test-exchange".into();

        let gateway = start(&config, &shutdown).unwrap();
        assert_eq!(gateway.broker.exchange(), "test-exchange");
        assert_eq!(gateway.dispatcher.route_count(), 13);
        assert!(gateway.broker.queue_exists("inventory"));

        shutdown.trigger();
        gateway.backend.unwrap().await.unwrap();
        assert!(!gateway.broker.queue_exists("inventory"));
    }

    #[tokio::test]
    async fn test_start_without_backend() {
        let mut config = GatewayConfig::default();
        config.bus.embedded_backend = false;
        let gateway = start(&config, &Shutdown::new()).unwrap();
        assert!(gateway.backend.is_none());
        assert!(!gateway.broker.queue_exists("inventory"));
    }

    #[test]
    fn test_rejects_unknown_bus() {
        let mut config = GatewayConfig::default();
        config.bus.uri = "amqp://localhost/".into();
        let err = start(&config, &Shutdown::new()).err().unwrap();
        assert!(matches!(err, StartupError::BusUri { .. }));
    }
}
