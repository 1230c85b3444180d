//! HTTP to message-bus gateway.
//!
//! # Architecture Overview
//!
//! ```text
//!                     ┌──────────────────────────────────────────────────────┐
//!                     │                       GATEWAY                        │
//!                     │                                                      │
//!   Client Request    │  ┌─────────┐    ┌──────────┐    ┌────────────────┐   │
//!   ──────────────────┼─▶│  http   │───▶│ security │───▶│   dispatcher   │   │
//!                     │  │ server  │    │   auth   │    │ routes + codes │   │
//!                     │  └─────────┘    └──────────┘    └───────┬────────┘   │
//!                     │                                         │            │
//!                     │                                         ▼            │
//!                     │                                 ┌────────────────┐   │
//!                     │                                 │    handlers    │   │
//!                     │                                 └───────┬────────┘   │
//!                     │                                         │            │
//!                     │                                         ▼            │
//!   Client Response   │                                 ┌────────────────┐   │    ┌─────────┐
//!   ◀─────────────────┼─────────────────────────────────│   bus client   │◀──┼───▶│ backend │
//!                     │                                 │ reply channels │   │    │ workers │
//!                     │                                 └────────────────┘   │    └─────────┘
//!                     │                                                      │
//!                     │  config (toml, hot reload) · observability · lifecycle
//!                     └──────────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use bus_gateway::config::validation::validate_config;
use bus_gateway::config::watcher::ConfigWatcher;
use bus_gateway::config::{load_config, ConfigError, GatewayConfig, TlsConfig};
use bus_gateway::http::GatewayServer;
use bus_gateway::lifecycle::{self, shutdown_signal, Shutdown};
use bus_gateway::net::load_tls_config;
use bus_gateway::observability::{logging, metrics};

const DEFAULT_CONFIG_FILE: &str = "/etc/bus-gateway/gateway.toml";

#[derive(Parser, Debug)]
#[command(name = "bus-gateway")]
#[command(about = "HTTP front end that forwards requests over a message bus", long_about = None)]
struct Cli {
    /// Configuration file to load.
    #[arg(long, value_name = "PATH")]
    config_file: Option<PathBuf>,

    /// Ignore any configuration file and start from defaults.
    #[arg(long, conflicts_with = "config_file")]
    no_config_file: bool,

    /// Address to listen on, e.g. 0.0.0.0:8000.
    #[arg(long, value_name = "ADDR")]
    listen: Option<String>,

    /// Message bus URI.
    #[arg(long, value_name = "URI")]
    bus_uri: Option<String>,

    /// Topic exchange requests are published to.
    #[arg(long, value_name = "NAME")]
    bus_exchange: Option<String>,

    /// PEM certificate for TLS; requires --tls-keyfile.
    #[arg(long, value_name = "PATH", requires = "tls_keyfile")]
    tls_pemfile: Option<String>,

    /// PEM private key for TLS; requires --tls-pemfile.
    #[arg(long, value_name = "PATH", requires = "tls_pemfile")]
    tls_keyfile: Option<String>,

    /// Log at debug level.
    #[arg(long)]
    debug: bool,
}

impl Cli {
    /// The file to read, if any, and whether it was asked for explicitly.
    fn config_source(&self) -> Option<(PathBuf, bool)> {
        if self.no_config_file {
            return None;
        }
        match &self.config_file {
            Some(path) => Some((path.clone(), true)),
            None => Some((PathBuf::from(DEFAULT_CONFIG_FILE), false)),
        }
    }

    /// Command-line values win over the file.
    fn apply_overrides(&self, config: &mut GatewayConfig) {
        if let Some(listen) = &self.listen {
            config.listener.bind_address = listen.clone();
        }
        if let Some(uri) = &self.bus_uri {
            config.bus.uri = uri.clone();
        }
        if let Some(exchange) = &self.bus_exchange {
            config.bus.exchange = exchange.clone();
        }
        if let (Some(cert_path), Some(key_path)) = (&self.tls_pemfile, &self.tls_keyfile) {
            config.listener.tls = Some(TlsConfig {
                cert_path: cert_path.clone(),
                key_path: key_path.clone(),
            });
        }
    }
}

fn resolve_config(cli: &Cli) -> Result<(GatewayConfig, Option<PathBuf>), ConfigError> {
    let (mut config, watched) = match cli.config_source() {
        Some((path, explicit)) => match load_config(&path) {
            Ok(config) => (config, Some(path)),
            Err(ConfigError::Io(e)) if !explicit && e.kind() == std::io::ErrorKind::NotFound => {
                (GatewayConfig::default(), None)
            }
            Err(e) => return Err(e),
        },
        None => (GatewayConfig::default(), None),
    };

    cli.apply_overrides(&mut config);
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok((config, watched))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let (config, watched) = match resolve_config(&cli) {
        Ok(resolved) => resolved,
        Err(e) => {
            eprintln!("bus-gateway: {e}");
            std::process::exit(2);
        }
    };

    logging::init_logging(&config.observability, cli.debug);
    tracing::info!("bus-gateway v{} starting", env!("CARGO_PKG_VERSION"));
    match &watched {
        Some(path) => tracing::info!(path = %path.display(), "Configuration loaded"),
        None => tracing::info!("No configuration file, using defaults"),
    }
    tracing::info!(
        bind_address = %config.listener.bind_address,
        bus_uri = %config.bus.uri,
        exchange = %config.bus.exchange,
        bus_timeout_secs = config.bus.request_timeout_secs,
        request_timeout_secs = config.timeouts.request_secs,
        "Effective configuration"
    );

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let shutdown = Shutdown::new();
    let gateway = lifecycle::start(&config, &shutdown)?;

    // Kept alive for the lifetime of the server.
    let (_watcher, config_updates) = match &watched {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            match watcher.run() {
                Ok(handle) => (Some(handle), updates),
                Err(e) => {
                    tracing::warn!(error = %e, "Config hot reload disabled");
                    (None, updates)
                }
            }
        }
        None => (None, mpsc::unbounded_channel().1),
    };

    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_shutdown.trigger();
    });

    let tls = config.listener.tls.clone();
    let server = GatewayServer::new(config.clone(), gateway.dispatcher.clone());
    match tls {
        Some(tls) => {
            let addr: SocketAddr = config.listener.bind_address.parse()?;
            let rustls = load_tls_config(&tls).await?;
            server.run_tls(addr, rustls, config_updates, shutdown.subscribe()).await?;
        }
        None => {
            let listener = TcpListener::bind(&config.listener.bind_address).await?;
            tracing::info!(address = %listener.local_addr()?, "Listening for connections");
            server.run(listener, config_updates, shutdown.subscribe()).await?;
        }
    }

    shutdown.trigger();
    if let Some(backend) = gateway.backend {
        let _ = backend.await;
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_overrides_file_values() {
        let cli = Cli::parse_from([
            "bus-gateway",
            "--no-config-file",
            "--listen",
            "0.0.0.0:9000",
            "--bus-exchange",
            "ops",
            "--tls-pemfile",
            "/tmp/cert.pem",
            "--tls-keyfile",
            "/tmp/key.pem",
        ]);
        assert!(cli.config_source().is_none());

        let mut config = GatewayConfig::default();
        cli.apply_overrides(&mut config);
        assert_eq!(config.listener.bind_address, "0.0.0.0:9000");
        assert_eq!(config.bus.exchange, "ops");
        assert_eq!(config.bus.uri, "memory://");
        assert_eq!(config.listener.tls.unwrap().key_path, "/tmp/key.pem");
    }

    #[test]
    fn test_tls_flags_come_in_pairs() {
        let result = Cli::try_parse_from(["bus-gateway", "--tls-pemfile", "/tmp/cert.pem"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_default_file_falls_back_to_defaults() {
        let cli = Cli::parse_from(["bus-gateway", "--listen", "127.0.0.1:8111"]);
        if std::path::Path::new(DEFAULT_CONFIG_FILE).exists() {
            return;
        }
        let (config, watched) = resolve_config(&cli).unwrap();
        assert!(watched.is_none());
        assert_eq!(config.listener.bind_address, "127.0.0.1:8111");
    }

    #[test]
    fn test_invalid_override_fails_validation() {
        let cli = Cli::parse_from(["bus-gateway", "--no-config-file", "--bus-uri", "amqp://broker/"]);
        let err = resolve_config(&cli).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }
}
