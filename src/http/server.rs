//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum Router with the dispatcher as its only handler
//! - Wire up middleware (tracing, request ID, timeout, body limit, auth)
//! - Serve on a plain listener or over TLS
//! - Apply configuration updates to the running dispatcher

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware,
    response::Response,
    Router,
};
use axum_server::tls_rustls::RustlsConfig;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tower_http::{limit::RequestBodyLimitLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::GatewayConfig;
use crate::dispatcher::Dispatcher;
use crate::http::request::{make_span, propagate_request_id_layer, set_request_id_layer};
use crate::lifecycle::shutdown::wait_for;
use crate::security::auth::{auth_middleware, build_authenticator};

/// How long in-flight TLS connections get to finish after shutdown.
const TLS_DRAIN_PERIOD: Duration = Duration::from_secs(10);

/// HTTP front end of the gateway.
pub struct GatewayServer {
    router: Router,
    config: GatewayConfig,
    dispatcher: Arc<Dispatcher>,
}

impl GatewayServer {
    pub fn new(config: GatewayConfig, dispatcher: Arc<Dispatcher>) -> Self {
        let router = Self::build_router(&config, dispatcher.clone());
        Self {
            router,
            config,
            dispatcher,
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &GatewayConfig, dispatcher: Arc<Dispatcher>) -> Router {
        let authenticator = build_authenticator(&config.auth);
        Router::new()
            .fallback(gateway_handler)
            .with_state(dispatcher)
            .layer(middleware::from_fn_with_state(authenticator, auth_middleware))
            .layer(RequestBodyLimitLayer::new(config.listener.max_body_size))
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(propagate_request_id_layer())
            .layer(TraceLayer::new_for_http().make_span_with(make_span))
            .layer(set_request_id_layer())
    }

    /// A clone of the router, for driving the server without a socket.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Serve on `listener` until `shutdown` fires, applying config updates as they arrive.
    pub async fn run(
        self,
        listener: TcpListener,
        config_updates: mpsc::UnboundedReceiver<GatewayConfig>,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(), io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let reloader = spawn_reloader(self.dispatcher.clone(), config_updates);

        axum::serve(listener, self.router)
            .with_graceful_shutdown(wait_for(shutdown))
            .await?;

        reloader.abort();
        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Serve over TLS on `addr` until `shutdown` fires.
    pub async fn run_tls(
        self,
        addr: SocketAddr,
        tls: RustlsConfig,
        config_updates: mpsc::UnboundedReceiver<GatewayConfig>,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(), io::Error> {
        tracing::info!(address = %addr, "HTTPS server starting");

        let reloader = spawn_reloader(self.dispatcher.clone(), config_updates);
        let handle = axum_server::Handle::new();
        let drain = handle.clone();
        tokio::spawn(async move {
            wait_for(shutdown).await;
            drain.graceful_shutdown(Some(TLS_DRAIN_PERIOD));
        });

        axum_server::bind_rustls(addr, tls)
            .handle(handle)
            .serve(self.router.into_make_service())
            .await?;

        reloader.abort();
        tracing::info!("HTTPS server stopped");
        Ok(())
    }
}

/// Every request goes to the dispatcher; routing happens there.
async fn gateway_handler(State(dispatcher): State<Arc<Dispatcher>>, request: Request<Body>) -> Response {
    dispatcher.dispatch(request).await
}

fn spawn_reloader(
    dispatcher: Arc<Dispatcher>,
    mut config_updates: mpsc::UnboundedReceiver<GatewayConfig>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(config) = config_updates.recv().await {
            match dispatcher.apply_config(&config) {
                Ok(()) => tracing::info!(
                    request_timeout_secs = config.bus.request_timeout_secs,
                    "Applied configuration update"
                ),
                Err(e) => tracing::error!(error = %e, "Rejected configuration update"),
            }
        }
    })
}
