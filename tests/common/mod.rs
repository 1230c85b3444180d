//! Shared utilities for integration tests.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::Request;
use axum::response::Response;
use bus_gateway::bus::{MemoryBroker, RpcError, RpcRequest, Worker};
use bus_gateway::config::GatewayConfig;
use bus_gateway::lifecycle::{self, Gateway, Shutdown};
use bus_gateway::dispatcher::Dispatcher;
use bus_gateway::GatewayServer;
use serde_json::Value;
use tokio::sync::mpsc;

/// A gateway wired to an in-process broker, plus the handles tests poke at.
pub struct TestGateway {
    pub server: GatewayServer,
    #[allow(dead_code)]
    pub dispatcher: Arc<Dispatcher>,
    pub broker: Arc<MemoryBroker>,
    pub shutdown: Shutdown,
}

impl TestGateway {
    pub fn new(config: GatewayConfig) -> Self {
        let shutdown = Shutdown::new();
        let Gateway { dispatcher, broker, .. } = lifecycle::start(&config, &shutdown).unwrap();
        Self {
            server: GatewayServer::new(config, dispatcher.clone()),
            dispatcher,
            broker,
            shutdown,
        }
    }

    /// Drive one request through the router without a socket.
    pub async fn call(&self, request: Request<Body>) -> Response {
        use tower::ServiceExt;
        self.server.router().oneshot(request).await.unwrap()
    }

    /// Serve a backend on `queue` bound to `patterns` until shutdown.
    #[allow(dead_code)]
    pub fn serve_backend<S, Fut>(&self, queue: &str, patterns: &[&str], service: S)
    where
        S: Fn(String, RpcRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, RpcError>> + Send + 'static,
    {
        let worker = Worker::bind(&self.broker, queue, patterns).unwrap();
        tokio::spawn(worker.run(service, self.shutdown.subscribe()));
    }
}

/// Config for a gateway with no embedded backend and a short bus timeout.
#[allow(dead_code)]
pub fn bare_config() -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.bus.embedded_backend = false;
    config.bus.request_timeout_secs = 1;
    config.timeouts.request_secs = 5;
    config
}

#[allow(dead_code)]
pub fn request(method: &str, uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[allow(dead_code)]
pub async fn body_json(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[allow(dead_code)]
pub async fn body_text(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// Run `gateway` on a real listener at `addr` until its shutdown fires.
#[allow(dead_code)]
pub async fn start_listener(gateway: TestGateway, addr: SocketAddr) -> (Arc<MemoryBroker>, Shutdown) {
    let TestGateway { server, broker, shutdown, .. } = gateway;
    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    let (_, config_updates) = mpsc::unbounded_channel();
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, config_updates, server_shutdown).await;
    });
    tokio::time::sleep(Duration::from_millis(100)).await;
    (broker, shutdown)
}

#[allow(dead_code)]
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}
