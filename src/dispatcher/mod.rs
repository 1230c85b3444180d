//! Request dispatch subsystem.
//!
//! # Data Flow
//! ```text
//! HTTP request
//!     → ROUTE_LOOKUP         (routing::RouteTable, no match → 404)
//!     → PARAM_EXTRACTION     (params.rs, malformed body → 400)
//!     → HANDLER_INVOCATION   (handlers::adapter, panic → 500)
//!     → RESPONSE_TRANSLATION (codes.rs, bus timeout → 502)
//!     → exactly one HTTP response
//! ```
//!
//! # Design Decisions
//! - Route table, error codes and bus client form one `Snapshot` behind `ArcSwap`
//! - Requests read a snapshot; reloads are serialized by a mutex
//! - The live code table is also published through `SharedCodes`
//! - Every failure is rendered here through `GatewayError`

pub mod codes;
pub mod params;

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use axum::body::{to_bytes, Body};
use axum::http::Request;
use axum::response::{IntoResponse, Response};

use crate::bus::client::BusClient;
use crate::config::GatewayConfig;
use crate::dispatcher::codes::{ErrorCodeTable, SharedCodes};
use crate::error::GatewayError;
use crate::handlers::adapter::HttpCall;
use crate::handlers::{self, HandlerContext};
use crate::http::request::request_id;
use crate::observability::metrics;
use crate::routing::{PatternError, RouteTable};

/// Everything a request reads, swapped as one unit.
#[derive(Debug)]
pub struct Snapshot {
    pub routes: RouteTable,
    pub codes: Arc<ErrorCodeTable>,
    pub bus: BusClient,
}

/// Maps HTTP requests onto handlers and handler replies onto HTTP responses.
pub struct Dispatcher {
    current: ArcSwap<Snapshot>,
    shared_codes: SharedCodes,
    reload_lock: Mutex<()>,
}

impl Dispatcher {
    pub fn new(routes: RouteTable, codes: ErrorCodeTable, bus: BusClient) -> Self {
        let codes = Arc::new(codes);
        Self {
            shared_codes: Arc::new(ArcSwap::new(codes.clone())),
            current: ArcSwap::from_pointee(Snapshot { routes, codes, bus }),
            reload_lock: Mutex::new(()),
        }
    }

    /// Build a dispatcher with the built-in routes and configured error codes.
    pub fn from_config(config: &GatewayConfig, bus: BusClient) -> Result<Self, PatternError> {
        let bus = bus.with_timeout(Duration::from_secs(config.bus.request_timeout_secs));
        Ok(Self::new(
            handlers::route_table()?,
            ErrorCodeTable::from_config(&config.error_codes),
            bus,
        ))
    }

    /// Handle one request end to end.
    pub async fn dispatch(&self, request: Request<Body>) -> Response {
        let start = Instant::now();
        let (parts, body) = request.into_parts();
        let method = parts.method;
        let path = parts.uri.path().to_string();
        let request_id = request_id(&parts.headers).to_string();

        let snapshot = self.current.load_full();
        let Some(matched) = snapshot.routes.lookup(&method, &path) else {
            tracing::debug!(request_id = %request_id, method = %method, path = %path, "No route matched");
            metrics::record_request(method.as_str(), 404, "none", start);
            return GatewayError::RouteNotFound { method, path }.into_response();
        };
        let route = matched.entry.pattern.template().to_string();

        tracing::debug!(
            request_id = %request_id,
            method = %method,
            path = %path,
            routing_key = %matched.entry.routing_key,
            "Dispatching request"
        );

        let result = match to_bytes(body, usize::MAX).await {
            Ok(body) => {
                let ctx = HandlerContext {
                    bus: snapshot.bus.clone(),
                    codes: snapshot.codes.clone(),
                    routing_key: matched.entry.routing_key.clone(),
                };
                let call = HttpCall {
                    method: &method,
                    path_params: &matched.params,
                    query: parts.uri.query(),
                    body: &body,
                };
                matched.entry.handler.handle(call, ctx).await
            }
            Err(e) => Err(GatewayError::BadRequest(format!("unreadable body: {e}"))),
        };

        let response = match result {
            Ok(reply) => reply.into_response(),
            Err(err) => {
                log_failure(&request_id, &route, &err);
                err.into_response()
            }
        };

        metrics::record_request(method.as_str(), response.status().as_u16(), &route, start);
        response
    }

    /// Swap in a new route table, error code table and bus timeout.
    ///
    /// Readers see either the old snapshot or the new one, never a mix.
    pub fn reload(&self, routes: RouteTable, codes: ErrorCodeTable, request_timeout: Duration) {
        let _guard = self.reload_lock.lock().unwrap_or_else(|e| e.into_inner());
        let route_count = routes.len();
        let codes = Arc::new(codes);
        let bus = self.current.load().bus.with_timeout(request_timeout);
        self.shared_codes.store(codes.clone());
        self.current.store(Arc::new(Snapshot { routes, codes, bus }));
        tracing::info!(routes = route_count, request_timeout = ?request_timeout, "Dispatcher reloaded");
    }

    /// Rebuild everything reloadable from a new configuration.
    pub fn apply_config(&self, config: &GatewayConfig) -> Result<(), PatternError> {
        self.reload(
            handlers::route_table()?,
            ErrorCodeTable::from_config(&config.error_codes),
            Duration::from_secs(config.bus.request_timeout_secs),
        );
        Ok(())
    }

    pub fn route_count(&self) -> usize {
        self.current.load().routes.len()
    }

    pub fn codes(&self) -> Arc<ErrorCodeTable> {
        self.current.load().codes.clone()
    }

    /// Handle on the live code table; follows every reload.
    pub fn shared_codes(&self) -> SharedCodes {
        self.shared_codes.clone()
    }

    pub fn request_timeout(&self) -> Duration {
        self.current.load().bus.default_timeout()
    }
}

fn log_failure(request_id: &str, route: &str, err: &GatewayError) {
    match err {
        GatewayError::BadRequest(reason) => {
            tracing::info!(request_id = %request_id, route = %route, reason = %reason, "Rejected malformed request");
        }
        GatewayError::Bus(e) if e.is_bad_gateway() => {
            tracing::warn!(request_id = %request_id, route = %route, error = %e, "Bus call failed");
        }
        other => {
            tracing::error!(request_id = %request_id, route = %route, error = %other, "Request failed");
        }
    }
}
