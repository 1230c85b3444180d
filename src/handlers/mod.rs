//! Resource handlers.
//!
//! # Data Flow
//! ```text
//! Dispatcher (route matched)
//!     → adapter.rs (params → RpcRequest with fresh id)
//!     → clusters.rs / networks.rs (domain handler)
//!         → BusClient::request(routing_key, method, params)
//!     → adapter.rs (RpcResponse → status + body)
//! ```
//!
//! # Design Decisions
//! - Registration is a plain list of `connect` calls, no discovery
//! - Handlers return `RpcResponse` values; only bus failures are errors
//! - `method` on the envelope carries the HTTP verb; the routing key names the operation

pub mod adapter;
pub mod clusters;
pub mod networks;

use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde_json::Value;

use crate::bus::client::BusClient;
use crate::bus::envelope::{RpcOutcome, RpcRequest, RpcResponse};
use crate::bus::error::BusError;
use crate::dispatcher::codes::ErrorCodeTable;
use crate::routing::{PatternError, RouteTable};

/// What a handler hands back: an RPC response, or a bus-level failure.
pub type HandlerResult = Result<RpcResponse, BusError>;

/// Per-call collaborators passed to every handler.
#[derive(Clone)]
pub struct HandlerContext {
    pub bus: BusClient,
    pub codes: Arc<ErrorCodeTable>,
    /// Routing key of the matched route.
    pub routing_key: String,
}

/// An inner resource handler.
pub trait Handler: Send + Sync + 'static {
    fn call(&self, request: RpcRequest, ctx: HandlerContext) -> BoxFuture<'static, HandlerResult>;
}

impl<F, Fut> Handler for F
where
    F: Fn(RpcRequest, HandlerContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn call(&self, request: RpcRequest, ctx: HandlerContext) -> BoxFuture<'static, HandlerResult> {
        Box::pin(self(request, ctx))
    }
}

/// Register every built-in route.
pub fn register(table: &mut RouteTable) -> Result<(), PatternError> {
    clusters::register(table)?;
    networks::register(table)?;
    Ok(())
}

/// Build the full route table.
pub fn route_table() -> Result<RouteTable, PatternError> {
    let mut table = RouteTable::new();
    register(&mut table)?;
    Ok(table)
}

/// Send the request to the route's routing key and wrap the outcome.
pub(crate) async fn forward(request: &RpcRequest, ctx: &HandlerContext) -> HandlerResult {
    let outcome = ctx
        .bus
        .request(&ctx.routing_key, &request.method, request.params.clone())
        .await?;
    Ok(respond_with(request, outcome))
}

pub(crate) fn respond_with(request: &RpcRequest, outcome: RpcOutcome) -> RpcResponse {
    match outcome {
        RpcOutcome::Result(result) => RpcResponse::success(request.id.clone(), result),
        RpcOutcome::Error(error) => RpcResponse::failure(request.id.clone(), error),
    }
}

/// Reduce `[{"name": ..}, ..]` to `["..", ..]`. Other shapes pass through.
pub(crate) fn names_only(value: Value) -> Value {
    match value {
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|item| match item {
                    Value::Object(mut map) => map.remove("name").unwrap_or(Value::Null),
                    other => other,
                })
                .collect(),
        ),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_names_only() {
        assert_eq!(names_only(json!([{"name": "a", "x": 1}, {"name": "b"}])), json!(["a", "b"]));
        assert_eq!(names_only(json!(["already", "flat"])), json!(["already", "flat"]));
        assert_eq!(names_only(json!([])), json!([]));
    }

    #[test]
    fn test_route_table_has_every_route() {
        let table = route_table().unwrap();
        let keys: Vec<&str> = table.iter().map(|e| e.routing_key.as_str()).collect();
        assert_eq!(
            keys,
            vec![
                "clusters.list",
                "clusters.get",
                "clusters.create",
                "clusters.delete",
                "clusters.hosts.list",
                "clusters.hosts.set",
                "clusters.hosts.check",
                "clusters.hosts.add",
                "clusters.hosts.delete",
                "networks.list",
                "networks.get",
                "networks.create",
                "networks.delete",
            ]
        );
        let member_add: Vec<&str> = table
            .iter()
            .filter(|e| e.is_member_add())
            .map(|e| e.routing_key.as_str())
            .collect();
        assert_eq!(member_add, vec!["clusters.hosts.set", "clusters.hosts.add"]);
    }
}
