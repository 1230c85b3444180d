//! Network handlers.

use axum::http::Method;

use crate::bus::envelope::RpcRequest;
use crate::handlers::{forward, names_only, HandlerContext, HandlerResult};
use crate::routing::{PatternError, RouteTable};

pub fn register(table: &mut RouteTable) -> Result<(), PatternError> {
    table.connect(Method::GET, "/api/v0/networks/", "networks.list", list_networks)?;
    table.connect(Method::GET, "/api/v0/network/{name}/", "networks.get", get_network)?;
    table.connect(Method::PUT, "/api/v0/network/{name}/", "networks.create", create_network)?;
    table.connect(Method::DELETE, "/api/v0/network/{name}/", "networks.delete", delete_network)?;
    Ok(())
}

/// Names of every network.
pub async fn list_networks(request: RpcRequest, ctx: HandlerContext) -> HandlerResult {
    let mut response = forward(&request, &ctx).await?;
    response.result = response.result.map(names_only);
    Ok(response)
}

pub async fn get_network(request: RpcRequest, ctx: HandlerContext) -> HandlerResult {
    forward(&request, &ctx).await
}

pub async fn create_network(request: RpcRequest, ctx: HandlerContext) -> HandlerResult {
    forward(&request, &ctx).await
}

pub async fn delete_network(request: RpcRequest, ctx: HandlerContext) -> HandlerResult {
    forward(&request, &ctx).await
}
