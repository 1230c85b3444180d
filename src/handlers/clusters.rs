//! Cluster and cluster-member handlers.

use axum::http::Method;
use serde_json::Value;

use crate::bus::envelope::{RpcRequest, RpcResponse};
use crate::dispatcher::codes::BAD_REQUEST;
use crate::handlers::{forward, names_only, HandlerContext, HandlerResult};
use crate::routing::{PatternError, RouteTable};

pub fn register(table: &mut RouteTable) -> Result<(), PatternError> {
    table.connect(Method::GET, "/api/v0/clusters/", "clusters.list", list_clusters)?;
    table.connect(Method::GET, "/api/v0/cluster/{name}/", "clusters.get", get_cluster)?;
    table.connect(Method::PUT, "/api/v0/cluster/{name}/", "clusters.create", create_cluster)?;
    table.connect(Method::DELETE, "/api/v0/cluster/{name}/", "clusters.delete", delete_cluster)?;
    table.connect(
        Method::GET,
        "/api/v0/cluster/{name}/hosts/",
        "clusters.hosts.list",
        list_cluster_members,
    )?;
    table
        .connect(
            Method::PUT,
            "/api/v0/cluster/{name}/hosts/",
            "clusters.hosts.set",
            update_cluster_members,
        )?
        .member_add();
    table.connect(
        Method::GET,
        "/api/v0/cluster/{name}/hosts/{host}/",
        "clusters.hosts.check",
        check_cluster_member,
    )?;
    table
        .connect(
            Method::PUT,
            "/api/v0/cluster/{name}/hosts/{host}/",
            "clusters.hosts.add",
            add_cluster_member,
        )?
        .member_add();
    table.connect(
        Method::DELETE,
        "/api/v0/cluster/{name}/hosts/{host}/",
        "clusters.hosts.delete",
        delete_cluster_member,
    )?;
    Ok(())
}

/// Names of every cluster.
pub async fn list_clusters(request: RpcRequest, ctx: HandlerContext) -> HandlerResult {
    let mut response = forward(&request, &ctx).await?;
    response.result = response.result.map(names_only);
    Ok(response)
}

pub async fn get_cluster(request: RpcRequest, ctx: HandlerContext) -> HandlerResult {
    forward(&request, &ctx).await
}

pub async fn create_cluster(request: RpcRequest, ctx: HandlerContext) -> HandlerResult {
    forward(&request, &ctx).await
}

pub async fn delete_cluster(request: RpcRequest, ctx: HandlerContext) -> HandlerResult {
    forward(&request, &ctx).await
}

pub async fn list_cluster_members(request: RpcRequest, ctx: HandlerContext) -> HandlerResult {
    forward(&request, &ctx).await
}

/// Replace the member set. `old` must describe the current members and `new`
/// the desired ones; both are arrays of host addresses.
pub async fn update_cluster_members(request: RpcRequest, ctx: HandlerContext) -> HandlerResult {
    for key in ["old", "new"] {
        if !is_string_array(request.param(key)) {
            tracing::debug!(id = %request.id, key, "Rejecting member update without a host list");
            let error = ctx
                .codes
                .error(BAD_REQUEST, format!("'{key}' must be a list of host addresses"));
            return Ok(RpcResponse::failure(request.id, error));
        }
    }
    forward(&request, &ctx).await
}

pub async fn check_cluster_member(request: RpcRequest, ctx: HandlerContext) -> HandlerResult {
    forward(&request, &ctx).await
}

pub async fn add_cluster_member(request: RpcRequest, ctx: HandlerContext) -> HandlerResult {
    forward(&request, &ctx).await
}

pub async fn delete_cluster_member(request: RpcRequest, ctx: HandlerContext) -> HandlerResult {
    forward(&request, &ctx).await
}

fn is_string_array(value: Option<&Value>) -> bool {
    matches!(value, Some(Value::Array(items)) if items.iter().all(Value::is_string))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::client::BusClient;
    use crate::bus::envelope::RpcError;
    use crate::bus::memory::MemoryBroker;
    use crate::bus::worker::Worker;
    use crate::dispatcher::codes::ErrorCodeTable;
    use crate::lifecycle::Shutdown;
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn context(broker: &Arc<MemoryBroker>, routing_key: &str) -> HandlerContext {
        HandlerContext {
            bus: BusClient::new(broker.clone(), Duration::from_secs(1)),
            codes: Arc::new(ErrorCodeTable::standard()),
            routing_key: routing_key.into(),
        }
    }

    #[tokio::test]
    async fn test_list_reduces_to_names() {
        let broker = Arc::new(MemoryBroker::new());
        let shutdown = Shutdown::new();
        let worker = Worker::bind(&broker, "inventory", &["clusters.#"]).unwrap();
        tokio::spawn(worker.run(
            |_, _| async { Ok::<_, RpcError>(json!([{"name": "a"}, {"name": "b"}])) },
            shutdown.subscribe(),
        ));

        let request = RpcRequest::new("req-1", "GET", json!({}));
        let response = list_clusters(request, context(&broker, "clusters.list")).await.unwrap();
        assert_eq!(response.id, "req-1");
        assert_eq!(response.result, Some(json!(["a", "b"])));
        shutdown.trigger();
    }

    #[tokio::test]
    async fn test_update_members_validates_before_calling_bus() {
        let broker = Arc::new(MemoryBroker::new());
        let shutdown = Shutdown::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let worker = Worker::bind(&broker, "inventory", &["clusters.#"]).unwrap();
        tokio::spawn(worker.run(
            move |_, request| {
                seen.fetch_add(1, Ordering::SeqCst);
                async move { Ok::<_, RpcError>(request.params) }
            },
            shutdown.subscribe(),
        ));

        let bad = RpcRequest::new("req-1", "PUT", json!({"name": "c", "old": "x", "new": []}));
        let response = update_cluster_members(bad, context(&broker, "clusters.hosts.set"))
            .await
            .unwrap();
        assert_eq!(response.error.map(|e| e.code), Some(-32600));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let good = RpcRequest::new("req-2", "PUT", json!({"name": "c", "old": [], "new": ["1.2.3.4"]}));
        let response = update_cluster_members(good, context(&broker, "clusters.hosts.set"))
            .await
            .unwrap();
        assert!(response.error.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        shutdown.trigger();
    }
}
