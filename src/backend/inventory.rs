//! In-memory cluster and network inventory.
//!
//! # Responsibilities
//! - Answer `clusters.#` and `networks.#` requests from the bus
//! - Keep clusters, their member hosts and networks in memory
//! - Report failures as RPC error objects from the error code table
//!
//! # Design Decisions
//! - Each record lives in a `DashMap` shard; compare-and-set on members
//!   happens under the record's write lock
//! - Creating an existing cluster returns it unchanged
//! - Creating an existing network is fine only if it is identical

use std::collections::BTreeSet;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::bus::envelope::{RpcError, RpcRequest};
use crate::bus::memory::MemoryBroker;
use crate::bus::transport::TransportError;
use crate::bus::worker::Worker;
use crate::dispatcher::codes::{SharedCodes, BAD_REQUEST, CONFLICT, METHOD_NOT_FOUND, NOT_FOUND};

/// Work queue the inventory consumes.
pub const INVENTORY_QUEUE: &str = "inventory";
/// Topic patterns bound to the inventory queue.
pub const INVENTORY_BINDINGS: [&str; 2] = ["clusters.#", "networks.#"];
/// Network every cluster falls back to.
pub const DEFAULT_NETWORK: &str = "default";

const NETWORK_TYPES: [&str; 3] = ["flat_ip", "flannel_etcd", "flannel_server"];

#[derive(Debug, Clone, PartialEq, Serialize)]
struct Cluster {
    name: String,
    network: String,
    hostset: BTreeSet<String>,
}

impl Cluster {
    /// Public view without the member list.
    fn summary(&self) -> Value {
        json!({ "name": self.name, "network": self.network })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
struct Network {
    name: String,
    #[serde(rename = "type")]
    kind: String,
    options: Value,
}

type Reply = Result<Value, RpcError>;

/// The store behind the embedded backend.
pub struct Inventory {
    clusters: DashMap<String, Cluster>,
    networks: DashMap<String, Network>,
    codes: SharedCodes,
}

impl Inventory {
    /// An inventory holding only the default network.
    ///
    /// Errors are numbered from whatever table `codes` holds at the time.
    pub fn new(codes: SharedCodes) -> Self {
        let networks = DashMap::new();
        networks.insert(
            DEFAULT_NETWORK.to_string(),
            Network {
                name: DEFAULT_NETWORK.to_string(),
                kind: "flat_ip".to_string(),
                options: json!({}),
            },
        );
        Self {
            clusters: DashMap::new(),
            networks,
            codes,
        }
    }

    /// Bind the inventory queue on `broker` and serve it until shutdown.
    pub fn spawn(
        self: Arc<Self>,
        broker: &Arc<MemoryBroker>,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<JoinHandle<()>, TransportError> {
        let worker = Worker::bind(broker, INVENTORY_QUEUE, &INVENTORY_BINDINGS)?;
        let service = move |routing_key: String, request: RpcRequest| {
            let inventory = self.clone();
            async move { inventory.handle(&routing_key, &request) }
        };
        Ok(tokio::spawn(worker.run(service, shutdown)))
    }

    /// Answer one request addressed to `routing_key`.
    pub fn handle(&self, routing_key: &str, request: &RpcRequest) -> Reply {
        tracing::debug!(routing_key = %routing_key, id = %request.id, "Inventory request");
        match routing_key {
            "clusters.list" => Ok(self.list_clusters()),
            "clusters.get" => self.get_cluster(self.name(request)?),
            "clusters.create" => self.create_cluster(self.name(request)?, request.param_str("network")),
            "clusters.delete" => self.delete_cluster(self.name(request)?),
            "clusters.hosts.list" => self.list_members(self.name(request)?),
            "clusters.hosts.set" => self.set_members(self.name(request)?, request),
            "clusters.hosts.check" => self.check_member(self.name(request)?, self.host(request)?),
            "clusters.hosts.add" => self.add_member(self.name(request)?, self.host(request)?),
            "clusters.hosts.delete" => self.delete_member(self.name(request)?, self.host(request)?),
            "networks.list" => Ok(self.list_networks()),
            "networks.get" => self.get_network(self.name(request)?),
            "networks.create" => self.create_network(self.name(request)?, request),
            "networks.delete" => self.delete_network(self.name(request)?),
            other => Err(self.error(METHOD_NOT_FOUND, format!("no operation for {other}"))),
        }
    }

    fn error(&self, name: &str, message: impl Into<String>) -> RpcError {
        self.codes.load().error(name, message)
    }

    fn required<'a>(&self, request: &'a RpcRequest, key: &str) -> Result<&'a str, RpcError> {
        request
            .param_str(key)
            .ok_or_else(|| self.error(BAD_REQUEST, format!("missing parameter '{key}'")))
    }

    fn name<'a>(&self, request: &'a RpcRequest) -> Result<&'a str, RpcError> {
        self.required(request, "name")
    }

    fn host<'a>(&self, request: &'a RpcRequest) -> Result<&'a str, RpcError> {
        self.required(request, "host")
    }

    fn missing_cluster(&self, name: &str) -> RpcError {
        self.error(NOT_FOUND, format!("cluster '{name}' does not exist"))
    }

    fn list_clusters(&self) -> Value {
        let mut names: Vec<String> = self.clusters.iter().map(|c| c.key().clone()).collect();
        names.sort();
        Value::Array(names.into_iter().map(|name| json!({ "name": name })).collect())
    }

    fn get_cluster(&self, name: &str) -> Reply {
        let cluster = self.clusters.get(name).ok_or_else(|| self.missing_cluster(name))?;
        Ok(json!({
            "name": cluster.name,
            "network": cluster.network,
            "hostset": cluster.hostset,
            "hosts": { "total": cluster.hostset.len() },
        }))
    }

    fn create_cluster(&self, name: &str, network: Option<&str>) -> Reply {
        let network = match network {
            Some(network) if self.networks.contains_key(network) => network,
            _ => DEFAULT_NETWORK,
        };
        let cluster = self
            .clusters
            .entry(name.to_string())
            .or_insert_with(|| {
                tracing::info!(cluster = %name, network = %network, "Cluster created");
                Cluster {
                    name: name.to_string(),
                    network: network.to_string(),
                    hostset: BTreeSet::new(),
                }
            });
        Ok(cluster.summary())
    }

    fn delete_cluster(&self, name: &str) -> Reply {
        self.clusters
            .remove(name)
            .map(|_| json!([]))
            .ok_or_else(|| self.missing_cluster(name))
    }

    fn list_members(&self, name: &str) -> Reply {
        let cluster = self.clusters.get(name).ok_or_else(|| self.missing_cluster(name))?;
        Ok(json!(cluster.hostset))
    }

    fn set_members(&self, name: &str, request: &RpcRequest) -> Reply {
        let old = host_set(request.param("old"))
            .ok_or_else(|| self.error(BAD_REQUEST, "'old' must be a list of host addresses"))?;
        let new = host_set(request.param("new"))
            .ok_or_else(|| self.error(BAD_REQUEST, "'new' must be a list of host addresses"))?;

        let mut cluster = self.clusters.get_mut(name).ok_or_else(|| self.missing_cluster(name))?;
        if cluster.hostset != old {
            return Err(self.error(CONFLICT, format!("conflict setting hosts for cluster {name}")));
        }
        cluster.hostset = new;
        Ok(serde_json::to_value(&*cluster).unwrap_or(Value::Null))
    }

    fn check_member(&self, name: &str, host: &str) -> Reply {
        let cluster = self.clusters.get(name).ok_or_else(|| self.missing_cluster(name))?;
        if cluster.hostset.contains(host) {
            Ok(json!([host]))
        } else {
            Err(self.error(NOT_FOUND, "the requested host is not part of the cluster"))
        }
    }

    fn add_member(&self, name: &str, host: &str) -> Reply {
        let mut cluster = self.clusters.get_mut(name).ok_or_else(|| self.missing_cluster(name))?;
        cluster.hostset.insert(host.to_string());
        Ok(json!([host]))
    }

    fn delete_member(&self, name: &str, host: &str) -> Reply {
        let mut cluster = self.clusters.get_mut(name).ok_or_else(|| self.missing_cluster(name))?;
        cluster.hostset.remove(host);
        Ok(json!([]))
    }

    fn list_networks(&self) -> Value {
        let mut names: Vec<String> = self.networks.iter().map(|n| n.key().clone()).collect();
        names.sort();
        Value::Array(names.into_iter().map(|name| json!({ "name": name })).collect())
    }

    fn get_network(&self, name: &str) -> Reply {
        self.networks
            .get(name)
            .map(|network| json!(*network))
            .ok_or_else(|| self.error(NOT_FOUND, format!("network '{name}' does not exist")))
    }

    fn create_network(&self, name: &str, request: &RpcRequest) -> Reply {
        let kind = request.param_str("type").unwrap_or("flat_ip");
        if !NETWORK_TYPES.contains(&kind) {
            return Err(self.error(BAD_REQUEST, format!("unknown network type '{kind}'")));
        }
        let options = match request.param("options") {
            None => json!({}),
            Some(options @ Value::Object(_)) => options.clone(),
            Some(_) => return Err(self.error(BAD_REQUEST, "'options' must be an object")),
        };
        let wanted = Network {
            name: name.to_string(),
            kind: kind.to_string(),
            options,
        };

        match self.networks.entry(name.to_string()) {
            Entry::Occupied(existing) if *existing.get() == wanted => Ok(json!(wanted)),
            Entry::Occupied(_) => Err(self.error(CONFLICT, "a network with that name already exists")),
            Entry::Vacant(slot) => {
                tracing::info!(network = %name, kind = %kind, "Network created");
                slot.insert(wanted.clone());
                Ok(json!(wanted))
            }
        }
    }

    fn delete_network(&self, name: &str) -> Reply {
        self.networks
            .remove(name)
            .map(|_| json!([]))
            .ok_or_else(|| self.error(NOT_FOUND, format!("network '{name}' does not exist")))
    }
}

fn host_set(value: Option<&Value>) -> Option<BTreeSet<String>> {
    value?
        .as_array()?
        .iter()
        .map(|item| item.as_str().map(str::to_string))
        .collect()
}
