//! Route table and lookup.
//!
//! # Responsibilities
//! - Store compiled routes
//! - Look up the route for a method and path
//! - Return matched route or explicit no-match
//!
//! # Design Decisions
//! - Immutable after construction; reload builds a new table
//! - O(n) scan in registration order (acceptable for typical route counts)
//! - First match wins
//! - Every handler is wrapped in a `JsonRpcHandler` at registration

use std::sync::Arc;

use axum::http::Method;

use crate::handlers::adapter::JsonRpcHandler;
use crate::handlers::Handler;
use crate::routing::matcher::{PathParams, PathPattern, PatternError};

/// One registered route.
pub struct RouteEntry {
    pub method: Method,
    pub pattern: PathPattern,
    /// Bus address handlers for this route talk to.
    pub routing_key: String,
    pub handler: JsonRpcHandler,
}

impl RouteEntry {
    /// Tag the route as an idempotent add-to-set operation (200 instead of 201 on PUT).
    pub fn member_add(&mut self) -> &mut Self {
        self.handler.set_member_add(true);
        self
    }

    pub fn is_member_add(&self) -> bool {
        self.handler.is_member_add()
    }
}

impl std::fmt::Debug for RouteEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteEntry")
            .field("method", &self.method)
            .field("pattern", &self.pattern.template())
            .field("routing_key", &self.routing_key)
            .field("member_add", &self.is_member_add())
            .finish()
    }
}

/// A successful lookup.
#[derive(Debug)]
pub struct RouteMatch<'a> {
    pub entry: &'a RouteEntry,
    pub params: PathParams,
}

/// Ordered collection of routes.
#[derive(Debug, Default)]
pub struct RouteTable {
    entries: Vec<RouteEntry>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `method` on `template`.
    pub fn connect<H: Handler>(
        &mut self,
        method: Method,
        template: &str,
        routing_key: &str,
        handler: H,
    ) -> Result<&mut RouteEntry, PatternError> {
        let pattern = PathPattern::parse(template)?;
        tracing::debug!(method = %method, template = %template, routing_key = %routing_key, "Route registered");
        self.entries.push(RouteEntry {
            method,
            pattern,
            routing_key: routing_key.to_string(),
            handler: JsonRpcHandler::new(Arc::new(handler)),
        });
        let last = self.entries.len() - 1;
        Ok(&mut self.entries[last])
    }

    /// Find the first route matching `method` and `path`.
    pub fn lookup(&self, method: &Method, path: &str) -> Option<RouteMatch<'_>> {
        self.entries
            .iter()
            .filter(|entry| entry.method == *method)
            .find_map(|entry| entry.pattern.matches(path).map(|params| RouteMatch { entry, params }))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RouteEntry> {
        self.entries.iter()
    }
}
