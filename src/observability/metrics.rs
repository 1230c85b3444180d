//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define gateway metrics (requests, latency, bus round trips, reply channels)
//! - Expose a Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `gateway_requests_total` (counter): HTTP requests by method, status, route
//! - `gateway_request_duration_seconds` (histogram): HTTP latency
//! - `gateway_bus_requests_total` (counter): bus calls by routing key, outcome
//! - `gateway_bus_request_duration_seconds` (histogram): bus round trip latency
//! - `gateway_reply_channels_open` (gauge): reply channels currently declared
//!
//! # Design Decisions
//! - Recording is a no-op until a recorder is installed (tests never install one)
//! - Labels stay low-cardinality: route templates, never raw paths

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Record one HTTP request.
pub fn record_request(method: &str, status: u16, route: &str, start: Instant) {
    let labels = [
        ("method", method.to_string()),
        ("status", status.to_string()),
        ("route", route.to_string()),
    ];
    counter!("gateway_requests_total", &labels).increment(1);
    histogram!("gateway_request_duration_seconds", &labels).record(start.elapsed().as_secs_f64());
}

/// Record one bus round trip.
pub fn record_bus_request(routing_key: &str, outcome: &'static str, start: Instant) {
    let labels = [("routing_key", routing_key.to_string()), ("outcome", outcome.to_string())];
    counter!("gateway_bus_requests_total", &labels).increment(1);
    histogram!("gateway_bus_request_duration_seconds", &labels).record(start.elapsed().as_secs_f64());
}

pub fn reply_channel_opened() {
    gauge!("gateway_reply_channels_open").increment(1.0);
}

pub fn reply_channel_closed() {
    gauge!("gateway_reply_channels_open").decrement(1.0);
}
