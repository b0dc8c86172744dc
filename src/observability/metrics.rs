//! Metrics collection and exposition.
//!
//! # Metrics
//! - `filter_executions_total` (counter): filters run locally, by tier and kind
//! - `filter_delegations_total` (counter): filters handed to the peer tier
//! - `filter_failures_total` (counter): aborted filter chains
//! - `filter_hook_duration_seconds` (histogram): time spent per lifecycle hook
//! - `gateway_requests_total` (counter): forwarded requests by method, status, filtering

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::filter::spec::{FilterKind, LifecyclePoint, Tier};

/// Start the Prometheus scrape endpoint on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_filter_execution(tier: Tier, kind: FilterKind) {
    counter!("filter_executions_total", "tier" => tier.as_str(), "kind" => kind.as_str()).increment(1);
}

pub fn record_filter_delegations(tier: Tier, count: usize) {
    counter!("filter_delegations_total", "tier" => tier.as_str()).increment(count as u64);
}

pub fn record_filter_failure(tier: Tier) {
    counter!("filter_failures_total", "tier" => tier.as_str()).increment(1);
}

pub fn record_hook(point: LifecyclePoint, started: Instant) {
    histogram!("filter_hook_duration_seconds", "hook" => point.as_str())
        .record(started.elapsed().as_secs_f64());
}

pub fn record_request(method: &str, status: u16, filtered: bool) {
    counter!(
        "gateway_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
        "filtered" => if filtered { "true" } else { "false" }
    )
    .increment(1);
}
