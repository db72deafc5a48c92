//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define load generator metrics (pools, workers, health, workload outcomes)
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `loadgen_enabled_targets` (gauge): enabled targets by backend
//! - `loadgen_live_managers` (gauge): running target managers by backend
//! - `loadgen_live_workers` (gauge): running workers by backend, target
//! - `loadgen_target_healthy` (gauge): 1=healthy, 0=unhealthy
//! - `loadgen_workload_operations_total` (counter): by backend, workload, outcome
//! - `loadgen_manager_restarts_total` (counter): manager pool restarts by backend, target
//!
//! # Design Decisions
//! - Low-overhead metric updates (atomic operations)
//! - Labels for backend, target and workload only; no per-slot series

use std::net::SocketAddr;

use ::metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::target::{BackendClass, TargetId, Workload};

/// Install the Prometheus recorder and its HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_enabled_targets(backend: BackendClass, count: usize) {
    gauge!("loadgen_enabled_targets", "backend" => backend.as_str()).set(count as f64);
}

pub fn record_live_managers(backend: BackendClass, count: usize) {
    gauge!("loadgen_live_managers", "backend" => backend.as_str()).set(count as f64);
}

pub fn record_live_workers(backend: BackendClass, target: &TargetId, count: usize) {
    gauge!(
        "loadgen_live_workers",
        "backend" => backend.as_str(),
        "target" => target.to_string()
    )
    .set(count as f64);
}

pub fn record_target_health(backend: BackendClass, target: &TargetId, healthy: bool) {
    gauge!(
        "loadgen_target_healthy",
        "backend" => backend.as_str(),
        "target" => target.to_string()
    )
    .set(if healthy { 1.0 } else { 0.0 });
}

pub fn record_workload(backend: BackendClass, workload: Workload, ok: bool) {
    counter!(
        "loadgen_workload_operations_total",
        "backend" => backend.as_str(),
        "workload" => workload.as_str(),
        "outcome" => if ok { "ok" } else { "error" }
    )
    .increment(1);
}

pub fn record_manager_restart(backend: BackendClass, target: &TargetId) {
    counter!(
        "loadgen_manager_restarts_total",
        "backend" => backend.as_str(),
        "target" => target.to_string()
    )
    .increment(1);
}
