//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_apply_steps_total` (counter): dispatch steps by step, outcome
//! - `gateway_listener_binds_total` (counter): bind attempts by protocol, result
//! - `gateway_listener_active` (gauge): 1 while a protocol has a listener
//! - `gateway_connections_total` (counter): accepted connections by protocol
//! - `gateway_dns_server_running` (gauge): 1 while the DNS listener runs

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::net::Protocol;

/// Install the Prometheus exporter on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    let builder = PrometheusBuilder::new().with_http_listener(addr);
    match builder.install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_apply_step(step: &'static str, outcome: &'static str) {
    counter!("gateway_apply_steps_total", "step" => step, "outcome" => outcome).increment(1);
}

pub fn record_listener_bind(protocol: Protocol, ok: bool) {
    let result = if ok { "ok" } else { "error" };
    counter!("gateway_listener_binds_total", "protocol" => protocol.as_str(), "result" => result).increment(1);
}

pub fn record_listener_active(protocol: Protocol, active: bool) {
    gauge!("gateway_listener_active", "protocol" => protocol.as_str()).set(if active { 1.0 } else { 0.0 });
}

pub fn record_connection(protocol: Protocol) {
    counter!("gateway_connections_total", "protocol" => protocol.as_str()).increment(1);
}

pub fn record_dns_server(running: bool) {
    gauge!("gateway_dns_server_running").set(if running { 1.0 } else { 0.0 });
}
