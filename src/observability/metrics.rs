//! Metrics collection and exposition.
//!
//! # Metrics
//! - `route_resolutions_total` (counter): resolutions by outcome
//!   (`entry`, `redirect`, `no_route`, `no_host`)
//! - `route_retries_total` (counter): retry decisions by status
//!   (`yes`, `no`, `overflow`)
//! - `route_table_reloads_total` (counter): table reloads by result
//!   (`success`, `failure`)

use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::resilience::RetryStatus;

/// Install the Prometheus recorder and serve it on `addr`.
///
/// Must be called from within a tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_resolution(outcome: &'static str) {
    metrics::counter!("route_resolutions_total", "outcome" => outcome).increment(1);
}

pub fn record_retry(status: RetryStatus) {
    metrics::counter!("route_retries_total", "status" => status.as_str()).increment(1);
}

pub fn record_table_reload(success: bool) {
    let result = if success { "success" } else { "failure" };
    metrics::counter!("route_table_reloads_total", "result" => result).increment(1);
}
