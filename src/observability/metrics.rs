//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by outcome and status
//! - `gateway_request_duration_seconds` (histogram): time until the
//!   response head is ready
//! - `gateway_tunnels_active` (gauge): relayed upgrade sessions
//! - `gateway_tunnel_bytes_total` (counter): relayed bytes by direction
//!
//! Recording is a no-op until [`init_metrics`] installs a recorder.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// How a request left the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Forwarded,
    Tunneled,
    Unauthenticated,
    Rejected,
    AuthError,
    UpstreamError,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Forwarded => "forwarded",
            Outcome::Tunneled => "tunneled",
            Outcome::Unauthenticated => "unauthenticated",
            Outcome::Rejected => "rejected",
            Outcome::AuthError => "auth_error",
            Outcome::UpstreamError => "upstream_error",
        }
    }
}

/// Install the Prometheus recorder and its scrape listener.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_request(outcome: Outcome, status: u16, start: Instant) {
    counter!(
        "gateway_requests_total",
        "outcome" => outcome.as_str(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("gateway_request_duration_seconds", "outcome" => outcome.as_str())
        .record(start.elapsed().as_secs_f64());
}

pub fn tunnel_opened() {
    gauge!("gateway_tunnels_active").increment(1.0);
}

pub fn tunnel_closed() {
    gauge!("gateway_tunnels_active").decrement(1.0);
}

/// `direction` is `upstream` (client to backend) or `downstream`.
pub fn record_tunnel_bytes(direction: &'static str, bytes: u64) {
    counter!("gateway_tunnel_bytes_total", "direction" => direction).increment(bytes);
}
