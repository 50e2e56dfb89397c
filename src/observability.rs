use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

// ── Reconciliation ──────────────────────────────────────────────

/// Counter: reconciliation rounds finished. Labels: outcome (published, discarded).
pub const ROUNDS_TOTAL: &str = "weekbook_rounds_total";

/// Histogram: fetch + merge duration of one round in seconds.
pub const ROUND_DURATION_SECONDS: &str = "weekbook_round_duration_seconds";

/// Counter: region availability fetches that degraded a round. Labels: reason.
pub const REGION_FETCH_FAILURES_TOTAL: &str = "weekbook_region_fetch_failures_total";

// ── Mutations ───────────────────────────────────────────────────

/// Counter: booking mutations. Labels: op, status.
pub const MUTATIONS_TOTAL: &str = "weekbook_mutations_total";

/// Install the Prometheus exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}
