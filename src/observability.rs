use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: availability checks. Labels: outcome (available, conflict, fail_open, error).
pub const AVAILABILITY_CHECKS_TOTAL: &str = "villabook_availability_checks_total";

/// Histogram: engine operation latency in seconds. Labels: operation.
pub const OPERATION_DURATION_SECONDS: &str = "villabook_operation_duration_seconds";

/// Counter: reservations created.
pub const RESERVATIONS_CREATED_TOTAL: &str = "villabook_reservations_created_total";

/// Counter: create attempts rejected because the stay overlaps a blocking reservation.
pub const RESERVATION_CONFLICTS_TOTAL: &str = "villabook_reservation_conflicts_total";

/// Counter: status transitions applied. Labels: status.
pub const STATUS_TRANSITIONS_TOTAL: &str = "villabook_status_transitions_total";

/// Counter: store failures seen by the engine. Labels: operation.
pub const STORE_ERRORS_TOTAL: &str = "villabook_store_errors_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: open change-feed subscriptions.
pub const FEED_SUBSCRIBERS_ACTIVE: &str = "villabook_feed_subscribers_active";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "villabook_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "villabook_wal_flush_batch_size";

/// Counter: WAL compactions. Labels: status (ok, error).
pub const WAL_COMPACTIONS_TOTAL: &str = "villabook_wal_compactions_total";

/// Install the Prometheus exporter on `port`. No-op if `port` is None.
pub fn init(port: Option<u16>) -> Result<(), metrics_exporter_prometheus::BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}
