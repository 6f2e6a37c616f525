use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: booking admissions accepted.
pub const ADMISSIONS_TOTAL: &str = "perch_admissions_total";

/// Counter: booking admissions turned away with a conflict. Conflicts are a
/// routine outcome of concurrent use, counted but never logged as failures.
pub const ADMISSION_CONFLICTS_TOTAL: &str = "perch_admission_conflicts_total";

/// Counter: bookings moved to completed (by sweep or direct call).
pub const BOOKINGS_COMPLETED_TOTAL: &str = "perch_bookings_completed_total";

/// Counter: reviews posted.
pub const REVIEWS_POSTED_TOTAL: &str = "perch_reviews_posted_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: listed properties.
pub const PROPERTIES_ACTIVE: &str = "perch_properties_active";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "perch_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "perch_wal_flush_batch_size";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .expect("failed to install Prometheus metrics exporter");
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
}
