//! Prometheus metrics for facturacion-service.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, HistogramVec, TextEncoder,
};

/// Issued invoice counter by outcome.
pub static INVOICES_ISSUED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "facturacion_invoices_issued_total",
        "Total number of issuance attempts by outcome",
        &["outcome"] // accepted, rejected, sent, failed
    )
    .expect("Failed to register invoices_issued_total")
});

/// Webhook deliveries by event type and result.
pub static WEBHOOK_EVENTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "facturacion_webhook_events_total",
        "Total number of webhook deliveries by type and result",
        &["event_type", "result"]
    )
    .expect("Failed to register webhook_events_total")
});

/// Outbound authority/relay request counter.
pub static AUTHORITY_REQUESTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "facturacion_authority_requests_total",
        "Total number of outbound authority requests by operation and result",
        &["operation", "result"]
    )
    .expect("Failed to register authority_requests_total")
});

/// Pipeline stage duration histogram.
pub static PIPELINE_STAGE_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "facturacion_pipeline_stage_duration_seconds",
        "Document pipeline stage duration in seconds",
        &["stage"],
        vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    )
    .expect("Failed to register pipeline_stage_duration")
});

/// Database query duration histogram.
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "facturacion_db_query_duration_seconds",
        "Database query duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .expect("Failed to register db_query_duration")
});

/// Initialize all metrics (forces lazy initialization).
pub fn init_metrics() {
    Lazy::force(&INVOICES_ISSUED_TOTAL);
    Lazy::force(&WEBHOOK_EVENTS_TOTAL);
    Lazy::force(&AUTHORITY_REQUESTS_TOTAL);
    Lazy::force(&PIPELINE_STAGE_DURATION);
    Lazy::force(&DB_QUERY_DURATION);
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder
        .encode_to_string(&metric_families)
        .unwrap_or_default()
}
