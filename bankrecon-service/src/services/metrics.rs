//! Prometheus metrics for bankrecon-service.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};

/// Histogram for store operation duration.
pub static STORE_OP_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "bankrecon_store_op_duration_seconds",
        "Store operation duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]
    )
    .expect("Failed to register STORE_OP_DURATION")
});

/// Counter for reconciliation ledger operations.
pub static RECONCILIATION_OPERATIONS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "bankrecon_reconciliation_operations_total",
        "Total number of reconciliation ledger operations",
        &["operation", "status"]
    )
    .expect("Failed to register RECONCILIATION_OPERATIONS")
});

/// Counter for suggestion requests.
pub static SUGGESTION_REQUESTS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "bankrecon_suggestion_requests_total",
        "Total number of suggestion requests",
        &["direction"]
    )
    .expect("Failed to register SUGGESTION_REQUESTS")
});

/// Counter for reversal pairings.
pub static REVERSAL_PAIRINGS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "bankrecon_reversal_pairings_total",
        "Total number of reversal pairings",
        &["ledger_impact"]
    )
    .expect("Failed to register REVERSAL_PAIRINGS")
});

/// Counter for allocations.
pub static ALLOCATIONS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "bankrecon_allocations_total",
        "Total number of allocation operations",
        &["operation", "status"]
    )
    .expect("Failed to register ALLOCATIONS")
});

/// Counter for errors.
pub static ERRORS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "bankrecon_errors_total",
        "Total number of errors",
        &["error_type"]
    )
    .expect("Failed to register ERRORS")
});

/// Initialize all metrics (forces lazy initialization).
pub fn init_metrics() {
    Lazy::force(&STORE_OP_DURATION);
    Lazy::force(&RECONCILIATION_OPERATIONS);
    Lazy::force(&SUGGESTION_REQUESTS);
    Lazy::force(&REVERSAL_PAIRINGS);
    Lazy::force(&ALLOCATIONS);
    Lazy::force(&ERRORS);
}

/// Get all metrics as Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}

/// Record a reconciliation ledger operation.
pub fn record_reconciliation_operation(operation: &str, status: &str) {
    RECONCILIATION_OPERATIONS
        .with_label_values(&[operation, status])
        .inc();
}

/// Record a suggestion request.
pub fn record_suggestion_request(direction: &str) {
    SUGGESTION_REQUESTS.with_label_values(&[direction]).inc();
}

/// Record a reversal pairing.
pub fn record_reversal_pairing(ledger_impact: bool) {
    let label = if ledger_impact { "posted" } else { "unposted" };
    REVERSAL_PAIRINGS.with_label_values(&[label]).inc();
}

/// Record an allocation operation.
pub fn record_allocation(operation: &str, status: &str) {
    ALLOCATIONS.with_label_values(&[operation, status]).inc();
}

/// Record an error.
pub fn record_error(error_type: &str) {
    ERRORS.with_label_values(&[error_type]).inc();
}
