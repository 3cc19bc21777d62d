//! Prometheus metrics for billing-engine.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter, register_counter_vec, register_histogram_vec, Counter, CounterVec,
    HistogramVec, TextEncoder,
};

/// Database query duration histogram.
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "billing_db_query_duration_seconds",
        "Database query duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .expect("Failed to register db_query_duration")
});

/// Invoice generation counter.
pub static INVOICES_GENERATED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "billing_invoices_generated_total",
        "Total number of invoice generation attempts",
        &["status"] // ok, error
    )
    .expect("Failed to register invoices_generated_total")
});

/// Payment operation counter.
pub static PAYMENTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "billing_payments_total",
        "Total number of payment operations",
        &["operation", "status"] // create/cancel/recharge, ok/error
    )
    .expect("Failed to register payments_total")
});

/// Journal entry counter by type.
pub static JOURNAL_ENTRIES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "billing_journal_entries_total",
        "Total number of journal entries posted",
        &["entry_type"]
    )
    .expect("Failed to register journal_entries_total")
});

/// Failed best-effort syncs to the core accounting system.
pub static LEDGER_SYNC_FAILURES_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "billing_ledger_sync_failures_total",
        "Journal entries that failed to reach the core accounting system"
    )
    .expect("Failed to register ledger_sync_failures_total")
});

/// Invoices transitioned by the overdue sweep.
pub static OVERDUE_TRANSITIONS_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "billing_overdue_transitions_total",
        "Invoices transitioned to overdue by the sweep"
    )
    .expect("Failed to register overdue_transitions_total")
});

/// Error counter for alerting.
pub static ERRORS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "billing_errors_total",
        "Total number of errors by type",
        &["error_type"]
    )
    .expect("Failed to register errors_total")
});

/// Initialize all metrics (forces lazy initialization).
pub fn init_metrics() {
    Lazy::force(&DB_QUERY_DURATION);
    Lazy::force(&INVOICES_GENERATED_TOTAL);
    Lazy::force(&PAYMENTS_TOTAL);
    Lazy::force(&JOURNAL_ENTRIES_TOTAL);
    Lazy::force(&LEDGER_SYNC_FAILURES_TOTAL);
    Lazy::force(&OVERDUE_TRANSITIONS_TOTAL);
    Lazy::force(&ERRORS_TOTAL);
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder
        .encode_to_string(&metric_families)
        .unwrap_or_default()
}
