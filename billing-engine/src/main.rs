//! Overdue sweep entry point.
//!
//! One-shot job, invoked by an external scheduler: flips every issued or
//! partial invoice past its due date to overdue, then exits.

use std::sync::Arc;
use std::time::Duration;

use billing_engine::config::Config;
use billing_engine::services::metrics::init_metrics;
use billing_engine::services::{
    HttpLedgerSync, InvoiceEngine, JournalLedger, LedgerSync, LogEventSink, NullLedgerSync,
};
use billing_engine::store::Database;

use billing_core::observability::init_tracing;
use chrono::Utc;
use secrecy::ExposeSecret;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    // Load configuration
    let config = Config::from_env().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        std::io::Error::other(format!("Configuration error: {}", e))
    })?;

    // Initialize tracing
    init_tracing(&config.service_name, &config.log_level);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting overdue sweep"
    );

    // Initialize metrics
    init_metrics();

    // Log configuration (mask sensitive values)
    tracing::info!(
        service_name = %config.service_name,
        db_max_connections = %config.database.max_connections,
        db_min_connections = %config.database.min_connections,
        ledger_sync_enabled = %config.ledger_sync.enabled,
        ledger_sync_url = %config.ledger_sync.base_url,
        "Configuration loaded"
    );

    let database = Database::new(
        config.database.url.expose_secret(),
        config.database.max_connections,
        config.database.min_connections,
    )
    .await
    .map_err(|e| {
        tracing::error!(error = %e, "Failed to connect to database");
        std::io::Error::other(format!("Database error: {}", e))
    })?;

    database.run_migrations().await.map_err(|e| {
        tracing::error!(error = %e, "Failed to run migrations");
        std::io::Error::other(format!("Migration error: {}", e))
    })?;

    let store = Arc::new(database);
    let sync: Arc<dyn LedgerSync> = if config.ledger_sync.enabled {
        let http = HttpLedgerSync::new(
            &config.ledger_sync.base_url,
            &config.ledger_sync.source_system,
            Duration::from_secs(config.ledger_sync.timeout_seconds),
        )
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to build ledger sync client");
            std::io::Error::other(format!("Ledger sync error: {}", e))
        })?;
        Arc::new(http)
    } else {
        Arc::new(NullLedgerSync)
    };
    let journal = Arc::new(JournalLedger::new(store.clone(), sync));
    let engine = InvoiceEngine::new(store, journal, Arc::new(LogEventSink));

    let as_of = Utc::now().date_naive();
    let count = engine.check_overdue_invoices(as_of).await.map_err(|e| {
        tracing::error!(error = %e, "Overdue sweep failed");
        std::io::Error::other(format!("Sweep error: {}", e))
    })?;

    tracing::info!(as_of = %as_of, count = count, "Overdue sweep finished");
    Ok(())
}
