//! Best-effort sync of journal entries to the core accounting system.
//!
//! A non-2xx response or a network failure is surfaced as
//! `AppError::Integration`; the caller logs and discards it. No retry
//! queue lives here — reconciliation re-pushes missed entries
//! out-of-band.

use std::time::Duration;

use billing_core::error::AppError;
use serde::Serialize;
use tracing::{debug, instrument};

use crate::models::{JournalEntry, JournalLine};

const SOURCE_SYSTEM_HEADER: &str = "X-Source-System";

#[derive(Serialize)]
struct JournalEntryPayload<'a> {
    #[serde(flatten)]
    entry: &'a JournalEntry,
    lines: &'a [JournalLine],
}

/// Core accounting system seam.
#[async_trait::async_trait]
pub trait LedgerSync: Send + Sync {
    async fn push_entry(
        &self,
        entry: &JournalEntry,
        lines: &[JournalLine],
    ) -> Result<(), AppError>;
}

/// HTTP client for the core accounting system.
pub struct HttpLedgerSync {
    client: reqwest::Client,
    base_url: String,
    source_system: String,
}

impl HttpLedgerSync {
    pub fn new(
        base_url: &str,
        source_system: &str,
        timeout: Duration,
    ) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Config(anyhow::anyhow!("Failed to build client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            source_system: source_system.to_string(),
        })
    }
}

#[async_trait::async_trait]
impl LedgerSync for HttpLedgerSync {
    #[instrument(skip(self, entry, lines), fields(entry_no = %entry.entry_no))]
    async fn push_entry(
        &self,
        entry: &JournalEntry,
        lines: &[JournalLine],
    ) -> Result<(), AppError> {
        let url = format!("{}/journal-entries", self.base_url);
        let response = self
            .client
            .post(&url)
            .header(SOURCE_SYSTEM_HEADER, &self.source_system)
            .json(&JournalEntryPayload { entry, lines })
            .send()
            .await
            .map_err(|e| AppError::Integration(anyhow::anyhow!("Ledger sync failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::Integration(anyhow::anyhow!(
                "Ledger sync rejected entry '{}': HTTP {}",
                entry.entry_no,
                response.status()
            )));
        }

        debug!(entry_no = %entry.entry_no, "Journal entry synced");
        Ok(())
    }
}

/// No-op sync used when the integration is disabled.
pub struct NullLedgerSync;

#[async_trait::async_trait]
impl LedgerSync for NullLedgerSync {
    async fn push_entry(
        &self,
        _entry: &JournalEntry,
        _lines: &[JournalLine],
    ) -> Result<(), AppError> {
        Ok(())
    }
}
