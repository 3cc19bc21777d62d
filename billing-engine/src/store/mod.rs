//! Persistence boundary for billing-engine.
//!
//! The engine only requires read-by-id, read-by-filter, create and a few
//! conditional updates; nothing here depends on a database-specific
//! feature. `postgres` is the production implementation, `memory` backs
//! the test suite and embedded use.

use billing_core::error::AppError;
use chrono::NaiveDate;
use uuid::Uuid;

use crate::models::{
    Customer, Debt, Invoice, InvoiceItem, InvoicePaymentUpdate, JournalEntry, JournalLine, Meter,
    MeterReading, Payment, TariffSlab,
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::Database;

#[async_trait::async_trait]
pub trait RecordStore: Send + Sync {
    // Customers, meters, readings
    async fn get_customer(&self, customer_id: Uuid) -> Result<Option<Customer>, AppError>;
    async fn list_active_meters(&self, customer_id: Uuid) -> Result<Vec<Meter>, AppError>;
    async fn find_unprocessed_reading(
        &self,
        meter_id: Uuid,
        billing_period: &str,
    ) -> Result<Option<MeterReading>, AppError>;

    // Tariffs
    /// Slabs for a category, ordered by `from_unit` ascending.
    async fn tariff_slabs(&self, category: &str) -> Result<Vec<TariffSlab>, AppError>;

    // Invoices
    async fn get_invoice(&self, invoice_id: Uuid) -> Result<Option<Invoice>, AppError>;
    /// The non-cancelled invoice for a (customer, period) pair, if any.
    async fn find_invoice_for_period(
        &self,
        customer_id: Uuid,
        billing_period: &str,
    ) -> Result<Option<Invoice>, AppError>;
    /// Atomically persist the invoice with its items and mark the source
    /// reading processed.
    async fn create_invoice(
        &self,
        invoice: &Invoice,
        items: &[InvoiceItem],
        reading_id: Uuid,
    ) -> Result<Invoice, AppError>;
    async fn get_invoice_items(&self, invoice_id: Uuid) -> Result<Vec<InvoiceItem>, AppError>;
    /// Conditional payment-state write; returns `None` when the version
    /// check fails or the invoice is missing.
    async fn update_invoice_payment(
        &self,
        invoice_id: Uuid,
        update: &InvoicePaymentUpdate,
    ) -> Result<Option<Invoice>, AppError>;
    /// Conditional cancellation: only open, unpaid invoices match.
    async fn cancel_invoice(
        &self,
        invoice_id: Uuid,
        reason: &str,
    ) -> Result<Option<Invoice>, AppError>;
    /// Transition every issued/partial invoice past due to overdue.
    /// Returns the number of invoices transitioned.
    async fn mark_overdue(&self, as_of: NaiveDate) -> Result<u64, AppError>;

    // Payments
    async fn create_payment(&self, payment: &Payment) -> Result<Payment, AppError>;
    async fn get_payment(&self, payment_id: Uuid) -> Result<Option<Payment>, AppError>;
    /// Conditional cancellation: only confirmed payments match.
    async fn cancel_payment(
        &self,
        payment_id: Uuid,
        reason: &str,
    ) -> Result<Option<Payment>, AppError>;

    // Debts
    async fn create_debt(&self, debt: &Debt) -> Result<Debt, AppError>;
    async fn get_debt(&self, debt_id: Uuid) -> Result<Option<Debt>, AppError>;
    async fn update_debt_payment(
        &self,
        debt_id: Uuid,
        paid_amount: rust_decimal::Decimal,
        remaining_amount: rust_decimal::Decimal,
        status: &str,
    ) -> Result<Option<Debt>, AppError>;
    async fn write_off_debt(&self, debt_id: Uuid, notes: &str) -> Result<Option<Debt>, AppError>;
    /// Non-deleted debts in outstanding or partial status.
    async fn list_open_debts(&self) -> Result<Vec<Debt>, AppError>;

    // Journal
    /// Atomically persist a journal entry with its lines.
    async fn create_journal_entry(
        &self,
        entry: &JournalEntry,
        lines: &[JournalLine],
    ) -> Result<JournalEntry, AppError>;
    async fn get_journal_entry(&self, journal_id: Uuid)
        -> Result<Option<JournalEntry>, AppError>;
    async fn get_journal_lines(&self, journal_id: Uuid) -> Result<Vec<JournalLine>, AppError>;
    /// The posted entry originated by a business object, if any.
    async fn find_journal_for_reference(
        &self,
        reference_type: &str,
        reference_id: Uuid,
    ) -> Result<Option<JournalEntry>, AppError>;
    /// Conditional flip posted -> reversed.
    async fn mark_journal_reversed(
        &self,
        journal_id: Uuid,
    ) -> Result<Option<JournalEntry>, AppError>;

    // Sequences
    /// Next value of the monotonic counter for a scope such as
    /// `JE-202601`. Starts at 1.
    async fn next_sequence(&self, scope: &str) -> Result<i64, AppError>;
}
