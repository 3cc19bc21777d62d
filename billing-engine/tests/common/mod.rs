#![allow(dead_code)]

use std::str::FromStr;
use std::sync::{Arc, Mutex};

use billing_core::error::AppError;
use rust_decimal::Decimal;

use chrono::NaiveDate;
use uuid::Uuid;

use billing_engine::models::{
    Customer, Debt, Invoice, InvoiceItem, InvoicePaymentUpdate, JournalEntry, JournalLine, Meter,
    MeterReading, Payment, TariffSlab,
};
use billing_engine::services::{
    DebtTracker, DomainEvent, EventSink, InvoiceEngine, JournalLedger, LedgerSync, NullLedgerSync,
    PaymentLedger,
};
use billing_engine::store::{MemoryStore, RecordStore};

pub fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

/// Event sink that keeps every published event for assertions.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<DomainEvent>>,
}

impl RecordingSink {
    pub fn types(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.event_type.clone())
            .collect()
    }
}

#[async_trait::async_trait]
impl EventSink for RecordingSink {
    async fn publish(&self, event: DomainEvent) -> Result<(), AppError> {
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}

/// Ledger sync stub that always fails, for exercising the best-effort
/// path.
pub struct FailingLedgerSync;

#[async_trait::async_trait]
impl LedgerSync for FailingLedgerSync {
    async fn push_entry(
        &self,
        _entry: &JournalEntry,
        _lines: &[JournalLine],
    ) -> Result<(), AppError> {
        Err(AppError::Integration(anyhow::anyhow!(
            "core ledger unreachable"
        )))
    }
}

/// Store wrapper whose invoice payment update always loses the version
/// race, so every retry comes back empty-handed. Remembers the ids of
/// created payments for assertions.
pub struct ContendedStore {
    pub inner: Arc<MemoryStore>,
    pub created_payments: Mutex<Vec<Uuid>>,
}

impl ContendedStore {
    pub fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            created_payments: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait::async_trait]
impl RecordStore for ContendedStore {
    async fn get_customer(&self, customer_id: Uuid) -> Result<Option<Customer>, AppError> {
        self.inner.get_customer(customer_id).await
    }

    async fn list_active_meters(&self, customer_id: Uuid) -> Result<Vec<Meter>, AppError> {
        self.inner.list_active_meters(customer_id).await
    }

    async fn find_unprocessed_reading(
        &self,
        meter_id: Uuid,
        billing_period: &str,
    ) -> Result<Option<MeterReading>, AppError> {
        self.inner
            .find_unprocessed_reading(meter_id, billing_period)
            .await
    }

    async fn tariff_slabs(&self, category: &str) -> Result<Vec<TariffSlab>, AppError> {
        self.inner.tariff_slabs(category).await
    }

    async fn get_invoice(&self, invoice_id: Uuid) -> Result<Option<Invoice>, AppError> {
        self.inner.get_invoice(invoice_id).await
    }

    async fn find_invoice_for_period(
        &self,
        customer_id: Uuid,
        billing_period: &str,
    ) -> Result<Option<Invoice>, AppError> {
        self.inner
            .find_invoice_for_period(customer_id, billing_period)
            .await
    }

    async fn create_invoice(
        &self,
        invoice: &Invoice,
        items: &[InvoiceItem],
        reading_id: Uuid,
    ) -> Result<Invoice, AppError> {
        self.inner.create_invoice(invoice, items, reading_id).await
    }

    async fn get_invoice_items(&self, invoice_id: Uuid) -> Result<Vec<InvoiceItem>, AppError> {
        self.inner.get_invoice_items(invoice_id).await
    }

    async fn update_invoice_payment(
        &self,
        _invoice_id: Uuid,
        _update: &InvoicePaymentUpdate,
    ) -> Result<Option<Invoice>, AppError> {
        Ok(None)
    }

    async fn cancel_invoice(
        &self,
        invoice_id: Uuid,
        reason: &str,
    ) -> Result<Option<Invoice>, AppError> {
        self.inner.cancel_invoice(invoice_id, reason).await
    }

    async fn mark_overdue(&self, as_of: NaiveDate) -> Result<u64, AppError> {
        self.inner.mark_overdue(as_of).await
    }

    async fn create_payment(&self, payment: &Payment) -> Result<Payment, AppError> {
        let created = self.inner.create_payment(payment).await?;
        self.created_payments.lock().unwrap().push(created.payment_id);
        Ok(created)
    }

    async fn get_payment(&self, payment_id: Uuid) -> Result<Option<Payment>, AppError> {
        self.inner.get_payment(payment_id).await
    }

    async fn cancel_payment(
        &self,
        payment_id: Uuid,
        reason: &str,
    ) -> Result<Option<Payment>, AppError> {
        self.inner.cancel_payment(payment_id, reason).await
    }

    async fn create_debt(&self, debt: &Debt) -> Result<Debt, AppError> {
        self.inner.create_debt(debt).await
    }

    async fn get_debt(&self, debt_id: Uuid) -> Result<Option<Debt>, AppError> {
        self.inner.get_debt(debt_id).await
    }

    async fn update_debt_payment(
        &self,
        debt_id: Uuid,
        paid_amount: Decimal,
        remaining_amount: Decimal,
        status: &str,
    ) -> Result<Option<Debt>, AppError> {
        self.inner
            .update_debt_payment(debt_id, paid_amount, remaining_amount, status)
            .await
    }

    async fn write_off_debt(&self, debt_id: Uuid, notes: &str) -> Result<Option<Debt>, AppError> {
        self.inner.write_off_debt(debt_id, notes).await
    }

    async fn list_open_debts(&self) -> Result<Vec<Debt>, AppError> {
        self.inner.list_open_debts().await
    }

    async fn create_journal_entry(
        &self,
        entry: &JournalEntry,
        lines: &[JournalLine],
    ) -> Result<JournalEntry, AppError> {
        self.inner.create_journal_entry(entry, lines).await
    }

    async fn get_journal_entry(
        &self,
        journal_id: Uuid,
    ) -> Result<Option<JournalEntry>, AppError> {
        self.inner.get_journal_entry(journal_id).await
    }

    async fn get_journal_lines(&self, journal_id: Uuid) -> Result<Vec<JournalLine>, AppError> {
        self.inner.get_journal_lines(journal_id).await
    }

    async fn find_journal_for_reference(
        &self,
        reference_type: &str,
        reference_id: Uuid,
    ) -> Result<Option<JournalEntry>, AppError> {
        self.inner
            .find_journal_for_reference(reference_type, reference_id)
            .await
    }

    async fn mark_journal_reversed(
        &self,
        journal_id: Uuid,
    ) -> Result<Option<JournalEntry>, AppError> {
        self.inner.mark_journal_reversed(journal_id).await
    }

    async fn next_sequence(&self, scope: &str) -> Result<i64, AppError> {
        self.inner.next_sequence(scope).await
    }
}

/// Engines wired over a seeded in-memory store: one active residential
/// customer with a single meter, slabs `[0,200)@0.5` (fixed charge 50)
/// and `[200,inf)@0.8`.
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub invoices: Arc<InvoiceEngine>,
    pub payments: PaymentLedger,
    pub debts: DebtTracker,
    pub events: Arc<RecordingSink>,
    pub customer: Customer,
    pub meter: Meter,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_sync(Arc::new(NullLedgerSync))
    }

    pub fn with_sync(sync: Arc<dyn LedgerSync>) -> Self {
        let store = Arc::new(MemoryStore::new());
        let customer = store.insert_customer("Asha Perera", "residential", true);
        let meter = store.insert_meter(customer.customer_id, "MTR-0001", true);
        store.insert_slab("residential", dec("0"), Some(dec("200")), dec("0.5"), Some(dec("50")));
        store.insert_slab("residential", dec("200"), None, dec("0.8"), None);

        let events = Arc::new(RecordingSink::default());
        let journal = Arc::new(JournalLedger::new(store.clone(), sync));
        let invoices = Arc::new(InvoiceEngine::new(
            store.clone(),
            journal.clone(),
            events.clone(),
        ));
        let payments = PaymentLedger::new(
            store.clone(),
            journal.clone(),
            invoices.clone(),
            events.clone(),
        );
        let debts = DebtTracker::new(store.clone());

        Self {
            store,
            invoices,
            payments,
            debts,
            events,
            customer,
            meter,
        }
    }

    pub fn add_reading(&self, period: &str, previous: &str, current: &str) -> MeterReading {
        self.store.insert_reading(
            self.meter.meter_id,
            self.customer.customer_id,
            period,
            dec(previous),
            dec(current),
        )
    }
}
