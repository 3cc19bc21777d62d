//! In-memory `RecordStore` used by the test suite and embedded tooling.
//!
//! Mirrors the conditional-update semantics of the Postgres store: the
//! version check on invoices and the status guards on cancellation are
//! all evaluated under one lock.

use std::collections::HashMap;
use std::sync::Mutex;

use billing_core::error::AppError;
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::models::{
    Customer, Debt, DebtStatus, Invoice, InvoiceItem, InvoicePaymentUpdate, InvoiceStatus,
    JournalEntry, JournalLine, JournalStatus, Meter, MeterReading, Payment, PaymentStatus,
    TariffSlab,
};
use crate::store::RecordStore;

#[derive(Default)]
struct Inner {
    customers: HashMap<Uuid, Customer>,
    meters: Vec<Meter>,
    readings: HashMap<Uuid, MeterReading>,
    slabs: Vec<TariffSlab>,
    invoices: HashMap<Uuid, Invoice>,
    invoice_items: HashMap<Uuid, Vec<InvoiceItem>>,
    payments: HashMap<Uuid, Payment>,
    debts: HashMap<Uuid, Debt>,
    journal_entries: HashMap<Uuid, JournalEntry>,
    journal_lines: HashMap<Uuid, Vec<JournalLine>>,
    sequences: HashMap<String, i64>,
}

/// In-memory record store.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // Lock poisoning only happens after a panic elsewhere; tests want
        // the underlying data regardless.
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    // ---------------------------------------------------------------------
    // Seeding helpers (customer/meter/reading/tariff records are owned by
    // the surrounding back office, not by the engine)
    // ---------------------------------------------------------------------

    pub fn insert_customer(&self, name: &str, tariff_category: &str, active: bool) -> Customer {
        let customer = Customer {
            customer_id: Uuid::new_v4(),
            name: name.to_string(),
            tariff_category: tariff_category.to_string(),
            active,
            created_utc: Utc::now(),
        };
        self.lock()
            .customers
            .insert(customer.customer_id, customer.clone());
        customer
    }

    pub fn insert_meter(&self, customer_id: Uuid, serial_no: &str, active: bool) -> Meter {
        let meter = Meter {
            meter_id: Uuid::new_v4(),
            customer_id,
            serial_no: serial_no.to_string(),
            active,
            created_utc: Utc::now(),
        };
        self.lock().meters.push(meter.clone());
        meter
    }

    pub fn insert_reading(
        &self,
        meter_id: Uuid,
        customer_id: Uuid,
        billing_period: &str,
        previous_reading: Decimal,
        current_reading: Decimal,
    ) -> MeterReading {
        let reading = MeterReading {
            reading_id: Uuid::new_v4(),
            meter_id,
            customer_id,
            billing_period: billing_period.to_string(),
            previous_reading,
            current_reading,
            processed: false,
            created_utc: Utc::now(),
        };
        self.lock()
            .readings
            .insert(reading.reading_id, reading.clone());
        reading
    }

    pub fn insert_slab(
        &self,
        category: &str,
        from_unit: Decimal,
        to_unit: Option<Decimal>,
        rate_per_unit: Decimal,
        fixed_charge: Option<Decimal>,
    ) -> TariffSlab {
        let slab = TariffSlab {
            slab_id: Uuid::new_v4(),
            category: category.to_string(),
            from_unit,
            to_unit,
            rate_per_unit,
            fixed_charge,
            created_utc: Utc::now(),
        };
        self.lock().slabs.push(slab.clone());
        slab
    }

    /// Whether the reading has been consumed by invoice generation.
    pub fn reading_processed(&self, reading_id: Uuid) -> bool {
        self.lock()
            .readings
            .get(&reading_id)
            .map(|r| r.processed)
            .unwrap_or(false)
    }
}

#[async_trait::async_trait]
impl RecordStore for MemoryStore {
    async fn get_customer(&self, customer_id: Uuid) -> Result<Option<Customer>, AppError> {
        Ok(self.lock().customers.get(&customer_id).cloned())
    }

    async fn list_active_meters(&self, customer_id: Uuid) -> Result<Vec<Meter>, AppError> {
        Ok(self
            .lock()
            .meters
            .iter()
            .filter(|m| m.customer_id == customer_id && m.active)
            .cloned()
            .collect())
    }

    async fn find_unprocessed_reading(
        &self,
        meter_id: Uuid,
        billing_period: &str,
    ) -> Result<Option<MeterReading>, AppError> {
        Ok(self
            .lock()
            .readings
            .values()
            .find(|r| r.meter_id == meter_id && r.billing_period == billing_period && !r.processed)
            .cloned())
    }

    async fn tariff_slabs(&self, category: &str) -> Result<Vec<TariffSlab>, AppError> {
        let mut slabs: Vec<TariffSlab> = self
            .lock()
            .slabs
            .iter()
            .filter(|s| s.category == category)
            .cloned()
            .collect();
        slabs.sort_by(|a, b| a.from_unit.cmp(&b.from_unit));
        Ok(slabs)
    }

    async fn get_invoice(&self, invoice_id: Uuid) -> Result<Option<Invoice>, AppError> {
        Ok(self.lock().invoices.get(&invoice_id).cloned())
    }

    async fn find_invoice_for_period(
        &self,
        customer_id: Uuid,
        billing_period: &str,
    ) -> Result<Option<Invoice>, AppError> {
        Ok(self
            .lock()
            .invoices
            .values()
            .find(|i| {
                i.customer_id == customer_id
                    && i.billing_period == billing_period
                    && i.parsed_status() != InvoiceStatus::Cancelled
            })
            .cloned())
    }

    async fn create_invoice(
        &self,
        invoice: &Invoice,
        items: &[InvoiceItem],
        reading_id: Uuid,
    ) -> Result<Invoice, AppError> {
        let mut inner = self.lock();

        let duplicate = inner.invoices.values().any(|i| {
            i.customer_id == invoice.customer_id
                && i.billing_period == invoice.billing_period
                && i.parsed_status() != InvoiceStatus::Cancelled
        });
        if duplicate {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Invoice already exists for customer {} period {}",
                invoice.customer_id,
                invoice.billing_period
            )));
        }

        let reading = inner
            .readings
            .get_mut(&reading_id)
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Reading {} not found", reading_id)))?;
        if reading.processed {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Reading {} already processed",
                reading_id
            )));
        }
        reading.processed = true;
        inner.invoices.insert(invoice.invoice_id, invoice.clone());
        inner
            .invoice_items
            .insert(invoice.invoice_id, items.to_vec());
        Ok(invoice.clone())
    }

    async fn get_invoice_items(&self, invoice_id: Uuid) -> Result<Vec<InvoiceItem>, AppError> {
        Ok(self
            .lock()
            .invoice_items
            .get(&invoice_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn update_invoice_payment(
        &self,
        invoice_id: Uuid,
        update: &InvoicePaymentUpdate,
    ) -> Result<Option<Invoice>, AppError> {
        let mut inner = self.lock();
        let Some(invoice) = inner.invoices.get_mut(&invoice_id) else {
            return Ok(None);
        };
        if invoice.version != update.expected_version {
            return Ok(None);
        }
        invoice.paid_amount = update.paid_amount;
        invoice.balance = update.balance;
        invoice.status = update.status.clone();
        invoice.paid_utc = update.paid_utc;
        invoice.version += 1;
        Ok(Some(invoice.clone()))
    }

    async fn cancel_invoice(
        &self,
        invoice_id: Uuid,
        reason: &str,
    ) -> Result<Option<Invoice>, AppError> {
        let mut inner = self.lock();
        let Some(invoice) = inner.invoices.get_mut(&invoice_id) else {
            return Ok(None);
        };
        let status = invoice.parsed_status();
        if status == InvoiceStatus::Cancelled
            || status == InvoiceStatus::Paid
            || !invoice.paid_amount.is_zero()
        {
            return Ok(None);
        }
        invoice.status = InvoiceStatus::Cancelled.as_str().to_string();
        invoice.cancel_reason = Some(reason.to_string());
        invoice.cancelled_utc = Some(Utc::now());
        invoice.version += 1;
        Ok(Some(invoice.clone()))
    }

    async fn mark_overdue(&self, as_of: NaiveDate) -> Result<u64, AppError> {
        let mut inner = self.lock();
        let mut count = 0;
        for invoice in inner.invoices.values_mut() {
            let status = invoice.parsed_status();
            if (status == InvoiceStatus::Issued || status == InvoiceStatus::Partial)
                && invoice.due_date < as_of
            {
                invoice.status = InvoiceStatus::Overdue.as_str().to_string();
                invoice.version += 1;
                count += 1;
            }
        }
        Ok(count)
    }

    async fn create_payment(&self, payment: &Payment) -> Result<Payment, AppError> {
        self.lock()
            .payments
            .insert(payment.payment_id, payment.clone());
        Ok(payment.clone())
    }

    async fn get_payment(&self, payment_id: Uuid) -> Result<Option<Payment>, AppError> {
        Ok(self.lock().payments.get(&payment_id).cloned())
    }

    async fn cancel_payment(
        &self,
        payment_id: Uuid,
        reason: &str,
    ) -> Result<Option<Payment>, AppError> {
        let mut inner = self.lock();
        let Some(payment) = inner.payments.get_mut(&payment_id) else {
            return Ok(None);
        };
        if payment.parsed_status() == PaymentStatus::Cancelled {
            return Ok(None);
        }
        payment.status = PaymentStatus::Cancelled.as_str().to_string();
        payment.cancel_reason = Some(reason.to_string());
        payment.cancelled_utc = Some(Utc::now());
        Ok(Some(payment.clone()))
    }

    async fn create_debt(&self, debt: &Debt) -> Result<Debt, AppError> {
        self.lock().debts.insert(debt.debt_id, debt.clone());
        Ok(debt.clone())
    }

    async fn get_debt(&self, debt_id: Uuid) -> Result<Option<Debt>, AppError> {
        Ok(self.lock().debts.get(&debt_id).cloned())
    }

    async fn update_debt_payment(
        &self,
        debt_id: Uuid,
        paid_amount: Decimal,
        remaining_amount: Decimal,
        status: &str,
    ) -> Result<Option<Debt>, AppError> {
        let mut inner = self.lock();
        let Some(debt) = inner.debts.get_mut(&debt_id) else {
            return Ok(None);
        };
        debt.paid_amount = paid_amount;
        debt.remaining_amount = remaining_amount;
        debt.status = status.to_string();
        Ok(Some(debt.clone()))
    }

    async fn write_off_debt(&self, debt_id: Uuid, notes: &str) -> Result<Option<Debt>, AppError> {
        let mut inner = self.lock();
        let Some(debt) = inner.debts.get_mut(&debt_id) else {
            return Ok(None);
        };
        debt.status = DebtStatus::WrittenOff.as_str().to_string();
        debt.notes = Some(match &debt.notes {
            Some(existing) => format!("{existing}; {notes}"),
            None => notes.to_string(),
        });
        Ok(Some(debt.clone()))
    }

    async fn list_open_debts(&self) -> Result<Vec<Debt>, AppError> {
        Ok(self
            .lock()
            .debts
            .values()
            .filter(|d| {
                !d.is_deleted
                    && matches!(
                        d.parsed_status(),
                        DebtStatus::Outstanding | DebtStatus::Partial
                    )
            })
            .cloned()
            .collect())
    }

    async fn create_journal_entry(
        &self,
        entry: &JournalEntry,
        lines: &[JournalLine],
    ) -> Result<JournalEntry, AppError> {
        let mut inner = self.lock();
        inner.journal_entries.insert(entry.journal_id, entry.clone());
        inner.journal_lines.insert(entry.journal_id, lines.to_vec());
        Ok(entry.clone())
    }

    async fn get_journal_entry(
        &self,
        journal_id: Uuid,
    ) -> Result<Option<JournalEntry>, AppError> {
        Ok(self.lock().journal_entries.get(&journal_id).cloned())
    }

    async fn get_journal_lines(&self, journal_id: Uuid) -> Result<Vec<JournalLine>, AppError> {
        Ok(self
            .lock()
            .journal_lines
            .get(&journal_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn find_journal_for_reference(
        &self,
        reference_type: &str,
        reference_id: Uuid,
    ) -> Result<Option<JournalEntry>, AppError> {
        Ok(self
            .lock()
            .journal_entries
            .values()
            .find(|e| {
                e.reference_type == reference_type
                    && e.reference_id == reference_id
                    && e.parsed_status() == JournalStatus::Posted
            })
            .cloned())
    }

    async fn mark_journal_reversed(
        &self,
        journal_id: Uuid,
    ) -> Result<Option<JournalEntry>, AppError> {
        let mut inner = self.lock();
        let Some(entry) = inner.journal_entries.get_mut(&journal_id) else {
            return Ok(None);
        };
        if entry.parsed_status() != JournalStatus::Posted {
            return Ok(None);
        }
        entry.status = JournalStatus::Reversed.as_str().to_string();
        Ok(Some(entry.clone()))
    }

    async fn next_sequence(&self, scope: &str) -> Result<i64, AppError> {
        let mut inner = self.lock();
        let counter = inner.sequences.entry(scope.to_string()).or_insert(0);
        *counter += 1;
        Ok(*counter)
    }
}
