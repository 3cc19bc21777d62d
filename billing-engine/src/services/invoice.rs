//! Invoice lifecycle: generation, cancellation, rebilling, balance
//! tracking and the overdue sweep.

use std::sync::Arc;

use billing_core::error::AppError;
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde_json::json;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::models::{
    balance_epsilon, BillingPeriod, GenerateInvoice, Invoice, InvoiceItem, InvoicePaymentUpdate,
    InvoiceStatus, ItemKind,
};
use crate::services::events::{publish_best_effort, EventSink};
use crate::services::journal::JournalLedger;
use crate::services::metrics::{ERRORS_TOTAL, INVOICES_GENERATED_TOTAL, OVERDUE_TRANSITIONS_TOTAL};
use crate::services::tariff;
use crate::store::RecordStore;

/// Flat VAT rate applied to every invoice subtotal.
fn vat_rate() -> Decimal {
    Decimal::new(15, 2)
}

/// Attempts before giving up on a version-guarded balance write.
const MAX_VERSION_RETRIES: u32 = 5;

/// Owns the invoice state machine:
/// `draft -> issued -> {partial -> paid} | overdue | cancelled`.
/// Cancellation is only legal from an open state with nothing paid.
pub struct InvoiceEngine {
    store: Arc<dyn RecordStore>,
    journal: Arc<JournalLedger>,
    events: Arc<dyn EventSink>,
}

impl InvoiceEngine {
    pub fn new(
        store: Arc<dyn RecordStore>,
        journal: Arc<JournalLedger>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            store,
            journal,
            events,
        }
    }

    /// Generate the invoice for a customer and billing period from its
    /// pending meter reading.
    #[instrument(skip(self, input), fields(customer_id = %input.customer_id, billing_period = %input.billing_period))]
    pub async fn generate(&self, input: &GenerateInvoice) -> Result<Invoice, AppError> {
        match self.generate_inner(input).await {
            Ok(invoice) => {
                INVOICES_GENERATED_TOTAL.with_label_values(&["ok"]).inc();
                Ok(invoice)
            }
            Err(e) => {
                INVOICES_GENERATED_TOTAL.with_label_values(&["error"]).inc();
                ERRORS_TOTAL.with_label_values(&[e.kind()]).inc();
                Err(e)
            }
        }
    }

    async fn generate_inner(&self, input: &GenerateInvoice) -> Result<Invoice, AppError> {
        if input.other_charges < Decimal::ZERO {
            return Err(AppError::Validation(format!(
                "Other charges must be non-negative, got {}",
                input.other_charges
            )));
        }
        let period = BillingPeriod::parse(&input.billing_period)?;

        let customer = self
            .store
            .get_customer(input.customer_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(anyhow::anyhow!("Customer {} not found", input.customer_id))
            })?;
        if !customer.active {
            return Err(AppError::Validation(format!(
                "Customer {} is inactive",
                customer.customer_id
            )));
        }

        let meters = self.store.list_active_meters(customer.customer_id).await?;
        let meter = match meters.as_slice() {
            [meter] => meter,
            [] => {
                return Err(AppError::Validation(format!(
                    "Customer {} has no active meter",
                    customer.customer_id
                )))
            }
            _ => {
                return Err(AppError::Validation(format!(
                    "Customer {} has {} active meters, expected exactly one",
                    customer.customer_id,
                    meters.len()
                )))
            }
        };

        if let Some(existing) = self
            .store
            .find_invoice_for_period(customer.customer_id, &input.billing_period)
            .await?
        {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Invoice {} already exists for customer {} period {}",
                existing.invoice_number,
                customer.customer_id,
                input.billing_period
            )));
        }

        let reading = self
            .store
            .find_unprocessed_reading(meter.meter_id, &input.billing_period)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(anyhow::anyhow!(
                    "No unprocessed reading for meter {} in period {}",
                    meter.meter_id,
                    input.billing_period
                ))
            })?;

        let consumption = reading.current_reading - reading.previous_reading;
        if consumption < Decimal::ZERO {
            return Err(AppError::Validation(format!(
                "Reading {} has current below previous ({} < {})",
                reading.reading_id, reading.current_reading, reading.previous_reading
            )));
        }

        let slabs = self.store.tariff_slabs(&customer.tariff_category).await?;
        let breakdown = tariff::calculate(&slabs, consumption)?;

        let subtotal = breakdown.consumption_amount + breakdown.fixed_charge + input.other_charges;
        let vat_amount = subtotal * vat_rate();
        let total = subtotal + vat_amount;

        let seq = self
            .store
            .next_sequence(&format!("INV-{}", period.compact()))
            .await?;
        let invoice_number = format!("INV-{}-{:04}", period.compact(), seq);

        let invoice_id = Uuid::new_v4();
        let now = Utc::now();
        let invoice = Invoice {
            invoice_id,
            invoice_number,
            customer_id: customer.customer_id,
            billing_period: input.billing_period.clone(),
            previous_reading: reading.previous_reading,
            current_reading: reading.current_reading,
            consumption,
            consumption_amount: breakdown.consumption_amount,
            fixed_charge: breakdown.fixed_charge,
            other_charges: input.other_charges,
            subtotal,
            vat_rate: vat_rate(),
            vat_amount,
            total,
            paid_amount: Decimal::ZERO,
            balance: total,
            status: InvoiceStatus::Issued.as_str().to_string(),
            due_date: period.due_date(),
            version: 0,
            cancel_reason: None,
            created_utc: now,
            paid_utc: None,
            cancelled_utc: None,
        };

        let mut items = Vec::new();
        for line in &breakdown.items {
            let upper = line
                .to_unit
                .map(|t| t.to_string())
                .unwrap_or_else(|| "above".to_string());
            items.push(InvoiceItem {
                item_id: Uuid::new_v4(),
                invoice_id,
                kind: ItemKind::Consumption.as_str().to_string(),
                description: format!("Consumption {} to {} units", line.from_unit, upper),
                from_unit: Some(line.from_unit),
                to_unit: line.to_unit,
                quantity: line.quantity,
                rate: line.rate,
                amount: line.amount,
                sort_order: items.len() as i32,
                created_utc: now,
            });
        }
        if breakdown.fixed_charge > Decimal::ZERO {
            items.push(InvoiceItem {
                item_id: Uuid::new_v4(),
                invoice_id,
                kind: ItemKind::FixedCharge.as_str().to_string(),
                description: "Fixed charge".to_string(),
                from_unit: None,
                to_unit: None,
                quantity: Decimal::ONE,
                rate: breakdown.fixed_charge,
                amount: breakdown.fixed_charge,
                sort_order: items.len() as i32,
                created_utc: now,
            });
        }
        if input.other_charges > Decimal::ZERO {
            items.push(InvoiceItem {
                item_id: Uuid::new_v4(),
                invoice_id,
                kind: ItemKind::Other.as_str().to_string(),
                description: "Other charges".to_string(),
                from_unit: None,
                to_unit: None,
                quantity: Decimal::ONE,
                rate: input.other_charges,
                amount: input.other_charges,
                sort_order: items.len() as i32,
                created_utc: now,
            });
        }

        let invoice = self
            .store
            .create_invoice(&invoice, &items, reading.reading_id)
            .await?;

        self.journal.post_invoice_entry(&invoice).await?;

        publish_best_effort(
            self.events.as_ref(),
            "InvoiceCreated",
            json!({
                "invoice_id": invoice.invoice_id,
                "invoice_number": invoice.invoice_number,
                "customer_id": invoice.customer_id,
                "billing_period": invoice.billing_period,
                "total": invoice.total,
                "due_date": invoice.due_date,
            }),
        )
        .await;

        info!(
            invoice_id = %invoice.invoice_id,
            invoice_number = %invoice.invoice_number,
            consumption = %invoice.consumption,
            total = %invoice.total,
            "Invoice generated"
        );

        Ok(invoice)
    }

    /// Cancel an open, unpaid invoice. The invoice row survives with
    /// status `cancelled`; nothing is deleted.
    #[instrument(skip(self, reason), fields(invoice_id = %invoice_id))]
    pub async fn cancel(&self, invoice_id: Uuid, reason: &str) -> Result<Invoice, AppError> {
        let invoice = self.store.get_invoice(invoice_id).await?.ok_or_else(|| {
            AppError::NotFound(anyhow::anyhow!("Invoice {} not found", invoice_id))
        })?;

        match invoice.parsed_status() {
            InvoiceStatus::Cancelled => {
                return Err(AppError::Conflict(anyhow::anyhow!(
                    "Invoice {} is already cancelled",
                    invoice.invoice_number
                )))
            }
            InvoiceStatus::Paid => {
                return Err(AppError::Conflict(anyhow::anyhow!(
                    "Invoice {} is paid and cannot be cancelled",
                    invoice.invoice_number
                )))
            }
            _ => {}
        }
        if !invoice.paid_amount.is_zero() {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Invoice {} has {} paid; reverse payments before cancelling",
                invoice.invoice_number,
                invoice.paid_amount
            )));
        }

        let cancelled = self
            .store
            .cancel_invoice(invoice_id, reason)
            .await?
            .ok_or_else(|| {
                AppError::Conflict(anyhow::anyhow!(
                    "Invoice {} changed concurrently and can no longer be cancelled",
                    invoice.invoice_number
                ))
            })?;

        publish_best_effort(
            self.events.as_ref(),
            "InvoiceCancelled",
            json!({
                "invoice_id": cancelled.invoice_id,
                "invoice_number": cancelled.invoice_number,
                "reason": reason,
            }),
        )
        .await;

        info!(invoice_number = %cancelled.invoice_number, reason = reason, "Invoice cancelled");

        Ok(cancelled)
    }

    /// Cancel and regenerate the invoice for the same customer and
    /// period. A corrected reading must already have been captured; the
    /// original reading stays processed.
    #[instrument(skip(self, reason), fields(invoice_id = %invoice_id))]
    pub async fn rebill(
        &self,
        invoice_id: Uuid,
        reason: &str,
        other_charges: Decimal,
    ) -> Result<Invoice, AppError> {
        let original = self.store.get_invoice(invoice_id).await?.ok_or_else(|| {
            AppError::NotFound(anyhow::anyhow!("Invoice {} not found", invoice_id))
        })?;

        self.cancel(invoice_id, reason).await?;

        self.generate(&GenerateInvoice {
            customer_id: original.customer_id,
            billing_period: original.billing_period.clone(),
            other_charges,
        })
        .await
    }

    /// Apply a signed payment delta to the invoice balance.
    ///
    /// The write is guarded by the invoice version; a concurrent payment
    /// forces a re-read, and persistent contention surfaces as a
    /// conflict instead of a lost update.
    #[instrument(skip(self), fields(invoice_id = %invoice_id, delta = %delta))]
    pub async fn update_payment_status(
        &self,
        invoice_id: Uuid,
        delta: Decimal,
    ) -> Result<Invoice, AppError> {
        let eps = balance_epsilon();

        for _ in 0..MAX_VERSION_RETRIES {
            let invoice = self.store.get_invoice(invoice_id).await?.ok_or_else(|| {
                AppError::NotFound(anyhow::anyhow!("Invoice {} not found", invoice_id))
            })?;

            let current = invoice.parsed_status();
            if current == InvoiceStatus::Cancelled {
                return Err(AppError::Conflict(anyhow::anyhow!(
                    "Invoice {} is cancelled",
                    invoice.invoice_number
                )));
            }

            let paid_amount = invoice.paid_amount + delta;
            if paid_amount < Decimal::ZERO {
                return Err(AppError::Validation(format!(
                    "Payment delta {} on invoice {} would make paid amount negative",
                    delta, invoice.invoice_number
                )));
            }
            // The cap is checked against the same row the version guard
            // protects, so concurrent payments cannot jointly overpay.
            if delta > Decimal::ZERO && paid_amount > invoice.total + eps {
                return Err(AppError::Validation(format!(
                    "Payment delta {} on invoice {} would exceed total {} (paid so far {})",
                    delta, invoice.invoice_number, invoice.total, invoice.paid_amount
                )));
            }
            let balance = (invoice.total - paid_amount).max(Decimal::ZERO);

            let (status, paid_utc) = if balance <= eps {
                (InvoiceStatus::Paid, Some(Utc::now()))
            } else if paid_amount <= eps {
                // A full reversal reopens the invoice as issued; the next
                // sweep re-marks it overdue if the due date has passed.
                let status = match current {
                    InvoiceStatus::Partial | InvoiceStatus::Paid | InvoiceStatus::Overdue => {
                        InvoiceStatus::Issued
                    }
                    other => other,
                };
                (status, None)
            } else {
                (InvoiceStatus::Partial, None)
            };

            let update = InvoicePaymentUpdate {
                paid_amount,
                balance,
                status: status.as_str().to_string(),
                paid_utc,
                expected_version: invoice.version,
            };

            if let Some(updated) = self
                .store
                .update_invoice_payment(invoice_id, &update)
                .await?
            {
                return Ok(updated);
            }
            // Version check failed; retry against the fresh row.
        }

        Err(AppError::Conflict(anyhow::anyhow!(
            "Invoice {} is being updated concurrently, giving up after {} attempts",
            invoice_id,
            MAX_VERSION_RETRIES
        )))
    }

    /// Transition every issued or partial invoice past its due date to
    /// overdue. Idempotent: a second run as of the same date is a no-op.
    #[instrument(skip(self))]
    pub async fn check_overdue_invoices(&self, as_of: NaiveDate) -> Result<u64, AppError> {
        let count = self.store.mark_overdue(as_of).await?;
        if count > 0 {
            OVERDUE_TRANSITIONS_TOTAL.inc_by(count as f64);
        }
        info!(as_of = %as_of, count = count, "Overdue sweep completed");
        Ok(count)
    }
}
