//! Payment collection and cancellation.

use std::sync::Arc;

use billing_core::error::AppError;
use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::json;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::models::{
    balance_epsilon, CreatePayment, InvoiceStatus, Payment, PaymentKind, PaymentMethod,
    PaymentStatus,
};
use crate::services::events::{publish_best_effort, EventSink};
use crate::services::invoice::InvoiceEngine;
use crate::services::journal::JournalLedger;
use crate::services::metrics::{ERRORS_TOTAL, PAYMENTS_TOTAL};
use crate::store::RecordStore;

/// Records payments against invoices and prepaid recharges. Payments are
/// append-only: a wrong payment is cancelled, never edited, and the
/// cancellation rolls the invoice balance back and reverses the journal
/// entry.
pub struct PaymentLedger {
    store: Arc<dyn RecordStore>,
    journal: Arc<JournalLedger>,
    invoices: Arc<InvoiceEngine>,
    events: Arc<dyn EventSink>,
}

impl PaymentLedger {
    pub fn new(
        store: Arc<dyn RecordStore>,
        journal: Arc<JournalLedger>,
        invoices: Arc<InvoiceEngine>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            store,
            journal,
            invoices,
            events,
        }
    }

    /// Collect a payment. With an invoice it settles that invoice's
    /// balance; without one it is a prepaid recharge.
    #[instrument(skip(self, input), fields(customer_id = %input.customer_id, amount = %input.amount))]
    pub async fn record_payment(&self, input: &CreatePayment) -> Result<Payment, AppError> {
        match self.record_inner(input).await {
            Ok(payment) => {
                PAYMENTS_TOTAL.with_label_values(&["record", "ok"]).inc();
                Ok(payment)
            }
            Err(e) => {
                PAYMENTS_TOTAL.with_label_values(&["record", "error"]).inc();
                ERRORS_TOTAL.with_label_values(&[e.kind()]).inc();
                Err(e)
            }
        }
    }

    async fn record_inner(&self, input: &CreatePayment) -> Result<Payment, AppError> {
        if input.amount <= Decimal::ZERO {
            return Err(AppError::Validation(format!(
                "Payment amount must be positive, got {}",
                input.amount
            )));
        }

        let customer = self
            .store
            .get_customer(input.customer_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(anyhow::anyhow!("Customer {} not found", input.customer_id))
            })?;

        let kind = match input.invoice_id {
            Some(_) => PaymentKind::Invoice,
            None => PaymentKind::Prepaid,
        };

        if let Some(invoice_id) = input.invoice_id {
            let invoice = self.store.get_invoice(invoice_id).await?.ok_or_else(|| {
                AppError::NotFound(anyhow::anyhow!("Invoice {} not found", invoice_id))
            })?;
            if invoice.customer_id != customer.customer_id {
                return Err(AppError::Validation(format!(
                    "Invoice {} does not belong to customer {}",
                    invoice.invoice_number, customer.customer_id
                )));
            }
            match invoice.parsed_status() {
                InvoiceStatus::Cancelled => {
                    return Err(AppError::Conflict(anyhow::anyhow!(
                        "Invoice {} is cancelled",
                        invoice.invoice_number
                    )))
                }
                InvoiceStatus::Paid => {
                    return Err(AppError::Conflict(anyhow::anyhow!(
                        "Invoice {} is already paid",
                        invoice.invoice_number
                    )))
                }
                _ => {}
            }
            if input.amount > invoice.balance + balance_epsilon() {
                return Err(AppError::Validation(format!(
                    "Payment {} exceeds outstanding balance {} on invoice {}",
                    input.amount, invoice.balance, invoice.invoice_number
                )));
            }
        }

        let now = Utc::now();
        let period = now.date_naive().format("%Y%m").to_string();
        let seq = self.store.next_sequence(&format!("RCT-{}", period)).await?;
        let receipt_number = format!("RCT-{}-{:04}", period, seq);

        let payment = Payment {
            payment_id: Uuid::new_v4(),
            receipt_number,
            customer_id: customer.customer_id,
            invoice_id: input.invoice_id,
            kind: kind.as_str().to_string(),
            amount: input.amount,
            method: input.method.as_str().to_string(),
            status: PaymentStatus::Confirmed.as_str().to_string(),
            cancel_reason: None,
            created_utc: now,
            cancelled_utc: None,
        };
        let payment = self.store.create_payment(&payment).await?;

        match kind {
            PaymentKind::Invoice => {
                // The payment row is already persisted; if applying it to
                // the invoice or posting it fails, void the row so no
                // confirmed-but-unapplied payment survives the error.
                if let Some(invoice_id) = payment.invoice_id {
                    if let Err(e) = self
                        .invoices
                        .update_payment_status(invoice_id, payment.amount)
                        .await
                    {
                        self.void_payment(&payment, "voided: balance update failed")
                            .await;
                        return Err(e);
                    }
                }
                if let Err(e) = self.journal.post_payment_entry(&payment).await {
                    if let Some(invoice_id) = payment.invoice_id {
                        if let Err(revert) = self
                            .invoices
                            .update_payment_status(invoice_id, -payment.amount)
                            .await
                        {
                            warn!(
                                receipt_number = %payment.receipt_number,
                                error = %revert,
                                "Failed to revert balance for voided payment"
                            );
                        }
                    }
                    self.void_payment(&payment, "voided: journal posting failed")
                        .await;
                    return Err(e);
                }
                publish_best_effort(
                    self.events.as_ref(),
                    "PaymentReceived",
                    json!({
                        "payment_id": payment.payment_id,
                        "receipt_number": payment.receipt_number,
                        "customer_id": payment.customer_id,
                        "invoice_id": payment.invoice_id,
                        "amount": payment.amount,
                        "method": payment.method,
                    }),
                )
                .await;
            }
            PaymentKind::Prepaid => {
                if let Err(e) = self.journal.post_recharge_entry(&payment).await {
                    self.void_payment(&payment, "voided: journal posting failed")
                        .await;
                    return Err(e);
                }
                publish_best_effort(
                    self.events.as_ref(),
                    "PrepaidRecharged",
                    json!({
                        "payment_id": payment.payment_id,
                        "receipt_number": payment.receipt_number,
                        "customer_id": payment.customer_id,
                        "amount": payment.amount,
                        "method": payment.method,
                    }),
                )
                .await;
            }
        }

        info!(
            receipt_number = %payment.receipt_number,
            kind = %payment.kind,
            amount = %payment.amount,
            "Payment recorded"
        );

        Ok(payment)
    }

    /// Void a persisted payment that could not be applied. Failures here
    /// are logged rather than propagated so the original error reaches
    /// the caller.
    async fn void_payment(&self, payment: &Payment, reason: &str) {
        warn!(
            receipt_number = %payment.receipt_number,
            reason,
            "Voiding unapplied payment"
        );
        match self.store.cancel_payment(payment.payment_id, reason).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                warn!(
                    receipt_number = %payment.receipt_number,
                    "Payment already cancelled while voiding"
                );
            }
            Err(e) => {
                warn!(
                    receipt_number = %payment.receipt_number,
                    error = %e,
                    "Failed to void unapplied payment"
                );
            }
        }
    }

    /// Prepaid meter recharge: a confirmed payment with no invoice.
    pub async fn record_recharge(
        &self,
        customer_id: Uuid,
        amount: Decimal,
        method: PaymentMethod,
    ) -> Result<Payment, AppError> {
        self.record_payment(&CreatePayment {
            customer_id,
            invoice_id: None,
            amount,
            method,
        })
        .await
    }

    /// Cancel a confirmed payment. Rolls the invoice balance back by the
    /// payment amount and posts a reversing journal entry.
    #[instrument(skip(self, reason), fields(payment_id = %payment_id))]
    pub async fn cancel_payment(&self, payment_id: Uuid, reason: &str) -> Result<Payment, AppError> {
        match self.cancel_inner(payment_id, reason).await {
            Ok(payment) => {
                PAYMENTS_TOTAL.with_label_values(&["cancel", "ok"]).inc();
                Ok(payment)
            }
            Err(e) => {
                PAYMENTS_TOTAL.with_label_values(&["cancel", "error"]).inc();
                ERRORS_TOTAL.with_label_values(&[e.kind()]).inc();
                Err(e)
            }
        }
    }

    async fn cancel_inner(&self, payment_id: Uuid, reason: &str) -> Result<Payment, AppError> {
        let payment = self.store.get_payment(payment_id).await?.ok_or_else(|| {
            AppError::NotFound(anyhow::anyhow!("Payment {} not found", payment_id))
        })?;
        if payment.parsed_status() == PaymentStatus::Cancelled {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Payment {} is already cancelled",
                payment.receipt_number
            )));
        }

        // Conditional update: whichever caller flips the status first
        // wins, the other gets a conflict.
        let cancelled = self
            .store
            .cancel_payment(payment_id, reason)
            .await?
            .ok_or_else(|| {
                AppError::Conflict(anyhow::anyhow!(
                    "Payment {} was cancelled concurrently",
                    payment.receipt_number
                ))
            })?;

        if let Some(invoice_id) = cancelled.invoice_id {
            self.invoices
                .update_payment_status(invoice_id, -cancelled.amount)
                .await?;
        }

        if let Some(entry) = self
            .store
            .find_journal_for_reference("payment", cancelled.payment_id)
            .await?
        {
            self.journal.reverse(&entry).await?;
        }

        publish_best_effort(
            self.events.as_ref(),
            "PaymentCancelled",
            json!({
                "payment_id": cancelled.payment_id,
                "receipt_number": cancelled.receipt_number,
                "invoice_id": cancelled.invoice_id,
                "amount": cancelled.amount,
                "reason": reason,
            }),
        )
        .await;

        info!(receipt_number = %cancelled.receipt_number, reason = reason, "Payment cancelled");

        Ok(cancelled)
    }
}
