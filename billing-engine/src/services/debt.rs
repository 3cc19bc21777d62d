//! Non-invoice debts (penalties, reconnection fees) and the aging report.

use std::sync::Arc;

use billing_core::error::AppError;
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::models::{balance_epsilon, AgingReport, CreateDebt, Debt, DebtStatus};
use crate::store::RecordStore;

/// Tracks outstanding debts outside the invoice lifecycle and rolls them
/// up into a receivables aging report.
pub struct DebtTracker {
    store: Arc<dyn RecordStore>,
}

impl DebtTracker {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Record a new debt. `remaining = original + penalty`.
    #[instrument(skip(self, input), fields(customer_id = %input.customer_id, debt_type = %input.debt_type))]
    pub async fn create(&self, input: &CreateDebt) -> Result<Debt, AppError> {
        if input.original_amount <= Decimal::ZERO {
            return Err(AppError::Validation(format!(
                "Debt amount must be positive, got {}",
                input.original_amount
            )));
        }
        if input.penalty_amount < Decimal::ZERO {
            return Err(AppError::Validation(format!(
                "Penalty must be non-negative, got {}",
                input.penalty_amount
            )));
        }

        self.store
            .get_customer(input.customer_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(anyhow::anyhow!("Customer {} not found", input.customer_id))
            })?;

        let debt = Debt {
            debt_id: Uuid::new_v4(),
            customer_id: input.customer_id,
            debt_type: input.debt_type.clone(),
            original_amount: input.original_amount,
            penalty_amount: input.penalty_amount,
            paid_amount: Decimal::ZERO,
            remaining_amount: input.original_amount + input.penalty_amount,
            status: DebtStatus::Outstanding.as_str().to_string(),
            due_date: input.due_date,
            notes: input.notes.clone(),
            is_deleted: false,
            created_utc: Utc::now(),
        };
        let debt = self.store.create_debt(&debt).await?;

        info!(
            debt_id = %debt.debt_id,
            debt_type = %debt.debt_type,
            remaining = %debt.remaining_amount,
            "Debt recorded"
        );

        Ok(debt)
    }

    /// Apply a payment to a debt. Remaining is floored at zero; within
    /// 0.01 of zero counts as settled.
    #[instrument(skip(self), fields(debt_id = %debt_id, amount = %amount))]
    pub async fn pay_debt(&self, debt_id: Uuid, amount: Decimal) -> Result<Debt, AppError> {
        if amount <= Decimal::ZERO {
            return Err(AppError::Validation(format!(
                "Debt payment must be positive, got {}",
                amount
            )));
        }

        let debt = self
            .store
            .get_debt(debt_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Debt {} not found", debt_id)))?;

        match debt.parsed_status() {
            DebtStatus::Paid => {
                return Err(AppError::Conflict(anyhow::anyhow!(
                    "Debt {} is already paid",
                    debt_id
                )))
            }
            DebtStatus::WrittenOff => {
                return Err(AppError::Conflict(anyhow::anyhow!(
                    "Debt {} is written off",
                    debt_id
                )))
            }
            _ => {}
        }

        let paid_amount = debt.paid_amount + amount;
        let remaining = (debt.original_amount + debt.penalty_amount - paid_amount)
            .max(Decimal::ZERO);
        let status = if remaining <= balance_epsilon() {
            DebtStatus::Paid
        } else {
            DebtStatus::Partial
        };

        let updated = self
            .store
            .update_debt_payment(debt_id, paid_amount, remaining, status.as_str())
            .await?
            .ok_or_else(|| {
                AppError::Conflict(anyhow::anyhow!("Debt {} changed concurrently", debt_id))
            })?;

        info!(
            debt_id = %updated.debt_id,
            remaining = %updated.remaining_amount,
            status = %updated.status,
            "Debt payment applied"
        );

        Ok(updated)
    }

    /// Write a debt off. The remaining amount is kept for reporting; the
    /// reason is appended to the notes.
    #[instrument(skip(self, reason), fields(debt_id = %debt_id))]
    pub async fn write_off(&self, debt_id: Uuid, reason: &str) -> Result<Debt, AppError> {
        self.store
            .get_debt(debt_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Debt {} not found", debt_id)))?;

        // The store appends to any existing notes.
        let updated = self
            .store
            .write_off_debt(debt_id, &format!("written off: {}", reason))
            .await?
            .ok_or_else(|| {
                AppError::Conflict(anyhow::anyhow!("Debt {} changed concurrently", debt_id))
            })?;

        info!(debt_id = %updated.debt_id, reason = reason, "Debt written off");

        Ok(updated)
    }

    /// Bucket open debts by days past due as of a date. Debts without a
    /// due date age from their creation date. Upper bounds are closed:
    /// exactly 30 days past due is still current.
    #[instrument(skip(self))]
    pub async fn aging_report(&self, as_of: NaiveDate) -> Result<AgingReport, AppError> {
        let debts = self.store.list_open_debts().await?;

        let mut report = AgingReport::default();
        for debt in &debts {
            let reference = debt.due_date.unwrap_or_else(|| debt.created_utc.date_naive());
            let days = (as_of - reference).num_days();
            let bucket = if days <= 30 {
                &mut report.current
            } else if days <= 60 {
                &mut report.days_31_60
            } else if days <= 90 {
                &mut report.days_61_90
            } else if days <= 180 {
                &mut report.days_91_180
            } else {
                &mut report.over_180
            };
            *bucket += debt.remaining_amount;
        }

        Ok(report)
    }
}
