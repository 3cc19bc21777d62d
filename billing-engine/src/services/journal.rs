//! Double-entry journal construction and posting.

use std::sync::Arc;

use billing_core::error::AppError;
use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{error, instrument, warn};
use uuid::Uuid;

use crate::models::{
    accounts, balance_epsilon, EntryType, Invoice, JournalEntry, JournalLine, JournalStatus,
    LineInput, Payment, PaymentMethod,
};
use crate::services::metrics::{JOURNAL_ENTRIES_TOTAL, LEDGER_SYNC_FAILURES_TOTAL};
use crate::services::sync::LedgerSync;
use crate::store::RecordStore;

/// Account a payment method settles to.
fn settlement_account(method: PaymentMethod) -> &'static str {
    match method {
        PaymentMethod::Cash => accounts::CASH,
        PaymentMethod::Bank | PaymentMethod::Card | PaymentMethod::Online => accounts::BANK,
    }
}

/// Constructs balanced journal entries and posts them append-only.
///
/// An unbalanced line set is a bug in the caller: it fails with
/// `AppError::Invariant` before anything is persisted, and is never
/// silently corrected. The push to the core accounting system is best
/// effort and never fails the local post.
pub struct JournalLedger {
    store: Arc<dyn RecordStore>,
    sync: Arc<dyn LedgerSync>,
}

impl JournalLedger {
    pub fn new(store: Arc<dyn RecordStore>, sync: Arc<dyn LedgerSync>) -> Self {
        Self { store, sync }
    }

    /// Post a balanced entry. Each line must carry exactly one non-zero
    /// side; total debits and credits must agree within 0.01.
    #[instrument(skip(self, lines), fields(entry_type = entry_type.as_str(), reference_no = %reference_no))]
    pub async fn post(
        &self,
        entry_type: EntryType,
        reference_type: &str,
        reference_id: Uuid,
        reference_no: &str,
        lines: Vec<LineInput>,
    ) -> Result<JournalEntry, AppError> {
        if lines.is_empty() {
            return Err(AppError::Invariant(format!(
                "Journal entry for {} '{}' has no lines",
                reference_type, reference_no
            )));
        }

        let mut total_debit = Decimal::ZERO;
        let mut total_credit = Decimal::ZERO;
        for line in &lines {
            let one_sided = (line.debit > Decimal::ZERO && line.credit.is_zero())
                || (line.credit > Decimal::ZERO && line.debit.is_zero());
            if !one_sided {
                return Err(AppError::Invariant(format!(
                    "Journal line on account {} must have exactly one non-zero side \
                     (debit {}, credit {})",
                    line.account_code, line.debit, line.credit
                )));
            }
            total_debit += line.debit;
            total_credit += line.credit;
        }

        if (total_debit - total_credit).abs() > balance_epsilon() {
            error!(
                total_debit = %total_debit,
                total_credit = %total_credit,
                reference_no = %reference_no,
                "Unbalanced journal entry rejected"
            );
            return Err(AppError::Invariant(format!(
                "Unbalanced journal entry for {} '{}': debit {} != credit {}",
                reference_type, reference_no, total_debit, total_credit
            )));
        }

        let entry_date = Utc::now().date_naive();
        let period = entry_date.format("%Y%m").to_string();
        let seq = self.store.next_sequence(&format!("JE-{}", period)).await?;
        let entry_no = format!("JE-{}-{:04}", period, seq);

        let journal_id = Uuid::new_v4();
        let entry = JournalEntry {
            journal_id,
            entry_no,
            entry_date,
            entry_type: entry_type.as_str().to_string(),
            reference_type: reference_type.to_string(),
            reference_id,
            reference_no: reference_no.to_string(),
            total_debit,
            total_credit,
            status: JournalStatus::Posted.as_str().to_string(),
            created_utc: Utc::now(),
        };
        let rows: Vec<JournalLine> = lines
            .into_iter()
            .enumerate()
            .map(|(i, line)| JournalLine {
                line_id: Uuid::new_v4(),
                journal_id,
                account_code: line.account_code,
                debit: line.debit,
                credit: line.credit,
                sort_order: i as i32,
            })
            .collect();

        let entry = self.store.create_journal_entry(&entry, &rows).await?;
        JOURNAL_ENTRIES_TOTAL
            .with_label_values(&[entry_type.as_str()])
            .inc();

        // Best effort: a failed sync is reconciled out-of-band and never
        // rolls back the local post.
        if let Err(e) = self.sync.push_entry(&entry, &rows).await {
            LEDGER_SYNC_FAILURES_TOTAL.inc();
            warn!(entry_no = %entry.entry_no, error = %e, "Ledger sync failed, entry kept locally");
        }

        Ok(entry)
    }

    /// Invoice issuance: debit Accounts Receivable for the total, credit
    /// each revenue component and VAT. Zero-amount lines are omitted.
    pub async fn post_invoice_entry(&self, invoice: &Invoice) -> Result<JournalEntry, AppError> {
        let mut lines = vec![LineInput::debit(
            accounts::ACCOUNTS_RECEIVABLE,
            invoice.total,
        )];
        if invoice.consumption_amount > Decimal::ZERO {
            lines.push(LineInput::credit(
                accounts::ELECTRICITY_REVENUE,
                invoice.consumption_amount,
            ));
        }
        if invoice.fixed_charge > Decimal::ZERO {
            lines.push(LineInput::credit(
                accounts::FIXED_CHARGES_REVENUE,
                invoice.fixed_charge,
            ));
        }
        if invoice.other_charges > Decimal::ZERO {
            lines.push(LineInput::credit(
                accounts::OTHER_REVENUE,
                invoice.other_charges,
            ));
        }
        if invoice.vat_amount > Decimal::ZERO {
            lines.push(LineInput::credit(accounts::VAT_PAYABLE, invoice.vat_amount));
        }

        self.post(
            EntryType::Invoice,
            "invoice",
            invoice.invoice_id,
            &invoice.invoice_number,
            lines,
        )
        .await
    }

    /// Payment receipt: debit Cash or Bank by method, credit Accounts
    /// Receivable.
    pub async fn post_payment_entry(&self, payment: &Payment) -> Result<JournalEntry, AppError> {
        let lines = vec![
            LineInput::debit(settlement_account(payment.parsed_method()), payment.amount),
            LineInput::credit(accounts::ACCOUNTS_RECEIVABLE, payment.amount),
        ];

        self.post(
            EntryType::Payment,
            "payment",
            payment.payment_id,
            &payment.receipt_number,
            lines,
        )
        .await
    }

    /// Prepaid recharge: debit Cash or Bank, credit Prepaid Revenue.
    pub async fn post_recharge_entry(&self, payment: &Payment) -> Result<JournalEntry, AppError> {
        let lines = vec![
            LineInput::debit(settlement_account(payment.parsed_method()), payment.amount),
            LineInput::credit(accounts::PREPAID_REVENUE, payment.amount),
        ];

        self.post(
            EntryType::PrepaidRecharge,
            "payment",
            payment.payment_id,
            &payment.receipt_number,
            lines,
        )
        .await
    }

    /// Reverse a posted entry: a new entry with debit and credit swapped
    /// per line, referencing the original, which flips to `reversed`.
    /// The original is never edited in place.
    #[instrument(skip(self, original), fields(entry_no = %original.entry_no))]
    pub async fn reverse(&self, original: &JournalEntry) -> Result<JournalEntry, AppError> {
        if original.parsed_status() != JournalStatus::Posted {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Journal entry '{}' is {}, only posted entries can be reversed",
                original.entry_no,
                original.status
            )));
        }

        let lines = self.store.get_journal_lines(original.journal_id).await?;
        let swapped: Vec<LineInput> = lines
            .iter()
            .map(|line| LineInput {
                account_code: line.account_code.clone(),
                debit: line.credit,
                credit: line.debit,
            })
            .collect();

        let reversal = self
            .post(
                EntryType::Adjustment,
                "journal_entry",
                original.journal_id,
                &original.entry_no,
                swapped,
            )
            .await?;

        self.store
            .mark_journal_reversed(original.journal_id)
            .await?
            .ok_or_else(|| {
                AppError::Conflict(anyhow::anyhow!(
                    "Journal entry '{}' was already reversed",
                    original.entry_no
                ))
            })?;

        Ok(reversal)
    }
}
