//! Double-entry journal model.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Chart of accounts used by the standard entry shapes.
pub mod accounts {
    pub const CASH: &str = "1000";
    pub const BANK: &str = "1010";
    pub const ACCOUNTS_RECEIVABLE: &str = "1200";
    pub const VAT_PAYABLE: &str = "2100";
    pub const PREPAID_REVENUE: &str = "2300";
    pub const ELECTRICITY_REVENUE: &str = "4000";
    pub const FIXED_CHARGES_REVENUE: &str = "4010";
    pub const OTHER_REVENUE: &str = "4090";
}

/// Tolerance for debit/credit equality and "fully paid" comparisons,
/// in currency units.
pub fn balance_epsilon() -> Decimal {
    Decimal::new(1, 2)
}

/// Journal entry type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    Invoice,
    Payment,
    Adjustment,
    Refund,
    PrepaidRecharge,
}

impl EntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryType::Invoice => "invoice",
            EntryType::Payment => "payment",
            EntryType::Adjustment => "adjustment",
            EntryType::Refund => "refund",
            EntryType::PrepaidRecharge => "prepaid_recharge",
        }
    }
}

/// Journal entry status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JournalStatus {
    Draft,
    Posted,
    Reversed,
}

impl JournalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JournalStatus::Draft => "draft",
            JournalStatus::Posted => "posted",
            JournalStatus::Reversed => "reversed",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "posted" => JournalStatus::Posted,
            "reversed" => JournalStatus::Reversed,
            _ => JournalStatus::Draft,
        }
    }
}

/// Journal entry header. Append-only; a correction is a new entry with
/// swapped sides, never an in-place edit.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct JournalEntry {
    pub journal_id: Uuid,
    pub entry_no: String,
    pub entry_date: NaiveDate,
    pub entry_type: String,
    pub reference_type: String,
    pub reference_id: Uuid,
    pub reference_no: String,
    pub total_debit: Decimal,
    pub total_credit: Decimal,
    pub status: String,
    pub created_utc: DateTime<Utc>,
}

impl JournalEntry {
    pub fn parsed_status(&self) -> JournalStatus {
        JournalStatus::from_string(&self.status)
    }
}

/// Journal entry line. Exactly one of `debit`/`credit` is non-zero.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct JournalLine {
    pub line_id: Uuid,
    pub journal_id: Uuid,
    pub account_code: String,
    pub debit: Decimal,
    pub credit: Decimal,
    pub sort_order: i32,
}

/// Line input for posting an entry.
#[derive(Debug, Clone)]
pub struct LineInput {
    pub account_code: String,
    pub debit: Decimal,
    pub credit: Decimal,
}

impl LineInput {
    pub fn debit(account_code: &str, amount: Decimal) -> Self {
        Self {
            account_code: account_code.to_string(),
            debit: amount,
            credit: Decimal::ZERO,
        }
    }

    pub fn credit(account_code: &str, amount: Decimal) -> Self {
        Self {
            account_code: account_code.to_string(),
            debit: Decimal::ZERO,
            credit: amount,
        }
    }
}
