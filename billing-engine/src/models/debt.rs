//! Non-invoice debt model (penalties, reconnection fees) with aging.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Debt status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebtStatus {
    Outstanding,
    Partial,
    Paid,
    WrittenOff,
    Disputed,
}

impl DebtStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DebtStatus::Outstanding => "outstanding",
            DebtStatus::Partial => "partial",
            DebtStatus::Paid => "paid",
            DebtStatus::WrittenOff => "written_off",
            DebtStatus::Disputed => "disputed",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "partial" => DebtStatus::Partial,
            "paid" => DebtStatus::Paid,
            "written_off" => DebtStatus::WrittenOff,
            "disputed" => DebtStatus::Disputed,
            _ => DebtStatus::Outstanding,
        }
    }
}

/// Debt record, independent of invoices. Soft-deleted via `is_deleted`.
/// `remaining_amount = original_amount + penalty_amount - paid_amount`,
/// floored at zero.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Debt {
    pub debt_id: Uuid,
    pub customer_id: Uuid,
    pub debt_type: String,
    pub original_amount: Decimal,
    pub penalty_amount: Decimal,
    pub paid_amount: Decimal,
    pub remaining_amount: Decimal,
    pub status: String,
    pub due_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub is_deleted: bool,
    pub created_utc: DateTime<Utc>,
}

impl Debt {
    pub fn parsed_status(&self) -> DebtStatus {
        DebtStatus::from_string(&self.status)
    }
}

/// Input for recording a debt.
#[derive(Debug, Clone)]
pub struct CreateDebt {
    pub customer_id: Uuid,
    pub debt_type: String,
    pub original_amount: Decimal,
    pub penalty_amount: Decimal,
    pub due_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

/// Outstanding debt grouped by days past due. Upper bounds are closed:
/// 30 days past due still counts as current.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgingReport {
    pub current: Decimal,
    pub days_31_60: Decimal,
    pub days_61_90: Decimal,
    pub days_91_180: Decimal,
    pub over_180: Decimal,
}

impl AgingReport {
    pub fn total(&self) -> Decimal {
        self.current + self.days_31_60 + self.days_61_90 + self.days_91_180 + self.over_180
    }
}
