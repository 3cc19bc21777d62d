//! Customer, meter and meter-reading records consumed by the engine.

use billing_core::error::AppError;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Customer record (maintained by the back office, read here).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Customer {
    pub customer_id: Uuid,
    pub name: String,
    pub tariff_category: String,
    pub active: bool,
    pub created_utc: DateTime<Utc>,
}

/// Installed meter. A billable customer has exactly one active meter.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Meter {
    pub meter_id: Uuid,
    pub customer_id: Uuid,
    pub serial_no: String,
    pub active: bool,
    pub created_utc: DateTime<Utc>,
}

/// Meter reading captured for a billing period. `processed` flips once an
/// invoice has been generated from it.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MeterReading {
    pub reading_id: Uuid,
    pub meter_id: Uuid,
    pub customer_id: Uuid,
    pub billing_period: String,
    pub previous_reading: Decimal,
    pub current_reading: Decimal,
    pub processed: bool,
    pub created_utc: DateTime<Utc>,
}

/// Billing period in `YYYY-MM` form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BillingPeriod {
    pub year: i32,
    pub month: u32,
}

impl BillingPeriod {
    /// Parse from `YYYY-MM`.
    pub fn parse(s: &str) -> Result<Self, AppError> {
        let invalid =
            || AppError::Validation(format!("Invalid billing period '{}', expected YYYY-MM", s));

        let (year_str, month_str) = s.split_once('-').ok_or_else(invalid)?;
        if year_str.len() != 4 || month_str.len() != 2 {
            return Err(invalid());
        }
        let year: i32 = year_str.parse().map_err(|_| invalid())?;
        let month: u32 = month_str.parse().map_err(|_| invalid())?;
        if !(1..=12).contains(&month) {
            return Err(invalid());
        }
        Ok(Self { year, month })
    }

    /// Invoices fall due on the 15th of the month after the period.
    pub fn due_date(&self) -> NaiveDate {
        let (year, month) = if self.month == 12 {
            (self.year + 1, 1)
        } else {
            (self.year, self.month + 1)
        };
        NaiveDate::from_ymd_opt(year, month, 15).expect("the 15th exists in every month")
    }

    /// Compact `YYYYMM` form used in document numbers.
    pub fn compact(&self) -> String {
        format!("{:04}{:02}", self.year, self.month)
    }
}

impl std::fmt::Display for BillingPeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}
