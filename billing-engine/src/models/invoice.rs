//! Invoice model for billing-engine.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Invoice status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Draft,
    Issued,
    Paid,
    Partial,
    Overdue,
    Cancelled,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "draft",
            InvoiceStatus::Issued => "issued",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Partial => "partial",
            InvoiceStatus::Overdue => "overdue",
            InvoiceStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "issued" => InvoiceStatus::Issued,
            "paid" => InvoiceStatus::Paid,
            "partial" => InvoiceStatus::Partial,
            "overdue" => InvoiceStatus::Overdue,
            "cancelled" => InvoiceStatus::Cancelled,
            _ => InvoiceStatus::Draft,
        }
    }

    /// Open invoices can still receive payments and, while unpaid, be
    /// cancelled.
    pub fn is_open(&self) -> bool {
        matches!(
            self,
            InvoiceStatus::Issued | InvoiceStatus::Partial | InvoiceStatus::Overdue
        )
    }
}

/// Invoice line kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Consumption,
    FixedCharge,
    Other,
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Consumption => "consumption",
            ItemKind::FixedCharge => "fixed_charge",
            ItemKind::Other => "other",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "fixed_charge" => ItemKind::FixedCharge,
            "other" => ItemKind::Other,
            _ => ItemKind::Consumption,
        }
    }
}

/// Invoice document. Never physically deleted; cancellation is a status
/// transition. `version` guards the paid-amount read-modify-write cycle.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Invoice {
    pub invoice_id: Uuid,
    pub invoice_number: String,
    pub customer_id: Uuid,
    pub billing_period: String,
    pub previous_reading: Decimal,
    pub current_reading: Decimal,
    pub consumption: Decimal,
    pub consumption_amount: Decimal,
    pub fixed_charge: Decimal,
    pub other_charges: Decimal,
    pub subtotal: Decimal,
    pub vat_rate: Decimal,
    pub vat_amount: Decimal,
    pub total: Decimal,
    pub paid_amount: Decimal,
    pub balance: Decimal,
    pub status: String,
    pub due_date: NaiveDate,
    pub version: i64,
    pub cancel_reason: Option<String>,
    pub created_utc: DateTime<Utc>,
    pub paid_utc: Option<DateTime<Utc>>,
    pub cancelled_utc: Option<DateTime<Utc>>,
}

impl Invoice {
    pub fn parsed_status(&self) -> InvoiceStatus {
        InvoiceStatus::from_string(&self.status)
    }
}

/// Invoice line. Immutable once created, owned exclusively by its invoice.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct InvoiceItem {
    pub item_id: Uuid,
    pub invoice_id: Uuid,
    pub kind: String,
    pub description: String,
    pub from_unit: Option<Decimal>,
    pub to_unit: Option<Decimal>,
    pub quantity: Decimal,
    pub rate: Decimal,
    pub amount: Decimal,
    pub sort_order: i32,
    pub created_utc: DateTime<Utc>,
}

/// Input for generating an invoice.
#[derive(Debug, Clone)]
pub struct GenerateInvoice {
    pub customer_id: Uuid,
    pub billing_period: String,
    pub other_charges: Decimal,
}

/// Conditional payment-state update; applied only when the stored row
/// still carries `expected_version`.
#[derive(Debug, Clone)]
pub struct InvoicePaymentUpdate {
    pub paid_amount: Decimal,
    pub balance: Decimal,
    pub status: String,
    pub paid_utc: Option<DateTime<Utc>>,
    pub expected_version: i64,
}
