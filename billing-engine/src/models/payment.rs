//! Payment model for billing-engine.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Collection channel. Cash settles to the cash account; everything else
/// settles to the bank account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Bank,
    Card,
    Online,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Bank => "bank",
            PaymentMethod::Card => "card",
            PaymentMethod::Online => "online",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "bank" => PaymentMethod::Bank,
            "card" => PaymentMethod::Card,
            "online" => PaymentMethod::Online,
            _ => PaymentMethod::Cash,
        }
    }
}

/// Payment status. Payments are never edited, only cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Confirmed,
    Cancelled,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Confirmed => "confirmed",
            PaymentStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "cancelled" => PaymentStatus::Cancelled,
            _ => PaymentStatus::Confirmed,
        }
    }
}

/// Payment kind: settlement of an invoice, or a prepaid meter recharge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentKind {
    Invoice,
    Prepaid,
}

impl PaymentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentKind::Invoice => "invoice",
            PaymentKind::Prepaid => "prepaid",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "prepaid" => PaymentKind::Prepaid,
            _ => PaymentKind::Invoice,
        }
    }
}

/// Payment record.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Payment {
    pub payment_id: Uuid,
    pub receipt_number: String,
    pub customer_id: Uuid,
    pub invoice_id: Option<Uuid>,
    pub kind: String,
    pub amount: Decimal,
    pub method: String,
    pub status: String,
    pub cancel_reason: Option<String>,
    pub created_utc: DateTime<Utc>,
    pub cancelled_utc: Option<DateTime<Utc>>,
}

impl Payment {
    pub fn parsed_status(&self) -> PaymentStatus {
        PaymentStatus::from_string(&self.status)
    }

    pub fn parsed_method(&self) -> PaymentMethod {
        PaymentMethod::from_string(&self.method)
    }
}

/// Input for collecting a payment.
#[derive(Debug, Clone)]
pub struct CreatePayment {
    pub customer_id: Uuid,
    pub invoice_id: Option<Uuid>,
    pub amount: Decimal,
    pub method: PaymentMethod,
}
