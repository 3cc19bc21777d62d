//! Tariff slab model and charge breakdown.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// One rate slab of a progressive tariff. Slabs for a category are
/// contiguous, non-overlapping and ordered by `from_unit` ascending; the
/// last slab carries `to_unit = None` (open-ended). `fixed_charge` is
/// applied once per invoice regardless of consumption.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TariffSlab {
    pub slab_id: Uuid,
    pub category: String,
    pub from_unit: Decimal,
    pub to_unit: Option<Decimal>,
    pub rate_per_unit: Decimal,
    pub fixed_charge: Option<Decimal>,
    pub created_utc: DateTime<Utc>,
}

/// One priced slab of consumption.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargeLine {
    pub from_unit: Decimal,
    pub to_unit: Option<Decimal>,
    pub quantity: Decimal,
    pub rate: Decimal,
    pub amount: Decimal,
}

/// Itemized output of the tariff calculator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TariffBreakdown {
    pub items: Vec<ChargeLine>,
    pub consumption_amount: Decimal,
    pub fixed_charge: Decimal,
}
