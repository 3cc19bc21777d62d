//! Progressive tariff-slab pricing.
//!
//! Pure calculation: no persistence, no clock. Consumption crossing
//! multiple slabs is billed per slab, not at a flat rate.

use billing_core::error::AppError;
use rust_decimal::Decimal;

use crate::models::{ChargeLine, TariffBreakdown, TariffSlab};

/// Validate that slabs cover `[0, inf)`: ordered by `from_unit`
/// ascending, contiguous, with exactly the last slab open-ended.
fn validate_slabs(slabs: &[TariffSlab]) -> Result<(), AppError> {
    let category = &slabs[0].category;

    if !slabs[0].from_unit.is_zero() {
        return Err(AppError::Config(anyhow::anyhow!(
            "Tariff category '{}' does not start at zero units",
            category
        )));
    }

    for (i, slab) in slabs.iter().enumerate() {
        let last = i == slabs.len() - 1;
        match slab.to_unit {
            None if !last => {
                return Err(AppError::Config(anyhow::anyhow!(
                    "Tariff category '{}' has an open-ended slab before the last",
                    category
                )));
            }
            Some(to) if to <= slab.from_unit => {
                return Err(AppError::Config(anyhow::anyhow!(
                    "Tariff category '{}' has an empty slab at {} units",
                    category,
                    slab.from_unit
                )));
            }
            Some(to) if last => {
                return Err(AppError::Config(anyhow::anyhow!(
                    "Tariff category '{}' is bounded at {} units; the last slab must be open-ended",
                    category,
                    to
                )));
            }
            _ => {}
        }
        if i > 0 {
            // Contiguity: each slab starts where the previous one ended.
            let prev_to = slabs[i - 1].to_unit;
            if prev_to != Some(slab.from_unit) {
                return Err(AppError::Config(anyhow::anyhow!(
                    "Tariff category '{}' has a gap or overlap at {} units",
                    category,
                    slab.from_unit
                )));
            }
        }
    }

    Ok(())
}

/// Compute the itemized charge breakdown for a consumption value.
///
/// Returns one `ChargeLine` per slab with non-zero billed units plus the
/// category's flat fixed charge, applied once and independent of
/// consumption.
pub fn calculate(slabs: &[TariffSlab], consumption: Decimal) -> Result<TariffBreakdown, AppError> {
    if consumption < Decimal::ZERO {
        return Err(AppError::Validation(format!(
            "Consumption must be non-negative, got {}",
            consumption
        )));
    }
    if slabs.is_empty() {
        return Err(AppError::Config(anyhow::anyhow!(
            "No tariff slabs configured for category"
        )));
    }
    validate_slabs(slabs)?;

    let mut items = Vec::new();
    let mut consumption_amount = Decimal::ZERO;
    let mut fixed_charge = Decimal::ZERO;

    for slab in slabs {
        if let Some(charge) = slab.fixed_charge {
            fixed_charge += charge;
        }

        let billed = match slab.to_unit {
            Some(to) => (consumption.min(to) - slab.from_unit).max(Decimal::ZERO),
            None => (consumption - slab.from_unit).max(Decimal::ZERO),
        };
        if billed > Decimal::ZERO {
            let amount = billed * slab.rate_per_unit;
            consumption_amount += amount;
            items.push(ChargeLine {
                from_unit: slab.from_unit,
                to_unit: slab.to_unit,
                quantity: billed,
                rate: slab.rate_per_unit,
                amount,
            });
        }
    }

    Ok(TariffBreakdown {
        items,
        consumption_amount,
        fixed_charge,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::str::FromStr;
    use uuid::Uuid;

    fn slab(from: &str, to: Option<&str>, rate: &str, fixed: Option<&str>) -> TariffSlab {
        TariffSlab {
            slab_id: Uuid::new_v4(),
            category: "residential".to_string(),
            from_unit: Decimal::from_str(from).unwrap(),
            to_unit: to.map(|t| Decimal::from_str(t).unwrap()),
            rate_per_unit: Decimal::from_str(rate).unwrap(),
            fixed_charge: fixed.map(|f| Decimal::from_str(f).unwrap()),
            created_utc: Utc::now(),
        }
    }

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn two_slab_crossing_consumption() {
        // 400 units over [0,200)@0.5 and [200,inf)@0.8 with fixed charge 50:
        // 200*0.5 + 200*0.8 = 260.
        let slabs = vec![
            slab("0", Some("200"), "0.5", Some("50")),
            slab("200", None, "0.8", None),
        ];

        let breakdown = calculate(&slabs, dec("400")).unwrap();
        assert_eq!(breakdown.consumption_amount, dec("260"));
        assert_eq!(breakdown.fixed_charge, dec("50"));
        assert_eq!(breakdown.items.len(), 2);
        assert_eq!(breakdown.items[0].quantity, dec("200"));
        assert_eq!(breakdown.items[0].amount, dec("100"));
        assert_eq!(breakdown.items[1].quantity, dec("200"));
        assert_eq!(breakdown.items[1].amount, dec("160.0"));
    }

    #[test]
    fn billed_units_cover_consumption_exactly() {
        let slabs = vec![
            slab("0", Some("100"), "0.4", None),
            slab("100", Some("300"), "0.6", None),
            slab("300", None, "0.9", None),
        ];

        for c in ["0", "1", "99.5", "100", "250", "300", "301", "12345"] {
            let consumption = dec(c);
            let breakdown = calculate(&slabs, consumption).unwrap();
            let billed: Decimal = breakdown.items.iter().map(|i| i.quantity).sum();
            assert_eq!(billed, consumption, "consumption {}", c);
        }
    }

    #[test]
    fn zero_consumption_keeps_fixed_charge() {
        let slabs = vec![
            slab("0", Some("200"), "0.5", Some("50")),
            slab("200", None, "0.8", None),
        ];

        let breakdown = calculate(&slabs, Decimal::ZERO).unwrap();
        assert!(breakdown.items.is_empty());
        assert_eq!(breakdown.consumption_amount, Decimal::ZERO);
        assert_eq!(breakdown.fixed_charge, dec("50"));
    }

    #[test]
    fn consumption_beyond_bounds_bills_in_open_slab() {
        let slabs = vec![
            slab("0", Some("50"), "1", None),
            slab("50", None, "2", None),
        ];

        let breakdown = calculate(&slabs, dec("1000")).unwrap();
        assert_eq!(breakdown.items[1].quantity, dec("950"));
        assert_eq!(breakdown.consumption_amount, dec("50") + dec("1900"));
    }

    #[test]
    fn consumption_within_first_slab_yields_single_item() {
        let slabs = vec![
            slab("0", Some("200"), "0.5", None),
            slab("200", None, "0.8", None),
        ];

        let breakdown = calculate(&slabs, dec("150")).unwrap();
        assert_eq!(breakdown.items.len(), 1);
        assert_eq!(breakdown.items[0].amount, dec("75.0"));
    }

    #[test]
    fn negative_consumption_is_rejected() {
        let slabs = vec![slab("0", None, "0.5", None)];
        let err = calculate(&slabs, dec("-1")).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn empty_slab_list_is_a_configuration_error() {
        let err = calculate(&[], dec("10")).unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[test]
    fn gap_between_slabs_is_a_configuration_error() {
        let slabs = vec![
            slab("0", Some("100"), "0.5", None),
            slab("150", None, "0.8", None),
        ];
        let err = calculate(&slabs, dec("10")).unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[test]
    fn bounded_last_slab_is_a_configuration_error() {
        let slabs = vec![slab("0", Some("100"), "0.5", None)];
        let err = calculate(&slabs, dec("10")).unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }
}
