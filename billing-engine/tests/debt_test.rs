mod common;

use billing_core::error::AppError;
use billing_engine::models::CreateDebt;
use chrono::{Duration, NaiveDate};
use common::{dec, Harness};
use rust_decimal::Decimal;
use uuid::Uuid;

fn debt_input(h: &Harness, amount: &str, penalty: &str) -> CreateDebt {
    CreateDebt {
        customer_id: h.customer.customer_id,
        debt_type: "reconnection_fee".to_string(),
        original_amount: dec(amount),
        penalty_amount: dec(penalty),
        due_date: None,
        notes: None,
    }
}

#[tokio::test]
async fn debt_settles_through_partial_to_paid() {
    let h = Harness::new();
    let debt = h.debts.create(&debt_input(&h, "1000", "0")).await.unwrap();
    assert_eq!(debt.status, "outstanding");
    assert_eq!(debt.remaining_amount, dec("1000"));

    let after_first = h.debts.pay_debt(debt.debt_id, dec("500")).await.unwrap();
    assert_eq!(after_first.status, "partial");
    assert_eq!(after_first.remaining_amount, dec("500"));

    let after_second = h.debts.pay_debt(debt.debt_id, dec("500")).await.unwrap();
    assert_eq!(after_second.status, "paid");
    assert_eq!(after_second.remaining_amount, Decimal::ZERO);

    let err = h.debts.pay_debt(debt.debt_id, dec("1")).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
}

#[tokio::test]
async fn penalty_counts_toward_the_remaining_amount() {
    let h = Harness::new();
    let debt = h.debts.create(&debt_input(&h, "1000", "150")).await.unwrap();
    assert_eq!(debt.remaining_amount, dec("1150"));

    let after = h.debts.pay_debt(debt.debt_id, dec("1000")).await.unwrap();
    assert_eq!(after.status, "partial");
    assert_eq!(after.remaining_amount, dec("150"));
}

#[tokio::test]
async fn overpaying_a_debt_floors_remaining_at_zero() {
    let h = Harness::new();
    let debt = h.debts.create(&debt_input(&h, "100", "0")).await.unwrap();

    let after = h.debts.pay_debt(debt.debt_id, dec("250")).await.unwrap();
    assert_eq!(after.remaining_amount, Decimal::ZERO);
    assert_eq!(after.status, "paid");
    assert_eq!(after.paid_amount, dec("250"));
}

#[tokio::test]
async fn written_off_debt_keeps_its_remaining_amount() {
    let h = Harness::new();
    let debt = h.debts.create(&debt_input(&h, "800", "0")).await.unwrap();

    let written_off = h
        .debts
        .write_off(debt.debt_id, "customer deceased")
        .await
        .unwrap();
    assert_eq!(written_off.status, "written_off");
    assert_eq!(written_off.remaining_amount, dec("800"));
    assert!(written_off
        .notes
        .as_deref()
        .unwrap()
        .contains("customer deceased"));

    let err = h.debts.pay_debt(debt.debt_id, dec("10")).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
}

#[tokio::test]
async fn unknown_debt_and_customer_are_not_found() {
    let h = Harness::new();

    let err = h.debts.pay_debt(Uuid::new_v4(), dec("10")).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    let err = h
        .debts
        .create(&CreateDebt {
            customer_id: Uuid::new_v4(),
            debt_type: "penalty".to_string(),
            original_amount: dec("10"),
            penalty_amount: Decimal::ZERO,
            due_date: None,
            notes: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn non_positive_amounts_are_rejected() {
    let h = Harness::new();
    let err = h.debts.create(&debt_input(&h, "0", "0")).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let debt = h.debts.create(&debt_input(&h, "100", "0")).await.unwrap();
    let err = h
        .debts
        .pay_debt(debt.debt_id, Decimal::ZERO)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
async fn aging_report_buckets_by_days_past_due() {
    let h = Harness::new();
    let as_of = NaiveDate::from_ymd_opt(2026, 8, 27).unwrap();

    let seed = |days_past: i64, amount: &str| CreateDebt {
        customer_id: h.customer.customer_id,
        debt_type: "arrears".to_string(),
        original_amount: dec(amount),
        penalty_amount: Decimal::ZERO,
        due_date: Some(as_of - Duration::days(days_past)),
        notes: None,
    };

    // Upper bounds are closed: 30 is still current, 60 is still 31-60.
    for (days, amount) in [
        (10, "100"),
        (30, "5"),
        (31, "200"),
        (60, "7"),
        (75, "300"),
        (120, "400"),
        (400, "500"),
    ] {
        h.debts.create(&seed(days, amount)).await.unwrap();
    }

    // Settled and written-off debts stay out of the report.
    let settled = h.debts.create(&seed(45, "50")).await.unwrap();
    h.debts.pay_debt(settled.debt_id, dec("50")).await.unwrap();
    let gone = h.debts.create(&seed(500, "60")).await.unwrap();
    h.debts.write_off(gone.debt_id, "uncollectable").await.unwrap();

    let report = h.debts.aging_report(as_of).await.unwrap();
    assert_eq!(report.current, dec("105"));
    assert_eq!(report.days_31_60, dec("207"));
    assert_eq!(report.days_61_90, dec("300"));
    assert_eq!(report.days_91_180, dec("400"));
    assert_eq!(report.over_180, dec("500"));
    assert_eq!(report.total(), dec("1512"));
}

#[tokio::test]
async fn debt_without_due_date_ages_from_creation() {
    let h = Harness::new();
    let debt = h.debts.create(&debt_input(&h, "100", "0")).await.unwrap();

    // Fresh debt is current today, over 180 days from next year.
    let today = debt.created_utc.date_naive();
    let report = h.debts.aging_report(today).await.unwrap();
    assert_eq!(report.current, dec("100"));

    let later = today + Duration::days(200);
    let report = h.debts.aging_report(later).await.unwrap();
    assert_eq!(report.over_180, dec("100"));
}
