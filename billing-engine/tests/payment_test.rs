mod common;

use std::sync::Arc;

use billing_core::error::AppError;
use billing_engine::models::{
    accounts, CreatePayment, GenerateInvoice, Invoice, PaymentMethod,
};
use billing_engine::services::{InvoiceEngine, JournalLedger, NullLedgerSync, PaymentLedger};
use billing_engine::store::{MemoryStore, RecordStore};
use common::{dec, ContendedStore, FailingLedgerSync, Harness, RecordingSink};
use rust_decimal::Decimal;

/// Issue an invoice with total 529: consumption 260 + fixed 50 + other
/// 150 = 460 subtotal, VAT 69.
async fn issue_invoice(h: &Harness) -> Invoice {
    h.add_reading("2026-07", "1000", "1400");
    let invoice = h
        .invoices
        .generate(&GenerateInvoice {
            customer_id: h.customer.customer_id,
            billing_period: "2026-07".to_string(),
            other_charges: dec("150"),
        })
        .await
        .unwrap();
    assert_eq!(invoice.total, dec("529"));
    invoice
}

fn pay(h: &Harness, invoice: &Invoice, amount: &str, method: PaymentMethod) -> CreatePayment {
    CreatePayment {
        customer_id: h.customer.customer_id,
        invoice_id: Some(invoice.invoice_id),
        amount: dec(amount),
        method,
    }
}

#[tokio::test]
async fn full_payment_settles_the_invoice() {
    let h = Harness::new();
    let invoice = issue_invoice(&h).await;

    let payment = h
        .payments
        .record_payment(&pay(&h, &invoice, "529", PaymentMethod::Cash))
        .await
        .unwrap();
    assert_eq!(payment.status, "confirmed");
    assert_eq!(payment.kind, "invoice");
    assert!(payment.receipt_number.starts_with("RCT-"));

    let settled = h.store.get_invoice(invoice.invoice_id).await.unwrap().unwrap();
    assert_eq!(settled.status, "paid");
    assert_eq!(settled.balance, Decimal::ZERO);
    assert_eq!(settled.paid_amount, dec("529"));
    assert!(settled.paid_utc.is_some());

    // Cash payment debits the cash account, credits receivables.
    let entry = h
        .store
        .find_journal_for_reference("payment", payment.payment_id)
        .await
        .unwrap()
        .unwrap();
    let lines = h.store.get_journal_lines(entry.journal_id).await.unwrap();
    assert_eq!(lines[0].account_code, accounts::CASH);
    assert_eq!(lines[0].debit, dec("529"));
    assert_eq!(lines[1].account_code, accounts::ACCOUNTS_RECEIVABLE);
    assert_eq!(lines[1].credit, dec("529"));

    assert!(h.events.types().contains(&"PaymentReceived".to_string()));
}

#[tokio::test]
async fn partial_payment_leaves_a_balance() {
    let h = Harness::new();
    let invoice = issue_invoice(&h).await;

    h.payments
        .record_payment(&pay(&h, &invoice, "300", PaymentMethod::Bank))
        .await
        .unwrap();

    let partial = h.store.get_invoice(invoice.invoice_id).await.unwrap().unwrap();
    assert_eq!(partial.status, "partial");
    assert_eq!(partial.paid_amount, dec("300"));
    assert_eq!(partial.balance, dec("229"));
    assert!(partial.paid_utc.is_none());
}

#[tokio::test]
async fn two_partial_payments_complete_the_invoice() {
    let h = Harness::new();
    let invoice = issue_invoice(&h).await;

    h.payments
        .record_payment(&pay(&h, &invoice, "300", PaymentMethod::Cash))
        .await
        .unwrap();
    h.payments
        .record_payment(&pay(&h, &invoice, "229", PaymentMethod::Card))
        .await
        .unwrap();

    let settled = h.store.get_invoice(invoice.invoice_id).await.unwrap().unwrap();
    assert_eq!(settled.status, "paid");
    assert_eq!(settled.balance, Decimal::ZERO);
}

#[tokio::test]
async fn cancelling_a_payment_restores_the_balance_and_reverses_the_entry() {
    let h = Harness::new();
    let invoice = issue_invoice(&h).await;

    let payment = h
        .payments
        .record_payment(&pay(&h, &invoice, "300", PaymentMethod::Cash))
        .await
        .unwrap();
    let original = h
        .store
        .find_journal_for_reference("payment", payment.payment_id)
        .await
        .unwrap()
        .unwrap();

    let cancelled = h
        .payments
        .cancel_payment(payment.payment_id, "teller error")
        .await
        .unwrap();
    assert_eq!(cancelled.status, "cancelled");
    assert_eq!(cancelled.cancel_reason.as_deref(), Some("teller error"));

    let restored = h.store.get_invoice(invoice.invoice_id).await.unwrap().unwrap();
    assert_eq!(restored.status, "issued");
    assert_eq!(restored.paid_amount, Decimal::ZERO);
    assert_eq!(restored.balance, dec("529"));

    // The original entry flips to reversed; a compensating adjustment
    // entry swaps the sides.
    let reversed = h
        .store
        .get_journal_entry(original.journal_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reversed.status, "reversed");

    let reversal = h
        .store
        .find_journal_for_reference("journal_entry", original.journal_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reversal.entry_type, "adjustment");
    assert_eq!(reversal.reference_no, original.entry_no);
    let lines = h.store.get_journal_lines(reversal.journal_id).await.unwrap();
    assert_eq!(lines[0].account_code, accounts::CASH);
    assert_eq!(lines[0].credit, dec("300"));
    assert_eq!(lines[1].account_code, accounts::ACCOUNTS_RECEIVABLE);
    assert_eq!(lines[1].debit, dec("300"));
}

#[tokio::test]
async fn cancelling_a_payment_twice_is_a_conflict() {
    let h = Harness::new();
    let invoice = issue_invoice(&h).await;
    let payment = h
        .payments
        .record_payment(&pay(&h, &invoice, "100", PaymentMethod::Cash))
        .await
        .unwrap();

    h.payments
        .cancel_payment(payment.payment_id, "first")
        .await
        .unwrap();
    let err = h
        .payments
        .cancel_payment(payment.payment_id, "second")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
}

#[tokio::test]
async fn overpayment_is_rejected() {
    let h = Harness::new();
    let invoice = issue_invoice(&h).await;

    let err = h
        .payments
        .record_payment(&pay(&h, &invoice, "600", PaymentMethod::Cash))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
async fn paid_and_cancelled_invoices_reject_payments() {
    let h = Harness::new();
    let invoice = issue_invoice(&h).await;

    h.payments
        .record_payment(&pay(&h, &invoice, "529", PaymentMethod::Cash))
        .await
        .unwrap();
    let err = h
        .payments
        .record_payment(&pay(&h, &invoice, "10", PaymentMethod::Cash))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    h.add_reading("2026-08", "1400", "1500");
    let other = h
        .invoices
        .generate(&GenerateInvoice {
            customer_id: h.customer.customer_id,
            billing_period: "2026-08".to_string(),
            other_charges: Decimal::ZERO,
        })
        .await
        .unwrap();
    h.invoices.cancel(other.invoice_id, "void").await.unwrap();
    let err = h
        .payments
        .record_payment(&pay(&h, &other, "10", PaymentMethod::Cash))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
}

#[tokio::test]
async fn payment_against_another_customers_invoice_is_rejected() {
    let h = Harness::new();
    let invoice = issue_invoice(&h).await;
    let stranger = h.store.insert_customer("Stranger", "residential", true);

    let err = h
        .payments
        .record_payment(&CreatePayment {
            customer_id: stranger.customer_id,
            invoice_id: Some(invoice.invoice_id),
            amount: dec("100"),
            method: PaymentMethod::Cash,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
async fn non_positive_amounts_are_rejected() {
    let h = Harness::new();
    let invoice = issue_invoice(&h).await;

    for amount in ["0", "-5"] {
        let err = h
            .payments
            .record_payment(&pay(&h, &invoice, amount, PaymentMethod::Cash))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }
}

#[tokio::test]
async fn prepaid_recharge_without_invoice_credits_prepaid_revenue() {
    let h = Harness::new();

    let payment = h
        .payments
        .record_recharge(h.customer.customer_id, dec("200"), PaymentMethod::Online)
        .await
        .unwrap();
    assert_eq!(payment.kind, "prepaid");
    assert!(payment.invoice_id.is_none());

    let entry = h
        .store
        .find_journal_for_reference("payment", payment.payment_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(entry.entry_type, "prepaid_recharge");
    let lines = h.store.get_journal_lines(entry.journal_id).await.unwrap();
    assert_eq!(lines[0].account_code, accounts::BANK);
    assert_eq!(lines[1].account_code, accounts::PREPAID_REVENUE);
    assert_eq!(lines[1].credit, dec("200"));

    assert!(h.events.types().contains(&"PrepaidRecharged".to_string()));
}

#[tokio::test]
async fn failed_ledger_sync_does_not_fail_the_payment() {
    let h = Harness::with_sync(Arc::new(FailingLedgerSync));
    let invoice = issue_invoice(&h).await;

    let payment = h
        .payments
        .record_payment(&pay(&h, &invoice, "529", PaymentMethod::Cash))
        .await
        .unwrap();
    assert_eq!(payment.status, "confirmed");

    // The entry is still posted locally.
    let entry = h
        .store
        .find_journal_for_reference("payment", payment.payment_id)
        .await
        .unwrap();
    assert!(entry.is_some());
}

#[tokio::test]
async fn concurrent_partial_payments_both_apply() {
    let h = Harness::new();
    let invoice = issue_invoice(&h).await;

    let a = h
        .invoices
        .update_payment_status(invoice.invoice_id, dec("100"));
    let b = h
        .invoices
        .update_payment_status(invoice.invoice_id, dec("150"));
    let (a, b) = tokio::join!(a, b);
    a.unwrap();
    b.unwrap();

    let after = h.store.get_invoice(invoice.invoice_id).await.unwrap().unwrap();
    assert_eq!(after.paid_amount, dec("250"));
    assert_eq!(after.balance, dec("279"));
    assert_eq!(after.status, "partial");
}

#[tokio::test]
async fn stale_balance_delta_cannot_push_paid_past_total() {
    let h = Harness::new();
    let invoice = issue_invoice(&h).await;

    // Two payments that each read the full 529 balance before either
    // wrote. The second delta is checked against the freshly read row,
    // not the stale balance.
    h.invoices
        .update_payment_status(invoice.invoice_id, dec("300"))
        .await
        .unwrap();
    let err = h
        .invoices
        .update_payment_status(invoice.invoice_id, dec("300"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let after = h.store.get_invoice(invoice.invoice_id).await.unwrap().unwrap();
    assert_eq!(after.paid_amount, dec("300"));
    assert_eq!(after.balance, dec("229"));
    assert_eq!(after.status, "partial");
}

#[tokio::test]
async fn unapplied_payment_is_voided_not_left_confirmed() {
    let inner = Arc::new(MemoryStore::new());
    let customer = inner.insert_customer("Asha Perera", "residential", true);
    let meter = inner.insert_meter(customer.customer_id, "MTR-0001", true);
    inner.insert_slab("residential", dec("0"), Some(dec("200")), dec("0.5"), Some(dec("50")));
    inner.insert_slab("residential", dec("200"), None, dec("0.8"), None);
    inner.insert_reading(
        meter.meter_id,
        customer.customer_id,
        "2026-07",
        dec("1000"),
        dec("1400"),
    );

    let store = Arc::new(ContendedStore::new(inner));
    let events = Arc::new(RecordingSink::default());
    let journal = Arc::new(JournalLedger::new(store.clone(), Arc::new(NullLedgerSync)));
    let invoices = Arc::new(InvoiceEngine::new(
        store.clone(),
        journal.clone(),
        events.clone(),
    ));
    let payments = PaymentLedger::new(store.clone(), journal, invoices.clone(), events);

    let invoice = invoices
        .generate(&GenerateInvoice {
            customer_id: customer.customer_id,
            billing_period: "2026-07".to_string(),
            other_charges: dec("150"),
        })
        .await
        .unwrap();

    // Every balance write loses the version race, so applying the
    // payment gives up after the bounded retries.
    let err = payments
        .record_payment(&CreatePayment {
            customer_id: customer.customer_id,
            invoice_id: Some(invoice.invoice_id),
            amount: dec("300"),
            method: PaymentMethod::Cash,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    // The persisted payment row is voided rather than left confirmed,
    // and no journal entry was posted for it.
    let payment_id = store.created_payments.lock().unwrap()[0];
    let payment = store.get_payment(payment_id).await.unwrap().unwrap();
    assert_eq!(payment.status, "cancelled");
    assert!(payment
        .cancel_reason
        .as_deref()
        .unwrap_or_default()
        .contains("voided"));

    let entry = store
        .find_journal_for_reference("payment", payment_id)
        .await
        .unwrap();
    assert!(entry.is_none());

    let after = store.get_invoice(invoice.invoice_id).await.unwrap().unwrap();
    assert_eq!(after.paid_amount, Decimal::ZERO);
    assert_eq!(after.balance, dec("529"));
}
