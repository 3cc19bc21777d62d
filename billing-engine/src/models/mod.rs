//! Domain models for billing-engine.

mod customer;
mod debt;
mod invoice;
mod journal;
mod payment;
mod tariff;

pub use customer::{BillingPeriod, Customer, Meter, MeterReading};
pub use debt::{AgingReport, CreateDebt, Debt, DebtStatus};
pub use invoice::{
    GenerateInvoice, Invoice, InvoiceItem, InvoicePaymentUpdate, InvoiceStatus, ItemKind,
};
pub use journal::{
    accounts, balance_epsilon, EntryType, JournalEntry, JournalLine, JournalStatus, LineInput,
};
pub use payment::{CreatePayment, Payment, PaymentKind, PaymentMethod, PaymentStatus};
pub use tariff::{ChargeLine, TariffBreakdown, TariffSlab};
