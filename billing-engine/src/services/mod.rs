pub mod debt;
pub mod events;
pub mod invoice;
pub mod journal;
pub mod metrics;
pub mod payment;
pub mod sync;
pub mod tariff;

pub use debt::DebtTracker;
pub use events::{DomainEvent, EventSink, LogEventSink};
pub use invoice::InvoiceEngine;
pub use journal::JournalLedger;
pub use payment::PaymentLedger;
pub use sync::{HttpLedgerSync, LedgerSync, NullLedgerSync};
