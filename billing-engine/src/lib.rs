//! Billing engine for utility electricity: progressive tariff
//! calculation, invoice lifecycle, payment collection, debt aging and a
//! double-entry journal synced to the core accounting system.

pub mod config;
pub mod models;
pub mod services;
pub mod store;
