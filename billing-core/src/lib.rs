//! billing-core: Shared infrastructure for the utility billing workspace.
pub mod error;
pub mod observability;

pub use anyhow;
pub use serde;
pub use serde_json;
pub use tracing;
