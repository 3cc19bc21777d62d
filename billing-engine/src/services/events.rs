//! Fire-and-forget domain event publication.
//!
//! Publish failures are logged and never propagated to the business
//! operation that raised the event.

use billing_core::error::AppError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

/// Source identifier stamped on every event.
pub const EVENT_SOURCE: &str = "billing-engine";

/// Typed domain event envelope.
#[derive(Debug, Clone, Serialize)]
pub struct DomainEvent {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub event_type: String,
    pub source: String,
    pub timestamp: DateTime<Utc>,
    pub data: serde_json::Value,
    pub correlation_id: Uuid,
}

impl DomainEvent {
    pub fn new(event_type: &str, data: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type: event_type.to_string(),
            source: EVENT_SOURCE.to_string(),
            timestamp: Utc::now(),
            data,
            correlation_id: Uuid::new_v4(),
        }
    }
}

/// Outbound event bus seam.
#[async_trait::async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, event: DomainEvent) -> Result<(), AppError>;
}

/// Default sink: emits the event into the structured log stream.
pub struct LogEventSink;

#[async_trait::async_trait]
impl EventSink for LogEventSink {
    async fn publish(&self, event: DomainEvent) -> Result<(), AppError> {
        info!(
            event_id = %event.id,
            event_type = %event.event_type,
            correlation_id = %event.correlation_id,
            data = %event.data,
            "Domain event"
        );
        Ok(())
    }
}

/// Publish an event, recovering locally from sink failures.
pub(crate) async fn publish_best_effort(
    sink: &dyn EventSink,
    event_type: &str,
    data: serde_json::Value,
) {
    let event = DomainEvent::new(event_type, data);
    if let Err(e) = sink.publish(event).await {
        warn!(event_type = event_type, error = %e, "Event publish failed");
    }
}
