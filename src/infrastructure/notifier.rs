use crate::domain::event::DomainEvent;
use crate::domain::ports::NotificationSink;
use crate::error::{EngineError, Result};
use async_trait::async_trait;
use tracing::info;

/// Writes every event to the `verisettle::events` tracing target as JSON.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

#[async_trait]
impl NotificationSink for TracingNotifier {
    async fn deliver(&self, event: &DomainEvent) -> Result<()> {
        let payload =
            serde_json::to_string(event).map_err(|e| EngineError::InternalError(Box::new(e)))?;
        info!(target: "verisettle::events", %payload, "event");
        Ok(())
    }
}
