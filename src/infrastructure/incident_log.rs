use crate::domain::ports::IncidentLog;
use async_trait::async_trait;
use serde_json::Value;
use tracing::error;

/// Writes incidents as structured `tracing` events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingIncidentLog;

#[async_trait]
impl IncidentLog for TracingIncidentLog {
    async fn log_entry(&self, message: &str, context: Value) {
        error!(context = %context, "{message}");
    }
}
