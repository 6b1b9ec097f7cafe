use async_trait::async_trait;
use metrics::histogram;
use tracing::info;

use crate::error::SinkError;
use crate::event::Event;
use crate::sinks::{EventSink, WriteSummary};

/// Logs batches instead of writing them anywhere. Useful to inspect the enriched output locally.
pub struct PrintSink {}

#[async_trait]
impl EventSink for PrintSink {
    async fn save(&self, batch: Vec<Event>) -> Result<WriteSummary, SinkError> {
        let span = tracing::span!(tracing::Level::INFO, "batch of events");
        let _enter = span.enter();

        histogram!("telemetry_print_batch_size").record(batch.len() as f64);
        for event in &batch {
            let document = serde_json::to_string(event).map_err(SinkError::Serialize)?;
            info!("event: {document}");
        }

        Ok(WriteSummary {
            sent: batch.len(),
            failed: 0,
        })
    }
}
