use async_trait::async_trait;

use crate::error::SinkError;
use crate::event::Event;

pub mod bulk;
pub mod print;

pub use bulk::BulkSink;
pub use print::PrintSink;

/// Outcome of a batch the destination accepted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteSummary {
    /// Documents sent in the request.
    pub sent: usize,
    /// Documents the destination reported as rejected. They are logged, not retried.
    pub failed: usize,
}

#[async_trait]
pub trait EventSink: Send + Sync {
    async fn save(&self, batch: Vec<Event>) -> Result<WriteSummary, SinkError>;
}
