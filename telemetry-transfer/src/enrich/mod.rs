//! Per-event enrichment of the free-form `data` payload.
//!
//! Processors run synchronously in registration order, right after an event is decoded. Each one
//! decides from the event name and the payload whether it applies, and only communicates with the
//! others through the payload itself.

use serde_json::Value;

use crate::event::{Data, Event};

pub mod clamp;
pub mod content_restriction;
pub mod device_name;
pub mod error_type;
pub mod media_id;
pub mod origin;
pub mod user_agent;

pub use clamp::ClampProcessor;
pub use content_restriction::ContentRestrictionProcessor;
pub use device_name::DeviceNameProcessor;
pub use error_type::ErrorTypeProcessor;
pub use media_id::MediaIdProcessor;
pub use origin::OriginProcessor;
pub use user_agent::UserAgentProcessor;

pub trait DataProcessor: Send + Sync {
    fn name(&self) -> &'static str;

    fn should_process(&self, _event_name: &str, _data: &Data) -> bool {
        true
    }

    fn process(&self, data: &mut Data);
}

pub struct Enricher {
    processors: Vec<Box<dyn DataProcessor>>,
}

impl Enricher {
    pub fn new(processors: Vec<Box<dyn DataProcessor>>) -> Self {
        Self { processors }
    }

    /// The processors every event goes through in production, in order.
    pub fn default_pipeline() -> Self {
        Self::new(vec![
            Box::new(UserAgentProcessor),
            Box::new(DeviceNameProcessor),
            Box::new(ContentRestrictionProcessor),
            Box::new(ErrorTypeProcessor),
            Box::new(MediaIdProcessor),
            Box::new(OriginProcessor),
            Box::new(ClampProcessor),
        ])
    }

    pub fn processor_names(&self) -> Vec<&'static str> {
        self.processors.iter().map(|p| p.name()).collect()
    }

    pub fn apply(&self, event: &mut Event) {
        for processor in &self.processors {
            if processor.should_process(&event.event_name, &event.data) {
                processor.process(&mut event.data);
            }
        }
    }
}

/// Mutable access to a nested object, if `key` holds one.
pub(crate) fn object_mut<'a>(data: &'a mut Data, key: &str) -> Option<&'a mut Data> {
    data.get_mut(key).and_then(Value::as_object_mut)
}

/// Mutable access to a nested object, replacing whatever `key` held if it is not an object.
/// Always `Some`.
pub(crate) fn object_entry<'a>(data: &'a mut Data, key: &str) -> Option<&'a mut Data> {
    let entry = data.entry(key.to_string()).or_insert(Value::Null);

    if !entry.is_object() {
        *entry = Value::Object(Data::new());
    }

    entry.as_object_mut()
}
