use std::sync::Arc;

use tracing::debug;

use crate::cache::SessionCache;
use crate::event::Event;
use crate::stats::PipelineStats;

/// Groups events into batches and attaches the session data of each event's START.
///
/// Only the batcher task owns a correlator, so the cache is never written concurrently.
pub struct Correlator {
    cache: Arc<dyn SessionCache>,
    batch_size: usize,
    pending: Vec<Event>,
    stats: Arc<PipelineStats>,
}

impl Correlator {
    pub fn new(cache: Arc<dyn SessionCache>, batch_size: usize, stats: Arc<PipelineStats>) -> Self {
        let batch_size = batch_size.max(1);

        Self {
            cache,
            batch_size,
            pending: Vec::with_capacity(batch_size.min(8192)),
            stats,
        }
    }

    /// Add an event, returning a resolved batch once `batch_size` events have accumulated.
    pub fn push(&mut self, event: Event) -> Option<Vec<Event>> {
        self.stats.record_batched();
        self.pending.push(event);

        if self.pending.len() >= self.batch_size {
            self.flush()
        } else {
            None
        }
    }

    /// Resolve whatever is pending, regardless of the batch size.
    pub fn flush(&mut self) -> Option<Vec<Event>> {
        if self.pending.is_empty() {
            return None;
        }

        let events = std::mem::replace(
            &mut self.pending,
            Vec::with_capacity(self.batch_size.min(8192)),
        );
        let resolved = self.resolve(events);

        (!resolved.is_empty()).then_some(resolved)
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// START events are applied first so that events queued just before their START in the same
    /// batch still find their session.
    fn resolve(&self, events: Vec<Event>) -> Vec<Event> {
        let (starts, others): (Vec<Event>, Vec<Event>) =
            events.into_iter().partition(Event::is_start);

        let mut resolved = Vec::with_capacity(starts.len() + others.len());

        for mut start in starts {
            let session = Arc::new(std::mem::take(&mut start.data));
            self.cache.put(start.session_id.clone(), session.clone());
            start.session = Some(session);
            resolved.push(start);
        }

        for mut event in others {
            match self.cache.get(&event.session_id) {
                Some(session) => {
                    self.stats.record_cache_hit();
                    event.session = Some(session);
                    resolved.push(event);
                }
                None => {
                    self.stats.record_unresolved();
                    debug!(
                        session_id = %event.session_id,
                        event_name = %event.event_name,
                        "dropping event without a known session"
                    );
                }
            }
        }

        resolved
    }
}
