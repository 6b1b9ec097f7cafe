use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::Notify;

use crate::event::Event;
use crate::stats::PipelineStats;

/// Bounded queue between the stream task and the batcher.
///
/// Pushing never waits: when the queue is full the oldest event is discarded to make room.
pub struct EventQueue {
    buf: Mutex<VecDeque<Event>>,
    capacity: usize,
    notify: Notify,
    closed: AtomicBool,
    stats: Arc<PipelineStats>,
}

impl EventQueue {
    pub fn new(capacity: usize, stats: Arc<PipelineStats>) -> Self {
        Self {
            buf: Mutex::new(VecDeque::with_capacity(capacity.min(4096))),
            capacity: capacity.max(1),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
            stats,
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Event>> {
        self.buf
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Enqueue an event, returning the event evicted to make room for it.
    pub fn push(&self, event: Event) -> Option<Event> {
        let mut buf = self.lock();
        let evicted = if buf.len() >= self.capacity {
            buf.pop_front()
        } else {
            None
        };
        buf.push_back(event);
        drop(buf);

        if let Some(evicted) = &evicted {
            self.stats.record_evicted();
            tracing::debug!(
                session_id = %evicted.session_id,
                event_name = %evicted.event_name,
                "queue full, dropped oldest event"
            );
        }

        self.notify.notify_one();
        evicted
    }

    pub fn try_recv(&self) -> Option<Event> {
        self.lock().pop_front()
    }

    /// Wait for the next event. Returns `None` once the queue is closed and drained.
    pub async fn recv(&self) -> Option<Event> {
        loop {
            if let Some(event) = self.try_recv() {
                return Some(event);
            }
            if self.closed.load(Ordering::Acquire) {
                // An event may have been pushed between the pop and the flag check.
                return self.try_recv();
            }
            self.notify.notified().await;
        }
    }

    /// Mark the queue closed: `recv` drains what is left and then yields `None`.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_one();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
