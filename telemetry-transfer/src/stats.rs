use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::info;

const EVENTS_INCOMING: &str = "telemetry_events_incoming_total";
const EVENTS_MALFORMED: &str = "telemetry_events_malformed_total";
const EVENTS_EVICTED: &str = "telemetry_events_evicted_total";
const EVENTS_BATCHED: &str = "telemetry_events_batched_total";
const SESSION_CACHE_HITS: &str = "telemetry_session_cache_hits_total";
const EVENTS_UNRESOLVED: &str = "telemetry_events_unresolved_total";
const EVENTS_PERSISTED: &str = "telemetry_events_persisted_total";
const DOCUMENT_FAILURES: &str = "telemetry_document_failures_total";
const BATCHES_WRITTEN: &str = "telemetry_batches_written_total";
const BATCHES_FAILED: &str = "telemetry_batches_failed_total";
const STREAM_RETRIES: &str = "telemetry_stream_retries_total";
const WRITE_DURATION: &str = "telemetry_bulk_write_duration_seconds";
const BATCH_SIZE: &str = "telemetry_batch_size";

/// Throughput counters for one pipeline, shared between its tasks.
///
/// Every counter is mirrored to the `metrics` facade so it shows up on the Prometheus endpoint.
#[derive(Debug, Default)]
pub struct PipelineStats {
    incoming: AtomicU64,
    malformed: AtomicU64,
    evicted: AtomicU64,
    batched: AtomicU64,
    cache_hits: AtomicU64,
    unresolved: AtomicU64,
    persisted: AtomicU64,
    document_failures: AtomicU64,
    batches_written: AtomicU64,
    batches_failed: AtomicU64,
    stream_retries: AtomicU64,
    write_latency: Mutex<LatencyWindow>,
}

#[derive(Debug, Default)]
struct LatencyWindow {
    total: Duration,
    samples: u32,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    fn bump(counter: &AtomicU64, name: &'static str, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
        metrics::counter!(name).increment(n);
    }

    pub fn record_incoming(&self) {
        Self::bump(&self.incoming, EVENTS_INCOMING, 1);
    }

    pub fn record_malformed(&self) {
        Self::bump(&self.malformed, EVENTS_MALFORMED, 1);
    }

    pub fn record_evicted(&self) {
        Self::bump(&self.evicted, EVENTS_EVICTED, 1);
    }

    pub fn record_batched(&self) {
        Self::bump(&self.batched, EVENTS_BATCHED, 1);
    }

    pub fn record_cache_hit(&self) {
        Self::bump(&self.cache_hits, SESSION_CACHE_HITS, 1);
    }

    pub fn record_unresolved(&self) {
        Self::bump(&self.unresolved, EVENTS_UNRESOLVED, 1);
    }

    pub fn record_stream_retry(&self) {
        Self::bump(&self.stream_retries, STREAM_RETRIES, 1);
    }

    /// A bulk request went through; `failed` of its `sent` documents were rejected by the store.
    pub fn record_write(&self, sent: usize, failed: usize, elapsed: Duration) {
        Self::bump(&self.persisted, EVENTS_PERSISTED, sent as u64);
        Self::bump(&self.document_failures, DOCUMENT_FAILURES, failed as u64);
        Self::bump(&self.batches_written, BATCHES_WRITTEN, 1);
        metrics::histogram!(BATCH_SIZE).record(sent as f64);
        self.record_latency(elapsed);
    }

    pub fn record_write_failed(&self, elapsed: Duration) {
        Self::bump(&self.batches_failed, BATCHES_FAILED, 1);
        self.record_latency(elapsed);
    }

    fn record_latency(&self, elapsed: Duration) {
        metrics::histogram!(WRITE_DURATION).record(elapsed.as_secs_f64());

        let mut window = self
            .write_latency
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        window.total += elapsed;
        window.samples += 1;
    }

    /// Average write latency since the previous call, if any write happened in between.
    pub fn take_average_write_latency(&self) -> Option<Duration> {
        let mut window = self
            .write_latency
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let window = std::mem::take(&mut *window);

        (window.samples > 0).then(|| window.total / window.samples)
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            incoming: self.incoming.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            evicted: self.evicted.load(Ordering::Relaxed),
            batched: self.batched.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            unresolved: self.unresolved.load(Ordering::Relaxed),
            persisted: self.persisted.load(Ordering::Relaxed),
            document_failures: self.document_failures.load(Ordering::Relaxed),
            batches_written: self.batches_written.load(Ordering::Relaxed),
            batches_failed: self.batches_failed.load(Ordering::Relaxed),
            stream_retries: self.stream_retries.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub incoming: u64,
    pub malformed: u64,
    pub evicted: u64,
    pub batched: u64,
    pub cache_hits: u64,
    pub unresolved: u64,
    pub persisted: u64,
    pub document_failures: u64,
    pub batches_written: u64,
    pub batches_failed: u64,
    pub stream_retries: u64,
}

impl StatsSnapshot {
    /// Counts accumulated since `previous` was taken.
    pub fn delta(&self, previous: &StatsSnapshot) -> StatsSnapshot {
        StatsSnapshot {
            incoming: self.incoming.saturating_sub(previous.incoming),
            malformed: self.malformed.saturating_sub(previous.malformed),
            evicted: self.evicted.saturating_sub(previous.evicted),
            batched: self.batched.saturating_sub(previous.batched),
            cache_hits: self.cache_hits.saturating_sub(previous.cache_hits),
            unresolved: self.unresolved.saturating_sub(previous.unresolved),
            persisted: self.persisted.saturating_sub(previous.persisted),
            document_failures: self
                .document_failures
                .saturating_sub(previous.document_failures),
            batches_written: self
                .batches_written
                .saturating_sub(previous.batches_written),
            batches_failed: self.batches_failed.saturating_sub(previous.batches_failed),
            stream_retries: self.stream_retries.saturating_sub(previous.stream_retries),
        }
    }
}

/// Log the per-interval figures until `shutdown` fires.
pub async fn report(
    stats: std::sync::Arc<PipelineStats>,
    interval: Duration,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    let mut previous = stats.snapshot();

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let current = stats.snapshot();
        let delta = current.delta(&previous);
        previous = current;

        let average_write_ms = stats
            .take_average_write_latency()
            .map(|latency| latency.as_millis() as u64);

        info!(
            incoming = delta.incoming,
            malformed = delta.malformed,
            evicted = delta.evicted,
            unresolved = delta.unresolved,
            persisted = delta.persisted,
            document_failures = delta.document_failures,
            batches_written = delta.batches_written,
            batches_failed = delta.batches_failed,
            stream_retries = delta.stream_retries,
            average_write_ms,
            interval_secs = interval.as_secs(),
            "pipeline stats"
        );
    }
}
