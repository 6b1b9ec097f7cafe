use std::sync::Arc;
use std::time::{self, Instant};

use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::cache::SessionCache;
use crate::config::Config;
use crate::correlator::Correlator;
use crate::error::PipelineError;
use crate::event::Event;
use crate::queue::EventQueue;
use crate::sinks::EventSink;
use crate::stats::{self, PipelineStats, StatsSnapshot};
use crate::stream::StreamClient;

// Extra time `shutdown` grants on top of the write drain timeout.
const SHUTDOWN_GRACE: time::Duration = time::Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Running,
    Draining,
    Stopped,
    Failed,
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Stopped | PipelineState::Failed)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PipelineSettings {
    pub buffer_capacity: usize,
    pub batch_size: usize,
    pub max_concurrent_writes: usize,
    pub shutdown_timeout: time::Duration,
    pub stats_interval: time::Duration,
}

impl From<&Config> for PipelineSettings {
    fn from(config: &Config) -> Self {
        Self {
            buffer_capacity: config.buffer_capacity,
            batch_size: config.batch_size,
            max_concurrent_writes: config.max_concurrent_writes,
            shutdown_timeout: config.shutdown_timeout.0,
            stats_interval: config.stats_interval.0,
        }
    }
}

/// Runs the stream, the batcher and the writers, and owns their lifecycle.
pub struct Pipeline {
    stream: Arc<StreamClient>,
    queue: Arc<EventQueue>,
    cache: Arc<dyn SessionCache>,
    sink: Arc<dyn EventSink>,
    stats: Arc<PipelineStats>,
    settings: PipelineSettings,
    shutdown: CancellationToken,
    state: watch::Sender<PipelineState>,
}

impl Pipeline {
    pub fn new(
        stream: StreamClient,
        cache: Arc<dyn SessionCache>,
        sink: Arc<dyn EventSink>,
        stats: Arc<PipelineStats>,
        settings: PipelineSettings,
    ) -> Self {
        let (state, _) = watch::channel(PipelineState::Idle);

        Self {
            stream: Arc::new(stream),
            queue: Arc::new(EventQueue::new(settings.buffer_capacity, stats.clone())),
            cache,
            sink,
            stats,
            settings,
            shutdown: CancellationToken::new(),
            state,
        }
    }

    pub fn state(&self) -> PipelineState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<PipelineState> {
        self.state.subscribe()
    }

    pub fn stats(&self) -> Arc<PipelineStats> {
        self.stats.clone()
    }

    /// Move from `from` to `to`, returning whether the transition happened.
    fn transition(&self, from: PipelineState, to: PipelineState) -> bool {
        let changed = self.state.send_if_modified(|state| {
            if *state == from {
                *state = to;
                true
            } else {
                false
            }
        });

        if changed {
            info!(from = ?from, to = ?to, "pipeline state changed");
        }
        changed
    }

    fn finish(&self, to: PipelineState) {
        let from = self.state.send_replace(to);
        info!(from = ?from, to = ?to, "pipeline state changed");
    }

    /// Run until the stream is shut down or fails for good.
    ///
    /// On shutdown the final partial batch is flushed and in-flight writes are awaited before the
    /// cumulative stats are returned. An exhausted stream retry budget is returned as an error
    /// after the same drain.
    pub async fn run(&self) -> Result<StatsSnapshot, PipelineError> {
        if !self.transition(PipelineState::Idle, PipelineState::Running) {
            return Err(PipelineError::AlreadyStarted);
        }

        let stream_task = {
            let stream = self.stream.clone();
            let queue = self.queue.clone();
            let shutdown = self.shutdown.clone();
            tokio::spawn(async move {
                let result = stream.run(&queue, &shutdown).await;
                queue.close();
                result
            })
        };

        let batcher_task = tokio::spawn(batch_and_write(
            self.queue.clone(),
            Correlator::new(self.cache.clone(), self.settings.batch_size, self.stats.clone()),
            self.sink.clone(),
            self.stats.clone(),
            self.settings,
        ));

        let reporter_shutdown = CancellationToken::new();
        let reporter = tokio::spawn(stats::report(
            self.stats.clone(),
            self.settings.stats_interval,
            reporter_shutdown.clone(),
        ));

        let stream_result = stream_task.await;
        // Also covers a panicking stream task, which never got to close the queue.
        self.queue.close();
        self.transition(PipelineState::Running, PipelineState::Draining);

        let batcher_result = batcher_task.await;
        reporter_shutdown.cancel();
        if let Err(error) = reporter.await {
            warn!(%error, "stats reporter failed");
        }

        if let Err(error) = batcher_result {
            error!(%error, "batcher task failed");
            self.finish(PipelineState::Failed);
            return Err(PipelineError::TaskFailed(error));
        }

        match stream_result {
            Ok(Ok(())) => {
                self.finish(PipelineState::Stopped);
                Ok(self.stats.snapshot())
            }
            Ok(Err(error)) => {
                error!(%error, "event stream failed, stopping pipeline");
                self.finish(PipelineState::Failed);
                Err(PipelineError::Stream(error))
            }
            Err(error) => {
                error!(%error, "stream task failed");
                self.finish(PipelineState::Failed);
                Err(PipelineError::TaskFailed(error))
            }
        }
    }

    /// Ask a running pipeline to drain and wait until it has stopped.
    pub async fn shutdown(&self) -> Result<(), PipelineError> {
        if self.transition(PipelineState::Idle, PipelineState::Stopped) {
            return Ok(());
        }

        self.transition(PipelineState::Running, PipelineState::Draining);
        self.shutdown.cancel();

        let mut state = self.subscribe();
        let stopped = tokio::time::timeout(self.settings.shutdown_timeout + SHUTDOWN_GRACE, async {
            // The sender lives in `self`, so the channel cannot close while we wait.
            state.wait_for(PipelineState::is_terminal).await.is_ok()
        })
        .await;

        match stopped {
            Ok(_) => Ok(()),
            Err(_) => Err(PipelineError::ShutdownTimeout),
        }
    }
}

/// The batcher: resolves queued events into batches and hands each batch to a writer task.
async fn batch_and_write(
    queue: Arc<EventQueue>,
    mut correlator: Correlator,
    sink: Arc<dyn EventSink>,
    stats: Arc<PipelineStats>,
    settings: PipelineSettings,
) {
    let permits = Arc::new(Semaphore::new(settings.max_concurrent_writes.max(1)));
    let mut writes = JoinSet::new();

    loop {
        tokio::select! {
            Some(finished) = writes.join_next(), if !writes.is_empty() => {
                if let Err(error) = finished {
                    error!(%error, "bulk write task failed");
                }
            }
            event = queue.recv() => {
                let Some(event) = event else {
                    break;
                };
                if let Some(batch) = correlator.push(event) {
                    dispatch(&mut writes, &permits, &sink, &stats, batch).await;
                }
            }
        }
    }

    if let Some(batch) = correlator.flush() {
        info!(size = batch.len(), "flushing final batch");
        dispatch(&mut writes, &permits, &sink, &stats, batch).await;
    }

    let drained = tokio::time::timeout(settings.shutdown_timeout, async {
        while let Some(finished) = writes.join_next().await {
            if let Err(error) = finished {
                error!(%error, "bulk write task failed");
            }
        }
    })
    .await;

    if drained.is_err() {
        warn!(
            remaining = writes.len(),
            "shutdown timeout elapsed, aborting in-flight bulk writes"
        );
        writes.abort_all();
    }
}

async fn dispatch(
    writes: &mut JoinSet<()>,
    permits: &Arc<Semaphore>,
    sink: &Arc<dyn EventSink>,
    stats: &Arc<PipelineStats>,
    batch: Vec<Event>,
) {
    // Waits while `max_concurrent_writes` batches are in flight.
    let permit = match permits.clone().acquire_owned().await {
        Ok(permit) => permit,
        Err(error) => {
            error!(%error, size = batch.len(), "write permits closed, dropping batch");
            return;
        }
    };

    let sink = sink.clone();
    let stats = stats.clone();

    writes.spawn(async move {
        let _permit = permit;
        let size = batch.len();
        let started = Instant::now();

        match sink.save(batch).await {
            Ok(summary) => {
                stats.record_write(summary.sent, summary.failed, started.elapsed());
            }
            Err(error) => {
                stats.record_write_failed(started.elapsed());
                error!(%error, size, "bulk write failed, dropping batch");
            }
        }
    });
}
