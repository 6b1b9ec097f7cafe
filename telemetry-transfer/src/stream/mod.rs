use std::sync::Arc;
use std::time;

use futures::StreamExt;
use reqwest::header;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::enrich::Enricher;
use crate::error::{DecodeError, StreamError};
use crate::event::Event;
use crate::queue::EventQueue;
use crate::retry::RetryPolicy;
use crate::stats::PipelineStats;

pub mod decoder;

pub use decoder::FrameDecoder;

/// Keeps the connection to the dispatch service open and feeds decoded, enriched events into the
/// queue.
pub struct StreamClient {
    client: reqwest::Client,
    uri: String,
    retry_policy: RetryPolicy,
    enricher: Arc<Enricher>,
    stats: Arc<PipelineStats>,
}

impl StreamClient {
    pub fn new(
        uri: &str,
        connect_timeout: time::Duration,
        retry_policy: RetryPolicy,
        enricher: Arc<Enricher>,
        stats: Arc<PipelineStats>,
    ) -> Result<Self, StreamError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("text/event-stream"),
        );

        // No overall timeout: the body is expected to stay open indefinitely.
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent("telemetry-transfer")
            .connect_timeout(connect_timeout)
            .build()
            .map_err(StreamError::Client)?;

        Ok(Self {
            client,
            uri: uri.to_owned(),
            retry_policy,
            enricher,
            stats,
        })
    }

    /// Decode one message and run it through the enrichment pipeline.
    pub fn decode(&self, message: &str) -> Result<Event, DecodeError> {
        let mut event = Event::decode(message)?;
        self.enricher.apply(&mut event);
        Ok(event)
    }

    /// Stream events into `queue` until `shutdown` fires or the retry budget is spent.
    ///
    /// Returns `Ok(())` only on shutdown. Attempts accumulate over every connection, including
    /// the ones that delivered events, so the budget bounds the total number of reconnects.
    pub async fn run(
        &self,
        queue: &EventQueue,
        shutdown: &CancellationToken,
    ) -> Result<(), StreamError> {
        let mut attempt: u32 = 0;

        loop {
            let mut received: u64 = 0;

            let outcome = tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),
                outcome = self.consume(queue, &mut received) => outcome,
            };
            let cause = match outcome {
                Ok(()) => StreamError::Closed,
                Err(error) => error,
            };

            if !self.retry_policy.allows(attempt) {
                error!(
                    cause = %cause,
                    attempts = attempt,
                    "event stream retries exhausted"
                );
                return Err(StreamError::RetriesExhausted {
                    attempts: attempt,
                    source: Box::new(cause),
                });
            }

            let delay = self.retry_policy.time_until_next_retry(attempt);
            attempt += 1;
            self.stats.record_stream_retry();

            warn!(
                cause = %cause,
                attempt,
                max_attempts = self.retry_policy.max_attempts(),
                received,
                delay_ms = delay.as_millis() as u64,
                "event stream lost, reconnecting"
            );

            tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// One connection: read until the server closes the body or an error occurs.
    async fn consume(&self, queue: &EventQueue, received: &mut u64) -> Result<(), StreamError> {
        let response = self
            .client
            .get(&self.uri)
            .send()
            .await
            .map_err(StreamError::Connect)?;

        let status = response.status();
        if !status.is_success() {
            return Err(StreamError::Status(status));
        }

        info!(uri = %self.uri, "connected to event stream");

        let mut decoder = FrameDecoder::new();
        let mut body = response.bytes_stream();

        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(StreamError::Read)?;
            for message in decoder.feed(&chunk) {
                self.handle(&message, queue, received);
            }
        }

        for message in decoder.finish() {
            self.handle(&message, queue, received);
        }

        Ok(())
    }

    fn handle(&self, message: &str, queue: &EventQueue, received: &mut u64) {
        match self.decode(message) {
            Ok(event) => {
                *received += 1;
                self.stats.record_incoming();
                queue.push(event);
            }
            Err(error) => {
                self.stats.record_malformed();
                warn!(%error, "skipping malformed stream message");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use httpmock::prelude::*;

    use super::*;

    fn client(uri: &str, max_attempts: u32, stats: Arc<PipelineStats>) -> StreamClient {
        StreamClient::new(
            uri,
            time::Duration::from_secs(1),
            RetryPolicy::new(
                time::Duration::from_millis(1),
                time::Duration::from_millis(5),
                max_attempts,
            ),
            Arc::new(Enricher::default_pipeline()),
            stats,
        )
        .expect("client should build")
    }

    #[test]
    fn test_decode_applies_enrichment() {
        let client = client("http://localhost:1", 0, Arc::new(PipelineStats::new()));

        let event = client
            .decode(r#"{"session_id":"s","event_name":"ERROR","@timestamp":1,"version":1,"data":{"message":"Ce contenu n'est plus disponible."}}"#)
            .unwrap();

        assert_eq!(event.data["block_reason"], "ENDDATE");
        assert_eq!(event.data["business_error"], true);
    }

    #[tokio::test]
    async fn test_reads_events_and_skips_malformed() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/events")
                .header("accept", "text/event-stream");
            then.status(200)
                .header("content-type", "text/event-stream")
                .body(concat!(
                    "data: {\"session_id\":\"s1\",\"event_name\":\"START\",\"@timestamp\":1,\"version\":1,\"data\":{}}\n\n",
                    "data: not json\n\n",
                    "data: {\"session_id\":\"s1\",\"event_name\":\"HEARTBEAT\",\"@timestamp\":2,\"version\":1,\"data\":{}}\n\n",
                ));
        });

        let stats = Arc::new(PipelineStats::new());
        let queue = EventQueue::new(10, stats.clone());
        let client = client(&server.url("/events"), 0, stats.clone());

        let result = client.run(&queue, &CancellationToken::new()).await;

        assert!(matches!(
            result,
            Err(StreamError::RetriesExhausted { attempts: 0, .. })
        ));
        mock.assert();
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.try_recv().unwrap().event_name, "START");
        assert_eq!(queue.try_recv().unwrap().event_name, "HEARTBEAT");
        assert_eq!(stats.snapshot().incoming, 2);
        assert_eq!(stats.snapshot().malformed, 1);
    }

    #[tokio::test]
    async fn test_retries_failing_stream_until_budget_is_spent() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/events");
            then.status(503);
        });

        let stats = Arc::new(PipelineStats::new());
        let queue = EventQueue::new(10, stats.clone());
        let client = client(&server.url("/events"), 3, stats.clone());

        let result = client.run(&queue, &CancellationToken::new()).await;

        match result {
            Err(StreamError::RetriesExhausted { attempts, source }) => {
                assert_eq!(attempts, 3);
                assert!(matches!(*source, StreamError::Status(status) if status.as_u16() == 503));
            }
            other => panic!("unexpected result: {other:?}"),
        }
        // The first connection plus three retries.
        mock.assert_hits(4);
        assert_eq!(stats.snapshot().stream_retries, 3);
    }

    #[tokio::test]
    async fn test_shutdown_stops_backoff() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/events");
            then.status(500);
        });

        let stats = Arc::new(PipelineStats::new());
        let queue = EventQueue::new(10, stats.clone());
        let client = StreamClient::new(
            &server.url("/events"),
            time::Duration::from_secs(1),
            RetryPolicy::new(
                time::Duration::from_secs(60),
                time::Duration::from_secs(60),
                5,
            ),
            Arc::new(Enricher::default_pipeline()),
            stats,
        )
        .unwrap();

        let shutdown = CancellationToken::new();
        let cancel = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(time::Duration::from_millis(100)).await;
            cancel.cancel();
        });

        let result = tokio::time::timeout(
            time::Duration::from_secs(5),
            client.run(&queue, &shutdown),
        )
        .await
        .expect("shutdown should interrupt the backoff sleep");

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_delivering_connections_still_spend_the_budget() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/events");
            then.status(200).body(
                "data: {\"session_id\":\"s1\",\"event_name\":\"HEARTBEAT\",\"@timestamp\":1,\"version\":1,\"data\":{}}\n\n",
            );
        });

        let stats = Arc::new(PipelineStats::new());
        let queue = EventQueue::new(10, stats.clone());
        let client = client(&server.url("/events"), 2, stats.clone());

        let result = tokio::time::timeout(
            time::Duration::from_secs(5),
            client.run(&queue, &CancellationToken::new()),
        )
        .await
        .expect("budget should be spent despite delivered events");

        assert!(matches!(
            result,
            Err(StreamError::RetriesExhausted { attempts: 2, .. })
        ));
        mock.assert_hits(3);
        assert_eq!(stats.snapshot().incoming, 3);
        assert_eq!(stats.snapshot().stream_retries, 2);
    }
}
