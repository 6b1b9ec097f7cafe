use std::sync::Arc;
use std::time::Duration;

use httpmock::prelude::*;
use serde_json::json;

use telemetry_transfer::cache::LruSessionCache;
use telemetry_transfer::driver::{Pipeline, PipelineSettings, PipelineState};
use telemetry_transfer::enrich::Enricher;
use telemetry_transfer::error::{PipelineError, StreamError};
use telemetry_transfer::retry::RetryPolicy;
use telemetry_transfer::sinks::BulkSink;
use telemetry_transfer::stats::PipelineStats;
use telemetry_transfer::stream::StreamClient;

const STREAM: &str = concat!(
    ": connected\n\n",
    "data: {\"session_id\":\"s1\",\"event_name\":\"START\",\"@timestamp\":1,\"version\":1,\"data\":{\"bu\":\"x\"}}\n\n",
    "data: {\"session_id\":\"s1\",\"event_name\":\"HEARTBEAT\",\"@timestamp\":2,\"version\":1,\"data\":{\"position\":10}}\n\n",
    "data: {\"session_id\":\"s2\",\"event_name\":\"ERROR\",\"@timestamp\":3,\"version\":1,",
    "\"data\":{\"message\":\"This content is not available outside Switzerland.\"}}\n\n",
    "data: not json\n\n",
);

fn pipeline(dispatch: &MockServer, store: &MockServer) -> Pipeline {
    let stats = Arc::new(PipelineStats::new());
    let stream = StreamClient::new(
        &dispatch.url("/events"),
        Duration::from_secs(1),
        RetryPolicy::new(Duration::ZERO, Duration::ZERO, 0),
        Arc::new(Enricher::default_pipeline()),
        stats.clone(),
    )
    .unwrap();
    let sink = BulkSink::new(
        &store.base_url(),
        "events",
        "heartbeats",
        Duration::from_secs(5),
    )
    .unwrap();

    Pipeline::new(
        stream,
        Arc::new(LruSessionCache::new(100)),
        Arc::new(sink),
        stats,
        PipelineSettings {
            buffer_capacity: 100,
            batch_size: 10,
            max_concurrent_writes: 2,
            shutdown_timeout: Duration::from_secs(5),
            stats_interval: Duration::from_secs(60),
        },
    )
}

#[tokio::test]
async fn test_stream_to_bulk_store() {
    let dispatch = MockServer::start();
    dispatch.mock(|when, then| {
        when.method(GET)
            .path("/events")
            .header("accept", "text/event-stream");
        then.status(200)
            .header("content-type", "text/event-stream")
            .body(STREAM);
    });

    let store = MockServer::start();
    let bulk = store.mock(|when, then| {
        when.method(POST)
            .path("/_bulk")
            .body_contains(r#"{"create":{"_index":"events"}}"#)
            .body_contains(r#"{"create":{"_index":"heartbeats"}}"#)
            .body_contains(r#""event_name":"START","@timestamp":1,"version":1,"data":{},"session":{"bu":"x"}"#)
            .body_contains(r#""data":{"position":10}"#);
        then.status(200)
            .json_body(json!({"took": 1, "errors": false, "items": []}));
    });

    let pipeline = pipeline(&dispatch, &store);
    let result = pipeline.run().await;

    // A single connection and no retries: the stream ends with an exhausted budget.
    assert!(matches!(
        result,
        Err(PipelineError::Stream(StreamError::RetriesExhausted { attempts: 0, .. }))
    ));
    assert_eq!(pipeline.state(), PipelineState::Failed);

    bulk.assert_hits(1);

    let snapshot = pipeline.stats().snapshot();
    assert_eq!(snapshot.incoming, 3);
    assert_eq!(snapshot.malformed, 1);
    assert_eq!(snapshot.batched, 3);
    assert_eq!(snapshot.unresolved, 1);
    assert_eq!(snapshot.cache_hits, 1);
    assert_eq!(snapshot.persisted, 2);
    assert_eq!(snapshot.batches_written, 1);
}

#[tokio::test]
async fn test_store_outage_drops_batch() {
    let dispatch = MockServer::start();
    dispatch.mock(|when, then| {
        when.method(GET).path("/events");
        then.status(200).body(STREAM);
    });

    let store = MockServer::start();
    let bulk = store.mock(|when, then| {
        when.method(POST).path("/_bulk");
        then.status(503).body("unavailable");
    });

    let pipeline = pipeline(&dispatch, &store);
    assert!(pipeline.run().await.is_err());

    bulk.assert_hits(1);

    let snapshot = pipeline.stats().snapshot();
    assert_eq!(snapshot.persisted, 0);
    assert_eq!(snapshot.batches_failed, 1);
}
