use std::collections::HashMap;
use std::time;

use async_trait::async_trait;
use reqwest::header;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error};

use crate::error::SinkError;
use crate::event::Event;
use crate::sinks::{EventSink, WriteSummary};

#[derive(Serialize)]
struct Directive<'a> {
    create: Target<'a>,
}

#[derive(Serialize)]
struct Target<'a> {
    #[serde(rename = "_index")]
    index: &'a str,
}

#[derive(Debug, Deserialize)]
struct BulkResponse {
    errors: bool,
    #[serde(default)]
    items: Vec<HashMap<String, BulkItem>>,
}

#[derive(Debug, Deserialize)]
struct BulkItem {
    #[serde(rename = "_index")]
    index: Option<String>,
    status: Option<u16>,
    error: Option<Value>,
}

/// Writes batches through the destination store's `_bulk` endpoint.
///
/// Heartbeats go to their own index, every other event to the core index. Each document is sent
/// with a `create` action, so the store assigns the document id.
pub struct BulkSink {
    client: reqwest::Client,
    bulk_uri: String,
    core_index: String,
    heartbeat_index: String,
}

impl BulkSink {
    pub fn new(
        base_uri: &str,
        core_index: &str,
        heartbeat_index: &str,
        request_timeout: time::Duration,
    ) -> Result<Self, SinkError> {
        let client = reqwest::Client::builder()
            .user_agent("telemetry-transfer")
            .timeout(request_timeout)
            .build()?;

        Ok(Self {
            client,
            bulk_uri: format!("{}/_bulk", base_uri.trim_end_matches('/')),
            core_index: core_index.to_owned(),
            heartbeat_index: heartbeat_index.to_owned(),
        })
    }

    pub fn index_for(&self, event: &Event) -> &str {
        if event.is_heartbeat() {
            &self.heartbeat_index
        } else {
            &self.core_index
        }
    }

    /// Serialize a batch as alternating directive and document lines.
    pub fn encode(&self, batch: &[Event]) -> Result<Vec<u8>, SinkError> {
        let mut body = Vec::with_capacity(batch.len() * 512);

        for event in batch {
            let directive = Directive {
                create: Target {
                    index: self.index_for(event),
                },
            };
            serde_json::to_writer(&mut body, &directive).map_err(SinkError::Serialize)?;
            body.push(b'\n');
            serde_json::to_writer(&mut body, event).map_err(SinkError::Serialize)?;
            body.push(b'\n');
        }

        Ok(body)
    }
}

#[async_trait]
impl EventSink for BulkSink {
    async fn save(&self, batch: Vec<Event>) -> Result<WriteSummary, SinkError> {
        let body = self.encode(&batch)?;

        let response = self
            .client
            .post(&self.bulk_uri)
            .header(header::CONTENT_TYPE, "application/x-ndjson")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SinkError::Status { status, body });
        }

        let raw = response.bytes().await?;
        let parsed: BulkResponse =
            serde_json::from_slice(&raw).map_err(SinkError::InvalidResponse)?;

        let mut failed = 0;
        if parsed.errors {
            for (position, item) in parsed.items.iter().enumerate() {
                for (action, result) in item {
                    let Some(reason) = &result.error else {
                        continue;
                    };
                    failed += 1;

                    let session_id = batch
                        .get(position)
                        .map(|event| event.session_id.as_str())
                        .unwrap_or_default();
                    error!(
                        position,
                        action = %action,
                        index = result.index.as_deref().unwrap_or_default(),
                        status = ?result.status,
                        session_id,
                        error = %reason,
                        "document rejected by bulk write"
                    );
                }
            }
        }

        debug!(sent = batch.len(), failed, "bulk write completed");

        Ok(WriteSummary {
            sent: batch.len(),
            failed,
        })
    }
}

#[cfg(test)]
mod tests {
    use assert_json_diff::assert_json_eq;
    use httpmock::prelude::*;
    use serde_json::json;

    use super::*;

    fn event(name: &str) -> Event {
        Event::decode(&format!(
            r#"{{"session_id":"s","event_name":"{name}","@timestamp":1,"version":1,"data":{{}}}}"#
        ))
        .unwrap()
    }

    fn sink(uri: &str) -> BulkSink {
        BulkSink::new(uri, "core", "beats", time::Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_encode_routes_heartbeats() {
        let body = sink("http://localhost:9200/")
            .encode(&[event("START"), event("HEARTBEAT")])
            .unwrap();
        let body = String::from_utf8(body).unwrap();
        let lines: Vec<serde_json::Value> = body
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();

        assert!(body.ends_with('\n'));
        assert_eq!(lines.len(), 4);
        assert_json_eq!(lines[0], json!({"create": {"_index": "core"}}));
        assert_eq!(lines[1]["event_name"], json!("START"));
        assert_json_eq!(lines[2], json!({"create": {"_index": "beats"}}));
        assert_eq!(lines[3]["event_name"], json!("HEARTBEAT"));
    }

    #[tokio::test]
    async fn test_save_counts_rejected_documents() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/_bulk")
                .header("content-type", "application/x-ndjson")
                .body_contains(r#"{"create":{"_index":"core"}}"#);
            then.status(200).json_body(json!({
                "took": 3,
                "errors": true,
                "items": [
                    {"create": {"_index": "core", "status": 201}},
                    {"create": {"_index": "core", "status": 400, "error": {"type": "mapper_parsing_exception"}}}
                ]
            }));
        });

        let summary = sink(&server.base_url())
            .save(vec![event("START"), event("ERROR")])
            .await
            .unwrap();

        mock.assert();
        assert_eq!(summary, WriteSummary { sent: 2, failed: 1 });
    }

    #[tokio::test]
    async fn test_save_rejected_request() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/_bulk");
            then.status(503).body("unavailable");
        });

        let result = sink(&server.base_url()).save(vec![event("START")]).await;

        match result {
            Err(SinkError::Status { status, body }) => {
                assert_eq!(status.as_u16(), 503);
                assert_eq!(body, "unavailable");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_save_invalid_response() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/_bulk");
            then.status(200).body("not json");
        });

        let result = sink(&server.base_url()).save(vec![event("START")]).await;

        assert!(matches!(result, Err(SinkError::InvalidResponse(_))));
    }

    #[tokio::test]
    async fn test_unreachable_store() {
        let result = sink("http://127.0.0.1:1").save(vec![event("START")]).await;

        assert!(matches!(result, Err(SinkError::Transport(_))));
    }
}
