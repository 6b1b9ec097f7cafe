use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::DecodeError;

pub const START: &str = "START";
pub const HEARTBEAT: &str = "HEARTBEAT";
pub const ERROR: &str = "ERROR";

/// Free-form payload sent by the player.
pub type Data = Map<String, Value>;

/// The `data` of a session's START event, shared between every event of that session.
pub type SessionData = Arc<Data>;

/// A single telemetry event as received from the dispatch stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub session_id: String,
    pub event_name: String,
    #[serde(rename = "@timestamp", alias = "timestamp")]
    pub timestamp: i64,
    #[serde(rename = "user_ip", default, skip_serializing_if = "Option::is_none")]
    pub client_ip: Option<String>,
    #[serde(rename = "version")]
    pub schema_version: i64,
    pub data: Data,
    // Only ever set by the correlator, never taken from the producer.
    #[serde(default, skip_deserializing, skip_serializing_if = "Option::is_none")]
    pub session: Option<SessionData>,
}

impl Event {
    /// Decode one stream message, rejecting events without a session or a name.
    pub fn decode(message: &str) -> Result<Self, DecodeError> {
        let event: Event = serde_json::from_str(message)?;

        if event.session_id.is_empty() {
            return Err(DecodeError::EmptyField("session_id"));
        }
        if event.event_name.is_empty() {
            return Err(DecodeError::EmptyField("event_name"));
        }

        Ok(event)
    }

    pub fn is_start(&self) -> bool {
        self.event_name == START
    }

    pub fn is_heartbeat(&self) -> bool {
        self.event_name == HEARTBEAT
    }
}
