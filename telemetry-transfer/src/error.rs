use reqwest::StatusCode;
use thiserror::Error;

/// A single stream message that could not be turned into an `Event`.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("message is not a valid event: {0}")]
    Json(#[from] serde_json::Error),
    #[error("required field {0} is empty")]
    EmptyField(&'static str),
}

/// Enumeration of errors that end one connection to the event stream.
#[derive(Error, Debug)]
pub enum StreamError {
    #[error("failed to build the stream client: {0}")]
    Client(reqwest::Error),
    #[error("failed to connect to the event stream: {0}")]
    Connect(reqwest::Error),
    #[error("event stream responded with status {0}")]
    Status(StatusCode),
    #[error("failed reading from the event stream: {0}")]
    Read(reqwest::Error),
    #[error("event stream was closed by the server")]
    Closed,
    #[error("event stream retries exhausted after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: Box<StreamError>,
    },
}

/// Enumeration of errors related to writing a batch to the destination store.
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("failed to serialize event for the bulk request: {0}")]
    Serialize(serde_json::Error),
    #[error("bulk request could not be delivered: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("bulk request was rejected with status {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("bulk response could not be parsed: {0}")]
    InvalidResponse(serde_json::Error),
}

/// Enumeration of errors surfaced by the pipeline driver to its owner.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("pipeline was already started")]
    AlreadyStarted,
    #[error("event stream failed: {0}")]
    Stream(#[from] StreamError),
    #[error("pipeline task failed: {0}")]
    TaskFailed(#[from] tokio::task::JoinError),
    #[error("pipeline did not stop within the shutdown timeout")]
    ShutdownTimeout,
}
