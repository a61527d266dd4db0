use std::path::PathBuf;

use thiserror::Error;

/// Configuration problems. Most are soft: they are logged and the run
/// proceeds with whatever could be loaded.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parse {path}: {source}")]
    ParseFile {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid value '{value}' for {key}")]
    InvalidValue { key: String, value: String },
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("expected a JSON object, got {found}")]
    NotAnObject { found: &'static str },
    #[error("malformed JSON payload: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum EventError {
    /// Derivation was attempted before any payload was ingested.
    #[error("{name} report is empty, nothing to derive an event from")]
    EmptyReport { name: String },
    #[error("{name} report is missing required field {field}")]
    MissingField { name: String, field: &'static str },
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("{name} has no endpoints configured")]
    NoEndpoints { name: String },
    #[error("https requested for {endpoint} but no security token is available")]
    MissingCredentials { endpoint: String },
    #[error("invalid endpoint {endpoint}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },
    #[error("request to {endpoint} failed: {source}")]
    Request {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("response from {endpoint}: {status}")]
    Status {
        endpoint: String,
        status: reqwest::StatusCode,
    },
    #[error("reading body from {endpoint}: {source}")]
    Body {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("decoding {endpoint}: {source}")]
    Decode {
        endpoint: String,
        #[source]
        source: DecodeError,
    },
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("analytics request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("analytics endpoint returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
}

/// Failures that abort a whole run.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("unable to build reporters: {0}")]
    Reporters(String),
    #[error("unable to build http client: {0}")]
    Client(String),
    #[error("{expected} reporters launched but only {received} completed")]
    WorkerLost { expected: usize, received: usize },
    #[error("serializing test output: {0}")]
    TestOutput(#[from] serde_json::Error),
    #[error("delivering test output: {0}")]
    TestDelivery(#[source] SinkError),
}
