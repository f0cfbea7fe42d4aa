use crate::core::model::JobId;
use std::time::Duration;

/// Used when the backend reports a failure without any message.
pub const GENERIC_FAILURE: &str = "download failed";

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("network error: {0}")]
    Network(String),

    #[error("http status {code}{}", .message.as_deref().map(|m| format!(": {m}")).unwrap_or_default())]
    Status { code: u16, message: Option<String> },

    #[error("unexpected content type: {0}")]
    UnexpectedContentType(String),

    #[error("malformed response: {0}")]
    Decode(String),

    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            TransportError::Decode(e.to_string())
        } else if let Some(status) = e.status() {
            TransportError::Status { code: status.as_u16(), message: None }
        } else {
            TransportError::Network(e.to_string())
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum SubmissionError {
    #[error("no URL given")]
    EmptyUrl,

    #[error("a download is already in progress")]
    AlreadyActive,

    #[error("invalid segment: {0}")]
    InvalidSegment(String),

    #[error("submission cancelled")]
    Cancelled,

    #[error("rejected by server: {0}")]
    Rejected(String),

    #[error("transport failure: {0}")]
    TransportFailure(#[source] TransportError),
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PollError {
    #[error("status checks failed {attempts} times in a row: {detail}")]
    TransientTransport { attempts: u32, detail: String },

    #[error("no terminal status after {}s", .elapsed.as_secs())]
    Timeout { elapsed: Duration },

    #[error("{0}")]
    Rejected(String),

    #[error("job {0} is not the active download")]
    NotActive(JobId),

    #[error("job {0} is already being polled")]
    AlreadyPolling(JobId),
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RetrievalError {
    #[error("download has not produced a file yet")]
    NotReady,
}

/// Failures of the stateless lookups (validation, metadata, VOD search).
#[derive(thiserror::Error, Debug)]
pub enum LookupError {
    #[error("empty input")]
    EmptyInput,

    #[error("{0}")]
    Rejected(String),

    #[error("transport failure: {0}")]
    TransportFailure(#[from] TransportError),
}
