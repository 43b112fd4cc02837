use reqwest::StatusCode;
use std::sync::Arc;
use thiserror::Error;

/// Failure of a single request against the data source.
///
/// Errors are cheap to clone so that one in-flight request can be awaited
/// by several callers of the request cache.
#[derive(Error, Debug, Clone)]
pub enum TransportError {
    #[error("error occurred while sending request: {0}")]
    Http(Arc<reqwest::Error>),
    #[error("unexpected status code: {status} - {body}")]
    UnexpectedStatus { status: StatusCode, body: String },
    #[error("cannot parse response json: {0}")]
    InvalidJson(Arc<serde_json::Error>),
    #[error("data source returned an error: {0}")]
    Server(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        Self::Http(Arc::new(err))
    }
}

impl From<serde_json::Error> for TransportError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidJson(Arc::new(err))
    }
}

/// Failure of a whole fetch sequence, as reported to series observers.
#[derive(Error, Debug, Clone)]
pub enum FetchError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("page {page} was full but carried no continuation cursor")]
    MissingCursor { page: u64 },
}
