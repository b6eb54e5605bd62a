//! Error taxonomy for the processing pipeline.
//!
//! Adapters classify failures at the provider boundary; the retry wrapper
//! retries only `Transient`, and the orchestrator is the single place a
//! terminal failure becomes `status = failed` on the record.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Network/timeout/rate-limit class failure. Retried with backoff up to a
    /// bounded attempt count.
    #[error("{0}")]
    Transient(String),

    /// Undecodable audio, oversize text, unsupported input. Never retried.
    #[error("{0}")]
    PermanentInput(String),

    /// A re-trigger was attempted on a meeting with an active run. Rejected
    /// synchronously to the caller, never queued.
    #[error("meeting {0} already has a run in progress")]
    ConcurrencyConflict(i64),

    /// Missing meeting, mapping, or required prerequisite field.
    #[error("{0}")]
    NotFound(String),

    /// Internal failure (storage, serialization). Terminal for the attempt.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl PipelineError {
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    pub fn permanent(msg: impl Into<String>) -> Self {
        Self::PermanentInput(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// Classify a reqwest transport error: timeouts and connection failures
    /// are retryable, everything else is not.
    pub fn from_reqwest(context: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() || err.is_request() {
            Self::Transient(format!("{context}: {err}"))
        } else {
            Self::Internal(err.into())
        }
    }

    /// Classify a non-success HTTP status from a provider. 408/429/5xx are
    /// transient, other client errors reject the input.
    pub fn from_status(context: &str, status: reqwest::StatusCode, body: &str) -> Self {
        if status.is_server_error()
            || status == reqwest::StatusCode::TOO_MANY_REQUESTS
            || status == reqwest::StatusCode::REQUEST_TIMEOUT
        {
            Self::Transient(format!("{context} responded {status}: {body}"))
        } else {
            Self::PermanentInput(format!("{context} rejected request ({status}): {body}"))
        }
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;
