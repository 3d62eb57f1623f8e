//! Firestore error types.

use std::time::Duration;
use thiserror::Error;

pub type FirestoreResult<T> = Result<T, FirestoreError>;

/// Back-off assumed for a 429 that carries no Retry-After.
const THROTTLE_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum FirestoreError {
    #[error("Firestore credentials unavailable: {0}")]
    Credentials(String),

    #[error("Document {0} not found")]
    NotFound(String),

    #[error("Document {0} already exists")]
    AlreadyExists(String),

    /// The document changed since it was read, or is missing.
    #[error("Write precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("Firestore refused the request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Firestore unavailable ({status}): {message}")]
    Unavailable { status: u16, message: String },

    #[error("Throttled by Firestore, retry after {0:?}")]
    Throttled(Duration),

    #[error("Unexpected response: {0}")]
    Decode(String),

    #[error("{document} kept changing across {attempts} update attempts")]
    Contended { document: String, attempts: u32 },

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    InvalidTransition(#[from] vedit_models::InvalidTransition),
}

impl FirestoreError {
    pub(crate) fn decode(message: impl Into<String>) -> Self {
        Self::Decode(message.into())
    }

    /// Classify a non-success HTTP answer.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            404 => Self::NotFound(message),
            409 => Self::AlreadyExists(message),
            412 => Self::PreconditionFailed(message),
            400 if message.contains("FAILED_PRECONDITION") => Self::PreconditionFailed(message),
            429 => Self::Throttled(THROTTLE_DELAY),
            500..=599 => Self::Unavailable { status, message },
            _ => Self::Rejected { status, message },
        }
    }

    /// HTTP status behind the error, if it came from a response.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::NotFound(_) => Some(404),
            Self::AlreadyExists(_) => Some(409),
            Self::PreconditionFailed(_) => Some(412),
            Self::Throttled(_) => Some(429),
            Self::Rejected { status, .. } | Self::Unavailable { status, .. } => Some(*status),
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Server-requested pause before the next attempt.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Throttled(after) => Some(*after),
            _ => None,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::Throttled(_) | Self::Unavailable { .. }
        )
    }

    pub fn is_precondition_failed(&self) -> bool {
        matches!(self, Self::PreconditionFailed(_))
    }
}
