//! Worker error types.

use thiserror::Error;

use vedit_firestore::FirestoreError;
use vedit_media::MediaError;
use vedit_models::{CueError, InvalidTransition, TrimRangeError, VideoId};
use vedit_queue::QueueError;
use vedit_storage::StorageError;

pub type WorkerResult<T> = Result<T, WorkerError>;

/// Failure classes a job can end in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A referenced record does not exist
    NotFound,
    /// The request can never succeed as stated
    Validation,
    /// Download, upload, codec or local filesystem failure
    Io,
    /// Metadata or queue read/write failure
    Store,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::Validation => "validation",
            ErrorKind::Io => "io",
            ErrorKind::Store => "store",
        }
    }
}

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Video {0} has no trims")]
    NoTrims(VideoId),

    #[error("None of the {requested} trimmed videos of {video_id} is uploaded")]
    NoUploadedInputs { video_id: VideoId, requested: usize },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Job timed out after {0}s")]
    Timeout(u64),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Firestore error: {0}")]
    Firestore(#[from] FirestoreError),

    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Classify the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            WorkerError::NotFound(_) => ErrorKind::NotFound,
            WorkerError::NoTrims(_)
            | WorkerError::NoUploadedInputs { .. }
            | WorkerError::Validation(_) => ErrorKind::Validation,
            WorkerError::Timeout(_) | WorkerError::ConfigError(_) | WorkerError::Io(_) => {
                ErrorKind::Io
            }
            WorkerError::Storage(StorageError::ForeignUrl { .. }) => ErrorKind::Validation,
            WorkerError::Storage(_) => ErrorKind::Io,
            WorkerError::Firestore(FirestoreError::NotFound(_)) => ErrorKind::NotFound,
            WorkerError::Firestore(FirestoreError::InvalidTransition(_)) => ErrorKind::Validation,
            WorkerError::Firestore(_) => ErrorKind::Store,
            WorkerError::Media(MediaError::EmptyConcat) => ErrorKind::Validation,
            WorkerError::Media(_) => ErrorKind::Io,
            WorkerError::Queue(QueueError::MalformedPayload(_)) => ErrorKind::Validation,
            WorkerError::Queue(_) => ErrorKind::Store,
        }
    }

    /// Check if this is a permanent failure that should NOT be retried.
    ///
    /// A missing record or an invalid request fails the same way on every
    /// delivery, so the job goes straight to the dead letter queue.
    pub fn is_permanent(&self) -> bool {
        matches!(self.kind(), ErrorKind::NotFound | ErrorKind::Validation)
    }
}

impl From<TrimRangeError> for WorkerError {
    fn from(e: TrimRangeError) -> Self {
        Self::Validation(e.to_string())
    }
}

impl From<CueError> for WorkerError {
    fn from(e: CueError) -> Self {
        Self::Validation(e.to_string())
    }
}

impl From<InvalidTransition> for WorkerError {
    fn from(e: InvalidTransition) -> Self {
        Self::Validation(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vedit_models::RenderStatus;
    use vedit_storage::ObjectOp;

    #[test]
    fn test_validation_errors_are_permanent() {
        let no_trims = WorkerError::NoTrims(VideoId::from_string("v1"));
        assert_eq!(no_trims.kind(), ErrorKind::Validation);
        assert!(no_trims.is_permanent());

        let transition: WorkerError = InvalidTransition {
            from: RenderStatus::Completed,
            to: RenderStatus::InProgress,
        }
        .into();
        assert!(transition.is_permanent());
    }

    #[test]
    fn test_missing_records_are_permanent() {
        let err: WorkerError = FirestoreError::NotFound("renders/r1".into()).into();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(err.is_permanent());
    }

    #[test]
    fn test_transient_errors_are_retried() {
        let download: WorkerError =
            StorageError::request(ObjectOp::Download, "videos/a.mp4", "reset by peer").into();
        assert_eq!(download.kind(), ErrorKind::Io);
        assert!(!download.is_permanent());

        let store: WorkerError = FirestoreError::from_status(503, "unavailable").into();
        assert_eq!(store.kind(), ErrorKind::Store);
        assert!(!store.is_permanent());

        assert!(!WorkerError::Timeout(60).is_permanent());
    }

    #[test]
    fn test_no_uploaded_inputs_message() {
        let err = WorkerError::NoUploadedInputs {
            video_id: VideoId::from_string("v1"),
            requested: 2,
        };
        assert_eq!(
            err.to_string(),
            "None of the 2 trimmed videos of v1 is uploaded"
        );
    }
}
