//! Storage error types.

use std::fmt;
use thiserror::Error;

pub type StorageResult<T> = Result<T, StorageError>;

/// Object operation that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectOp {
    Upload,
    Download,
    HeadBucket,
}

impl fmt::Display for ObjectOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ObjectOp::Upload => "upload",
            ObjectOp::Download => "download",
            ObjectOp::HeadBucket => "head bucket",
        })
    }
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("{0} is not set")]
    MissingEnv(&'static str),

    #[error("No object at key {0}")]
    NoSuchKey(String),

    #[error("{op} {target} failed: {reason}")]
    Request {
        op: ObjectOp,
        target: String,
        reason: String,
    },

    /// A stored URL that does not point into the bucket.
    #[error("Cannot derive an object key from {url}: {reason}")]
    ForeignUrl { url: String, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl StorageError {
    pub fn request(op: ObjectOp, target: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::Request {
            op,
            target: target.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn foreign_url(url: &str, reason: impl fmt::Display) -> Self {
        Self::ForeignUrl {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_message_names_operation() {
        let err = StorageError::request(ObjectOp::Download, "videos/a.mp4", "connection reset");
        assert_eq!(
            err.to_string(),
            "download videos/a.mp4 failed: connection reset"
        );
    }
}
