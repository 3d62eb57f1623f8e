//! Queue error types.

use thiserror::Error;

pub type QueueResult<T> = Result<T, QueueError>;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// The job's idempotency key is still held by an earlier enqueue.
    #[error("Job {0} is already queued")]
    Duplicate(String),

    #[error("Stream append failed: {0}")]
    Append(#[source] redis::RedisError),

    #[error("Undecodable stream entry: {0}")]
    MalformedPayload(String),

    #[error("Job payload encoding failed: {0}")]
    Json(#[from] serde_json::Error),
}
