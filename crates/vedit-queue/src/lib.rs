//! Render jobs on a Redis stream.
//!
//! [`JobQueue`] is the consumer-group side (enqueue, read, reclaim, settle)
//! and [`ProgressChannel`] keeps the per-job progress value and log tail.

pub mod error;
pub mod job;
pub mod progress;
pub mod queue;

pub use error::{QueueError, QueueResult};
pub use job::{QueueJob, RenderJob};
pub use progress::{JobSnapshot, ProgressChannel, ProgressEvent, JOB_STATE_TTL_SECS, MAX_LOG_LINES};
pub use queue::{Delivery, JobQueue, QueueConfig};
