//! Per-job progress and logs.
//!
//! The latest progress value and a bounded log tail live in Redis so a job
//! can be polled, and each write is also published on `progress:{job_id}`.
//! Logs accumulate across retries of the same render; progress is simply
//! overwritten by the next attempt.

use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};

use crate::error::QueueResult;

/// Progress/log keys expire a week after the last write.
pub const JOB_STATE_TTL_SECS: i64 = 7 * 24 * 3600;
/// Log lines kept per job.
pub const MAX_LOG_LINES: isize = 500;

/// Message published for every progress or log write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    Progress { job_id: String, value: u8 },
    Log { job_id: String, message: String },
}

/// Stored view of a job's progress.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub progress: u8,
    pub updated_at: Option<DateTime<Utc>>,
    pub logs: Vec<String>,
}

/// Redis keys owned by one job.
struct JobKeys {
    state: String,
    logs: String,
    channel: String,
}

impl JobKeys {
    fn new(job_id: &str) -> Self {
        Self {
            state: format!("vedit:job:{}", job_id),
            logs: format!("vedit:job:{}:logs", job_id),
            channel: format!("progress:{}", job_id),
        }
    }
}

/// Records job progress and logs.
#[derive(Clone)]
pub struct ProgressChannel {
    client: redis::Client,
}

impl ProgressChannel {
    pub fn new(redis_url: &str) -> QueueResult<Self> {
        Ok(Self {
            client: redis::Client::open(redis_url)?,
        })
    }

    /// Store `value` (capped at 100) and publish it.
    pub async fn progress(&self, job_id: &str, value: u8) -> QueueResult<()> {
        let value = value.min(100);
        let keys = JobKeys::new(job_id);
        let event = serde_json::to_string(&ProgressEvent::Progress {
            job_id: job_id.to_string(),
            value,
        })?;

        redis::pipe()
            .hset(&keys.state, "progress", value)
            .hset(&keys.state, "updated_at", Utc::now().to_rfc3339())
            .expire(&keys.state, JOB_STATE_TTL_SECS)
            .publish(&keys.channel, event)
            .query_async::<()>(&mut self.client.get_multiplexed_async_connection().await?)
            .await?;
        Ok(())
    }

    /// Append a line to the job log and publish it.
    pub async fn log(&self, job_id: &str, message: &str) -> QueueResult<()> {
        let keys = JobKeys::new(job_id);
        let event = serde_json::to_string(&ProgressEvent::Log {
            job_id: job_id.to_string(),
            message: message.to_string(),
        })?;

        redis::pipe()
            .rpush(&keys.logs, message)
            .ltrim(&keys.logs, -MAX_LOG_LINES, -1)
            .expire(&keys.logs, JOB_STATE_TTL_SECS)
            .publish(&keys.channel, event)
            .query_async::<()>(&mut self.client.get_multiplexed_async_connection().await?)
            .await?;
        Ok(())
    }

    /// Read stored progress and logs.
    pub async fn snapshot(&self, job_id: &str) -> QueueResult<JobSnapshot> {
        let keys = JobKeys::new(job_id);
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let (progress, updated_at): (Option<u8>, Option<String>) =
            conn.hget(&keys.state, &["progress", "updated_at"]).await?;
        let logs: Vec<String> = conn.lrange(&keys.logs, 0, -1).await?;

        Ok(JobSnapshot {
            progress: progress.unwrap_or(0),
            updated_at: updated_at
                .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
                .map(|t| t.with_timezone(&Utc)),
            logs,
        })
    }
}
