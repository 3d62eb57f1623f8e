//! Job payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vedit_models::{RenderId, VideoId};

/// Job to concatenate the trimmed clips of a video.
///
/// The render id doubles as the job name: one render, one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderJob {
    pub render_id: RenderId,
    /// Source video whose trims are concatenated
    pub video_id: VideoId,
    pub created_at: DateTime<Utc>,
}

impl RenderJob {
    pub fn new(render_id: RenderId, video_id: VideoId) -> Self {
        Self {
            render_id,
            video_id,
            created_at: Utc::now(),
        }
    }

    pub fn idempotency_key(&self) -> String {
        format!("render:{}", self.render_id)
    }
}

/// Generic job wrapper for queue storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueueJob {
    /// Concatenate trimmed clips into a rendered video
    Render(RenderJob),
}

impl QueueJob {
    /// Job name used in logs and progress keys.
    pub fn job_id(&self) -> &str {
        match self {
            QueueJob::Render(j) => j.render_id.as_str(),
        }
    }

    pub fn video_id(&self) -> &VideoId {
        match self {
            QueueJob::Render(j) => &j.video_id,
        }
    }

    pub fn idempotency_key(&self) -> String {
        match self {
            QueueJob::Render(j) => j.idempotency_key(),
        }
    }

    /// Decode a raw stream payload.
    pub fn from_payload(payload: &str) -> serde_json::Result<Self> {
        serde_json::from_str(payload)
    }
}

impl From<RenderJob> for QueueJob {
    fn from(job: RenderJob) -> Self {
        QueueJob::Render(job)
    }
}
