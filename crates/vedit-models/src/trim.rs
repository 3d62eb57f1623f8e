//! Trim records.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{TrimId, VideoId};

/// Reasons a requested trim range is rejected.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TrimRangeError {
    #[error("start time must be non-negative, got {0}")]
    NegativeStart(f64),

    #[error("end time {end} must be greater than start time {start}")]
    EmptyRange { start: f64, end: f64 },

    #[error("end time {end} exceeds video duration {duration}")]
    PastEnd { end: f64, duration: f64 },
}

/// A validated `[start, end)` range in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TrimRange {
    pub start: f64,
    pub end: f64,
}

impl TrimRange {
    /// Validate `0 <= start < end <= duration`.
    pub fn new(start: f64, end: f64, duration: f64) -> Result<Self, TrimRangeError> {
        if !(start >= 0.0) {
            return Err(TrimRangeError::NegativeStart(start));
        }
        if !(end > start) {
            return Err(TrimRangeError::EmptyRange { start, end });
        }
        if end > duration {
            return Err(TrimRangeError::PastEnd { end, duration });
        }
        Ok(Self { start, end })
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// Links a source video to the clip derived from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Trim {
    pub id: TrimId,

    /// Source video
    pub video_id: VideoId,

    /// Derived clip
    pub trimmed_video_id: VideoId,

    /// Start offset in seconds
    pub start_time: f64,

    /// End offset in seconds
    pub end_time: f64,

    pub created_at: DateTime<Utc>,
}

impl Trim {
    pub fn new(video_id: VideoId, trimmed_video_id: VideoId, range: TrimRange) -> Self {
        Self {
            id: TrimId::new(),
            video_id,
            trimmed_video_id,
            start_time: range.start,
            end_time: range.end,
            created_at: Utc::now(),
        }
    }
}
