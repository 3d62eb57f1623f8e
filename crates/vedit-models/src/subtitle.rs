//! Subtitle cues and stored subtitle records.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{SubtitleId, VideoId};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CueError {
    #[error("cue {index} has empty text")]
    EmptyText { index: usize },

    #[error("cue {index} has invalid timing {start}..{end}")]
    InvalidTiming { index: usize, start: f64, end: f64 },
}

/// One subtitle line shown between two offsets (seconds).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubtitleCue {
    pub text: String,
    pub start_time: f64,
    pub end_time: f64,
}

impl SubtitleCue {
    pub fn new(text: impl Into<String>, start_time: f64, end_time: f64) -> Self {
        Self {
            text: text.into(),
            start_time,
            end_time,
        }
    }

    /// Validate a cue list before rendering it.
    pub fn validate_all(cues: &[SubtitleCue]) -> Result<(), CueError> {
        for (index, cue) in cues.iter().enumerate() {
            if cue.text.trim().is_empty() {
                return Err(CueError::EmptyText { index });
            }
            if !(cue.start_time >= 0.0 && cue.end_time > cue.start_time) {
                return Err(CueError::InvalidTiming {
                    index,
                    start: cue.start_time,
                    end: cue.end_time,
                });
            }
        }
        Ok(())
    }
}

/// A burned-in cue kept against the video it was applied to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Subtitle {
    pub id: SubtitleId,
    pub video_id: VideoId,
    pub text: String,
    pub start_time: f64,
    pub end_time: f64,
    pub created_at: DateTime<Utc>,
}

impl Subtitle {
    pub fn from_cue(video_id: VideoId, cue: &SubtitleCue) -> Self {
        Self {
            id: SubtitleId::new(),
            video_id,
            text: cue.text.clone(),
            start_time: cue.start_time,
            end_time: cue.end_time,
            created_at: Utc::now(),
        }
    }
}
