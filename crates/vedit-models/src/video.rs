//! Video asset models.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{Trim, VideoId};

/// Video availability status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VideoStatus {
    /// Bytes are in the blob store and the record is usable as an input
    Uploaded,
    /// Record exists but its bytes are still being produced
    #[default]
    Processing,
}

impl VideoStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VideoStatus::Uploaded => "UPLOADED",
            VideoStatus::Processing => "PROCESSING",
        }
    }

    /// Parse the stored string form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "UPLOADED" => Some(VideoStatus::Uploaded),
            "PROCESSING" => Some(VideoStatus::Processing),
            _ => None,
        }
    }
}

impl fmt::Display for VideoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A stored media asset.
///
/// Videos are immutable once created. The only mutation is a size patch
/// after a subtitle burn rewrites the bytes in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Video {
    /// Unique video ID
    pub id: VideoId,

    /// Original file name (used to build local and remote names)
    pub filename: String,

    /// Public URL of the object in the blob store
    pub file_path: String,

    /// Duration in seconds
    #[serde(default)]
    pub duration: f64,

    /// Size in bytes
    #[serde(default)]
    pub size: u64,

    /// MIME type, e.g. `video/mp4`
    pub content_type: String,

    /// Availability status
    #[serde(default)]
    pub status: VideoStatus,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl Video {
    /// Create a new record for bytes that are already uploaded.
    pub fn uploaded(
        id: VideoId,
        filename: impl Into<String>,
        file_path: impl Into<String>,
        content_type: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            filename: filename.into(),
            file_path: file_path.into(),
            duration: 0.0,
            size: 0,
            content_type: content_type.into(),
            status: VideoStatus::Uploaded,
            created_at: now,
            updated_at: now,
        }
    }

    /// Set probed media metadata.
    pub fn with_media(mut self, duration: f64, size: u64) -> Self {
        self.duration = duration.max(0.0);
        self.size = size;
        self
    }

    pub fn is_uploaded(&self) -> bool {
        self.status == VideoStatus::Uploaded
    }
}

/// A source video together with the trims taken from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VideoWithTrims {
    pub video: Video,

    /// Trims in creation order
    pub trims: Vec<Trim>,
}

impl VideoWithTrims {
    /// Ids of the derived videos, in trim order.
    pub fn trimmed_video_ids(&self) -> Vec<VideoId> {
        self.trims.iter().map(|t| t.trimmed_video_id.clone()).collect()
    }
}
