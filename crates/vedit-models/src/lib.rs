//! Shared data models for the video edit backend.
//!
//! This crate provides Serde-serializable types for:
//! - Videos (uploads, trimmed outputs, rendered outputs)
//! - Trims linking a source video to its derived clip
//! - Render jobs and their status state machine
//! - Subtitle cues and the subtitle records kept per video

pub mod ids;
pub mod render;
pub mod subtitle;
pub mod trim;
pub mod video;

// Re-export common types
pub use ids::{RenderId, SubtitleId, TrimId, VideoId};
pub use render::{InvalidTransition, Render, RenderStatus, RenderUpdate};
pub use subtitle::{CueError, Subtitle, SubtitleCue};
pub use trim::{Trim, TrimRange, TrimRangeError};
pub use video::{Video, VideoStatus, VideoWithTrims};
