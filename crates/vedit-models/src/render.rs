//! Render records and their status state machine.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::{RenderId, VideoId};

/// Render status.
///
/// ```text
/// PENDING -> IN_PROGRESS -> COMPLETED
///                 |   ^
///                 v   |
///                FAILED
/// ```
///
/// FAILED may re-enter IN_PROGRESS when the queue redelivers the job.
/// Nothing ever moves back to PENDING and COMPLETED is absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RenderStatus {
    /// Accepted, waiting for a worker
    #[default]
    Pending,
    /// A worker picked the job up
    InProgress,
    /// Output video persisted
    Completed,
    /// Last execution failed
    Failed,
}

/// Rejected status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid render status transition {from} -> {to}")]
pub struct InvalidTransition {
    pub from: RenderStatus,
    pub to: RenderStatus,
}

impl RenderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RenderStatus::Pending => "PENDING",
            RenderStatus::InProgress => "IN_PROGRESS",
            RenderStatus::Completed => "COMPLETED",
            RenderStatus::Failed => "FAILED",
        }
    }

    /// Parse the stored string form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(RenderStatus::Pending),
            "IN_PROGRESS" => Some(RenderStatus::InProgress),
            "COMPLETED" => Some(RenderStatus::Completed),
            "FAILED" => Some(RenderStatus::Failed),
            _ => None,
        }
    }

    /// Terminal for one execution.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RenderStatus::Completed | RenderStatus::Failed)
    }

    pub fn can_transition_to(&self, next: RenderStatus) -> bool {
        use RenderStatus::*;
        match (self, next) {
            (_, Pending) => false,
            (Completed, Completed) => true,
            (Completed, _) => false,
            (Pending, InProgress) | (Pending, Failed) => true,
            (Pending, Completed) => false,
            (InProgress, _) => true,
            (Failed, InProgress) | (Failed, Failed) => true,
            (Failed, Completed) => false,
        }
    }

    /// Validate a transition.
    pub fn transition(self, next: RenderStatus) -> Result<RenderStatus, InvalidTransition> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(InvalidTransition { from: self, to: next })
        }
    }
}

impl fmt::Display for RenderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A request to concatenate the trimmed clips of a video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Render {
    /// Unique render ID, also used as the queue job name
    pub id: RenderId,

    /// Source video whose trims are concatenated
    pub video_id: VideoId,

    /// Output video, set on completion
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rendered_video_id: Option<VideoId>,

    /// Public URL of the rendered output, set on completion
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,

    #[serde(default)]
    pub status: RenderStatus,

    /// Error message of the last failed execution
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    /// Number of executions started
    #[serde(default)]
    pub attempts: u32,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Render {
    /// Create a new pending render.
    pub fn new(video_id: VideoId) -> Self {
        let now = Utc::now();
        Self {
            id: RenderId::new(),
            video_id,
            rendered_video_id: None,
            output_path: None,
            status: RenderStatus::Pending,
            error_message: None,
            attempts: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == RenderStatus::Completed
    }

    /// Apply a status change, rejecting transitions the state machine forbids.
    pub fn apply(&mut self, update: &RenderUpdate) -> Result<(), InvalidTransition> {
        self.status = self.status.transition(update.target_status())?;
        match update {
            RenderUpdate::Start => {
                self.attempts += 1;
                self.error_message = None;
            }
            RenderUpdate::Complete {
                rendered_video_id,
                output_path,
            } => {
                self.rendered_video_id = Some(rendered_video_id.clone());
                self.output_path = Some(output_path.clone());
                self.error_message = None;
            }
            RenderUpdate::Fail { error_message } => {
                self.error_message = Some(error_message.clone());
            }
        }
        self.updated_at = Utc::now();
        Ok(())
    }
}

/// A status change written by the render pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderUpdate {
    /// Picked up by a worker
    Start,
    /// Output persisted; the single commit write of a successful run
    Complete {
        rendered_video_id: VideoId,
        output_path: String,
    },
    /// Execution failed
    Fail { error_message: String },
}

impl RenderUpdate {
    pub fn target_status(&self) -> RenderStatus {
        match self {
            RenderUpdate::Start => RenderStatus::InProgress,
            RenderUpdate::Complete { .. } => RenderStatus::Completed,
            RenderUpdate::Fail { .. } => RenderStatus::Failed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use RenderStatus::*;

    #[test]
    fn test_render_creation() {
        let render = Render::new(VideoId::from("v1"));
        assert_eq!(render.status, Pending);
        assert_eq!(render.attempts, 0);
        assert!(render.rendered_video_id.is_none());
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(serde_json::to_string(&InProgress).unwrap(), "\"IN_PROGRESS\"");
        for status in [Pending, InProgress, Completed, Failed] {
            assert_eq!(RenderStatus::parse(status.as_str()), Some(status));
        }
    }

    #[test]
    fn test_happy_path_transitions() {
        assert_eq!(Pending.transition(InProgress), Ok(InProgress));
        assert_eq!(InProgress.transition(Completed), Ok(Completed));
        assert_eq!(InProgress.transition(Failed), Ok(Failed));
    }

    #[test]
    fn test_redelivery_transitions() {
        assert!(Failed.can_transition_to(InProgress));
        assert!(InProgress.can_transition_to(InProgress));
        assert!(Completed.can_transition_to(Completed));
    }

    #[test]
    fn test_forbidden_transitions() {
        for from in [Pending, InProgress, Completed, Failed] {
            assert!(!from.can_transition_to(Pending));
        }
        assert!(!Completed.can_transition_to(InProgress));
        assert!(!Completed.can_transition_to(Failed));
        assert!(!Pending.can_transition_to(Completed));
        assert_eq!(
            Completed.transition(Failed),
            Err(InvalidTransition { from: Completed, to: Failed })
        );
    }

    #[test]
    fn test_apply_updates() {
        let mut render = Render::new(VideoId::from("v1"));
        render.apply(&RenderUpdate::Start).unwrap();
        assert_eq!(render.status, InProgress);
        assert_eq!(render.attempts, 1);

        render
            .apply(&RenderUpdate::Fail {
                error_message: "boom".to_string(),
            })
            .unwrap();
        assert_eq!(render.status, Failed);
        assert_eq!(render.error_message.as_deref(), Some("boom"));

        render.apply(&RenderUpdate::Start).unwrap();
        assert_eq!(render.attempts, 2);
        assert!(render.error_message.is_none());

        render
            .apply(&RenderUpdate::Complete {
                rendered_video_id: VideoId::from("out"),
                output_path: "/tmp/out.mp4".to_string(),
            })
            .unwrap();
        assert!(render.is_completed());
        assert_eq!(render.rendered_video_id, Some(VideoId::from("out")));
    }

    #[test]
    fn test_apply_rejects_leaving_completed() {
        let mut render = Render::new(VideoId::from("v1"));
        render.status = Completed;
        let err = render.apply(&RenderUpdate::Start).unwrap_err();
        assert_eq!(err.from, Completed);
        assert_eq!(render.status, Completed);
        assert_eq!(render.attempts, 0);
    }

    #[test]
    fn test_terminal_states() {
        assert!(Completed.is_terminal());
        assert!(Failed.is_terminal());
        assert!(!Pending.is_terminal());
        assert!(!InProgress.is_terminal());
    }
}
