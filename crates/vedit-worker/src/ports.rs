//! Collaborator interfaces used by the render pipeline and edit services.
//!
//! Production implementations live in [`crate::adapters`]; tests substitute
//! in-memory fakes.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use vedit_models::{
    Render, RenderId, RenderUpdate, Subtitle, Trim, TrimRange, Video, VideoId, VideoStatus,
    VideoWithTrims,
};
use vedit_queue::QueueJob;

use crate::error::WorkerResult;

/// Progress and log sink of the job being executed.
#[async_trait]
pub trait JobHandle: Send + Sync {
    /// Report completion percentage (0..=100).
    async fn update_progress(&self, percent: u8) -> WorkerResult<()>;

    /// Append a line to the job log.
    async fn append_log(&self, message: &str) -> WorkerResult<()>;
}

/// Object storage addressed by key.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Download `key` into `local_path`, returning the byte count.
    async fn get(&self, key: &str, local_path: &Path) -> WorkerResult<u64>;

    /// Upload `local_path` under `key`.
    async fn put(&self, local_path: &Path, key: &str, content_type: &str) -> WorkerResult<()>;

    /// Public URL of `key`.
    fn url_for(&self, key: &str) -> String;

    /// Recover the key from a stored URL.
    fn key_for_url(&self, url: &str) -> WorkerResult<String>;
}

/// Video, trim, subtitle and render records.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn find_video(&self, id: &VideoId) -> WorkerResult<Option<Video>>;

    /// A video with its trims in creation order.
    async fn find_video_with_trims(&self, id: &VideoId) -> WorkerResult<Option<VideoWithTrims>>;

    /// Videos among `ids` with `status`, in the order of `ids`.
    async fn find_videos_by_ids_with_status(
        &self,
        ids: &[VideoId],
        status: VideoStatus,
    ) -> WorkerResult<Vec<Video>>;

    async fn create_video(&self, video: &Video) -> WorkerResult<()>;

    /// Create or replace a video record.
    async fn upsert_video(&self, video: &Video) -> WorkerResult<()>;

    async fn update_video_size(&self, id: &VideoId, size: u64) -> WorkerResult<()>;

    async fn create_trim(&self, trim: &Trim) -> WorkerResult<()>;

    async fn create_subtitles(&self, subtitles: &[Subtitle]) -> WorkerResult<()>;

    async fn find_render(&self, id: &RenderId) -> WorkerResult<Option<Render>>;

    async fn create_render(&self, render: &Render) -> WorkerResult<()>;

    /// Apply a status change, rejecting transitions the state machine forbids.
    async fn update_render(&self, id: &RenderId, update: &RenderUpdate) -> WorkerResult<Render>;
}

/// Media facts the pipeline needs from a probe.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MediaInfo {
    /// Duration in seconds
    pub duration: f64,
}

/// Media operations.
#[async_trait]
pub trait Codec: Send + Sync {
    async fn probe(&self, path: &Path) -> WorkerResult<MediaInfo>;

    /// Join `inputs` in order into `output`.
    async fn concat(&self, inputs: &[PathBuf], output: &Path) -> WorkerResult<()>;

    async fn trim(&self, input: &Path, output: &Path, range: TrimRange) -> WorkerResult<()>;

    async fn burn_subtitles(&self, input: &Path, srt: &Path, output: &Path) -> WorkerResult<()>;
}

/// Where accepted jobs are submitted.
#[async_trait]
pub trait JobSink: Send + Sync {
    /// Submit a job, returning the queue message id.
    async fn submit(&self, job: QueueJob) -> WorkerResult<String>;
}
