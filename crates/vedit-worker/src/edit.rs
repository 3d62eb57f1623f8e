//! Edit operations that run outside the render queue.
//!
//! Uploading, trimming and subtitle burn-in complete within the call;
//! rendering is accepted here and executed by the worker.

use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};

use vedit_media::{file_size, generate_srt};
use vedit_models::{Render, RenderUpdate, Subtitle, SubtitleCue, Trim, TrimRange, Video, VideoId};
use vedit_queue::{QueueJob, RenderJob};
use vedit_storage::{sanitize_filename, trimmed_key, upload_key};

use crate::context::ProcessingContext;
use crate::error::{WorkerError, WorkerResult};
use crate::ports::JobSink;
use crate::staging::StagingArea;

/// Video edit operations over the shared processing handles.
#[derive(Clone)]
pub struct EditService {
    ctx: ProcessingContext,
    jobs: Arc<dyn JobSink>,
}

impl EditService {
    pub fn new(ctx: ProcessingContext, jobs: Arc<dyn JobSink>) -> Self {
        Self { ctx, jobs }
    }

    /// Store a local video file and record it as UPLOADED.
    pub async fn ingest_upload(
        &self,
        local_path: &Path,
        filename: &str,
        content_type: &str,
    ) -> WorkerResult<Video> {
        if !content_type.starts_with("video/") {
            return Err(WorkerError::validation(format!(
                "Unsupported content type '{}'",
                content_type
            )));
        }

        let info = self.ctx.codec.probe(local_path).await?;
        let size = file_size(local_path).await?;

        let name = sanitize_filename(filename);
        let key = upload_key(&name);
        self.ctx.blobs.put(local_path, &key, content_type).await?;

        let url = self.ctx.blobs.url_for(&key);
        let video =
            Video::uploaded(VideoId::new(), name, url, content_type).with_media(info.duration, size);
        self.ctx.store.create_video(&video).await?;

        info!(video_id = %video.id, key = %key, "Ingested upload");
        Ok(video)
    }

    /// Cut `[start, end)` seconds out of a video into a new UPLOADED video
    /// linked by a trim record.
    pub async fn trim_video(
        &self,
        video_id: &VideoId,
        start: f64,
        end: f64,
    ) -> WorkerResult<(Video, Trim)> {
        let source = self.find_uploaded(video_id).await?;
        let range = TrimRange::new(start, end, source.duration)?;

        let trimmed_id = VideoId::new();
        let staging_id = format!("trim-{}", trimmed_id);
        let staging = StagingArea::create(&self.ctx.config.work_dir, &staging_id).await?;
        let result = self.trim_into(&source, &trimmed_id, range, &staging).await;
        staging.cleanup().await;

        let (video, trim) = result?;
        info!(
            video_id = %source.id,
            trimmed_video_id = %video.id,
            start = range.start,
            end = range.end,
            "Created trim"
        );
        Ok((video, trim))
    }

    async fn trim_into(
        &self,
        source: &Video,
        trimmed_id: &VideoId,
        range: TrimRange,
        staging: &StagingArea,
    ) -> WorkerResult<(Video, Trim)> {
        let input = staging.download_path(source);
        let source_key = self.ctx.blobs.key_for_url(&source.file_path)?;
        self.ctx.blobs.get(&source_key, &input).await?;

        let name = format!("trimmed_{}_{}", trimmed_id, sanitize_filename(&source.filename));
        let output = staging.output_path(&name);
        self.ctx.codec.trim(&input, &output, range).await?;

        let key = trimmed_key(&name);
        self.ctx
            .blobs
            .put(&output, &key, &source.content_type)
            .await?;

        let size = file_size(&output).await?;
        let video = Video::uploaded(
            trimmed_id.clone(),
            name,
            self.ctx.blobs.url_for(&key),
            source.content_type.as_str(),
        )
        .with_media(range.duration(), size);
        self.ctx.store.create_video(&video).await?;

        let trim = Trim::new(source.id.clone(), video.id.clone(), range);
        self.ctx.store.create_trim(&trim).await?;

        Ok((video, trim))
    }

    /// Burn subtitles into a video in place and keep the cues as subtitle
    /// records of that video.
    pub async fn add_subtitles(
        &self,
        video_id: &VideoId,
        cues: &[SubtitleCue],
    ) -> WorkerResult<Video> {
        if cues.is_empty() {
            return Err(WorkerError::validation("No subtitles given"));
        }
        SubtitleCue::validate_all(cues)?;

        let video = self.find_uploaded(video_id).await?;
        let staging_id = format!("subs-{}", video.id);
        let staging = StagingArea::create(&self.ctx.config.work_dir, &staging_id).await?;
        let result = self.subtitle_into(&video, cues, &staging).await;
        staging.cleanup().await;

        let size = result?;
        let mut updated = video;
        updated.size = size;
        updated.updated_at = chrono::Utc::now();

        info!(video_id = %updated.id, cues = cues.len(), "Burned in subtitles");
        Ok(updated)
    }

    async fn subtitle_into(
        &self,
        video: &Video,
        cues: &[SubtitleCue],
        staging: &StagingArea,
    ) -> WorkerResult<u64> {
        let key = self.ctx.blobs.key_for_url(&video.file_path)?;
        let input = staging.download_path(video);
        self.ctx.blobs.get(&key, &input).await?;

        let srt = staging.output_path("subtitles.srt");
        tokio::fs::write(&srt, generate_srt(cues)).await?;

        let output_name = format!("subbed_{}", sanitize_filename(&video.filename));
        let output = staging.output_path(&output_name);
        self.ctx.codec.burn_subtitles(&input, &srt, &output).await?;

        // The subtitled file replaces the original object.
        self.ctx.blobs.put(&output, &key, &video.content_type).await?;

        let size = file_size(&output).await?;
        self.ctx.store.update_video_size(&video.id, size).await?;

        let records: Vec<Subtitle> = cues
            .iter()
            .map(|cue| Subtitle::from_cue(video.id.clone(), cue))
            .collect();
        self.ctx.store.create_subtitles(&records).await?;
        Ok(size)
    }

    /// Accept a render of a video's trims: record it PENDING and queue it.
    ///
    /// A render that cannot be queued is marked FAILED before the error is
    /// returned.
    pub async fn request_render(&self, video_id: &VideoId) -> WorkerResult<Render> {
        if self.ctx.store.find_video(video_id).await?.is_none() {
            return Err(WorkerError::not_found(format!("video {}", video_id)));
        }

        let render = Render::new(video_id.clone());
        self.ctx.store.create_render(&render).await?;

        let job = RenderJob::new(render.id.clone(), video_id.clone());
        let message_id = match self.jobs.submit(QueueJob::Render(job)).await {
            Ok(id) => id,
            Err(e) => {
                let update = RenderUpdate::Fail {
                    error_message: format!("Failed to queue render: {}", e),
                };
                if let Err(mark) = self.ctx.store.update_render(&render.id, &update).await {
                    warn!(
                        render_id = %render.id,
                        "Failed to mark unqueued render FAILED: {}",
                        mark
                    );
                }
                return Err(e);
            }
        };

        info!(
            render_id = %render.id,
            video_id = %video_id,
            message_id = %message_id,
            "Render queued"
        );
        Ok(render)
    }

    async fn find_uploaded(&self, video_id: &VideoId) -> WorkerResult<Video> {
        let video = self
            .ctx
            .store
            .find_video(video_id)
            .await?
            .ok_or_else(|| WorkerError::not_found(format!("video {}", video_id)))?;

        if !video.is_uploaded() {
            return Err(WorkerError::validation(format!(
                "Video {} is not uploaded",
                video_id
            )));
        }
        Ok(video)
    }
}
