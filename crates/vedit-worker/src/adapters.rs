//! Production implementations of the worker ports.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use vedit_firestore::{
    FirestoreClient, RenderRepository, SubtitleRepository, TrimRepository, VideoRepository,
};
use vedit_media::{burn_subtitles, concat_videos, probe_video, trim_video, FfmpegRunner};
use vedit_models::{
    Render, RenderId, RenderUpdate, Subtitle, Trim, TrimRange, Video, VideoId, VideoStatus,
    VideoWithTrims,
};
use vedit_queue::{JobQueue, ProgressChannel, QueueJob};
use vedit_storage::S3Client;

use crate::error::WorkerResult;
use crate::ports::{BlobStore, Codec, JobHandle, JobSink, MediaInfo, MetadataStore};

#[async_trait]
impl BlobStore for S3Client {
    async fn get(&self, key: &str, local_path: &Path) -> WorkerResult<u64> {
        Ok(self.download_file(key, local_path).await?)
    }

    async fn put(&self, local_path: &Path, key: &str, content_type: &str) -> WorkerResult<()> {
        Ok(self.upload_file(local_path, key, content_type).await?)
    }

    fn url_for(&self, key: &str) -> String {
        self.urls().url_for(key)
    }

    fn key_for_url(&self, url: &str) -> WorkerResult<String> {
        Ok(self.urls().key_for_url(url)?)
    }
}

/// Metadata store backed by the Firestore repositories.
#[derive(Clone)]
pub struct FirestoreMetadataStore {
    videos: VideoRepository,
    trims: TrimRepository,
    subtitles: SubtitleRepository,
    renders: RenderRepository,
}

impl FirestoreMetadataStore {
    pub fn new(client: FirestoreClient) -> Self {
        Self {
            videos: VideoRepository::new(client.clone()),
            trims: TrimRepository::new(client.clone()),
            subtitles: SubtitleRepository::new(client.clone()),
            renders: RenderRepository::new(client),
        }
    }
}

#[async_trait]
impl MetadataStore for FirestoreMetadataStore {
    async fn find_video(&self, id: &VideoId) -> WorkerResult<Option<Video>> {
        Ok(self.videos.get(id).await?)
    }

    async fn find_video_with_trims(&self, id: &VideoId) -> WorkerResult<Option<VideoWithTrims>> {
        let Some(video) = self.videos.get(id).await? else {
            return Ok(None);
        };
        let trims = self.trims.list_for_video(id).await?;
        Ok(Some(VideoWithTrims { video, trims }))
    }

    async fn find_videos_by_ids_with_status(
        &self,
        ids: &[VideoId],
        status: VideoStatus,
    ) -> WorkerResult<Vec<Video>> {
        Ok(self.videos.find_by_ids_with_status(ids, status).await?)
    }

    async fn create_video(&self, video: &Video) -> WorkerResult<()> {
        Ok(self.videos.create(video).await?)
    }

    async fn upsert_video(&self, video: &Video) -> WorkerResult<()> {
        Ok(self.videos.upsert(video).await?)
    }

    async fn update_video_size(&self, id: &VideoId, size: u64) -> WorkerResult<()> {
        Ok(self.videos.update_size(id, size).await?)
    }

    async fn create_trim(&self, trim: &Trim) -> WorkerResult<()> {
        Ok(self.trims.create(trim).await?)
    }

    async fn create_subtitles(&self, subtitles: &[Subtitle]) -> WorkerResult<()> {
        Ok(self.subtitles.create_all(subtitles).await?)
    }

    async fn find_render(&self, id: &RenderId) -> WorkerResult<Option<Render>> {
        Ok(self.renders.get(id).await?)
    }

    async fn create_render(&self, render: &Render) -> WorkerResult<()> {
        Ok(self.renders.create(render).await?)
    }

    async fn update_render(&self, id: &RenderId, update: &RenderUpdate) -> WorkerResult<Render> {
        Ok(self.renders.apply_update(id, update).await?)
    }
}

/// Codec backed by the ffmpeg/ffprobe binaries.
#[derive(Debug, Clone, Default)]
pub struct FfmpegCodec {
    runner: FfmpegRunner,
}

impl FfmpegCodec {
    pub fn new(runner: FfmpegRunner) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl Codec for FfmpegCodec {
    async fn probe(&self, path: &Path) -> WorkerResult<MediaInfo> {
        let info = probe_video(path).await?;
        Ok(MediaInfo {
            duration: info.duration,
        })
    }

    async fn concat(&self, inputs: &[PathBuf], output: &Path) -> WorkerResult<()> {
        Ok(concat_videos(&self.runner, inputs, output).await?)
    }

    async fn trim(&self, input: &Path, output: &Path, range: TrimRange) -> WorkerResult<()> {
        Ok(trim_video(&self.runner, input, output, range).await?)
    }

    async fn burn_subtitles(&self, input: &Path, srt: &Path, output: &Path) -> WorkerResult<()> {
        Ok(burn_subtitles(&self.runner, input, srt, output).await?)
    }
}

/// Job handle publishing to the Redis progress channel.
#[derive(Clone)]
pub struct RedisJobHandle {
    channel: ProgressChannel,
    job_id: String,
}

impl RedisJobHandle {
    pub fn new(channel: ProgressChannel, job_id: impl Into<String>) -> Self {
        Self {
            channel,
            job_id: job_id.into(),
        }
    }
}

#[async_trait]
impl JobHandle for RedisJobHandle {
    async fn update_progress(&self, percent: u8) -> WorkerResult<()> {
        Ok(self.channel.progress(&self.job_id, percent).await?)
    }

    async fn append_log(&self, message: &str) -> WorkerResult<()> {
        Ok(self.channel.log(&self.job_id, message).await?)
    }
}

#[async_trait]
impl JobSink for JobQueue {
    async fn submit(&self, job: QueueJob) -> WorkerResult<String> {
        Ok(self.enqueue(job).await?)
    }
}
