//! In-memory collaborators for worker tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tempfile::TempDir;

use vedit_firestore::FirestoreError;
use vedit_media::MediaError;
use vedit_models::{
    Render, RenderId, RenderStatus, RenderUpdate, Subtitle, Trim, TrimRange, Video, VideoId,
    VideoStatus, VideoWithTrims,
};
use vedit_queue::QueueJob;
use vedit_storage::{trimmed_key, upload_key, ObjectOp, StorageError, UrlMapper};
use vedit_worker::{
    BlobStore, Codec, JobHandle, JobSink, MediaInfo, MetadataStore, ProcessingContext,
    WorkerConfig, WorkerError, WorkerResult,
};

pub const PROBED_DURATION: f64 = 12.5;

#[derive(Default)]
pub struct MemoryStore {
    pub videos: Mutex<HashMap<VideoId, Video>>,
    pub trims: Mutex<Vec<Trim>>,
    pub subtitles: Mutex<Vec<Subtitle>>,
    pub renders: Mutex<HashMap<RenderId, Render>>,
    /// Upcoming `find_render` calls that fail as unavailable
    pub failing_render_reads: AtomicUsize,
}

impl MemoryStore {
    pub fn video(&self, id: &VideoId) -> Option<Video> {
        self.videos.lock().unwrap().get(id).cloned()
    }

    pub fn render(&self, id: &RenderId) -> Option<Render> {
        self.renders.lock().unwrap().get(id).cloned()
    }

    pub fn insert_video(&self, video: Video) {
        self.videos.lock().unwrap().insert(video.id.clone(), video);
    }

    pub fn insert_render(&self, render: Render) {
        self.renders.lock().unwrap().insert(render.id.clone(), render);
    }

    pub fn subtitles_of(&self, id: &VideoId) -> Vec<Subtitle> {
        self.subtitles
            .lock()
            .unwrap()
            .iter()
            .filter(|s| &s.video_id == id)
            .cloned()
            .collect()
    }

    pub fn fail_render_reads(&self, count: usize) {
        self.failing_render_reads.store(count, Ordering::SeqCst);
    }

    pub fn set_render_status(&self, id: &RenderId, status: RenderStatus) {
        if let Some(render) = self.renders.lock().unwrap().get_mut(id) {
            render.status = status;
        }
    }
}

#[async_trait]
impl MetadataStore for MemoryStore {
    async fn find_video(&self, id: &VideoId) -> WorkerResult<Option<Video>> {
        Ok(self.video(id))
    }

    async fn find_video_with_trims(&self, id: &VideoId) -> WorkerResult<Option<VideoWithTrims>> {
        let Some(video) = self.video(id) else {
            return Ok(None);
        };
        let mut trims: Vec<Trim> = self
            .trims
            .lock()
            .unwrap()
            .iter()
            .filter(|t| &t.video_id == id)
            .cloned()
            .collect();
        trims.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(Some(VideoWithTrims { video, trims }))
    }

    async fn find_videos_by_ids_with_status(
        &self,
        ids: &[VideoId],
        status: VideoStatus,
    ) -> WorkerResult<Vec<Video>> {
        let videos = self.videos.lock().unwrap();
        let mut seen = HashSet::new();
        Ok(ids
            .iter()
            .filter(|id| seen.insert((*id).clone()))
            .filter_map(|id| videos.get(id))
            .filter(|v| v.status == status)
            .cloned()
            .collect())
    }

    async fn create_video(&self, video: &Video) -> WorkerResult<()> {
        let mut videos = self.videos.lock().unwrap();
        if videos.contains_key(&video.id) {
            return Err(WorkerError::validation(format!("video {} exists", video.id)));
        }
        videos.insert(video.id.clone(), video.clone());
        Ok(())
    }

    async fn upsert_video(&self, video: &Video) -> WorkerResult<()> {
        self.insert_video(video.clone());
        Ok(())
    }

    async fn update_video_size(&self, id: &VideoId, size: u64) -> WorkerResult<()> {
        let mut videos = self.videos.lock().unwrap();
        let video = videos
            .get_mut(id)
            .ok_or_else(|| WorkerError::not_found(format!("video {}", id)))?;
        video.size = size;
        Ok(())
    }

    async fn create_trim(&self, trim: &Trim) -> WorkerResult<()> {
        self.trims.lock().unwrap().push(trim.clone());
        Ok(())
    }

    async fn create_subtitles(&self, subtitles: &[Subtitle]) -> WorkerResult<()> {
        self.subtitles.lock().unwrap().extend_from_slice(subtitles);
        Ok(())
    }

    async fn find_render(&self, id: &RenderId) -> WorkerResult<Option<Render>> {
        let injected = self
            .failing_render_reads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(FirestoreError::Unavailable {
                status: 503,
                message: "injected failure".into(),
            }
            .into());
        }
        Ok(self.render(id))
    }

    async fn create_render(&self, render: &Render) -> WorkerResult<()> {
        self.insert_render(render.clone());
        Ok(())
    }

    async fn update_render(&self, id: &RenderId, update: &RenderUpdate) -> WorkerResult<Render> {
        let mut renders = self.renders.lock().unwrap();
        let render = renders
            .get_mut(id)
            .ok_or_else(|| WorkerError::not_found(format!("render {}", id)))?;
        render.apply(update)?;
        Ok(render.clone())
    }
}

pub struct MemoryBlobs {
    urls: UrlMapper,
    pub objects: Mutex<HashMap<String, Vec<u8>>>,
    pub failing: Mutex<HashSet<String>>,
}

impl Default for MemoryBlobs {
    fn default() -> Self {
        Self {
            urls: UrlMapper::new("http://blobs.test", "bucket"),
            objects: Mutex::new(HashMap::new()),
            failing: Mutex::new(HashSet::new()),
        }
    }
}

impl MemoryBlobs {
    pub fn object(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    pub fn insert(&self, key: &str, bytes: &[u8]) {
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), bytes.to_vec());
    }

    pub fn fail_downloads_of(&self, key: &str) {
        self.failing.lock().unwrap().insert(key.to_string());
    }

    pub fn heal(&self) {
        self.failing.lock().unwrap().clear();
    }
}

#[async_trait]
impl BlobStore for MemoryBlobs {
    async fn get(&self, key: &str, local_path: &Path) -> WorkerResult<u64> {
        if self.failing.lock().unwrap().contains(key) {
            return Err(StorageError::request(ObjectOp::Download, key, "injected failure").into());
        }
        let bytes = self
            .object(key)
            .ok_or_else(|| WorkerError::from(StorageError::NoSuchKey(key.to_string())))?;
        tokio::fs::write(local_path, &bytes).await?;
        Ok(bytes.len() as u64)
    }

    async fn put(&self, local_path: &Path, key: &str, _content_type: &str) -> WorkerResult<()> {
        let bytes = tokio::fs::read(local_path).await?;
        self.insert(key, &bytes);
        Ok(())
    }

    fn url_for(&self, key: &str) -> String {
        self.urls.url_for(key)
    }

    fn key_for_url(&self, url: &str) -> WorkerResult<String> {
        Ok(self.urls.key_for_url(url)?)
    }
}

/// Codec that joins bytes instead of running ffmpeg.
#[derive(Default)]
pub struct FakeCodec {
    pub concat_calls: Mutex<Vec<Vec<PathBuf>>>,
}

impl FakeCodec {
    pub fn concat_count(&self) -> usize {
        self.concat_calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Codec for FakeCodec {
    async fn probe(&self, _path: &Path) -> WorkerResult<MediaInfo> {
        Ok(MediaInfo {
            duration: PROBED_DURATION,
        })
    }

    async fn concat(&self, inputs: &[PathBuf], output: &Path) -> WorkerResult<()> {
        if inputs.is_empty() {
            return Err(MediaError::EmptyConcat.into());
        }
        self.concat_calls.lock().unwrap().push(inputs.to_vec());
        let mut joined = Vec::new();
        for input in inputs {
            joined.extend(tokio::fs::read(input).await?);
        }
        tokio::fs::write(output, joined).await?;
        Ok(())
    }

    async fn trim(&self, input: &Path, output: &Path, range: TrimRange) -> WorkerResult<()> {
        let mut bytes = tokio::fs::read(input).await?;
        bytes.extend(format!("[{}-{}]", range.start, range.end).into_bytes());
        tokio::fs::write(output, bytes).await?;
        Ok(())
    }

    async fn burn_subtitles(&self, input: &Path, srt: &Path, output: &Path) -> WorkerResult<()> {
        let mut bytes = tokio::fs::read(input).await?;
        bytes.extend(tokio::fs::read(srt).await?);
        tokio::fs::write(output, bytes).await?;
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingHandle {
    pub progress: Mutex<Vec<u8>>,
    pub logs: Mutex<Vec<String>>,
}

impl RecordingHandle {
    pub fn progress(&self) -> Vec<u8> {
        self.progress.lock().unwrap().clone()
    }

    pub fn logs(&self) -> Vec<String> {
        self.logs.lock().unwrap().clone()
    }
}

#[async_trait]
impl JobHandle for RecordingHandle {
    async fn update_progress(&self, percent: u8) -> WorkerResult<()> {
        self.progress.lock().unwrap().push(percent);
        Ok(())
    }

    async fn append_log(&self, message: &str) -> WorkerResult<()> {
        self.logs.lock().unwrap().push(message.to_string());
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeSink {
    pub jobs: Mutex<Vec<QueueJob>>,
    pub unreachable: AtomicBool,
}

impl FakeSink {
    /// Make every later submit fail as if the queue were down.
    pub fn go_down(&self) {
        self.unreachable.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl JobSink for FakeSink {
    async fn submit(&self, job: QueueJob) -> WorkerResult<String> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "queue unreachable",
            )
            .into());
        }
        let mut jobs = self.jobs.lock().unwrap();
        jobs.push(job);
        Ok(format!("{}-0", jobs.len()))
    }
}

/// A context wired to in-memory collaborators and a temp work dir.
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub blobs: Arc<MemoryBlobs>,
    pub codec: Arc<FakeCodec>,
    pub ctx: ProcessingContext,
    pub work_dir: TempDir,
}

impl Harness {
    pub fn new() -> Self {
        let work_dir = tempfile::tempdir().unwrap();
        let config = WorkerConfig {
            work_dir: work_dir.path().to_string_lossy().into_owned(),
            ..WorkerConfig::default()
        };
        let store = Arc::new(MemoryStore::default());
        let blobs = Arc::new(MemoryBlobs::default());
        let codec = Arc::new(FakeCodec::default());
        let ctx = ProcessingContext::new(config, store.clone(), blobs.clone(), codec.clone());

        Self {
            store,
            blobs,
            codec,
            ctx,
            work_dir,
        }
    }

    /// Store an uploaded source video with its bytes.
    pub fn seed_source(&self, id: &str) -> Video {
        let key = upload_key(&format!("{}.mp4", id));
        self.blobs.insert(&key, format!("<{}>", id).as_bytes());
        let video = Video::uploaded(
            VideoId::from_string(id),
            format!("{}.mp4", id),
            self.blobs.url_for(&key),
            "video/mp4",
        )
        .with_media(60.0, 4);
        self.store.insert_video(video.clone());
        video
    }

    /// Store trimmed clips of `source`, in the given creation order.
    ///
    /// Each clip's bytes are `<id>` so concatenation order is visible in
    /// the output object.
    pub fn seed_trims(&self, source: &Video, clips: &[(&str, VideoStatus)]) -> Vec<Video> {
        let base = Utc::now() - Duration::minutes(10);
        let mut videos = Vec::new();

        for (i, (id, status)) in clips.iter().enumerate() {
            let name = format!("trimmed_{}.mp4", id);
            let key = trimmed_key(&name);
            self.blobs.insert(&key, format!("<{}>", id).as_bytes());

            let mut video = Video::uploaded(
                VideoId::from_string(*id),
                name,
                self.blobs.url_for(&key),
                "video/mp4",
            )
            .with_media(2.0, 4);
            video.status = *status;
            self.store.insert_video(video.clone());

            let range = TrimRange::new(0.0, 2.0, source.duration).unwrap();
            let mut trim = Trim::new(source.id.clone(), video.id.clone(), range);
            trim.created_at = base + Duration::seconds(i as i64);
            self.store.trims.lock().unwrap().push(trim);

            videos.push(video);
        }
        videos
    }

    /// Store a PENDING render of `source`.
    pub fn seed_render(&self, source: &Video) -> Render {
        let render = Render::new(source.id.clone());
        self.store.insert_render(render.clone());
        render
    }

    pub fn scratch_dirs(&self, job_id: &str) -> [PathBuf; 2] {
        [
            self.work_dir.path().join("downloads").join(job_id),
            self.work_dir.path().join("renders").join(job_id),
        ]
    }
}
