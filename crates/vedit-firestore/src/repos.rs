//! Typed repositories for videos, trims, subtitles and renders.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use vedit_models::{
    Render, RenderId, RenderStatus, RenderUpdate, Subtitle, Trim, TrimId, Video, VideoId,
    VideoStatus,
};

use crate::client::{FirestoreClient, Precondition};
use crate::error::{FirestoreError, FirestoreResult};
use crate::types::{Document, FromFirestoreValue, StructuredQuery, ToFirestoreValue, Value};

const VIDEOS: &str = "videos";
const TRIMS: &str = "trims";
const RENDERS: &str = "renders";
const SUBTITLES: &str = "subtitles";

/// Repository for video documents.
#[derive(Clone)]
pub struct VideoRepository {
    client: FirestoreClient,
}

impl VideoRepository {
    pub fn new(client: FirestoreClient) -> Self {
        Self { client }
    }

    /// Get a video by ID.
    pub async fn get(&self, video_id: &VideoId) -> FirestoreResult<Option<Video>> {
        let doc = self.client.get_document(VIDEOS, video_id.as_str()).await?;
        doc.map(|d| document_to_video(&d, video_id)).transpose()
    }

    /// Create a new video record.
    pub async fn create(&self, video: &Video) -> FirestoreResult<()> {
        self.client
            .create_document(VIDEOS, video.id.as_str(), video_to_fields(video))
            .await?;
        info!("Created video record: {}", video.id);
        Ok(())
    }

    /// Write a video record, replacing any existing one with the same id.
    pub async fn upsert(&self, video: &Video) -> FirestoreResult<()> {
        self.client
            .set_document(VIDEOS, video.id.as_str(), video_to_fields(video))
            .await?;
        debug!("Upserted video record: {}", video.id);
        Ok(())
    }

    /// Record the stored size of an existing video.
    pub async fn update_size(&self, video_id: &VideoId, size: u64) -> FirestoreResult<()> {
        let mut fields = HashMap::new();
        fields.insert("size".to_string(), size.to_firestore_value());
        fields.insert("updated_at".to_string(), Utc::now().to_firestore_value());

        self.client
            .update_document(
                VIDEOS,
                video_id.as_str(),
                fields,
                &["size", "updated_at"],
                Precondition::Exists,
            )
            .await?;
        Ok(())
    }

    /// Fetch the videos among `ids` that have `status`, in the order of `ids`.
    pub async fn find_by_ids_with_status(
        &self,
        ids: &[VideoId],
        status: VideoStatus,
    ) -> FirestoreResult<Vec<Video>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut unique: Vec<&str> = ids.iter().map(|id| id.as_str()).collect();
        unique.sort_unstable();
        unique.dedup();

        let docs = self.client.batch_get_documents(VIDEOS, &unique).await?;

        let mut found = HashMap::with_capacity(docs.len());
        for doc in &docs {
            let Some(id) = doc.id() else {
                warn!("Skipping batchGet document without a name");
                continue;
            };
            let video = document_to_video(doc, &VideoId::from_string(id))?;
            if video.status == status {
                found.insert(video.id.clone(), video);
            }
        }

        Ok(order_by_requested(ids, &found))
    }
}

/// Repository for trim documents.
#[derive(Clone)]
pub struct TrimRepository {
    client: FirestoreClient,
}

impl TrimRepository {
    pub fn new(client: FirestoreClient) -> Self {
        Self { client }
    }

    /// Create a new trim record.
    pub async fn create(&self, trim: &Trim) -> FirestoreResult<()> {
        self.client
            .create_document(TRIMS, trim.id.as_str(), trim_to_fields(trim))
            .await?;
        info!(
            "Created trim {} of video {} -> {}",
            trim.id, trim.video_id, trim.trimmed_video_id
        );
        Ok(())
    }

    /// Trims taken from a video, oldest first.
    pub async fn list_for_video(&self, video_id: &VideoId) -> FirestoreResult<Vec<Trim>> {
        // Equality-only query; ordering happens here so no composite index is needed.
        let query = StructuredQuery::collection(TRIMS)
            .where_eq("video_id", video_id.as_str().to_firestore_value());

        let docs = self.client.run_query(query).await?;
        let mut trims = docs
            .iter()
            .map(document_to_trim)
            .collect::<FirestoreResult<Vec<_>>>()?;

        sort_trims(&mut trims);
        Ok(trims)
    }
}

/// Repository for subtitle documents.
#[derive(Clone)]
pub struct SubtitleRepository {
    client: FirestoreClient,
}

impl SubtitleRepository {
    pub fn new(client: FirestoreClient) -> Self {
        Self { client }
    }

    /// Create one record per subtitle, in order.
    pub async fn create_all(&self, subtitles: &[Subtitle]) -> FirestoreResult<()> {
        for subtitle in subtitles {
            self.client
                .create_document(SUBTITLES, subtitle.id.as_str(), subtitle_to_fields(subtitle))
                .await?;
        }
        if let Some(first) = subtitles.first() {
            info!(
                "Created {} subtitle records for video {}",
                subtitles.len(),
                first.video_id
            );
        }
        Ok(())
    }
}

/// Repository for render documents.
#[derive(Clone)]
pub struct RenderRepository {
    client: FirestoreClient,
}

impl RenderRepository {
    /// Concurrent writers retried before giving up.
    const MAX_UPDATE_RETRIES: u32 = 5;

    pub fn new(client: FirestoreClient) -> Self {
        Self { client }
    }

    /// Get a render by ID.
    pub async fn get(&self, render_id: &RenderId) -> FirestoreResult<Option<Render>> {
        let doc = self.client.get_document(RENDERS, render_id.as_str()).await?;
        doc.map(|d| document_to_render(&d, render_id)).transpose()
    }

    /// Create a new render record.
    pub async fn create(&self, render: &Render) -> FirestoreResult<()> {
        self.client
            .create_document(RENDERS, render.id.as_str(), render_to_fields(render))
            .await?;
        info!("Created render record: {}", render.id);
        Ok(())
    }

    /// Apply a status change guarded by the render state machine.
    ///
    /// The read-validate-write cycle uses the document's updateTime as a
    /// precondition, so a concurrent writer causes a re-read instead of a
    /// lost update.
    pub async fn apply_update(
        &self,
        render_id: &RenderId,
        update: &RenderUpdate,
    ) -> FirestoreResult<Render> {
        let mut last_error = None;

        for attempt in 0..Self::MAX_UPDATE_RETRIES {
            let doc = self
                .client
                .get_document(RENDERS, render_id.as_str())
                .await?
                .ok_or_else(|| FirestoreError::NotFound(format!("{}/{}", RENDERS, render_id)))?;

            let mut render = document_to_render(&doc, render_id)?;
            render.apply(update)?;

            let precondition = match &doc.update_time {
                Some(ts) => Precondition::UpdateTime(ts.clone()),
                None => Precondition::Exists,
            };

            match self
                .client
                .update_document(
                    RENDERS,
                    render_id.as_str(),
                    render_status_fields(&render),
                    RENDER_STATUS_MASK,
                    precondition,
                )
                .await
            {
                Ok(_) => {
                    debug!(
                        render_id = %render_id,
                        status = %render.status,
                        "Render status updated"
                    );
                    return Ok(render);
                }
                Err(e) if e.is_precondition_failed() => {
                    debug!(
                        "Render update precondition failed for {} (attempt {}), retrying",
                        render_id,
                        attempt + 1
                    );
                    last_error = Some(e);
                    tokio::time::sleep(Duration::from_millis(50 * (attempt as u64 + 1))).await;
                }
                Err(e) => return Err(e),
            }
        }

        warn!(
            "Render update failed after {} retries for {}: {:?}",
            Self::MAX_UPDATE_RETRIES,
            render_id,
            last_error
        );
        Err(FirestoreError::Contended {
            document: format!("{}/{}", RENDERS, render_id),
            attempts: Self::MAX_UPDATE_RETRIES,
        })
    }
}

const RENDER_STATUS_MASK: &[&str] = &[
    "status",
    "rendered_video_id",
    "output_path",
    "error_message",
    "attempts",
    "updated_at",
];

fn order_by_requested(ids: &[VideoId], found: &HashMap<VideoId, Video>) -> Vec<Video> {
    ids.iter().filter_map(|id| found.get(id).cloned()).collect()
}

fn sort_trims(trims: &mut [Trim]) {
    trims.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.id.cmp(&b.id))
    });
}

// ============================================================================
// Document conversion
// ============================================================================

struct Fields<'a>(&'a HashMap<String, Value>);

impl<'a> Fields<'a> {
    fn of(doc: &'a Document) -> FirestoreResult<Self> {
        if doc.fields.is_empty() {
            return Err(FirestoreError::decode("document has no fields"));
        }
        Ok(Fields(&doc.fields))
    }

    fn get<T: FromFirestoreValue>(&self, key: &str) -> Option<T> {
        self.0.get(key).and_then(T::from_firestore_value)
    }

    fn string(&self, key: &str) -> String {
        self.get(key).unwrap_or_default()
    }

    fn timestamp(&self, key: &str) -> DateTime<Utc> {
        self.get(key).unwrap_or_else(Utc::now)
    }
}

fn video_to_fields(video: &Video) -> HashMap<String, Value> {
    let mut fields = HashMap::new();
    fields.insert("filename".to_string(), video.filename.to_firestore_value());
    fields.insert("file_path".to_string(), video.file_path.to_firestore_value());
    fields.insert("duration".to_string(), video.duration.to_firestore_value());
    fields.insert("size".to_string(), video.size.to_firestore_value());
    fields.insert(
        "content_type".to_string(),
        video.content_type.to_firestore_value(),
    );
    fields.insert("status".to_string(), video.status.as_str().to_firestore_value());
    fields.insert("created_at".to_string(), video.created_at.to_firestore_value());
    fields.insert("updated_at".to_string(), video.updated_at.to_firestore_value());
    fields
}

fn document_to_video(doc: &Document, video_id: &VideoId) -> FirestoreResult<Video> {
    let f = Fields::of(doc)?;

    // Unknown statuses are treated as not yet usable.
    let status = f
        .get::<String>("status")
        .and_then(|s| VideoStatus::parse(&s))
        .unwrap_or(VideoStatus::Processing);

    Ok(Video {
        id: video_id.clone(),
        filename: f.string("filename"),
        file_path: f.string("file_path"),
        duration: f.get("duration").unwrap_or(0.0),
        size: f.get("size").unwrap_or(0),
        content_type: f.string("content_type"),
        status,
        created_at: f.timestamp("created_at"),
        updated_at: f.timestamp("updated_at"),
    })
}

fn trim_to_fields(trim: &Trim) -> HashMap<String, Value> {
    let mut fields = HashMap::new();
    fields.insert("video_id".to_string(), trim.video_id.as_str().to_firestore_value());
    fields.insert(
        "trimmed_video_id".to_string(),
        trim.trimmed_video_id.as_str().to_firestore_value(),
    );
    fields.insert("start_time".to_string(), trim.start_time.to_firestore_value());
    fields.insert("end_time".to_string(), trim.end_time.to_firestore_value());
    fields.insert("created_at".to_string(), trim.created_at.to_firestore_value());
    fields
}

fn document_to_trim(doc: &Document) -> FirestoreResult<Trim> {
    let id = doc
        .id()
        .ok_or_else(|| FirestoreError::decode("trim document has no name"))?;
    let f = Fields::of(doc)?;

    Ok(Trim {
        id: TrimId::from_string(id),
        video_id: VideoId::from_string(f.string("video_id")),
        trimmed_video_id: VideoId::from_string(f.string("trimmed_video_id")),
        start_time: f.get("start_time").unwrap_or(0.0),
        end_time: f.get("end_time").unwrap_or(0.0),
        created_at: f.timestamp("created_at"),
    })
}

fn subtitle_to_fields(subtitle: &Subtitle) -> HashMap<String, Value> {
    let mut fields = HashMap::new();
    fields.insert(
        "video_id".to_string(),
        subtitle.video_id.as_str().to_firestore_value(),
    );
    fields.insert("text".to_string(), subtitle.text.to_firestore_value());
    fields.insert("start_time".to_string(), subtitle.start_time.to_firestore_value());
    fields.insert("end_time".to_string(), subtitle.end_time.to_firestore_value());
    fields.insert("created_at".to_string(), subtitle.created_at.to_firestore_value());
    fields
}

fn render_status_fields(render: &Render) -> HashMap<String, Value> {
    let mut fields = HashMap::new();
    fields.insert("status".to_string(), render.status.as_str().to_firestore_value());
    fields.insert(
        "rendered_video_id".to_string(),
        render
            .rendered_video_id
            .as_ref()
            .map(|id| id.as_str().to_string())
            .to_firestore_value(),
    );
    fields.insert("output_path".to_string(), render.output_path.to_firestore_value());
    fields.insert(
        "error_message".to_string(),
        render.error_message.to_firestore_value(),
    );
    fields.insert("attempts".to_string(), render.attempts.to_firestore_value());
    fields.insert("updated_at".to_string(), render.updated_at.to_firestore_value());
    fields
}

fn render_to_fields(render: &Render) -> HashMap<String, Value> {
    let mut fields = render_status_fields(render);
    fields.insert("video_id".to_string(), render.video_id.as_str().to_firestore_value());
    fields.insert("created_at".to_string(), render.created_at.to_firestore_value());
    fields
}

fn document_to_render(doc: &Document, render_id: &RenderId) -> FirestoreResult<Render> {
    let f = Fields::of(doc)?;

    let raw_status = f.string("status");
    let status = RenderStatus::parse(&raw_status).ok_or_else(|| {
        FirestoreError::decode(format!(
            "Render {} has unknown status '{}'",
            render_id, raw_status
        ))
    })?;

    Ok(Render {
        id: render_id.clone(),
        video_id: VideoId::from_string(f.string("video_id")),
        rendered_video_id: f.get::<String>("rendered_video_id").map(VideoId::from_string),
        output_path: f.get("output_path"),
        status,
        error_message: f.get("error_message"),
        attempts: f.get("attempts").unwrap_or(0),
        created_at: f.timestamp("created_at"),
        updated_at: f.timestamp("updated_at"),
    })
}
