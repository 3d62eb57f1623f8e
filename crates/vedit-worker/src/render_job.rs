//! Render job processing.
//!
//! A render concatenates the uploaded trims of a source video into a new
//! video:
//!
//! 1. load the source video and its trims
//! 2. resolve the trimmed videos that are uploaded
//! 3. download them in parallel into execution-scoped scratch space
//! 4. concatenate in trim order
//! 5. upload the output
//! 6. probe it, upsert the output video and commit the render
//! 7. remove the scratch space
//!
//! Any error marks the render FAILED and is returned to the caller, which
//! owns retry policy. The exception is a render some other execution has
//! committed in the meantime, which is reported as already completed.

use std::path::PathBuf;

use futures::future::{BoxFuture, FutureExt};
use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::{info, Instrument};

use vedit_media::file_size;
use vedit_models::{Render, RenderId, RenderUpdate, Video, VideoStatus};
use vedit_queue::RenderJob;
use vedit_storage::{render_key, sanitize_filename};

use crate::context::ProcessingContext;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::ports::JobHandle;
use crate::progress::ProgressReporter;
use crate::staging::StagingArea;

/// Result of a render execution.
#[derive(Debug, Clone)]
pub struct RenderOutcome {
    pub render: Render,
    /// The output video; `None` when the render was already committed.
    pub video: Option<Video>,
}

/// Process a render job.
///
/// Safe to re-execute for the same render: the output video id and object
/// key derive from the render id, and an already COMPLETED render returns
/// without running any stage.
pub async fn process_render_job(
    ctx: &ProcessingContext,
    job: &RenderJob,
    handle: &dyn JobHandle,
) -> WorkerResult<RenderOutcome> {
    let logger = JobLogger::new(job.render_id.as_str(), "render");
    let span = logger.span();
    execute(ctx, job, handle, &logger).instrument(span).await
}

async fn execute(
    ctx: &ProcessingContext,
    job: &RenderJob,
    handle: &dyn JobHandle,
    logger: &JobLogger,
) -> WorkerResult<RenderOutcome> {
    logger.started(&format!("Rendering video {}", job.video_id));

    match run_render(ctx, job, handle, logger).await {
        Ok(outcome) => Ok(outcome),
        Err(e) => {
            // A duplicate delivery may have committed the render meanwhile.
            if let Ok(Some(render)) = ctx.store.find_render(&job.render_id).await {
                if render.is_completed() {
                    logger.warn(&format!(
                        "Render {} committed by another execution; dropping error: {}",
                        job.render_id, e
                    ));
                    return Ok(already_completed(render, handle, logger).await);
                }
            }
            logger
                .failure(handle, &format!("Render failed: {}", e))
                .await;
            mark_failed(ctx, job, &e, logger).await;
            Err(e)
        }
    }
}

async fn already_completed(
    render: Render,
    handle: &dyn JobHandle,
    logger: &JobLogger,
) -> RenderOutcome {
    logger
        .milestone(handle, &format!("Render {} already completed", render.id))
        .await;
    if let Err(e) = handle.update_progress(100).await {
        logger.warn(&format!("Failed to report progress: {}", e));
    }
    RenderOutcome {
        render,
        video: None,
    }
}

/// Record a failed execution on the render.
pub async fn fail_render(
    ctx: &ProcessingContext,
    render_id: &RenderId,
    error: &WorkerError,
) -> WorkerResult<Render> {
    let update = RenderUpdate::Fail {
        error_message: error.to_string(),
    };
    ctx.store.update_render(render_id, &update).await
}

/// Best-effort FAILED write; the original error is what the caller sees.
async fn mark_failed(
    ctx: &ProcessingContext,
    job: &RenderJob,
    error: &WorkerError,
    logger: &JobLogger,
) {
    if let Err(e) = fail_render(ctx, &job.render_id, error).await {
        logger.warn(&format!("Failed to mark render FAILED: {}", e));
    }
}

async fn run_render(
    ctx: &ProcessingContext,
    job: &RenderJob,
    handle: &dyn JobHandle,
    logger: &JobLogger,
) -> WorkerResult<RenderOutcome> {
    let existing = ctx
        .store
        .find_render(&job.render_id)
        .await?
        .ok_or_else(|| WorkerError::not_found(format!("render {}", job.render_id)))?;

    if existing.is_completed() {
        return Ok(already_completed(existing, handle, logger).await);
    }

    ctx.store
        .update_render(&job.render_id, &RenderUpdate::Start)
        .await?;

    let mut progress = ProgressReporter::new(handle, logger);
    progress.reset().await;

    let staging = StagingArea::create(&ctx.config.work_dir, job.render_id.as_str()).await?;
    let result = run_stages(ctx, job, handle, logger, &mut progress, &staging).await;
    staging.cleanup().await;

    let outcome = result?;
    logger
        .milestone(handle, &format!("Render complete {}", job.render_id))
        .await;
    Ok(outcome)
}

async fn run_stages(
    ctx: &ProcessingContext,
    job: &RenderJob,
    handle: &dyn JobHandle,
    logger: &JobLogger,
    progress: &mut ProgressReporter<'_>,
    staging: &StagingArea,
) -> WorkerResult<RenderOutcome> {
    // Load context
    let source = ctx
        .store
        .find_video_with_trims(&job.video_id)
        .await?
        .ok_or_else(|| WorkerError::not_found(format!("video {}", job.video_id)))?;

    if source.trims.is_empty() {
        return Err(WorkerError::NoTrims(job.video_id.clone()));
    }

    // Resolve inputs
    let trimmed_ids = source.trimmed_video_ids();
    let inputs = ctx
        .store
        .find_videos_by_ids_with_status(&trimmed_ids, VideoStatus::Uploaded)
        .await?;

    logger
        .milestone(handle, &format!("Fetched trimmed videos: {}", inputs.len()))
        .await;

    if inputs.is_empty() {
        return Err(WorkerError::NoUploadedInputs {
            video_id: job.video_id.clone(),
            requested: trimmed_ids.len(),
        });
    }

    progress.set_inputs(inputs.len());
    progress.advance().await;

    // Download
    let local_paths = download_inputs(ctx, &inputs, staging, progress).await?;
    logger
        .milestone(handle, &format!("Downloaded trimmed videos: {}", local_paths.len()))
        .await;

    // Concatenate
    let key = render_key(job.render_id.as_str(), &source.video.filename);
    let output_name = output_filename(job, &source.video.filename);
    let output_path = staging.output_path(&output_name);

    ctx.codec.concat(&local_paths, &output_path).await?;
    progress.advance().await;
    logger
        .milestone(handle, &format!("Joined videos: {}", output_path.display()))
        .await;

    // Upload
    let content_type = source.video.content_type.as_str();
    ctx.blobs.put(&output_path, &key, content_type).await?;
    progress.advance().await;
    logger
        .milestone(handle, &format!("Uploaded rendered video: {}", key))
        .await;

    // Persist
    let info = ctx.codec.probe(&output_path).await?;
    let size = file_size(&output_path).await?;
    let url = ctx.blobs.url_for(&key);

    let video = Video::uploaded(
        job.render_id.output_video_id(),
        output_name,
        url.clone(),
        content_type,
    )
    .with_media(info.duration, size);

    ctx.store.upsert_video(&video).await?;
    let render = ctx
        .store
        .update_render(
            &job.render_id,
            &RenderUpdate::Complete {
                rendered_video_id: video.id.clone(),
                output_path: url,
            },
        )
        .await?;
    progress.advance().await;
    logger
        .milestone(handle, &format!("Saved rendered video: {}", video.id))
        .await;

    info!(
        render_id = %job.render_id,
        video_id = %video.id,
        duration = video.duration,
        size = video.size,
        "Render persisted"
    );

    Ok(RenderOutcome {
        render,
        video: Some(video),
    })
}

/// Download every input, advancing progress as each one lands.
///
/// Returns local paths in input order regardless of completion order. The
/// first failure drops the remaining downloads.
async fn download_inputs(
    ctx: &ProcessingContext,
    inputs: &[Video],
    staging: &StagingArea,
    progress: &mut ProgressReporter<'_>,
) -> WorkerResult<Vec<PathBuf>> {
    let blobs = ctx.blobs.as_ref();
    let limit = ctx.config.download_limit(inputs.len());

    // Boxed up front: the job future must stay Send for tokio::spawn.
    let fetches: Vec<BoxFuture<'_, WorkerResult<(usize, PathBuf)>>> = inputs
        .iter()
        .enumerate()
        .map(|(index, video)| {
            let path = staging.download_path(video);
            async move {
                let key = blobs.key_for_url(&video.file_path)?;
                let bytes = blobs.get(&key, &path).await?;
                tracing::debug!(video_id = %video.id, bytes, "Downloaded input");
                Ok::<_, WorkerError>((index, path))
            }
            .boxed()
        })
        .collect();

    let mut downloads = stream::iter(fetches).buffer_unordered(limit);

    let mut paths: Vec<Option<PathBuf>> = vec![None; inputs.len()];
    while let Some((index, path)) = downloads.try_next().await? {
        paths[index] = Some(path);
        progress.advance().await;
    }

    Ok(paths.into_iter().flatten().collect())
}

/// Stable output name, so re-executions overwrite rather than duplicate.
fn output_filename(job: &RenderJob, source_filename: &str) -> String {
    format!("{}_{}", job.render_id, sanitize_filename(source_filename))
}
