//! Render pipeline scenarios against in-memory collaborators.

mod common;

use std::sync::Arc;

use common::{Harness, RecordingHandle, PROBED_DURATION};
use vedit_models::{RenderId, RenderStatus, VideoId, VideoStatus};
use vedit_queue::RenderJob;
use vedit_storage::render_key;
use vedit_worker::{
    process_render_job, ErrorKind, ProcessingContext, RenderOutcome, WorkerError, WorkerResult,
};

fn job_for(render_id: &RenderId, video_id: &VideoId) -> RenderJob {
    RenderJob::new(render_id.clone(), video_id.clone())
}

/// Run a render on the runtime's worker threads, as the executor does.
fn spawn_render(
    ctx: &ProcessingContext,
    job: &RenderJob,
) -> tokio::task::JoinHandle<WorkerResult<RenderOutcome>> {
    let ctx = ctx.clone();
    let job = job.clone();
    let handle = Arc::new(RecordingHandle::default());
    tokio::spawn(async move { process_render_job(&ctx, &job, handle.as_ref()).await })
}

#[tokio::test]
async fn test_render_two_trims() {
    let h = Harness::new();
    let source = h.seed_source("src");
    h.seed_trims(
        &source,
        &[("a", VideoStatus::Uploaded), ("b", VideoStatus::Uploaded)],
    );
    let render = h.seed_render(&source);
    let handle = RecordingHandle::default();

    let outcome = process_render_job(&h.ctx, &job_for(&render.id, &source.id), &handle)
        .await
        .unwrap();

    let output = outcome.video.expect("output video");
    assert_eq!(output.id, render.id.output_video_id());
    assert_eq!(output.status, VideoStatus::Uploaded);
    assert_eq!(output.duration, PROBED_DURATION);
    assert_eq!(output.size, "<a><b>".len() as u64);

    let key = render_key(render.id.as_str(), &source.filename);
    assert_eq!(h.blobs.object(&key).unwrap(), b"<a><b>".to_vec());
    assert_eq!(output.file_path, h.ctx.blobs.url_for(&key));

    let stored = h.store.render(&render.id).unwrap();
    assert_eq!(stored.status, RenderStatus::Completed);
    assert_eq!(stored.rendered_video_id, Some(output.id.clone()));
    assert_eq!(stored.output_path.as_deref(), Some(output.file_path.as_str()));
    assert_eq!(stored.attempts, 1);
    assert!(h.store.video(&output.id).is_some());

    // 2 downloads + 4 fixed steps
    assert_eq!(handle.progress(), vec![0, 16, 33, 50, 66, 83, 100]);

    let logs = handle.logs();
    assert!(logs.iter().any(|l| l == "Fetched trimmed videos: 2"));
    assert!(logs.iter().any(|l| l == "Downloaded trimmed videos: 2"));
    assert!(logs.iter().any(|l| l.starts_with("Render complete")));
}

#[tokio::test]
async fn test_concat_follows_trim_creation_order() {
    let h = Harness::new();
    let source = h.seed_source("src");
    h.seed_trims(
        &source,
        &[
            ("c", VideoStatus::Uploaded),
            ("a", VideoStatus::Uploaded),
            ("b", VideoStatus::Uploaded),
        ],
    );
    let render = h.seed_render(&source);
    let handle = RecordingHandle::default();

    process_render_job(&h.ctx, &job_for(&render.id, &source.id), &handle)
        .await
        .unwrap();

    let key = render_key(render.id.as_str(), &source.filename);
    assert_eq!(h.blobs.object(&key).unwrap(), b"<c><a><b>".to_vec());

    let calls = h.codec.concat_calls.lock().unwrap().clone();
    assert_eq!(calls.len(), 1);
    let names: Vec<String> = calls[0]
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(
        names,
        vec!["c_trimmed_c.mp4", "a_trimmed_a.mp4", "b_trimmed_b.mp4"]
    );
}

#[tokio::test]
async fn test_progress_is_monotonic_and_ends_at_100() {
    let h = Harness::new();
    let source = h.seed_source("src");
    let clips: Vec<(String, VideoStatus)> = (0..7)
        .map(|i| (format!("clip{}", i), VideoStatus::Uploaded))
        .collect();
    let clip_refs: Vec<(&str, VideoStatus)> =
        clips.iter().map(|(id, s)| (id.as_str(), *s)).collect();
    h.seed_trims(&source, &clip_refs);
    let render = h.seed_render(&source);
    let handle = RecordingHandle::default();

    process_render_job(&h.ctx, &job_for(&render.id, &source.id), &handle)
        .await
        .unwrap();

    let progress = handle.progress();
    assert!(progress.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(progress.last(), Some(&100));
    assert_eq!(progress.iter().filter(|p| **p == 100).count(), 1);
}

#[tokio::test]
async fn test_only_uploaded_clips_are_joined() {
    let h = Harness::new();
    let source = h.seed_source("src");
    h.seed_trims(
        &source,
        &[
            ("a", VideoStatus::Uploaded),
            ("b", VideoStatus::Processing),
            ("c", VideoStatus::Uploaded),
        ],
    );
    let render = h.seed_render(&source);
    let handle = RecordingHandle::default();

    process_render_job(&h.ctx, &job_for(&render.id, &source.id), &handle)
        .await
        .unwrap();

    let key = render_key(render.id.as_str(), &source.filename);
    assert_eq!(h.blobs.object(&key).unwrap(), b"<a><c>".to_vec());
    assert!(handle
        .logs()
        .iter()
        .any(|l| l == "Fetched trimmed videos: 2"));
}

#[tokio::test]
async fn test_no_uploaded_clips_fails_without_concat() {
    let h = Harness::new();
    let source = h.seed_source("src");
    h.seed_trims(&source, &[("a", VideoStatus::Processing)]);
    let render = h.seed_render(&source);
    let handle = RecordingHandle::default();

    let err = process_render_job(&h.ctx, &job_for(&render.id, &source.id), &handle)
        .await
        .unwrap_err();

    assert!(matches!(err, WorkerError::NoUploadedInputs { requested: 1, .. }));
    assert!(err.is_permanent());
    assert_eq!(h.codec.concat_count(), 0);

    let stored = h.store.render(&render.id).unwrap();
    assert_eq!(stored.status, RenderStatus::Failed);
    assert!(stored.error_message.is_some());
    assert!(stored.rendered_video_id.is_none());
    assert!(h.store.video(&render.id.output_video_id()).is_none());
}

#[tokio::test]
async fn test_video_without_trims_fails() {
    let h = Harness::new();
    let source = h.seed_source("src");
    let render = h.seed_render(&source);
    let handle = RecordingHandle::default();

    let err = process_render_job(&h.ctx, &job_for(&render.id, &source.id), &handle)
        .await
        .unwrap_err();

    assert!(matches!(err, WorkerError::NoTrims(_)));
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(
        h.store.render(&render.id).unwrap().status,
        RenderStatus::Failed
    );
}

#[tokio::test]
async fn test_download_failure_leaves_no_output() {
    let h = Harness::new();
    let source = h.seed_source("src");
    let clips = h.seed_trims(
        &source,
        &[("a", VideoStatus::Uploaded), ("b", VideoStatus::Uploaded)],
    );
    let failing_key = h.ctx.blobs.key_for_url(&clips[1].file_path).unwrap();
    h.blobs.fail_downloads_of(&failing_key);

    let render = h.seed_render(&source);
    let handle = RecordingHandle::default();

    let err = process_render_job(&h.ctx, &job_for(&render.id, &source.id), &handle)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Io);
    assert!(!err.is_permanent());
    assert_eq!(h.codec.concat_count(), 0);

    let stored = h.store.render(&render.id).unwrap();
    assert_eq!(stored.status, RenderStatus::Failed);
    assert!(stored.rendered_video_id.is_none());
    assert!(stored.output_path.is_none());
    assert!(h.store.video(&render.id.output_video_id()).is_none());

    let key = render_key(render.id.as_str(), &source.filename);
    assert!(h.blobs.object(&key).is_none());
    assert!(handle.logs().iter().any(|l| l.starts_with("Render failed")));
}

#[tokio::test]
async fn test_retry_after_failure_completes() {
    let h = Harness::new();
    let source = h.seed_source("src");
    let clips = h.seed_trims(&source, &[("a", VideoStatus::Uploaded)]);
    let failing_key = h.ctx.blobs.key_for_url(&clips[0].file_path).unwrap();
    h.blobs.fail_downloads_of(&failing_key);

    let render = h.seed_render(&source);
    let job = job_for(&render.id, &source.id);

    let first = RecordingHandle::default();
    assert!(process_render_job(&h.ctx, &job, &first).await.is_err());

    h.blobs.heal();
    let second = RecordingHandle::default();
    let outcome = process_render_job(&h.ctx, &job, &second).await.unwrap();

    assert_eq!(outcome.render.status, RenderStatus::Completed);
    assert_eq!(outcome.render.attempts, 2);
    assert!(outcome.render.error_message.is_none());
    // Progress restarts from zero on the second execution
    assert_eq!(second.progress().first(), Some(&0));
}

#[tokio::test]
async fn test_completed_render_is_not_redone() {
    let h = Harness::new();
    let source = h.seed_source("src");
    h.seed_trims(&source, &[("a", VideoStatus::Uploaded)]);
    let render = h.seed_render(&source);
    let job = job_for(&render.id, &source.id);

    process_render_job(&h.ctx, &job, &RecordingHandle::default())
        .await
        .unwrap();

    let handle = RecordingHandle::default();
    let outcome = process_render_job(&h.ctx, &job, &handle).await.unwrap();

    assert!(outcome.video.is_none());
    assert_eq!(outcome.render.status, RenderStatus::Completed);
    assert_eq!(outcome.render.attempts, 1);
    assert_eq!(h.codec.concat_count(), 1);
    assert_eq!(handle.progress(), vec![100]);
}

#[tokio::test]
async fn test_missing_render_is_not_found() {
    let h = Harness::new();
    let source = h.seed_source("src");
    let handle = RecordingHandle::default();
    let job = job_for(&RenderId::from_string("missing"), &source.id);

    let err = process_render_job(&h.ctx, &job, &handle).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(handle.progress().is_empty());
}

#[tokio::test]
async fn test_missing_source_video_fails_render() {
    let h = Harness::new();
    let source = h.seed_source("src");
    let render = h.seed_render(&source);
    let job = job_for(&render.id, &VideoId::from_string("gone"));

    let err = process_render_job(&h.ctx, &job, &RecordingHandle::default())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(
        h.store.render(&render.id).unwrap().status,
        RenderStatus::Failed
    );
}

#[tokio::test]
async fn test_scratch_space_removed_on_success_and_failure() {
    let h = Harness::new();
    let source = h.seed_source("src");
    h.seed_trims(&source, &[("a", VideoStatus::Uploaded)]);

    let ok = h.seed_render(&source);
    process_render_job(&h.ctx, &job_for(&ok.id, &source.id), &RecordingHandle::default())
        .await
        .unwrap();
    for dir in h.scratch_dirs(ok.id.as_str()) {
        assert!(!dir.exists(), "{} left behind", dir.display());
    }

    let other = h.seed_source("other");
    let clips = h.seed_trims(&other, &[("x", VideoStatus::Uploaded)]);
    h.blobs
        .fail_downloads_of(&h.ctx.blobs.key_for_url(&clips[0].file_path).unwrap());
    let failed = h.seed_render(&other);
    assert!(process_render_job(
        &h.ctx,
        &job_for(&failed.id, &other.id),
        &RecordingHandle::default()
    )
    .await
    .is_err());
    for dir in h.scratch_dirs(failed.id.as_str()) {
        assert!(!dir.exists(), "{} left behind", dir.display());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_render_runs_on_spawned_task() {
    let h = Harness::new();
    let source = h.seed_source("src");
    h.seed_trims(
        &source,
        &[("a", VideoStatus::Uploaded), ("b", VideoStatus::Uploaded)],
    );
    let render = h.seed_render(&source);

    let outcome = spawn_render(&h.ctx, &job_for(&render.id, &source.id))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(outcome.render.status, RenderStatus::Completed);
    let key = render_key(render.id.as_str(), &source.filename);
    assert_eq!(h.blobs.object(&key).unwrap(), b"<a><b>".to_vec());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_duplicate_executions_both_succeed() {
    let h = Harness::new();
    let source = h.seed_source("src");
    let clips: Vec<String> = (0..6).map(|i| format!("clip{}", i)).collect();
    let clip_refs: Vec<(&str, VideoStatus)> = clips
        .iter()
        .map(|id| (id.as_str(), VideoStatus::Uploaded))
        .collect();
    h.seed_trims(&source, &clip_refs);
    let expected: Vec<u8> = clips
        .iter()
        .flat_map(|id| format!("<{}>", id).into_bytes())
        .collect();

    for _ in 0..10 {
        let render = h.seed_render(&source);
        let job = job_for(&render.id, &source.id);

        let (first, second) = tokio::join!(spawn_render(&h.ctx, &job), spawn_render(&h.ctx, &job));
        let first = first.unwrap();
        let second = second.unwrap();
        assert!(first.is_ok(), "first execution failed: {:?}", first.as_ref().err());
        assert!(second.is_ok(), "second execution failed: {:?}", second.as_ref().err());

        let stored = h.store.render(&render.id).unwrap();
        assert_eq!(stored.status, RenderStatus::Completed);
        assert!(stored.error_message.is_none());

        let key = render_key(render.id.as_str(), &source.filename);
        assert_eq!(h.blobs.object(&key).unwrap(), expected);
        for dir in h.scratch_dirs(render.id.as_str()) {
            assert!(!dir.exists(), "{} left behind", dir.display());
        }
    }
}

#[tokio::test]
async fn test_unreadable_render_is_marked_failed() {
    let h = Harness::new();
    let source = h.seed_source("src");
    h.seed_trims(&source, &[("a", VideoStatus::Uploaded)]);
    let render = h.seed_render(&source);
    h.store.fail_render_reads(1);
    let handle = RecordingHandle::default();

    let err = process_render_job(&h.ctx, &job_for(&render.id, &source.id), &handle)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Store);
    assert!(!err.is_permanent());
    assert_eq!(h.codec.concat_count(), 0);

    let stored = h.store.render(&render.id).unwrap();
    assert_eq!(stored.status, RenderStatus::Failed);
    assert!(stored
        .error_message
        .as_deref()
        .is_some_and(|m| m.contains("injected failure")));
    assert!(handle.logs().iter().any(|l| l.starts_with("Render failed")));
}
