//! Execution-scoped scratch directories.
//!
//! Each execution gets `<work_dir>/downloads/<job_id>/<execution>/` and
//! `<work_dir>/renders/<job_id>/<execution>/`. Two deliveries of the same
//! job therefore never share files. The guard removes both directories when
//! the execution finishes and, failing that, when it is dropped. The
//! `<job_id>` parents go with the last execution that leaves them empty.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use uuid::Uuid;

use vedit_models::Video;
use vedit_storage::sanitize_filename;

use crate::error::WorkerResult;

/// RAII guard over a job's scratch directories.
#[derive(Debug)]
pub struct StagingArea {
    job_id: String,
    downloads_dir: PathBuf,
    renders_dir: PathBuf,
    cleaned: bool,
}

impl StagingArea {
    /// Create fresh scratch directories for one execution of `job_id`.
    pub async fn create(work_dir: impl AsRef<Path>, job_id: &str) -> WorkerResult<Self> {
        let work_dir = work_dir.as_ref();
        let execution = Uuid::new_v4().simple().to_string();
        let downloads_dir = work_dir.join("downloads").join(job_id).join(&execution);
        let renders_dir = work_dir.join("renders").join(job_id).join(&execution);

        tokio::fs::create_dir_all(&downloads_dir).await?;
        tokio::fs::create_dir_all(&renders_dir).await?;

        debug!(
            job_id = %job_id,
            execution = %execution,
            "Created staging area under {}",
            work_dir.display()
        );

        Ok(Self {
            job_id: job_id.to_string(),
            downloads_dir,
            renders_dir,
            cleaned: false,
        })
    }

    /// Local path for a downloaded input: `<videoId>_<filename>`.
    pub fn download_path(&self, video: &Video) -> PathBuf {
        self.downloads_dir
            .join(format!("{}_{}", video.id, sanitize_filename(&video.filename)))
    }

    /// Local path for a produced file.
    pub fn output_path(&self, filename: &str) -> PathBuf {
        self.renders_dir.join(sanitize_filename(filename))
    }

    pub fn downloads_dir(&self) -> &Path {
        &self.downloads_dir
    }

    pub fn renders_dir(&self) -> &Path {
        &self.renders_dir
    }

    /// Remove the scratch directories.
    pub async fn cleanup(mut self) {
        self.cleaned = true;
        for dir in [&self.downloads_dir, &self.renders_dir] {
            match tokio::fs::remove_dir_all(dir).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(
                    job_id = %self.job_id,
                    "Failed to remove {}: {}",
                    dir.display(),
                    e
                ),
            }
            // Fails while a sibling execution still has files there.
            if let Some(parent) = dir.parent() {
                let _ = tokio::fs::remove_dir(parent).await;
            }
        }
        debug!(job_id = %self.job_id, "Staging area cleaned up");
    }
}

impl Drop for StagingArea {
    fn drop(&mut self) {
        if self.cleaned {
            return;
        }
        // Reached on cancellation (job timeout) or panic.
        warn!(
            job_id = %self.job_id,
            "StagingArea dropped without cleanup(), removing synchronously"
        );
        for dir in [&self.downloads_dir, &self.renders_dir] {
            if let Err(e) = std::fs::remove_dir_all(dir) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!("Failed to remove {}: {}", dir.display(), e);
                }
            }
            if let Some(parent) = dir.parent() {
                let _ = std::fs::remove_dir(parent);
            }
        }
    }
}
