//! Job logging.
//!
//! Every line goes to tracing inside the job span. Milestones and failures
//! are also appended to the job's own log through its [`JobHandle`], which
//! is what a caller polling the job sees.

use tracing::{error, info, warn, Span};

use crate::ports::JobHandle;

#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    kind: &'static str,
}

impl JobLogger {
    pub fn new(job_id: impl Into<String>, kind: &'static str) -> Self {
        Self {
            job_id: job_id.into(),
            kind,
        }
    }

    /// Span that carries `job_id` and `kind` for everything logged in it.
    pub fn span(&self) -> Span {
        tracing::info_span!("job", job_id = %self.job_id, kind = self.kind)
    }

    pub fn started(&self, message: &str) {
        info!("{} started: {}", self.kind, message);
    }

    pub fn warn(&self, message: &str) {
        warn!("{}", message);
    }

    /// Log a milestone and append it to the job log.
    pub async fn milestone(&self, handle: &dyn JobHandle, message: &str) {
        info!("{}", message);
        self.append(handle, message).await;
    }

    /// Log a failure and append it to the job log.
    pub async fn failure(&self, handle: &dyn JobHandle, message: &str) {
        error!("{}", message);
        self.append(handle, message).await;
    }

    // A lost job-log line never fails the job.
    async fn append(&self, handle: &dyn JobHandle, message: &str) {
        if let Err(e) = handle.append_log(message).await {
            self.warn(&format!("Failed to append job log: {}", e));
        }
    }
}
