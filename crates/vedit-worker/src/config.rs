//! Worker configuration.

use std::str::FromStr;
use std::time::Duration;

/// Worker settings, read from `WORKER_*` variables.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Renders processed at once by one worker
    pub max_concurrent_jobs: usize,
    /// Parallel input downloads per render; 0 downloads every input at once
    pub max_download_parallel: usize,
    /// Wall-clock limit for one render, also applied to each ffmpeg run
    pub job_timeout: Duration,
    /// How long shutdown waits for in-flight renders
    pub shutdown_timeout: Duration,
    /// Root of per-job scratch directories
    pub work_dir: String,
    /// Period of the idle-delivery scan
    pub claim_interval: Duration,
    /// Idle time after which a delivery is assumed abandoned; see
    /// [`WorkerConfig::reclaim_idle_after`]
    pub claim_min_idle: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 2,
            max_download_parallel: 0,
            job_timeout: Duration::from_secs(60 * 60),
            shutdown_timeout: Duration::from_secs(30),
            work_dir: "/tmp/vedit".to_string(),
            claim_interval: Duration::from_secs(30),
            claim_min_idle: Duration::from_secs(5 * 60),
        }
    }
}

impl WorkerConfig {
    /// Defaults overridden by whichever variables are set and parse.
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            max_concurrent_jobs: parsed::<usize>("WORKER_MAX_JOBS")
                .filter(|n| *n > 0)
                .unwrap_or(d.max_concurrent_jobs),
            max_download_parallel: parsed("WORKER_MAX_DOWNLOAD_PARALLEL")
                .unwrap_or(d.max_download_parallel),
            job_timeout: secs("WORKER_JOB_TIMEOUT").unwrap_or(d.job_timeout),
            shutdown_timeout: secs("WORKER_SHUTDOWN_TIMEOUT").unwrap_or(d.shutdown_timeout),
            work_dir: std::env::var("WORKER_WORK_DIR")
                .ok()
                .filter(|v| !v.is_empty())
                .unwrap_or(d.work_dir),
            claim_interval: secs("WORKER_CLAIM_INTERVAL_SECS").unwrap_or(d.claim_interval),
            claim_min_idle: secs("WORKER_CLAIM_MIN_IDLE_SECS").unwrap_or(d.claim_min_idle),
        }
    }

    /// Idle time the claim scan actually uses.
    ///
    /// Never shorter than a job may legitimately run, so a render still in
    /// progress is not handed to a second consumer.
    pub fn reclaim_idle_after(&self) -> Duration {
        self.claim_min_idle.max(self.job_timeout + self.shutdown_timeout)
    }

    /// Download fan-out for a job with `inputs` downloads.
    pub fn download_limit(&self, inputs: usize) -> usize {
        let limit = match self.max_download_parallel {
            0 => inputs,
            cap => cap.min(inputs),
        };
        limit.max(1)
    }
}

fn parsed<T: FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok()?.trim().parse().ok()
}

fn secs(name: &str) -> Option<Duration> {
    parsed(name).map(Duration::from_secs)
}
