//! Worker metrics.

use metrics::{counter, gauge, histogram};

/// Metric names as constants for consistency.
pub mod names {
    pub const JOBS_TOTAL: &str = "vedit_render_jobs_total";
    pub const JOB_DURATION_SECONDS: &str = "vedit_render_duration_seconds";
    pub const JOBS_IN_FLIGHT: &str = "vedit_render_jobs_in_flight";
    pub const CLAIMED_TOTAL: &str = "vedit_render_jobs_claimed_total";
}

/// Final disposition of one delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    Retried,
    DeadLettered,
}

impl JobOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobOutcome::Completed => "completed",
            JobOutcome::Retried => "retried",
            JobOutcome::DeadLettered => "dead_lettered",
        }
    }
}

/// Record a finished delivery.
pub fn record_job(outcome: JobOutcome, duration_secs: f64) {
    counter!(names::JOBS_TOTAL, "outcome" => outcome.as_str()).increment(1);
    histogram!(names::JOB_DURATION_SECONDS, "outcome" => outcome.as_str()).record(duration_secs);
}

pub fn set_in_flight(count: usize) {
    gauge!(names::JOBS_IN_FLIGHT).set(count as f64);
}

pub fn record_claimed(count: usize) {
    counter!(names::CLAIMED_TOTAL).increment(count as u64);
}
