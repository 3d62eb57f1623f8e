//! Render progress accounting.
//!
//! A render execution has one unit per input download plus four fixed
//! units: the post-resolve checkpoint, concatenation, upload and persist.
//! Reported percentages are `floor(completed / total * 100)` and never go
//! down within an execution.

use crate::logging::JobLogger;
use crate::ports::JobHandle;

/// Units that do not depend on the number of inputs.
pub const FIXED_STEPS: u32 = 4;

/// Counts completed units of one execution.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    completed: u32,
    total: u32,
    reported: u8,
}

impl ProgressTracker {
    pub fn new(total: u32) -> Self {
        Self {
            completed: 0,
            total: total.max(1),
            reported: 0,
        }
    }

    /// Tracker for a render over `inputs` downloaded clips.
    pub fn for_inputs(inputs: usize) -> Self {
        Self::new(inputs as u32 + FIXED_STEPS)
    }

    /// Mark one unit done and return the percentage to report.
    pub fn advance(&mut self) -> u8 {
        self.completed = (self.completed + 1).min(self.total);
        let percent = (self.completed * 100 / self.total) as u8;
        self.reported = self.reported.max(percent);
        self.reported
    }

    pub fn percent(&self) -> u8 {
        self.reported
    }

    pub fn total(&self) -> u32 {
        self.total
    }

    pub fn is_complete(&self) -> bool {
        self.completed >= self.total
    }
}

/// Pushes tracker updates to a job handle.
pub struct ProgressReporter<'a> {
    handle: &'a dyn JobHandle,
    logger: &'a JobLogger,
    tracker: Option<ProgressTracker>,
}

impl<'a> ProgressReporter<'a> {
    pub fn new(handle: &'a dyn JobHandle, logger: &'a JobLogger) -> Self {
        Self {
            handle,
            logger,
            tracker: None,
        }
    }

    /// Report 0% at the start of an execution.
    pub async fn reset(&mut self) {
        self.tracker = None;
        self.send(0).await;
    }

    /// Size the tracker once the inputs are known.
    pub fn set_inputs(&mut self, inputs: usize) {
        self.tracker = Some(ProgressTracker::for_inputs(inputs));
    }

    /// Mark one unit done and report the new percentage.
    pub async fn advance(&mut self) -> u8 {
        let percent = match self.tracker.as_mut() {
            Some(tracker) => tracker.advance(),
            None => {
                self.logger.warn("Progress advanced before inputs were resolved");
                return 0;
            }
        };
        self.send(percent).await;
        percent
    }

    pub fn percent(&self) -> u8 {
        self.tracker.as_ref().map(|t| t.percent()).unwrap_or(0)
    }

    async fn send(&self, percent: u8) {
        if let Err(e) = self.handle.update_progress(percent).await {
            self.logger
                .warn(&format!("Failed to report progress {}%: {}", percent, e));
        }
    }
}
