//! Progress reporting for stage runs and bulk campaign work.

use serde::Serialize;

/// Running tally of a bulk operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BulkProgress {
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub total: usize,
    pub cancelled: bool,
}

impl BulkProgress {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            ..Default::default()
        }
    }

    /// Items finished in any way.
    pub fn processed(&self) -> usize {
        self.completed + self.failed + self.skipped
    }
}

/// Progress callback for long-running operations.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase (e.g. a stage name).
    fn phase(&self, name: &str);
    /// Called after each item of a bulk operation.
    fn advance(&self, progress: &BulkProgress, detail: &str);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn advance(&self, _progress: &BulkProgress, _detail: &str) {}
}
