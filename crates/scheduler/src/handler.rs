use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;

/// Outcome counts of one handler invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct JobReport {
    /// Candidate rows examined.
    pub processed: usize,
    /// Rows whose status or derived state was written.
    pub transitioned: usize,
    /// Rows left alone this pass (guard lost, below threshold, missing quote).
    pub skipped: usize,
    /// Rows whose processing failed.
    pub failed: usize,
}

impl JobReport {
    pub fn merge(&mut self, other: Self) {
        self.processed += other.processed;
        self.transitioned += other.transitioned;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }
}

impl fmt::Display for JobReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "processed={} transitioned={} skipped={} failed={}",
            self.processed, self.transitioned, self.skipped, self.failed
        )
    }
}

/// Body of a recurring task.
///
/// Invocations of the same handler may overlap: a slow run can still be in
/// progress when the next slot fires. Implementations must be reentrant,
/// which the keeper's processors achieve by filtering on row status and
/// writing with status-guarded updates.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn run(&self) -> Result<JobReport>;
}
