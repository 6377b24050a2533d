//! Fan-out of one job pass over its candidate positions.

use anyhow::{bail, Result};
use futures_util::stream::{self, StreamExt};
use std::future::Future;
use tracing::{debug, warn};
use vault_keeper_core::Position;
use vault_keeper_scheduler::JobReport;

/// What a processor did with one position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// A row was written.
    Updated,
    /// Nothing to do, or another writer got there first.
    Skipped,
}

/// Processes `positions` with at most `concurrency` in flight.
///
/// A failing position never stops its siblings. The pass itself fails only
/// when every position failed, which is what an outage of a shared
/// dependency looks like.
pub async fn process_all<F, Fut>(
    job: &str,
    positions: Vec<Position>,
    concurrency: usize,
    process: F,
) -> Result<JobReport>
where
    F: Fn(Position) -> Fut,
    Fut: Future<Output = Result<Outcome>>,
{
    let mut report = JobReport {
        processed: positions.len(),
        ..JobReport::default()
    };
    if positions.is_empty() {
        return Ok(report);
    }

    let mut results = stream::iter(positions.into_iter().map(|position| {
        let id = position.id;
        let fut = process(position);
        async move { (id, fut.await) }
    }))
    .buffer_unordered(concurrency.max(1));

    while let Some((id, result)) = results.next().await {
        match result {
            Ok(Outcome::Updated) => report.transitioned += 1,
            Ok(Outcome::Skipped) => report.skipped += 1,
            Err(e) => {
                report.failed += 1;
                warn!(job, position_id = %id, error = %format!("{e:#}"), "Position failed");
            }
        }
    }

    debug!(job, %report, "Pass complete");
    if report.failed == report.processed {
        bail!("{job}: all {} positions failed", report.failed);
    }
    Ok(report)
}
