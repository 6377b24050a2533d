use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use vault_keeper_core::SchedulerConfig;
use vault_keeper_scheduler::{JobHandler, JobReport, JobScheduler};

use crate::context::KeeperContext;
use crate::drift::DriftMonitor;
use crate::entry::EntryProcessor;
use crate::safety::SafetyGuard;
use crate::strategy::StrategyStateMachine;
use crate::valuation::ValuationProcessor;

pub const ENTRY_JOB: &str = "entry";
pub const VALUATION_JOB: &str = "valuation";
pub const DRIFT_JOB: &str = "drift-monitor";
pub const SAFETY_JOB: &str = "safety-check";
pub const STRATEGY_JOB: &str = "strategy";

pub const JOB_NAMES: [&str; 5] = [ENTRY_JOB, VALUATION_JOB, DRIFT_JOB, SAFETY_JOB, STRATEGY_JOB];

macro_rules! job_handler {
    ($($processor:ty),+ $(,)?) => {
        $(
            #[async_trait]
            impl JobHandler for $processor {
                async fn run(&self) -> Result<JobReport> {
                    self.run_pass().await
                }
            }
        )+
    };
}

job_handler!(
    EntryProcessor,
    ValuationProcessor,
    DriftMonitor,
    SafetyGuard,
    StrategyStateMachine,
);

/// Handler for a job name, for one-off runs outside the scheduler.
#[must_use]
pub fn handler_for(name: &str, ctx: &Arc<KeeperContext>) -> Option<Arc<dyn JobHandler>> {
    let ctx = Arc::clone(ctx);
    let handler: Arc<dyn JobHandler> = match name {
        ENTRY_JOB => Arc::new(EntryProcessor::new(ctx)),
        VALUATION_JOB => Arc::new(ValuationProcessor::new(ctx)),
        DRIFT_JOB => Arc::new(DriftMonitor::new(ctx)),
        SAFETY_JOB => Arc::new(SafetyGuard::new(ctx)),
        STRATEGY_JOB => Arc::new(StrategyStateMachine::new(ctx)),
        _ => return None,
    };
    Some(handler)
}

/// Registers the five keeper jobs on their configured intervals.
///
/// # Errors
/// Returns an error if a job cannot be registered.
pub fn register_jobs(
    scheduler: &mut JobScheduler,
    ctx: &Arc<KeeperContext>,
    config: &SchedulerConfig,
) -> Result<()> {
    let intervals = [
        (ENTRY_JOB, config.entry_interval_secs),
        (VALUATION_JOB, config.valuation_interval_secs),
        (DRIFT_JOB, config.drift_interval_secs),
        (SAFETY_JOB, config.safety_interval_secs),
        (STRATEGY_JOB, config.strategy_interval_secs),
    ];
    for (name, secs) in intervals {
        if let Some(handler) = handler_for(name, ctx) {
            scheduler.schedule(name, Duration::from_secs(secs), handler)?;
        }
    }
    Ok(())
}
