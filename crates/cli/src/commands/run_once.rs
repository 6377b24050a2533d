use anyhow::{bail, Result};
use vault_keeper::{handler_for, JOB_NAMES};
use vault_keeper_core::AppConfig;
use vault_keeper_scheduler::JobScheduler;

use crate::services::Services;

/// Runs one job through the scheduler so the run is recorded like a
/// scheduled one.
pub async fn run_job_once(config: AppConfig, job: &str, paper: bool) -> Result<()> {
    let services = Services::from_config(&config, paper).await?;
    let Some(handler) = handler_for(job, &services.ctx) else {
        bail!("unknown job '{job}', expected one of: {}", JOB_NAMES.join(", "));
    };

    let mut scheduler = JobScheduler::new(services.store.clone(), config.scheduler.job_timeout());
    scheduler.schedule(job, std::time::Duration::from_secs(1), handler)?;
    let run = scheduler.run_now(job).await?;

    println!("{}", serde_json::to_string_pretty(&run)?);
    if let Some(error) = run.error {
        bail!("job '{job}' failed: {error}");
    }
    Ok(())
}
