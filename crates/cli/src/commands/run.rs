use anyhow::Result;
use vault_keeper::register_jobs;
use vault_keeper_core::AppConfig;
use vault_keeper_scheduler::JobScheduler;
use vault_keeper_web_api::ApiServer;

use crate::services::Services;

/// Runs the five keeper jobs and the web API until Ctrl+C.
pub async fn run_keeper(config: AppConfig, paper: bool) -> Result<()> {
    tracing::info!(paper, "Starting vault keeper");
    let services = Services::from_config(&config, paper).await?;

    let mut scheduler = JobScheduler::new(services.store.clone(), config.scheduler.job_timeout());
    register_jobs(&mut scheduler, &services.ctx, &config.scheduler)?;
    scheduler.start().await?;

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let server = ApiServer::new(services.api_state());
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let api = tokio::spawn(async move {
        let shutdown = async {
            let _ = stop_rx.await;
        };
        if let Err(e) = server.serve_until(&addr, shutdown).await {
            tracing::error!(error = %e, "Web API stopped");
        }
    });

    tokio::signal::ctrl_c().await?;
    tracing::info!("Received Ctrl+C, shutting down");

    let _ = stop_tx.send(());
    if let Err(e) = scheduler.shutdown().await {
        tracing::error!(error = %e, "Error during scheduler shutdown");
    }
    if let Err(e) = api.await {
        tracing::error!(error = %e, "Web API task failed");
    }

    tracing::info!("Vault keeper stopped");
    Ok(())
}
