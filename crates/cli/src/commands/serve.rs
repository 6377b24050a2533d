use anyhow::Result;
use vault_keeper_core::AppConfig;
use vault_keeper_web_api::ApiServer;

use crate::services::Services;

/// Serves the health and reporting API over the configured database
/// without running any keeper job.
pub async fn run_server(config: AppConfig, addr: Option<String>) -> Result<()> {
    let services = Services::live(&config).await?;
    let addr = addr.unwrap_or_else(|| format!("{}:{}", config.server.host, config.server.port));
    ApiServer::new(services.api_state()).serve(&addr).await
}
