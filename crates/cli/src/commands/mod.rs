pub mod deposit;
pub mod run;
pub mod run_once;
pub mod serve;

use anyhow::Result;
use vault_keeper_core::{AppConfig, ConfigLoader};

/// Explicit file, then profile, then the default layering.
pub fn load_config(path: Option<&str>, profile: Option<&str>) -> Result<AppConfig> {
    let config = match (path, profile) {
        (Some(path), _) => ConfigLoader::load_from(path)?,
        (None, Some(profile)) => ConfigLoader::load_with_profile(profile)?,
        (None, None) => ConfigLoader::load()?,
    };
    tracing::info!(
        database = %config.database.url,
        ledger = %config.ledger.api_url,
        "Configuration loaded"
    );
    Ok(config)
}
