use crate::config::AppConfig;
use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Json, Toml},
    Figment,
};
use std::path::Path;

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads configuration by merging TOML, environment variables, and JSON.
    ///
    /// Environment variables use the `APP_` prefix with `__` between nested
    /// keys, e.g. `APP_STRATEGY__DRIFT_THRESHOLD=0.2`.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration files cannot be parsed or the
    /// merged configuration is invalid.
    pub fn load() -> Result<AppConfig> {
        Self::finish(Self::base())
    }

    /// Loads configuration with `config/Config.{profile}.toml` layered over
    /// the base file.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration files cannot be parsed or the
    /// merged configuration is invalid.
    pub fn load_with_profile(profile: &str) -> Result<AppConfig> {
        let figment = Figment::new()
            .merge(Toml::file("config/Config.toml"))
            .merge(Toml::file(format!("config/Config.{profile}.toml")))
            .merge(Self::env())
            .join(Json::file("config/Config.json"));
        Self::finish(figment)
    }

    /// Loads configuration from an explicit TOML file plus the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the file does not exist, cannot be parsed, or the
    /// merged configuration is invalid.
    pub fn load_from(path: impl AsRef<Path>) -> Result<AppConfig> {
        let path = path.as_ref();
        anyhow::ensure!(path.exists(), "config file not found: {}", path.display());
        let figment = Figment::new()
            .merge(Toml::file(path))
            .merge(Self::env());
        Self::finish(figment)
    }

    fn base() -> Figment {
        Figment::new()
            .merge(Toml::file("config/Config.toml"))
            .merge(Self::env())
            .join(Json::file("config/Config.json"))
    }

    fn env() -> Env {
        Env::prefixed("APP_").split("__")
    }

    fn finish(figment: Figment) -> Result<AppConfig> {
        let config: AppConfig = figment.extract().context("failed to load configuration")?;
        config.validate()?;
        tracing::debug!(
            ledger = %config.ledger.api_url,
            vault_wallets = config.ledger.vault_wallets.len(),
            "configuration loaded"
        );
        Ok(config)
    }
}
