use anyhow::{ensure, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub ledger: LedgerConfig,
    pub market_data: MarketDataConfig,
    pub scheduler: SchedulerConfig,
    pub strategy: StrategyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgresql://localhost/vault_keeper".to_string(),
            max_connections: 10,
        }
    }
}

/// A vault whose funds are controlled by a wallet other than the keeper's
/// default wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultWalletConfig {
    /// Vault address in either raw or user-friendly form.
    pub vault: String,
    /// Environment variable holding the controlling wallet's private key.
    pub key_env: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub api_url: String,
    pub requests_per_second: u32,
    /// Native units attached to every keeper message to pay for execution.
    pub message_value: u64,
    pub keeper_key_env: String,
    pub vault_wallets: Vec<VaultWalletConfig>,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8081/api/v1".to_string(),
            requests_per_second: 10,
            message_value: 50_000_000,
            keeper_key_env: "KEEPER_PRIVATE_KEY".to_string(),
            vault_wallets: Vec::new(),
        }
    }
}

/// Quote served by the in-memory feed when running in paper mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaperQuoteConfig {
    pub pair_id: String,
    pub spot_price: Decimal,
    pub perp_price: Decimal,
    pub funding_rate: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketDataConfig {
    pub api_url: String,
    pub requests_per_second: u32,
    pub paper_quotes: Vec<PaperQuoteConfig>,
}

impl Default for MarketDataConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8082/api/v1".to_string(),
            requests_per_second: 20,
            paper_quotes: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub entry_interval_secs: u64,
    pub valuation_interval_secs: u64,
    pub drift_interval_secs: u64,
    pub safety_interval_secs: u64,
    pub strategy_interval_secs: u64,
    /// Bound on each feed or ledger call.
    pub call_timeout_secs: u64,
    /// Bound on a whole handler invocation.
    pub job_timeout_secs: u64,
    /// Positions processed in parallel per invocation.
    pub max_concurrency: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            entry_interval_secs: 30,
            valuation_interval_secs: 60,
            drift_interval_secs: 120,
            safety_interval_secs: 60,
            strategy_interval_secs: 180,
            call_timeout_secs: 10,
            job_timeout_secs: 50,
            max_concurrency: 8,
        }
    }
}

impl SchedulerConfig {
    #[must_use]
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    #[must_use]
    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }

    #[must_use]
    pub fn valuation_interval(&self) -> Duration {
        Duration::from_secs(self.valuation_interval_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    /// Derivative notional per unit of spot notional.
    pub target_hedge_ratio: Decimal,
    /// Share of principal the floor guarantees.
    pub principal_retained_fraction: Decimal,
    pub drift_threshold: Decimal,
    pub rebalance_cooldown_secs: u64,
    /// Slack below the floor before the safety guard fires.
    pub floor_tolerance: Decimal,
    pub ema_half_life_hours: u64,
    /// Per-pass smoothing factor; derived from the half-life when unset.
    pub ema_alpha: Option<Decimal>,
    /// Funding EMA below this moves active positions to stasis.
    pub stasis_enter_rate: Decimal,
    /// Funding EMA at or above this lets stasis positions resume.
    pub stasis_resume_rate: Decimal,
    pub auto_forced_exit: bool,
    pub entry_fee_rate: Decimal,
    pub default_strategy_id: i32,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            target_hedge_ratio: Decimal::ONE,
            principal_retained_fraction: Decimal::new(95, 2),
            drift_threshold: Decimal::new(10, 2),
            rebalance_cooldown_secs: 600,
            floor_tolerance: Decimal::new(5, 2),
            ema_half_life_hours: 24,
            ema_alpha: None,
            stasis_enter_rate: Decimal::new(-1, 4),
            stasis_resume_rate: Decimal::new(5, 5),
            auto_forced_exit: true,
            entry_fee_rate: Decimal::new(5, 4),
            default_strategy_id: 1,
        }
    }
}

impl StrategyConfig {
    #[must_use]
    pub fn rebalance_cooldown(&self) -> Duration {
        Duration::from_secs(self.rebalance_cooldown_secs)
    }

    #[must_use]
    pub fn ema_half_life(&self) -> Duration {
        Duration::from_secs(self.ema_half_life_hours * 3600)
    }
}

impl AppConfig {
    /// Rejects settings the keeper cannot run with.
    ///
    /// # Errors
    /// Returns an error naming the first invalid setting.
    pub fn validate(&self) -> Result<()> {
        let s = &self.scheduler;
        for (name, secs) in [
            ("entry_interval_secs", s.entry_interval_secs),
            ("valuation_interval_secs", s.valuation_interval_secs),
            ("drift_interval_secs", s.drift_interval_secs),
            ("safety_interval_secs", s.safety_interval_secs),
            ("strategy_interval_secs", s.strategy_interval_secs),
            ("call_timeout_secs", s.call_timeout_secs),
            ("job_timeout_secs", s.job_timeout_secs),
        ] {
            ensure!(secs > 0, "scheduler.{name} must be positive");
        }
        ensure!(s.max_concurrency > 0, "scheduler.max_concurrency must be positive");

        let st = &self.strategy;
        ensure!(
            st.target_hedge_ratio > Decimal::ZERO,
            "strategy.target_hedge_ratio must be positive"
        );
        ensure!(
            st.principal_retained_fraction > Decimal::ZERO
                && st.principal_retained_fraction <= Decimal::ONE,
            "strategy.principal_retained_fraction must be in (0, 1]"
        );
        ensure!(
            st.drift_threshold > Decimal::ZERO && st.drift_threshold <= Decimal::ONE,
            "strategy.drift_threshold must be in (0, 1]"
        );
        ensure!(
            st.floor_tolerance >= Decimal::ZERO && st.floor_tolerance < Decimal::ONE,
            "strategy.floor_tolerance must be in [0, 1)"
        );
        ensure!(
            st.stasis_enter_rate < st.stasis_resume_rate,
            "strategy.stasis_enter_rate must be below strategy.stasis_resume_rate"
        );
        ensure!(
            st.ema_half_life_hours > 0,
            "strategy.ema_half_life_hours must be positive"
        );
        if let Some(alpha) = st.ema_alpha {
            ensure!(
                alpha > Decimal::ZERO && alpha <= Decimal::ONE,
                "strategy.ema_alpha must be in (0, 1]"
            );
        }
        ensure!(
            st.entry_fee_rate >= Decimal::ZERO && st.entry_fee_rate < Decimal::ONE,
            "strategy.entry_fee_rate must be in [0, 1)"
        );

        ensure!(
            self.ledger.requests_per_second > 0,
            "ledger.requests_per_second must be positive"
        );
        ensure!(
            self.market_data.requests_per_second > 0,
            "market_data.requests_per_second must be positive"
        );
        Ok(())
    }
}
