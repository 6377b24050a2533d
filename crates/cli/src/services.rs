//! Process-wide dependencies, built once at startup.

use anyhow::{Context, Result};
use std::sync::Arc;
use vault_keeper::KeeperContext;
use vault_keeper_core::{AppConfig, KeeperStore, LedgerClient, MarketDataFeed, ReportStore};
use vault_keeper_data::{MemoryStore, PgStore};
use vault_keeper_ledger::wallet::create_wallet_from_private_key;
use vault_keeper_ledger::{
    ApiClient, HttpLedgerClient, HttpMarketFeed, PaperLedger, StaticMarketFeed,
    VaultRebalanceGateway, WalletRegistry, PAPER_KEEPER_KEY,
};
use vault_keeper_web_api::AppState;

pub struct Services {
    pub store: Arc<dyn KeeperStore>,
    pub reports: Arc<dyn ReportStore>,
    pub gateway: Arc<VaultRebalanceGateway>,
    pub ctx: Arc<KeeperContext>,
}

impl Services {
    /// Postgres, the HTTP market feed and the HTTP ledger.
    pub async fn live(config: &AppConfig) -> Result<Self> {
        let store = Arc::new(
            PgStore::connect(&config.database.url, config.database.max_connections)
                .await
                .context("Failed to connect to database")?,
        );

        let call_timeout = config.scheduler.call_timeout();
        let feed = HttpMarketFeed::new(ApiClient::new(
            &config.market_data.api_url,
            config.market_data.requests_per_second,
            call_timeout,
        )?);
        let ledger = HttpLedgerClient::new(ApiClient::new(
            &config.ledger.api_url,
            config.ledger.requests_per_second,
            call_timeout,
        )?);
        let wallets = WalletRegistry::from_config(&config.ledger)?;

        Ok(Self::assemble(
            store.clone(),
            store,
            Arc::new(feed),
            Arc::new(ledger),
            wallets,
            config,
        ))
    }

    /// In-memory store, configured static quotes and a simulated ledger.
    pub fn paper(config: &AppConfig) -> Result<Self> {
        tracing::warn!("Paper mode: no network or database, state is lost on exit");
        let store = Arc::new(MemoryStore::new());
        let feed = Arc::new(StaticMarketFeed::from_config(&config.market_data.paper_quotes));
        let wallet = create_wallet_from_private_key(PAPER_KEEPER_KEY)?;

        Ok(Self::assemble(
            store.clone(),
            store,
            feed,
            Arc::new(PaperLedger::new()),
            WalletRegistry::new(Some(wallet)),
            config,
        ))
    }

    pub async fn from_config(config: &AppConfig, paper: bool) -> Result<Self> {
        if paper {
            Self::paper(config)
        } else {
            Self::live(config).await
        }
    }

    fn assemble(
        store: Arc<dyn KeeperStore>,
        reports: Arc<dyn ReportStore>,
        feed: Arc<dyn MarketDataFeed>,
        ledger: Arc<dyn LedgerClient>,
        wallets: WalletRegistry,
        config: &AppConfig,
    ) -> Self {
        let gateway = Arc::new(VaultRebalanceGateway::new(
            Arc::clone(&ledger),
            wallets,
            config.ledger.message_value,
            config.scheduler.call_timeout(),
        ));
        let ctx = Arc::new(KeeperContext::new(
            Arc::clone(&store),
            feed,
            ledger,
            Arc::clone(&gateway),
            config,
        ));
        Self {
            store,
            reports,
            gateway,
            ctx,
        }
    }

    pub fn api_state(&self) -> AppState {
        AppState::new(
            Arc::clone(&self.store),
            Arc::clone(&self.reports),
            Arc::clone(&self.gateway),
        )
    }
}
