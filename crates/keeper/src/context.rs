//! Dependencies shared by every processor.

use anyhow::Result;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use vault_keeper_core::math::ema_alpha;
use vault_keeper_core::{
    AppConfig, AuditLevel, AuditLogEntry, FeedError, KeeperStore, LedgerClient, LedgerError,
    MarketDataFeed, Position, PositionFilter, PositionPatch, PositionStatus, Quote, StrategyConfig,
    TransactionRecord, VaultLegs,
};
use vault_keeper_ledger::VaultRebalanceGateway;

/// Constructed once at startup and handed to each processor.
pub struct KeeperContext {
    pub store: Arc<dyn KeeperStore>,
    pub feed: Arc<dyn MarketDataFeed>,
    pub ledger: Arc<dyn LedgerClient>,
    pub gateway: Arc<VaultRebalanceGateway>,
    pub strategy: StrategyConfig,
    /// Per-valuation-pass EMA smoothing factor.
    pub ema_alpha: Decimal,
    pub call_timeout: Duration,
    pub max_concurrency: usize,
}

impl KeeperContext {
    #[must_use]
    pub fn new(
        store: Arc<dyn KeeperStore>,
        feed: Arc<dyn MarketDataFeed>,
        ledger: Arc<dyn LedgerClient>,
        gateway: Arc<VaultRebalanceGateway>,
        config: &AppConfig,
    ) -> Self {
        let strategy = config.strategy.clone();
        let alpha = strategy.ema_alpha.unwrap_or_else(|| {
            ema_alpha(strategy.ema_half_life(), config.scheduler.valuation_interval())
        });
        info!(
            ema_alpha = %alpha,
            drift_threshold = %strategy.drift_threshold,
            floor_tolerance = %strategy.floor_tolerance,
            "Keeper context ready"
        );

        Self {
            store,
            feed,
            ledger,
            gateway,
            strategy,
            ema_alpha: alpha,
            call_timeout: config.scheduler.call_timeout(),
            max_concurrency: config.scheduler.max_concurrency.max(1),
        }
    }

    pub async fn candidates(&self, statuses: &[PositionStatus]) -> Result<Vec<Position>> {
        self.store
            .find_positions(&PositionFilter::with_status(statuses))
            .await
    }

    /// Fetches a quote under the call timeout.
    ///
    /// # Errors
    /// Returns [`FeedError::Timeout`] if the feed does not answer in time.
    pub async fn quote(&self, pair_id: &str) -> Result<Quote, FeedError> {
        tokio::time::timeout(self.call_timeout, self.feed.get_quote(pair_id))
            .await
            .map_err(|_| FeedError::Timeout(self.call_timeout))?
    }

    /// Quote for a position, or `None` after auditing a data error. Feed
    /// outages are returned as errors so the position counts as failed.
    pub async fn quote_for(&self, component: &str, position: &Position) -> Result<Option<Quote>> {
        match self.quote(&position.pair_id).await {
            Ok(quote) => Ok(Some(quote)),
            Err(e) if e.is_data_error() => {
                let action = match e {
                    FeedError::MissingQuote(_) => "QUOTE_MISSING",
                    _ => "QUOTE_MALFORMED",
                };
                self.audit(
                    AuditLogEntry::warn(component, action)
                        .for_position(position)
                        .with_detail(serde_json::json!({ "error": e.to_string() })),
                )
                .await?;
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Leg holdings reported by the ledger, if it reports any.
    ///
    /// # Errors
    /// Returns [`LedgerError::Timeout`] if the ledger does not answer in time.
    pub async fn vault_legs(&self, position: &Position) -> Result<Option<VaultLegs>, LedgerError> {
        tokio::time::timeout(
            self.call_timeout,
            self.ledger.get_vault_legs(&position.vault_address),
        )
        .await
        .map_err(|_| LedgerError::Timeout(self.call_timeout))?
    }

    /// Appends an audit row and mirrors it to the operational log.
    pub async fn audit(&self, entry: AuditLogEntry) -> Result<()> {
        self.store.append_audit_log(&entry).await?;
        trace_audit(&entry);
        Ok(())
    }

    /// Applies a guarded status change together with its transaction and
    /// audit rows. Returns `None` if another writer moved the row first.
    pub async fn commit(
        &self,
        position: &Position,
        patch: &PositionPatch,
        transactions: &[TransactionRecord],
        audit: AuditLogEntry,
    ) -> Result<Option<Position>> {
        let updated = self
            .store
            .transition_position(position.id, position.status, patch, transactions, &audit)
            .await?;
        if updated.is_some() {
            trace_audit(&audit);
        }
        Ok(updated)
    }
}

fn trace_audit(entry: &AuditLogEntry) {
    let position_id = entry.position_id.map(|id| id.to_string()).unwrap_or_default();
    match entry.level {
        AuditLevel::Info => info!(
            component = %entry.component,
            action = %entry.action,
            position_id = %position_id,
            detail = %entry.detail,
            "audit"
        ),
        AuditLevel::Warn => warn!(
            component = %entry.component,
            action = %entry.action,
            position_id = %position_id,
            detail = %entry.detail,
            "audit"
        ),
        AuditLevel::Error | AuditLevel::Panic => error!(
            component = %entry.component,
            action = %entry.action,
            position_id = %position_id,
            detail = %entry.detail,
            "audit"
        ),
    }
}
