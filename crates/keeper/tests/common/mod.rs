#![allow(dead_code)]

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;
use vault_keeper::KeeperContext;
use vault_keeper_core::{
    AppConfig, AuditLogEntry, JobRunRecord, KeeperStore, LedgerClient, LedgerError, NewPosition,
    Position, PositionFilter, PositionPatch, PositionStatus, SignedMessage, SubmitReceipt,
    TransactionRecord, VaultAddress, VaultLegs,
};
use vault_keeper_data::MemoryStore;
use vault_keeper_ledger::wallet::create_wallet_from_private_key;
use vault_keeper_ledger::{
    PaperLedger, StaticMarketFeed, VaultRebalanceGateway, WalletRegistry, PAPER_KEEPER_KEY,
};

pub const PAIR: &str = "TON-USDT";

/// In-memory keeper wired like paper mode.
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub feed: Arc<StaticMarketFeed>,
    pub ledger: Arc<PaperLedger>,
    pub gateway: Arc<VaultRebalanceGateway>,
    pub ctx: Arc<KeeperContext>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(AppConfig::default())
    }

    pub fn with_config(config: AppConfig) -> Self {
        Self::with_parts(
            config,
            |store| store as Arc<dyn KeeperStore>,
            |ledger| ledger as Arc<dyn LedgerClient>,
        )
    }

    /// Lets a test put a wrapper in front of the store or the ledger the
    /// processors see. `store` and `ledger` stay the inner fakes.
    pub fn with_parts(
        config: AppConfig,
        wrap_store: impl FnOnce(Arc<MemoryStore>) -> Arc<dyn KeeperStore>,
        wrap_ledger: impl FnOnce(Arc<PaperLedger>) -> Arc<dyn LedgerClient>,
    ) -> Self {
        let store = Arc::new(MemoryStore::new());
        let feed = Arc::new(StaticMarketFeed::new());
        feed.set_quote(PAIR, dec!(2.5), dec!(2.5), dec!(0.0001));
        let ledger = Arc::new(PaperLedger::new());
        let seen_ledger = wrap_ledger(ledger.clone());

        let wallet = create_wallet_from_private_key(PAPER_KEEPER_KEY).unwrap();
        let gateway = Arc::new(VaultRebalanceGateway::new(
            seen_ledger.clone(),
            WalletRegistry::new(Some(wallet)),
            1_000,
            Duration::from_secs(1),
        ));
        let ctx = Arc::new(KeeperContext::new(
            wrap_store(store.clone()),
            feed.clone(),
            seen_ledger,
            gateway.clone(),
            &config,
        ));

        Self {
            store,
            feed,
            ledger,
            gateway,
            ctx,
        }
    }

    /// Inserts a live position holding the given leg values.
    pub async fn live_position(
        &self,
        vault_byte: u8,
        status: PositionStatus,
        spot_value: Decimal,
        perp_value: Decimal,
        principal_floor: Decimal,
    ) -> Position {
        let mut position = NewPosition {
            user_id: format!("user-{vault_byte}"),
            pair_id: PAIR.to_string(),
            vault_address: vault(vault_byte),
            strategy_id: 1,
            principal: principal_floor,
        }
        .into_position(Utc::now());
        position.status = status;
        position.spot_value = spot_value;
        position.perp_value = perp_value;
        position.principal_floor = principal_floor;
        self.store.insert_position(position.clone()).await;
        position
    }

    pub async fn deposit(&self, vault_byte: u8, principal: Decimal) -> Position {
        self.store
            .create_position(NewPosition {
                user_id: format!("user-{vault_byte}"),
                pair_id: PAIR.to_string(),
                vault_address: vault(vault_byte),
                strategy_id: 1,
                principal,
            })
            .await
            .unwrap()
    }

    pub async fn position(&self, id: uuid::Uuid) -> Position {
        self.store.get_position(id).await.unwrap().unwrap()
    }

    pub async fn audits(&self, action: &str) -> Vec<AuditLogEntry> {
        self.store
            .audit_logs()
            .await
            .into_iter()
            .filter(|e| e.action == action)
            .collect()
    }
}

pub fn vault(byte: u8) -> VaultAddress {
    VaultAddress::new(0, [byte; 32])
}

/// Accepts every message, then stalls past the gateway's call timeout.
pub struct SlowAcceptLedger {
    pub inner: Arc<PaperLedger>,
    pub stall: Duration,
}

#[async_trait]
impl LedgerClient for SlowAcceptLedger {
    async fn get_sequence_number(&self, wallet: &str) -> Result<u64, LedgerError> {
        self.inner.get_sequence_number(wallet).await
    }

    async fn submit_signed_message(
        &self,
        wallet: &str,
        message: &SignedMessage,
        value: u64,
    ) -> Result<SubmitReceipt, LedgerError> {
        let receipt = self.inner.submit_signed_message(wallet, message, value).await;
        tokio::time::sleep(self.stall).await;
        receipt
    }

    async fn get_vault_legs(&self, vault: &VaultAddress) -> Result<Option<VaultLegs>, LedgerError> {
        self.inner.get_vault_legs(vault).await
    }
}

/// Fails the next `failures` status transitions as a rolled-back database
/// transaction would: nothing from the failed write is kept.
pub struct FailingTransitionStore {
    pub inner: Arc<MemoryStore>,
    pub failures: AtomicUsize,
}

impl FailingTransitionStore {
    pub fn new(inner: Arc<MemoryStore>, failures: usize) -> Self {
        Self {
            inner,
            failures: AtomicUsize::new(failures),
        }
    }
}

#[async_trait]
impl KeeperStore for FailingTransitionStore {
    async fn create_position(&self, new: NewPosition) -> Result<Position> {
        self.inner.create_position(new).await
    }

    async fn get_position(&self, id: Uuid) -> Result<Option<Position>> {
        self.inner.get_position(id).await
    }

    async fn find_positions(&self, filter: &PositionFilter) -> Result<Vec<Position>> {
        self.inner.find_positions(filter).await
    }

    async fn update_position(
        &self,
        id: Uuid,
        expected_status: PositionStatus,
        patch: &PositionPatch,
    ) -> Result<Option<Position>> {
        self.inner.update_position(id, expected_status, patch).await
    }

    async fn transition_position(
        &self,
        id: Uuid,
        expected_status: PositionStatus,
        patch: &PositionPatch,
        transactions: &[TransactionRecord],
        audit: &AuditLogEntry,
    ) -> Result<Option<Position>> {
        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            bail!("connection reset during commit");
        }
        self.inner
            .transition_position(id, expected_status, patch, transactions, audit)
            .await
    }

    async fn claim_rebalance(&self, id: Uuid, now: DateTime<Utc>, cooldown: Duration) -> Result<bool> {
        self.inner.claim_rebalance(id, now, cooldown).await
    }

    async fn release_rebalance_claim(
        &self,
        id: Uuid,
        claimed_at: DateTime<Utc>,
        previous: Option<DateTime<Utc>>,
    ) -> Result<()> {
        self.inner.release_rebalance_claim(id, claimed_at, previous).await
    }

    async fn append_audit_log(&self, entry: &AuditLogEntry) -> Result<()> {
        self.inner.append_audit_log(entry).await
    }

    async fn append_transaction(&self, tx: &TransactionRecord) -> Result<()> {
        self.inner.append_transaction(tx).await
    }

    async fn record_job_run(&self, run: &JobRunRecord) -> Result<()> {
        self.inner.record_job_run(run).await
    }
}
