use crate::address::VaultAddress;
use crate::error::{FeedError, LedgerError};
use crate::market::{Quote, SignedMessage, SubmitReceipt};
use crate::position::{NewPosition, Position, PositionFilter, PositionPatch, VaultLegs};
use crate::records::{
    AuditFilter, AuditLogEntry, JobRunRecord, LevelCount, PnlSummary, TransactionRecord,
    WorkerHealth,
};
use crate::status::PositionStatus;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use uuid::Uuid;

/// Durable records the keeper reads and writes.
///
/// Every write touches a single position. Status changes are conditional on
/// the status the writer last read, so two overlapping invocations cannot
/// both apply the same transition.
#[async_trait]
pub trait KeeperStore: Send + Sync {
    /// Inserts a `pending_entry` row for a user deposit.
    async fn create_position(&self, new: NewPosition) -> Result<Position>;

    async fn get_position(&self, id: Uuid) -> Result<Option<Position>>;

    async fn find_positions(&self, filter: &PositionFilter) -> Result<Vec<Position>>;

    /// Applies `patch` only if the row is still in `expected_status`.
    ///
    /// Returns `None` when the guard did not match, meaning another writer
    /// got there first.
    async fn update_position(
        &self,
        id: Uuid,
        expected_status: PositionStatus,
        patch: &PositionPatch,
    ) -> Result<Option<Position>>;

    /// Guarded update that also appends `transactions` and `audit` in the
    /// same write. Either all rows land or none do; a missed guard writes
    /// nothing and returns `None`.
    async fn transition_position(
        &self,
        id: Uuid,
        expected_status: PositionStatus,
        patch: &PositionPatch,
        transactions: &[TransactionRecord],
        audit: &AuditLogEntry,
    ) -> Result<Option<Position>>;

    /// Stamps `last_rebalance_at = now` if the position is active and its
    /// last attempt is older than `cooldown`. Returns false if the claim was
    /// not granted.
    async fn claim_rebalance(&self, id: Uuid, now: DateTime<Utc>, cooldown: Duration)
        -> Result<bool>;

    /// Restores `previous` if the row still carries the claim stamped at
    /// `claimed_at`.
    async fn release_rebalance_claim(
        &self,
        id: Uuid,
        claimed_at: DateTime<Utc>,
        previous: Option<DateTime<Utc>>,
    ) -> Result<()>;

    async fn append_audit_log(&self, entry: &AuditLogEntry) -> Result<()>;

    async fn append_transaction(&self, tx: &TransactionRecord) -> Result<()>;

    async fn record_job_run(&self, run: &JobRunRecord) -> Result<()>;
}

/// Read-only aggregation consumed by the health surface.
#[async_trait]
pub trait ReportStore: Send + Sync {
    async fn worker_health(&self, since: DateTime<Utc>) -> Result<Vec<WorkerHealth>>;

    /// Newest first.
    async fn query_audit_logs(&self, filter: &AuditFilter) -> Result<Vec<AuditLogEntry>>;

    async fn error_counts(&self, since: DateTime<Utc>) -> Result<Vec<LevelCount>>;

    async fn list_transactions(&self, position_id: Uuid) -> Result<Vec<TransactionRecord>>;

    async fn pnl_summary(&self, position_id: Uuid) -> Result<PnlSummary> {
        let txs = self.list_transactions(position_id).await?;
        Ok(PnlSummary::from_transactions(position_id, &txs))
    }
}

#[async_trait]
pub trait MarketDataFeed: Send + Sync {
    async fn get_quote(&self, pair_id: &str) -> Result<Quote, FeedError>;
}

/// Settlement network access for one or more controlling wallets.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    async fn get_sequence_number(&self, wallet: &str) -> Result<u64, LedgerError>;

    /// Submits a signed message from `wallet`, attaching `value` native
    /// units. Returns once the network has accepted it.
    async fn submit_signed_message(
        &self,
        wallet: &str,
        message: &SignedMessage,
        value: u64,
    ) -> Result<SubmitReceipt, LedgerError>;

    /// Leg holdings as observed on-ledger. Implementations that cannot read
    /// vault state return `None` and the keeper keeps its own record.
    async fn get_vault_legs(&self, _vault: &VaultAddress) -> Result<Option<VaultLegs>, LedgerError> {
        Ok(None)
    }
}
