//! In-memory keeper store for paper mode and tests.
//!
//! Each write holds the lock for the whole read-check-write, which gives the
//! same conditional-update semantics as the `UPDATE ... WHERE status = $2`
//! statements in [`crate::PgStore`].

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;
use vault_keeper_core::{
    AuditFilter, AuditLevel, AuditLogEntry, JobRunRecord, KeeperStore, LevelCount, NewPosition,
    Position, PositionFilter, PositionPatch, PositionStatus, ReportStore, TransactionRecord,
    WorkerHealth,
};

#[derive(Debug, Default)]
struct Tables {
    positions: HashMap<Uuid, Position>,
    transactions: Vec<TransactionRecord>,
    audit_logs: Vec<AuditLogEntry>,
    job_runs: Vec<JobRunRecord>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a position row exactly as given.
    pub async fn insert_position(&self, position: Position) {
        self.tables
            .write()
            .await
            .positions
            .insert(position.id, position);
    }

    /// Audit log in append order.
    pub async fn audit_logs(&self) -> Vec<AuditLogEntry> {
        self.tables.read().await.audit_logs.clone()
    }

    /// Transactions in append order.
    pub async fn transactions(&self) -> Vec<TransactionRecord> {
        self.tables.read().await.transactions.clone()
    }

    /// Job runs in append order.
    pub async fn job_runs(&self) -> Vec<JobRunRecord> {
        self.tables.read().await.job_runs.clone()
    }
}

#[async_trait]
impl KeeperStore for MemoryStore {
    async fn create_position(&self, new: NewPosition) -> Result<Position> {
        let position = new.into_position(Utc::now());
        self.insert_position(position.clone()).await;
        Ok(position)
    }

    async fn get_position(&self, id: Uuid) -> Result<Option<Position>> {
        Ok(self.tables.read().await.positions.get(&id).cloned())
    }

    async fn find_positions(&self, filter: &PositionFilter) -> Result<Vec<Position>> {
        let tables = self.tables.read().await;
        let mut positions: Vec<Position> = tables
            .positions
            .values()
            .filter(|p| filter.matches(p))
            .cloned()
            .collect();
        positions.sort_by_key(|p| p.created_at);
        Ok(positions)
    }

    async fn update_position(
        &self,
        id: Uuid,
        expected_status: PositionStatus,
        patch: &PositionPatch,
    ) -> Result<Option<Position>> {
        patch.check_guard(expected_status)?;

        let mut tables = self.tables.write().await;
        let Some(position) = tables.positions.get_mut(&id) else {
            return Ok(None);
        };
        if position.status != expected_status {
            return Ok(None);
        }
        position.apply(patch, Utc::now());
        Ok(Some(position.clone()))
    }

    async fn transition_position(
        &self,
        id: Uuid,
        expected_status: PositionStatus,
        patch: &PositionPatch,
        transactions: &[TransactionRecord],
        audit: &AuditLogEntry,
    ) -> Result<Option<Position>> {
        patch.check_guard(expected_status)?;

        let mut tables = self.tables.write().await;
        let Some(position) = tables.positions.get_mut(&id) else {
            return Ok(None);
        };
        if position.status != expected_status {
            return Ok(None);
        }
        position.apply(patch, Utc::now());
        let updated = position.clone();
        tables.transactions.extend_from_slice(transactions);
        tables.audit_logs.push(audit.clone());
        Ok(Some(updated))
    }

    async fn claim_rebalance(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
        cooldown: Duration,
    ) -> Result<bool> {
        let cutoff = now - chrono::Duration::from_std(cooldown)?;

        let mut tables = self.tables.write().await;
        let Some(position) = tables.positions.get_mut(&id) else {
            return Ok(false);
        };
        if position.status != PositionStatus::Active {
            return Ok(false);
        }
        if position.last_rebalance_at.is_some_and(|at| at > cutoff) {
            return Ok(false);
        }
        position.last_rebalance_at = Some(now);
        position.updated_at = now;
        Ok(true)
    }

    async fn release_rebalance_claim(
        &self,
        id: Uuid,
        claimed_at: DateTime<Utc>,
        previous: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let mut tables = self.tables.write().await;
        if let Some(position) = tables.positions.get_mut(&id) {
            if position.last_rebalance_at == Some(claimed_at) {
                position.last_rebalance_at = previous;
            }
        }
        Ok(())
    }

    async fn append_audit_log(&self, entry: &AuditLogEntry) -> Result<()> {
        self.tables.write().await.audit_logs.push(entry.clone());
        Ok(())
    }

    async fn append_transaction(&self, tx: &TransactionRecord) -> Result<()> {
        self.tables.write().await.transactions.push(tx.clone());
        Ok(())
    }

    async fn record_job_run(&self, run: &JobRunRecord) -> Result<()> {
        self.tables.write().await.job_runs.push(run.clone());
        Ok(())
    }
}

#[async_trait]
impl ReportStore for MemoryStore {
    async fn worker_health(&self, since: DateTime<Utc>) -> Result<Vec<WorkerHealth>> {
        let tables = self.tables.read().await;
        let recent: Vec<JobRunRecord> = tables
            .job_runs
            .iter()
            .filter(|run| run.start_time >= since)
            .cloned()
            .collect();
        Ok(WorkerHealth::aggregate(&recent))
    }

    async fn query_audit_logs(&self, filter: &AuditFilter) -> Result<Vec<AuditLogEntry>> {
        let tables = self.tables.read().await;
        let limit = usize::try_from(filter.effective_limit()).unwrap_or(usize::MAX);
        let mut entries: Vec<AuditLogEntry> = tables
            .audit_logs
            .iter()
            .filter(|entry| filter.matches(entry))
            .cloned()
            .collect();
        // Stable sort keeps append order among equal timestamps.
        entries.reverse();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        entries.truncate(limit);
        Ok(entries)
    }

    async fn error_counts(&self, since: DateTime<Utc>) -> Result<Vec<LevelCount>> {
        let tables = self.tables.read().await;
        let mut counts: BTreeMap<AuditLevel, i64> = BTreeMap::new();
        for entry in tables
            .audit_logs
            .iter()
            .filter(|e| e.created_at >= since && e.level != AuditLevel::Info)
        {
            *counts.entry(entry.level).or_default() += 1;
        }
        Ok(counts
            .into_iter()
            .map(|(level, count)| LevelCount { level, count })
            .collect())
    }

    async fn list_transactions(&self, position_id: Uuid) -> Result<Vec<TransactionRecord>> {
        let tables = self.tables.read().await;
        Ok(tables
            .transactions
            .iter()
            .filter(|tx| tx.position_id == position_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use vault_keeper_core::{
        JobRunStatus, StatusChange, TransactionKind, TransactionStatus, VaultAddress,
    };

    fn deposit(pair: &str) -> NewPosition {
        NewPosition {
            user_id: "user-1".to_string(),
            pair_id: pair.to_string(),
            vault_address: VaultAddress::new(0, [3u8; 32]),
            strategy_id: 1,
            principal: dec!(1000),
        }
    }

    fn activate() -> PositionPatch {
        PositionPatch::transition(
            StatusChange::new(PositionStatus::PendingEntry, PositionStatus::Active).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_guarded_update_applies_once() {
        let store = MemoryStore::new();
        let position = store.create_position(deposit("TON-USDT")).await.unwrap();

        let first = store
            .update_position(position.id, PositionStatus::PendingEntry, &activate())
            .await
            .unwrap();
        assert_eq!(first.unwrap().status, PositionStatus::Active);

        let second = store
            .update_position(position.id, PositionStatus::PendingEntry, &activate())
            .await
            .unwrap();
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn test_transition_writes_records_only_when_guard_matches() {
        let store = MemoryStore::new();
        let position = store.create_position(deposit("TON-USDT")).await.unwrap();
        let fee = TransactionRecord::new(position.id, TransactionKind::Entry, TransactionStatus::Success);
        let audit = AuditLogEntry::info("EntryProcessor", "ENTRY_ACTIVATED").for_position(&position);

        let first = store
            .transition_position(position.id, PositionStatus::PendingEntry, &activate(), &[fee.clone()], &audit)
            .await
            .unwrap();
        assert_eq!(first.unwrap().status, PositionStatus::Active);

        let second = store
            .transition_position(position.id, PositionStatus::PendingEntry, &activate(), &[fee], &audit)
            .await
            .unwrap();
        assert!(second.is_none());
        assert_eq!(store.transactions().await.len(), 1);
        assert_eq!(store.audit_logs().await.len(), 1);
    }

    #[tokio::test]
    async fn test_update_rejects_patch_inconsistent_with_guard() {
        let store = MemoryStore::new();
        let position = store.create_position(deposit("TON-USDT")).await.unwrap();
        let result = store
            .update_position(position.id, PositionStatus::Active, &activate())
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_find_positions_by_status() {
        let store = MemoryStore::new();
        let pending = store.create_position(deposit("TON-USDT")).await.unwrap();
        let other = store.create_position(deposit("BTC-USDT")).await.unwrap();
        store
            .update_position(other.id, PositionStatus::PendingEntry, &activate())
            .await
            .unwrap();

        let found = store
            .find_positions(&PositionFilter::with_status(&[PositionStatus::PendingEntry]))
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, pending.id);
    }

    #[tokio::test]
    async fn test_rebalance_claim_respects_cooldown() {
        let store = MemoryStore::new();
        let position = store.create_position(deposit("TON-USDT")).await.unwrap();
        let cooldown = Duration::from_secs(600);
        let now = Utc::now();

        // Only active positions can be claimed.
        assert!(!store.claim_rebalance(position.id, now, cooldown).await.unwrap());

        store
            .update_position(position.id, PositionStatus::PendingEntry, &activate())
            .await
            .unwrap();
        assert!(store.claim_rebalance(position.id, now, cooldown).await.unwrap());
        assert!(!store.claim_rebalance(position.id, now, cooldown).await.unwrap());

        let later = now + chrono::Duration::seconds(601);
        assert!(store.claim_rebalance(position.id, later, cooldown).await.unwrap());
    }

    #[tokio::test]
    async fn test_released_claim_can_be_retaken() {
        let store = MemoryStore::new();
        let position = store.create_position(deposit("TON-USDT")).await.unwrap();
        store
            .update_position(position.id, PositionStatus::PendingEntry, &activate())
            .await
            .unwrap();
        let cooldown = Duration::from_secs(600);
        let now = Utc::now();

        assert!(store.claim_rebalance(position.id, now, cooldown).await.unwrap());
        store
            .release_rebalance_claim(position.id, now, None)
            .await
            .unwrap();
        let row = store.get_position(position.id).await.unwrap().unwrap();
        assert_eq!(row.last_rebalance_at, None);
        assert!(store.claim_rebalance(position.id, now, cooldown).await.unwrap());
    }

    #[tokio::test]
    async fn test_reports() {
        let store = MemoryStore::new();
        let position = store.create_position(deposit("TON-USDT")).await.unwrap();
        let since = Utc::now() - chrono::Duration::hours(1);

        store
            .append_audit_log(&AuditLogEntry::info("entry_processor", "ENTRY_ACTIVATED").for_position(&position))
            .await
            .unwrap();
        store
            .append_audit_log(&AuditLogEntry::error("safety_guard", "PANIC_PRINCIPAL_FLOOR_BREACH").for_position(&position))
            .await
            .unwrap();
        store
            .append_audit_log(&AuditLogEntry::warn("entry_processor", "QUOTE_MISSING"))
            .await
            .unwrap();

        let errors = store
            .query_audit_logs(&AuditFilter {
                level: Some(AuditLevel::Error),
                ..AuditFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].action.contains("PANIC"));

        let by_pair = store
            .query_audit_logs(&AuditFilter {
                pair_id: Some("TON-USDT".to_string()),
                ..AuditFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(by_pair.len(), 2);

        let counts = store.error_counts(since).await.unwrap();
        assert_eq!(
            counts,
            vec![
                LevelCount { level: AuditLevel::Warn, count: 1 },
                LevelCount { level: AuditLevel::Error, count: 1 },
            ]
        );

        store
            .append_transaction(
                &TransactionRecord::new(position.id, TransactionKind::Exit, TransactionStatus::Success)
                    .with_pnl(dec!(12.5)),
            )
            .await
            .unwrap();
        let summary = store.pnl_summary(position.id).await.unwrap();
        assert_eq!(summary.realized_pnl, dec!(12.5));

        store
            .record_job_run(&JobRunRecord {
                id: Uuid::new_v4(),
                worker_name: "entry".to_string(),
                slot_key: "entry@0".to_string(),
                status: JobRunStatus::Success,
                start_time: Utc::now(),
                duration_ms: 3,
                processed: 1,
                failed: 0,
                error: None,
            })
            .await
            .unwrap();
        let health = store.worker_health(since).await.unwrap();
        assert_eq!(health.len(), 1);
        assert_eq!(health[0].success_rate, 1.0);
    }
}
