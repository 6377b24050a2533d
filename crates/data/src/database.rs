use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;
use uuid::Uuid;
use vault_keeper_core::{
    AuditFilter, AuditLogEntry, JobRunRecord, KeeperStore, LevelCount, NewPosition, Position,
    PositionFilter, PositionPatch, PositionStatus, ReportStore, TransactionRecord, WorkerHealth,
};

use crate::repositories::{
    AuditLogRepository, PositionRepository, Repositories, TransactionRepository,
};

/// `PostgreSQL`-backed keeper store.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
    repos: Repositories,
}

impl PgStore {
    /// Connects to the database and applies pending migrations.
    ///
    /// # Errors
    /// Returns an error if the connection cannot be established or a
    /// migration fails.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect(database_url)
            .await
            .context("failed to connect to database")?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("failed to run migrations")?;
        tracing::info!("database migrations applied");

        Ok(Self::from_pool(pool))
    }

    #[must_use]
    pub fn from_pool(pool: PgPool) -> Self {
        let repos = Repositories::new(pool.clone());
        Self { pool, repos }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl KeeperStore for PgStore {
    async fn create_position(&self, new: NewPosition) -> Result<Position> {
        let position = new.into_position(Utc::now());
        self.repos.positions.insert(&position).await?;
        Ok(position)
    }

    async fn get_position(&self, id: Uuid) -> Result<Option<Position>> {
        self.repos.positions.get(id).await
    }

    async fn find_positions(&self, filter: &PositionFilter) -> Result<Vec<Position>> {
        self.repos.positions.find(filter).await
    }

    async fn update_position(
        &self,
        id: Uuid,
        expected_status: PositionStatus,
        patch: &PositionPatch,
    ) -> Result<Option<Position>> {
        self.repos
            .positions
            .update_guarded(id, expected_status, patch)
            .await
    }

    async fn transition_position(
        &self,
        id: Uuid,
        expected_status: PositionStatus,
        patch: &PositionPatch,
        transactions: &[TransactionRecord],
        audit: &AuditLogEntry,
    ) -> Result<Option<Position>> {
        let mut db_tx = self.pool.begin().await?;

        let Some(position) =
            PositionRepository::update_guarded_with(&mut *db_tx, id, expected_status, patch).await?
        else {
            db_tx.rollback().await?;
            return Ok(None);
        };
        for record in transactions {
            TransactionRepository::insert_with(&mut *db_tx, record).await?;
        }
        AuditLogRepository::insert_with(&mut *db_tx, audit).await?;

        db_tx.commit().await?;
        Ok(Some(position))
    }

    async fn claim_rebalance(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
        cooldown: Duration,
    ) -> Result<bool> {
        self.repos.positions.claim_rebalance(id, now, cooldown).await
    }

    async fn release_rebalance_claim(
        &self,
        id: Uuid,
        claimed_at: DateTime<Utc>,
        previous: Option<DateTime<Utc>>,
    ) -> Result<()> {
        self.repos
            .positions
            .release_rebalance_claim(id, claimed_at, previous)
            .await
    }

    async fn append_audit_log(&self, entry: &AuditLogEntry) -> Result<()> {
        self.repos.audit_logs.insert(entry).await
    }

    async fn append_transaction(&self, tx: &TransactionRecord) -> Result<()> {
        self.repos.transactions.insert(tx).await
    }

    async fn record_job_run(&self, run: &JobRunRecord) -> Result<()> {
        self.repos.job_runs.insert(run).await
    }
}

#[async_trait]
impl ReportStore for PgStore {
    async fn worker_health(&self, since: DateTime<Utc>) -> Result<Vec<WorkerHealth>> {
        self.repos.job_runs.worker_health(since).await
    }

    async fn query_audit_logs(&self, filter: &AuditFilter) -> Result<Vec<AuditLogEntry>> {
        self.repos.audit_logs.query(filter).await
    }

    async fn error_counts(&self, since: DateTime<Utc>) -> Result<Vec<LevelCount>> {
        self.repos.audit_logs.level_counts(since).await
    }

    async fn list_transactions(&self, position_id: Uuid) -> Result<Vec<TransactionRecord>> {
        self.repos.transactions.list_for_position(position_id).await
    }
}
