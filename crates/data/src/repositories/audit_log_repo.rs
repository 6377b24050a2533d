//! Audit log repository. Rows are append-only.

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::{Executor, PgPool, Postgres, QueryBuilder};
use vault_keeper_core::{AuditFilter, AuditLogEntry, LevelCount};

use crate::models::{AuditLogRow, LevelCountRow};

#[derive(Debug, Clone)]
pub struct AuditLogRepository {
    pool: PgPool,
}

impl AuditLogRepository {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// # Errors
    /// Returns an error if the insert fails.
    pub async fn insert(&self, entry: &AuditLogEntry) -> Result<()> {
        Self::insert_with(&self.pool, entry).await
    }

    /// Inserts on a caller-supplied executor, typically an open transaction.
    ///
    /// # Errors
    /// Returns an error if the insert fails.
    pub async fn insert_with<'e, E>(executor: E, entry: &AuditLogEntry) -> Result<()>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query(
            r"
            INSERT INTO audit_logs
                (id, level, component, action, position_id, vault_address, pair_id,
                 detail, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ",
        )
        .bind(entry.id)
        .bind(entry.level.as_str())
        .bind(&entry.component)
        .bind(&entry.action)
        .bind(entry.position_id)
        .bind(&entry.vault_address)
        .bind(&entry.pair_id)
        .bind(&entry.detail)
        .bind(entry.created_at)
        .execute(executor)
        .await?;

        Ok(())
    }

    /// Filtered query, newest first.
    ///
    /// # Errors
    /// Returns an error if the query fails or a row cannot be decoded.
    pub async fn query(&self, filter: &AuditFilter) -> Result<Vec<AuditLogEntry>> {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
            r"
            SELECT id, level, component, action, position_id, vault_address, pair_id,
                   detail, created_at
            FROM audit_logs
            WHERE TRUE
            ",
        );

        if let Some(level) = filter.level {
            qb.push(" AND level = ").push_bind(level.as_str());
        }
        if let Some(component) = &filter.component {
            qb.push(" AND component = ").push_bind(component.clone());
        }
        if let Some(wallet) = &filter.wallet {
            qb.push(" AND vault_address = ").push_bind(wallet.clone());
        }
        if let Some(pair) = &filter.pair_id {
            qb.push(" AND pair_id = ").push_bind(pair.clone());
        }
        if let Some(position_id) = filter.position_id {
            qb.push(" AND position_id = ").push_bind(position_id);
        }
        if let Some(from) = filter.from {
            qb.push(" AND created_at >= ").push_bind(from);
        }
        if let Some(to) = filter.to {
            qb.push(" AND created_at <= ").push_bind(to);
        }
        qb.push(" ORDER BY created_at DESC LIMIT ")
            .push_bind(filter.effective_limit());

        let rows = qb
            .build_query_as::<AuditLogRow>()
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(AuditLogEntry::try_from).collect()
    }

    /// Counts of non-INFO entries since `since`, per level.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn level_counts(&self, since: DateTime<Utc>) -> Result<Vec<LevelCount>> {
        let rows = sqlx::query_as::<_, LevelCountRow>(
            r"
            SELECT level, COUNT(*) AS count
            FROM audit_logs
            WHERE created_at >= $1 AND level <> 'INFO'
            GROUP BY level
            ORDER BY level
            ",
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| -> Result<LevelCount> {
                Ok(LevelCount {
                    level: row.level.parse()?,
                    count: row.count,
                })
            })
            .collect()
    }
}
