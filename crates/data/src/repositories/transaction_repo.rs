use anyhow::Result;
use sqlx::{Executor, PgPool, Postgres};
use uuid::Uuid;
use vault_keeper_core::TransactionRecord;

use crate::models::TransactionRow;

/// Repository for position transactions. Rows are never updated.
#[derive(Debug, Clone)]
pub struct TransactionRepository {
    pool: PgPool,
}

impl TransactionRepository {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// # Errors
    /// Returns an error if the insert fails.
    pub async fn insert(&self, tx: &TransactionRecord) -> Result<()> {
        Self::insert_with(&self.pool, tx).await
    }

    /// Inserts on a caller-supplied executor, typically an open transaction.
    ///
    /// # Errors
    /// Returns an error if the insert fails.
    pub async fn insert_with<'e, E>(executor: E, tx: &TransactionRecord) -> Result<()>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query(
            r"
            INSERT INTO transactions
                (id, position_id, kind, status, realized_pnl, fees_paid, tx_hash, timestamp)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ",
        )
        .bind(tx.id)
        .bind(tx.position_id)
        .bind(tx.kind.as_str())
        .bind(tx.status.as_str())
        .bind(tx.realized_pnl)
        .bind(tx.fees_paid)
        .bind(&tx.tx_hash)
        .bind(tx.timestamp)
        .execute(executor)
        .await?;

        Ok(())
    }

    /// Oldest first.
    ///
    /// # Errors
    /// Returns an error if the query fails or a row cannot be decoded.
    pub async fn list_for_position(&self, position_id: Uuid) -> Result<Vec<TransactionRecord>> {
        let rows = sqlx::query_as::<_, TransactionRow>(
            r"
            SELECT id, position_id, kind, status, realized_pnl, fees_paid, tx_hash, timestamp
            FROM transactions
            WHERE position_id = $1
            ORDER BY timestamp ASC
            ",
        )
        .bind(position_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TransactionRecord::try_from).collect()
    }
}
