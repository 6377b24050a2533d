//! Job run repository and the worker health aggregation.

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use vault_keeper_core::{JobRunRecord, WorkerHealth};

use crate::models::WorkerHealthRow;

#[derive(Debug, Clone)]
pub struct JobRunRepository {
    pool: PgPool,
}

impl JobRunRepository {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// # Errors
    /// Returns an error if the insert fails.
    pub async fn insert(&self, run: &JobRunRecord) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO job_runs
                (id, worker_name, slot_key, status, start_time, duration_ms,
                 processed, failed, error)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ",
        )
        .bind(run.id)
        .bind(&run.worker_name)
        .bind(&run.slot_key)
        .bind(run.status.as_str())
        .bind(run.start_time)
        .bind(run.duration_ms)
        .bind(run.processed)
        .bind(run.failed)
        .bind(&run.error)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Success rate and last-seen per worker since `since`.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn worker_health(&self, since: DateTime<Utc>) -> Result<Vec<WorkerHealth>> {
        let rows = sqlx::query_as::<_, WorkerHealthRow>(
            r"
            SELECT worker_name,
                   COUNT(*) AS runs,
                   COUNT(*) FILTER (WHERE status = 'FAILURE') AS failures,
                   MAX(start_time) AS last_seen,
                   (ARRAY_AGG(status ORDER BY start_time DESC))[1] AS last_status
            FROM job_runs
            WHERE start_time >= $1
            GROUP BY worker_name
            ORDER BY worker_name
            ",
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| -> Result<WorkerHealth> {
                let last_status = row.last_status.as_deref().map(str::parse).transpose()?;
                Ok(WorkerHealth::from_counts(
                    row.worker_name,
                    row.runs,
                    row.failures,
                    row.last_seen,
                    last_status,
                ))
            })
            .collect()
    }
}
