//! Position repository.
//!
//! Every mutation is a single conditional `UPDATE ... WHERE` so overlapping
//! job invocations cannot both win the same transition.

use anyhow::Result;
use chrono::{DateTime, SubsecRound, Utc};
use sqlx::{Executor, PgPool, Postgres, QueryBuilder};
use std::time::Duration;
use uuid::Uuid;
use vault_keeper_core::{Position, PositionFilter, PositionPatch, PositionStatus};

use crate::models::{PositionRow, POSITION_COLUMNS};

#[derive(Debug, Clone)]
pub struct PositionRepository {
    pool: PgPool,
}

impl PositionRepository {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts a position row as-is.
    ///
    /// # Errors
    /// Returns an error if the insert fails.
    pub async fn insert(&self, position: &Position) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO positions
                (id, user_id, pair_id, vault_address, strategy_id, status,
                 principal, spot_value, perp_value,
                 entry_price, current_price, funding_rate, funding_rate_ema,
                 drift_coefficient, principal_floor,
                 spot_quantity, perp_quantity, perp_entry_price, perp_margin,
                 last_rebalance_at, last_valued_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13,
                    $14, $15, $16, $17, $18, $19, $20, $21, $22, $23)
            ",
        )
        .bind(position.id)
        .bind(&position.user_id)
        .bind(&position.pair_id)
        .bind(position.vault_address.to_raw())
        .bind(position.strategy_id)
        .bind(position.status.as_str())
        .bind(position.principal)
        .bind(position.spot_value)
        .bind(position.perp_value)
        .bind(position.entry_price)
        .bind(position.current_price)
        .bind(position.funding_rate)
        .bind(position.funding_rate_ema)
        .bind(position.drift_coefficient)
        .bind(position.principal_floor)
        .bind(position.spot_quantity)
        .bind(position.perp_quantity)
        .bind(position.perp_entry_price)
        .bind(position.perp_margin)
        .bind(position.last_rebalance_at)
        .bind(position.last_valued_at)
        .bind(position.created_at)
        .bind(position.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// # Errors
    /// Returns an error if the query fails or the row cannot be decoded.
    pub async fn get(&self, id: Uuid) -> Result<Option<Position>> {
        let sql = format!("SELECT {POSITION_COLUMNS} FROM positions WHERE id = $1");
        let row = sqlx::query_as::<_, PositionRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Position::try_from).transpose()
    }

    /// # Errors
    /// Returns an error if the query fails or a row cannot be decoded.
    pub async fn find(&self, filter: &PositionFilter) -> Result<Vec<Position>> {
        let mut qb: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {POSITION_COLUMNS} FROM positions WHERE TRUE"));

        if !filter.statuses.is_empty() {
            let statuses: Vec<String> = filter
                .statuses
                .iter()
                .map(|s| s.as_str().to_string())
                .collect();
            qb.push(" AND status = ANY(").push_bind(statuses).push(")");
        }
        if let Some(vault) = filter.vault_address {
            qb.push(" AND vault_address = ").push_bind(vault.to_raw());
        }
        if let Some(pair) = &filter.pair_id {
            qb.push(" AND pair_id = ").push_bind(pair.clone());
        }
        qb.push(" ORDER BY created_at ASC");

        let rows = qb
            .build_query_as::<PositionRow>()
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Position::try_from).collect()
    }

    /// Applies `patch` if the row is still in `expected_status`.
    ///
    /// # Errors
    /// Returns an error if the patch's status change does not start at
    /// `expected_status`, or if the update fails.
    pub async fn update_guarded(
        &self,
        id: Uuid,
        expected_status: PositionStatus,
        patch: &PositionPatch,
    ) -> Result<Option<Position>> {
        Self::update_guarded_with(&self.pool, id, expected_status, patch).await
    }

    /// [`Self::update_guarded`] on a caller-supplied executor, typically an
    /// open transaction.
    ///
    /// # Errors
    /// Same as [`Self::update_guarded`].
    pub async fn update_guarded_with<'e, E>(
        executor: E,
        id: Uuid,
        expected_status: PositionStatus,
        patch: &PositionPatch,
    ) -> Result<Option<Position>>
    where
        E: Executor<'e, Database = Postgres>,
    {
        patch.check_guard(expected_status)?;

        let sql = format!(
            r"
            UPDATE positions SET
                status            = COALESCE($3, status),
                spot_value        = COALESCE($4, spot_value),
                perp_value        = COALESCE($5, perp_value),
                entry_price       = COALESCE($6, entry_price),
                current_price     = COALESCE($7, current_price),
                funding_rate      = COALESCE($8, funding_rate),
                funding_rate_ema  = COALESCE($9, funding_rate_ema),
                drift_coefficient = COALESCE($10, drift_coefficient),
                principal_floor   = COALESCE($11, principal_floor),
                spot_quantity     = COALESCE($12, spot_quantity),
                perp_quantity     = COALESCE($13, perp_quantity),
                perp_entry_price  = COALESCE($14, perp_entry_price),
                perp_margin       = COALESCE($15, perp_margin),
                last_valued_at    = COALESCE($16, last_valued_at),
                updated_at        = NOW()
            WHERE id = $1 AND status = $2
            RETURNING {POSITION_COLUMNS}
            "
        );

        let row = sqlx::query_as::<_, PositionRow>(&sql)
            .bind(id)
            .bind(expected_status.as_str())
            .bind(patch.status.map(|change| change.to().as_str()))
            .bind(patch.spot_value)
            .bind(patch.perp_value)
            .bind(patch.entry_price)
            .bind(patch.current_price)
            .bind(patch.funding_rate)
            .bind(patch.funding_rate_ema)
            .bind(patch.drift_coefficient)
            .bind(patch.principal_floor)
            .bind(patch.spot_quantity)
            .bind(patch.perp_quantity)
            .bind(patch.perp_entry_price)
            .bind(patch.perp_margin)
            .bind(patch.last_valued_at)
            .fetch_optional(executor)
            .await?;

        row.map(Position::try_from).transpose()
    }

    /// Stamps `last_rebalance_at` if the position is active and outside its
    /// cool-down window.
    ///
    /// # Errors
    /// Returns an error if the update fails.
    pub async fn claim_rebalance(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
        cooldown: Duration,
    ) -> Result<bool> {
        // Timestamps are stored with microsecond precision; the release path
        // compares against the exact stored value.
        let now = now.trunc_subsecs(6);
        let cutoff = now - chrono::Duration::from_std(cooldown)?;

        let result = sqlx::query(
            r"
            UPDATE positions
            SET last_rebalance_at = $2, updated_at = NOW()
            WHERE id = $1
              AND status = 'active'
              AND (last_rebalance_at IS NULL OR last_rebalance_at <= $3)
            ",
        )
        .bind(id)
        .bind(now)
        .bind(cutoff)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// # Errors
    /// Returns an error if the update fails.
    pub async fn release_rebalance_claim(
        &self,
        id: Uuid,
        claimed_at: DateTime<Utc>,
        previous: Option<DateTime<Utc>>,
    ) -> Result<()> {
        sqlx::query(
            r"
            UPDATE positions
            SET last_rebalance_at = $3
            WHERE id = $1 AND last_rebalance_at = $2
            ",
        )
        .bind(id)
        .bind(claimed_at.trunc_subsecs(6))
        .bind(previous)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
