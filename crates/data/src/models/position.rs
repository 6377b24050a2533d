//! Row mapping for the `positions` table.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;
use vault_keeper_core::{Position, PositionStatus, VaultAddress};

/// Column list shared by every query that returns a full position.
pub const POSITION_COLUMNS: &str = r"
    id, user_id, pair_id, vault_address, strategy_id, status,
    principal, spot_value, perp_value,
    entry_price, current_price, funding_rate, funding_rate_ema,
    drift_coefficient, principal_floor,
    spot_quantity, perp_quantity, perp_entry_price, perp_margin,
    last_rebalance_at, last_valued_at, created_at, updated_at
";

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PositionRow {
    pub id: Uuid,
    pub user_id: String,
    pub pair_id: String,
    pub vault_address: String,
    pub strategy_id: i32,
    pub status: String,
    pub principal: Decimal,
    pub spot_value: Decimal,
    pub perp_value: Decimal,
    pub entry_price: Decimal,
    pub current_price: Decimal,
    pub funding_rate: Decimal,
    pub funding_rate_ema: Decimal,
    pub drift_coefficient: Decimal,
    pub principal_floor: Decimal,
    pub spot_quantity: Decimal,
    pub perp_quantity: Decimal,
    pub perp_entry_price: Decimal,
    pub perp_margin: Decimal,
    pub last_rebalance_at: Option<DateTime<Utc>>,
    pub last_valued_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<PositionRow> for Position {
    type Error = anyhow::Error;

    fn try_from(row: PositionRow) -> Result<Self> {
        let vault_address = VaultAddress::parse(&row.vault_address)
            .with_context(|| format!("position {} has a malformed vault address", row.id))?;
        let status: PositionStatus = row
            .status
            .parse()
            .with_context(|| format!("position {} has an unknown status", row.id))?;

        Ok(Self {
            id: row.id,
            user_id: row.user_id,
            pair_id: row.pair_id,
            vault_address,
            strategy_id: row.strategy_id,
            status,
            principal: row.principal,
            spot_value: row.spot_value,
            perp_value: row.perp_value,
            entry_price: row.entry_price,
            current_price: row.current_price,
            funding_rate: row.funding_rate,
            funding_rate_ema: row.funding_rate_ema,
            drift_coefficient: row.drift_coefficient,
            principal_floor: row.principal_floor,
            spot_quantity: row.spot_quantity,
            perp_quantity: row.perp_quantity,
            perp_entry_price: row.perp_entry_price,
            perp_margin: row.perp_margin,
            last_rebalance_at: row.last_rebalance_at,
            last_valued_at: row.last_valued_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
