//! Row mappings for the append-only tables.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use uuid::Uuid;
use vault_keeper_core::{AuditLogEntry, TransactionRecord};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TransactionRow {
    pub id: Uuid,
    pub position_id: Uuid,
    pub kind: String,
    pub status: String,
    pub realized_pnl: Decimal,
    pub fees_paid: Decimal,
    pub tx_hash: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl TryFrom<TransactionRow> for TransactionRecord {
    type Error = anyhow::Error;

    fn try_from(row: TransactionRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            position_id: row.position_id,
            kind: row.kind.parse().context("transaction kind")?,
            status: row.status.parse().context("transaction status")?,
            realized_pnl: row.realized_pnl,
            fees_paid: row.fees_paid,
            tx_hash: row.tx_hash,
            timestamp: row.timestamp,
        })
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AuditLogRow {
    pub id: Uuid,
    pub level: String,
    pub component: String,
    pub action: String,
    pub position_id: Option<Uuid>,
    pub vault_address: Option<String>,
    pub pair_id: Option<String>,
    pub detail: JsonValue,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<AuditLogRow> for AuditLogEntry {
    type Error = anyhow::Error;

    fn try_from(row: AuditLogRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            level: row.level.parse().context("audit level")?,
            component: row.component,
            action: row.action,
            position_id: row.position_id,
            vault_address: row.vault_address,
            pair_id: row.pair_id,
            detail: row.detail,
            created_at: row.created_at,
        })
    }
}

/// One row of the per-worker health aggregation.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct WorkerHealthRow {
    pub worker_name: String,
    pub runs: i64,
    pub failures: i64,
    pub last_seen: Option<DateTime<Utc>>,
    pub last_status: Option<String>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct LevelCountRow {
    pub level: String,
    pub count: i64,
}
