//! Append-only records written by the keeper: transactions, audit log
//! entries, and job runs, plus the aggregates the health surface reads.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::position::Position;

/// Generates `as_str`, `Display`, and `FromStr` for a unit-only enum stored
/// as text.
macro_rules! text_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            #[must_use]
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = anyhow::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => anyhow::bail!("unknown {}: {other}", stringify!($name)),
                }
            }
        }
    };
}

// =============================================================================
// Transactions
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionKind {
    Entry,
    Rebalance,
    Exit,
}

text_enum!(TransactionKind {
    Entry => "ENTRY",
    Rebalance => "REBALANCE",
    Exit => "EXIT",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    /// Accepted by the network, not yet observed as settled.
    Submitted,
    Success,
    Failed,
}

text_enum!(TransactionStatus {
    Submitted => "SUBMITTED",
    Success => "SUCCESS",
    Failed => "FAILED",
});

/// One economic event tied to a position. Never mutated once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: Uuid,
    pub position_id: Uuid,
    pub kind: TransactionKind,
    pub status: TransactionStatus,
    pub realized_pnl: Decimal,
    pub fees_paid: Decimal,
    /// Ledger message hash when the event came from a submitted message.
    pub tx_hash: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl TransactionRecord {
    #[must_use]
    pub fn new(position_id: Uuid, kind: TransactionKind, status: TransactionStatus) -> Self {
        Self {
            id: Uuid::new_v4(),
            position_id,
            kind,
            status,
            realized_pnl: Decimal::ZERO,
            fees_paid: Decimal::ZERO,
            tx_hash: None,
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_pnl(mut self, realized_pnl: Decimal) -> Self {
        self.realized_pnl = realized_pnl;
        self
    }

    #[must_use]
    pub fn with_fees(mut self, fees_paid: Decimal) -> Self {
        self.fees_paid = fees_paid;
        self
    }

    #[must_use]
    pub fn with_tx_hash(mut self, tx_hash: impl Into<String>) -> Self {
        self.tx_hash = Some(tx_hash.into());
        self
    }
}

/// Realized PnL and fees over the settled transactions of one position.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PnlSummary {
    pub position_id: Uuid,
    pub realized_pnl: Decimal,
    pub fees_paid: Decimal,
    pub net_pnl: Decimal,
    pub settled: usize,
    pub pending: usize,
}

impl PnlSummary {
    /// Only `SUCCESS` rows contribute to PnL and fees.
    #[must_use]
    pub fn from_transactions(position_id: Uuid, transactions: &[TransactionRecord]) -> Self {
        let mut summary = Self {
            position_id,
            ..Self::default()
        };
        for tx in transactions.iter().filter(|tx| tx.position_id == position_id) {
            match tx.status {
                TransactionStatus::Success => {
                    summary.realized_pnl += tx.realized_pnl;
                    summary.fees_paid += tx.fees_paid;
                    summary.settled += 1;
                }
                TransactionStatus::Submitted => summary.pending += 1,
                TransactionStatus::Failed => {}
            }
        }
        summary.net_pnl = summary.realized_pnl - summary.fees_paid;
        summary
    }
}

// =============================================================================
// Audit log
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditLevel {
    Info,
    Warn,
    Error,
    Panic,
}

text_enum!(AuditLevel {
    Info => "INFO",
    Warn => "WARN",
    Error => "ERROR",
    Panic => "PANIC",
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub level: AuditLevel,
    pub component: String,
    pub action: String,
    pub position_id: Option<Uuid>,
    /// Denormalized from the position so the log can be filtered by wallet
    /// and pair without a join.
    pub vault_address: Option<String>,
    pub pair_id: Option<String>,
    pub detail: JsonValue,
    pub created_at: DateTime<Utc>,
}

impl AuditLogEntry {
    #[must_use]
    pub fn new(level: AuditLevel, component: &str, action: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            level,
            component: component.to_string(),
            action: action.to_string(),
            position_id: None,
            vault_address: None,
            pair_id: None,
            detail: JsonValue::Null,
            created_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn info(component: &str, action: &str) -> Self {
        Self::new(AuditLevel::Info, component, action)
    }

    #[must_use]
    pub fn warn(component: &str, action: &str) -> Self {
        Self::new(AuditLevel::Warn, component, action)
    }

    #[must_use]
    pub fn error(component: &str, action: &str) -> Self {
        Self::new(AuditLevel::Error, component, action)
    }

    #[must_use]
    pub fn for_position(mut self, position: &Position) -> Self {
        self.position_id = Some(position.id);
        self.vault_address = Some(position.vault_address.to_raw());
        self.pair_id = Some(position.pair_id.clone());
        self
    }

    #[must_use]
    pub fn with_detail(mut self, detail: JsonValue) -> Self {
        self.detail = detail;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditFilter {
    pub level: Option<AuditLevel>,
    pub component: Option<String>,
    /// Raw vault address.
    pub wallet: Option<String>,
    pub pair_id: Option<String>,
    pub position_id: Option<Uuid>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
}

impl AuditFilter {
    pub const DEFAULT_LIMIT: i64 = 200;

    #[must_use]
    pub fn matches(&self, entry: &AuditLogEntry) -> bool {
        self.level.map_or(true, |level| entry.level == level)
            && self
                .component
                .as_deref()
                .map_or(true, |c| entry.component == c)
            && self
                .wallet
                .as_deref()
                .map_or(true, |w| entry.vault_address.as_deref() == Some(w))
            && self
                .pair_id
                .as_deref()
                .map_or(true, |p| entry.pair_id.as_deref() == Some(p))
            && self
                .position_id
                .map_or(true, |id| entry.position_id == Some(id))
            && self.from.map_or(true, |from| entry.created_at >= from)
            && self.to.map_or(true, |to| entry.created_at <= to)
    }

    #[must_use]
    pub fn effective_limit(&self) -> i64 {
        self.limit.unwrap_or(Self::DEFAULT_LIMIT).clamp(1, 10_000)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelCount {
    pub level: AuditLevel,
    pub count: i64,
}

// =============================================================================
// Job runs
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobRunStatus {
    Success,
    Failure,
}

text_enum!(JobRunStatus {
    Success => "SUCCESS",
    Failure => "FAILURE",
});

/// One execution record per scheduled invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRunRecord {
    pub id: Uuid,
    pub worker_name: String,
    /// De-duplication key of the slot this invocation served.
    pub slot_key: String,
    pub status: JobRunStatus,
    pub start_time: DateTime<Utc>,
    pub duration_ms: i64,
    pub processed: i32,
    pub failed: i32,
    pub error: Option<String>,
}

/// Per-worker aggregation over job runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerHealth {
    pub worker_name: String,
    pub runs: i64,
    pub failures: i64,
    pub success_rate: f64,
    pub last_seen: Option<DateTime<Utc>>,
    pub last_status: Option<JobRunStatus>,
}

impl WorkerHealth {
    /// Aggregates runs per worker, sorted by worker name.
    #[must_use]
    pub fn aggregate(runs: &[JobRunRecord]) -> Vec<Self> {
        let mut by_worker: std::collections::BTreeMap<&str, Vec<&JobRunRecord>> =
            std::collections::BTreeMap::new();
        for run in runs {
            by_worker.entry(run.worker_name.as_str()).or_default().push(run);
        }

        by_worker
            .into_iter()
            .map(|(worker, runs)| {
                let total = i64::try_from(runs.len()).unwrap_or(i64::MAX);
                let failures = i64::try_from(
                    runs.iter()
                        .filter(|r| r.status == JobRunStatus::Failure)
                        .count(),
                )
                .unwrap_or(i64::MAX);
                let latest = runs.iter().max_by_key(|r| r.start_time);
                Self::from_counts(
                    worker.to_string(),
                    total,
                    failures,
                    latest.map(|r| r.start_time),
                    latest.map(|r| r.status),
                )
            })
            .collect()
    }

    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn from_counts(
        worker_name: String,
        runs: i64,
        failures: i64,
        last_seen: Option<DateTime<Utc>>,
        last_status: Option<JobRunStatus>,
    ) -> Self {
        let success_rate = if runs > 0 {
            (runs - failures) as f64 / runs as f64
        } else {
            0.0
        };
        Self {
            worker_name,
            runs,
            failures,
            success_rate,
            last_seen,
            last_status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn run(worker: &str, status: JobRunStatus, minutes_ago: i64) -> JobRunRecord {
        JobRunRecord {
            id: Uuid::new_v4(),
            worker_name: worker.to_string(),
            slot_key: format!("{worker}@{minutes_ago}"),
            status,
            start_time: Utc::now() - Duration::minutes(minutes_ago),
            duration_ms: 12,
            processed: 1,
            failed: 0,
            error: None,
        }
    }

    #[test]
    fn test_worker_health_aggregation() {
        let runs = vec![
            run("valuation", JobRunStatus::Success, 3),
            run("valuation", JobRunStatus::Failure, 2),
            run("valuation", JobRunStatus::Success, 1),
            run("entry", JobRunStatus::Failure, 1),
        ];

        let health = WorkerHealth::aggregate(&runs);
        assert_eq!(health.len(), 2);

        let entry = &health[0];
        assert_eq!(entry.worker_name, "entry");
        assert_eq!(entry.success_rate, 0.0);
        assert_eq!(entry.last_status, Some(JobRunStatus::Failure));

        let valuation = &health[1];
        assert_eq!(valuation.runs, 3);
        assert_eq!(valuation.failures, 1);
        assert!((valuation.success_rate - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(valuation.last_status, Some(JobRunStatus::Success));
    }

    #[test]
    fn test_pnl_summary_only_counts_settled() {
        let position_id = Uuid::new_v4();
        let txs = vec![
            TransactionRecord::new(position_id, TransactionKind::Entry, TransactionStatus::Success)
                .with_fees(dec!(0.5)),
            TransactionRecord::new(position_id, TransactionKind::Rebalance, TransactionStatus::Submitted),
            TransactionRecord::new(position_id, TransactionKind::Exit, TransactionStatus::Success)
                .with_pnl(dec!(42)),
            TransactionRecord::new(Uuid::new_v4(), TransactionKind::Exit, TransactionStatus::Success)
                .with_pnl(dec!(1000)),
        ];

        let summary = PnlSummary::from_transactions(position_id, &txs);
        assert_eq!(summary.realized_pnl, dec!(42));
        assert_eq!(summary.fees_paid, dec!(0.5));
        assert_eq!(summary.net_pnl, dec!(41.5));
        assert_eq!(summary.settled, 2);
        assert_eq!(summary.pending, 1);
    }

    #[test]
    fn test_audit_filter() {
        let entry = AuditLogEntry::error("safety_guard", "PANIC_PRINCIPAL_FLOOR_BREACH");

        assert!(AuditFilter::default().matches(&entry));
        assert!(AuditFilter {
            level: Some(AuditLevel::Error),
            component: Some("safety_guard".to_string()),
            ..AuditFilter::default()
        }
        .matches(&entry));
        assert!(!AuditFilter {
            wallet: Some("0:00".to_string()),
            ..AuditFilter::default()
        }
        .matches(&entry));
        assert!(!AuditFilter {
            from: Some(Utc::now() + Duration::minutes(1)),
            ..AuditFilter::default()
        }
        .matches(&entry));
    }

    #[test]
    fn test_text_enums_round_trip() {
        assert_eq!("PANIC".parse::<AuditLevel>().unwrap(), AuditLevel::Panic);
        assert_eq!(JobRunStatus::Failure.to_string(), "FAILURE");
        assert!("pending".parse::<TransactionStatus>().is_err());
    }
}
