//! Database row types and their conversions into domain records.

pub mod position;
pub mod records;

pub use position::{PositionRow, POSITION_COLUMNS};
pub use records::{AuditLogRow, LevelCountRow, TransactionRow, WorkerHealthRow};
