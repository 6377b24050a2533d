//! Database repositories for the keeper tables.
//!
//! Each repository provides typed access to a single table.

pub mod audit_log_repo;
pub mod job_run_repo;
pub mod position_repo;
pub mod transaction_repo;

pub use audit_log_repo::AuditLogRepository;
pub use job_run_repo::JobRunRepository;
pub use position_repo::PositionRepository;
pub use transaction_repo::TransactionRepository;

use sqlx::PgPool;

/// Creates all repositories from a single database pool.
#[derive(Debug, Clone)]
pub struct Repositories {
    pub positions: PositionRepository,
    pub transactions: TransactionRepository,
    pub audit_logs: AuditLogRepository,
    pub job_runs: JobRunRepository,
}

impl Repositories {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self {
            positions: PositionRepository::new(pool.clone()),
            transactions: TransactionRepository::new(pool.clone()),
            audit_logs: AuditLogRepository::new(pool.clone()),
            job_runs: JobRunRepository::new(pool),
        }
    }
}
