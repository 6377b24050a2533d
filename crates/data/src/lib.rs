//! Storage for the vault keeper.
//!
//! This crate provides:
//! - `PgStore`: `PostgreSQL` store with migrations applied on connect
//! - `MemoryStore`: in-process store for paper mode and tests
//! - Row models and per-table repositories

pub mod database;
pub mod memory;
pub mod models;
pub mod repositories;

pub use database::PgStore;
pub use memory::MemoryStore;
pub use repositories::{
    AuditLogRepository, JobRunRepository, PositionRepository, Repositories, TransactionRepository,
};
