//! Position-keeper control loop.
//!
//! Five idempotent job bodies share one [`KeeperContext`]:
//!
//! - [`EntryProcessor`]: `pending_entry` deposits become `active` hedges
//! - [`ValuationProcessor`]: marks live positions to market
//! - [`DriftMonitor`]: requests on-ledger rebalances for drifted hedges
//! - [`SafetyGuard`]: principal floor breaches and forced exits
//! - [`StrategyStateMachine`]: `active` / `stasis` switching on funding
//!
//! Every status write is guarded by the status the processor read, so
//! overlapping runs of the same job cannot double-apply a transition.

pub mod context;
pub mod drift;
pub mod entry;
pub mod jobs;
pub mod pass;
pub mod positions;
pub mod safety;
pub mod strategy;
pub mod valuation;

pub use context::KeeperContext;
pub use drift::DriftMonitor;
pub use entry::EntryProcessor;
pub use jobs::{handler_for, register_jobs, JOB_NAMES};
pub use pass::Outcome;
pub use positions::{PositionError, PositionService};
pub use safety::SafetyGuard;
pub use strategy::StrategyStateMachine;
pub use valuation::ValuationProcessor;
