//! Interval scheduler for keeper jobs.

pub mod handler;
pub mod scheduler;
pub mod slot;

pub use handler::{JobHandler, JobReport};
pub use scheduler::JobScheduler;
pub use slot::SlotTracker;
