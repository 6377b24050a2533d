pub mod handlers;
pub mod health;
pub mod server;
pub mod state;

pub use health::{HealthResponse, HealthSummary, WorkerStatus};
pub use server::ApiServer;
pub use state::AppState;
