pub mod address;
pub mod config;
pub mod config_loader;
pub mod error;
pub mod market;
pub mod math;
pub mod position;
pub mod records;
pub mod status;
pub mod traits;

pub use address::{AddressError, VaultAddress};
pub use config::{
    AppConfig, DatabaseConfig, LedgerConfig, MarketDataConfig, PaperQuoteConfig, SchedulerConfig,
    ServerConfig, StrategyConfig, VaultWalletConfig,
};
pub use config_loader::ConfigLoader;
pub use error::{FeedError, LedgerError};
pub use market::{Quote, SignedMessage, SubmitReceipt};
pub use position::{NewPosition, Position, PositionFilter, PositionPatch, VaultLegs};
pub use records::{
    AuditFilter, AuditLevel, AuditLogEntry, JobRunRecord, JobRunStatus, LevelCount, PnlSummary,
    TransactionKind, TransactionRecord, TransactionStatus, WorkerHealth,
};
pub use status::{PositionStatus, StatusChange, TransitionError, UnknownStatus};
pub use traits::{KeeperStore, LedgerClient, MarketDataFeed, ReportStore};
