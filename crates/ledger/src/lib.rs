pub mod client;
pub mod gateway;
pub mod http_feed;
pub mod http_ledger;
pub mod message;
pub mod paper;
pub mod signing;
pub mod wallet;

pub use client::{ApiClient, ApiError};
pub use gateway::{DisabledVault, VaultRebalanceGateway, DEFAULT_PENDING_TTL};
pub use http_feed::HttpMarketFeed;
pub use http_ledger::HttpLedgerClient;
pub use message::{OpCode, VaultInstruction};
pub use paper::{PaperLedger, PaperSubmission, StaticMarketFeed, PAPER_KEEPER_KEY};
pub use wallet::WalletRegistry;
