//! Error types for the keeper's external collaborators.
//!
//! Ledger errors split into transient failures, which are left for the next
//! scheduled pass, and permanent ones, which disable the vault until an
//! operator re-enables it.

use crate::address::VaultAddress;
use std::time::Duration;
use thiserror::Error;

/// Errors returned by the ledger client and the rebalance gateway.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// Network or RPC endpoint unreachable.
    #[error("ledger unavailable: {0}")]
    Unavailable(String),

    /// Call exceeded its time bound.
    #[error("ledger call timed out after {0:?}")]
    Timeout(Duration),

    /// Vault address rejected by the network.
    #[error("invalid vault address: {0}")]
    InvalidAddress(String),

    /// Signing wallet is not authorized to instruct the vault.
    #[error("wallet {wallet} is not authorized for vault {vault}")]
    Unauthorized {
        /// Controlling wallet address.
        wallet: String,
        /// Vault the message targeted.
        vault: String,
    },

    /// Message rejected for any other reason.
    #[error("message rejected: {0}")]
    Rejected(String),

    /// The wallet's previous message has not landed yet.
    #[error("sequence number {seqno} for wallet {wallet} is still pending")]
    SequencePending {
        /// Controlling wallet address.
        wallet: String,
        /// Sequence number of the outstanding message.
        seqno: u64,
    },

    /// Vault disabled after a permanent failure.
    #[error("vault {0} is disabled")]
    VaultDisabled(VaultAddress),
}

impl LedgerError {
    pub fn unauthorized(wallet: impl Into<String>, vault: impl Into<String>) -> Self {
        Self::Unauthorized {
            wallet: wallet.into(),
            vault: vault.into(),
        }
    }

    /// Returns true if retrying cannot succeed without operator action.
    #[must_use]
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            Self::InvalidAddress(_) | Self::Unauthorized { .. } | Self::VaultDisabled(_)
        )
    }

    /// Returns true if the next scheduled pass may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Unavailable(_) | Self::Timeout(_) | Self::SequencePending { .. }
        )
    }

    /// Returns true if the network may have accepted the message despite
    /// the error. Only a timeout leaves acceptance unknown; every other
    /// variant is reported before or instead of acceptance.
    #[must_use]
    pub fn may_have_landed(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

/// Errors returned by the market data feed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FeedError {
    #[error("market data unavailable: {0}")]
    Unavailable(String),

    #[error("market data call timed out after {0:?}")]
    Timeout(Duration),

    #[error("no quote for pair {0}")]
    MissingQuote(String),

    #[error("malformed quote for pair {pair}: {reason}")]
    Malformed { pair: String, reason: String },
}

impl FeedError {
    pub fn malformed(pair: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Malformed {
            pair: pair.into(),
            reason: reason.into(),
        }
    }

    /// Data errors concern one pair; the rest mean the feed itself is down.
    #[must_use]
    pub fn is_data_error(&self) -> bool {
        matches!(self, Self::MissingQuote(_) | Self::Malformed { .. })
    }
}
