//! In-process ledger and market feed for paper mode and tests.
//!
//! Neither type makes network calls. `PaperLedger` checks signatures and
//! sequence numbers the way the network does, so the gateway's ordering
//! logic is exercised for real.

use async_trait::async_trait;
use chrono::Utc;
use ethers::types::Address;
use parking_lot::{Mutex, RwLock};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use vault_keeper_core::{
    FeedError, LedgerClient, LedgerError, MarketDataFeed, PaperQuoteConfig, Quote, SignedMessage,
    SubmitReceipt, VaultAddress, VaultLegs,
};

use crate::signing::{message_hash, verify_vault_message};

/// Development key paper mode signs with. Never funded.
pub const PAPER_KEEPER_KEY: &str =
    "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcad7f60ebb7c58f8b";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaperSubmission {
    pub wallet: String,
    pub message: SignedMessage,
    pub value: u64,
}

pub struct PaperLedger {
    seqnos: Mutex<HashMap<String, u64>>,
    submissions: Mutex<Vec<PaperSubmission>>,
    legs: Mutex<HashMap<VaultAddress, VaultLegs>>,
    failure: Mutex<Option<LedgerError>>,
    auto_land: AtomicBool,
}

impl Default for PaperLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl PaperLedger {
    /// Accepted messages land immediately unless [`Self::set_auto_land`]
    /// turns that off.
    #[must_use]
    pub fn new() -> Self {
        Self {
            seqnos: Mutex::new(HashMap::new()),
            submissions: Mutex::new(Vec::new()),
            legs: Mutex::new(HashMap::new()),
            failure: Mutex::new(None),
            auto_land: AtomicBool::new(true),
        }
    }

    pub fn set_auto_land(&self, auto_land: bool) {
        self.auto_land.store(auto_land, Ordering::SeqCst);
    }

    /// Makes every call fail with `failure` until cleared with `None`.
    pub fn fail_with(&self, failure: Option<LedgerError>) {
        *self.failure.lock() = failure;
    }

    /// Lands every accepted message that has not landed yet.
    pub fn land_pending(&self) {
        let submissions = self.submissions.lock();
        let mut seqnos = self.seqnos.lock();
        for submission in submissions.iter() {
            let seqno = seqnos.entry(submission.wallet.clone()).or_default();
            if *seqno == submission.message.seqno {
                *seqno += 1;
            }
        }
    }

    pub fn set_vault_legs(&self, vault: VaultAddress, legs: VaultLegs) {
        self.legs.lock().insert(vault, legs);
    }

    #[must_use]
    pub fn submissions(&self) -> Vec<PaperSubmission> {
        self.submissions.lock().clone()
    }

    fn check_failure(&self) -> Result<(), LedgerError> {
        match self.failure.lock().as_ref() {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl LedgerClient for PaperLedger {
    async fn get_sequence_number(&self, wallet: &str) -> Result<u64, LedgerError> {
        self.check_failure()?;
        Ok(self.seqnos.lock().get(wallet).copied().unwrap_or(0))
    }

    async fn submit_signed_message(
        &self,
        wallet: &str,
        message: &SignedMessage,
        value: u64,
    ) -> Result<SubmitReceipt, LedgerError> {
        self.check_failure()?;

        let signer = Address::from_str(wallet)
            .map_err(|_| LedgerError::Rejected(format!("malformed wallet address {wallet}")))?;
        if verify_vault_message(message, signer).is_err() {
            return Err(LedgerError::unauthorized(wallet, message.vault.to_raw()));
        }

        // Same lock order as `land_pending`.
        let mut submissions = self.submissions.lock();
        let mut seqnos = self.seqnos.lock();
        let current = seqnos.entry(wallet.to_string()).or_default();
        if message.seqno != *current {
            return Err(LedgerError::Rejected(format!(
                "seqno {} does not match account seqno {current}",
                message.seqno
            )));
        }
        if self.auto_land.load(Ordering::SeqCst) {
            *current += 1;
        }

        submissions.push(PaperSubmission {
            wallet: wallet.to_string(),
            message: message.clone(),
            value,
        });

        Ok(SubmitReceipt {
            message_hash: message_hash(message),
            seqno: message.seqno,
        })
    }

    async fn get_vault_legs(&self, vault: &VaultAddress) -> Result<Option<VaultLegs>, LedgerError> {
        self.check_failure()?;
        Ok(self.legs.lock().get(vault).copied())
    }
}

/// Quotes set by hand or from configuration.
#[derive(Default)]
pub struct StaticMarketFeed {
    quotes: RwLock<HashMap<String, Quote>>,
    unavailable: AtomicBool,
}

impl StaticMarketFeed {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_config(quotes: &[PaperQuoteConfig]) -> Self {
        let feed = Self::new();
        for q in quotes {
            feed.set_quote(&q.pair_id, q.spot_price, q.perp_price, q.funding_rate);
        }
        feed
    }

    pub fn set_quote(&self, pair_id: &str, spot_price: Decimal, perp_price: Decimal, funding_rate: Decimal) {
        self.quotes.write().insert(
            pair_id.to_string(),
            Quote {
                spot_price,
                perp_price,
                funding_rate,
                timestamp: Utc::now(),
            },
        );
    }

    pub fn set_funding_rate(&self, pair_id: &str, funding_rate: Decimal) {
        if let Some(quote) = self.quotes.write().get_mut(pair_id) {
            quote.funding_rate = funding_rate;
            quote.timestamp = Utc::now();
        }
    }

    pub fn remove_quote(&self, pair_id: &str) {
        self.quotes.write().remove(pair_id);
    }

    /// Simulates a feed outage.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }
}

#[async_trait]
impl MarketDataFeed for StaticMarketFeed {
    async fn get_quote(&self, pair_id: &str) -> Result<Quote, FeedError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(FeedError::Unavailable("paper feed offline".to_string()));
        }
        let quote = self
            .quotes
            .read()
            .get(pair_id)
            .copied()
            .ok_or_else(|| FeedError::MissingQuote(pair_id.to_string()))?;
        quote.validate(pair_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signing::sign_vault_message;
    use crate::wallet::{create_wallet_from_private_key, wallet_address};
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_paper_ledger_enforces_seqno_and_signature() {
        let ledger = PaperLedger::new();
        let wallet = create_wallet_from_private_key(PAPER_KEEPER_KEY).unwrap();
        let address = wallet_address(&wallet);
        let vault = VaultAddress::new(0, [1u8; 32]);

        let first = sign_vault_message(&wallet, &vault, 0, b"a").await.unwrap();
        ledger.submit_signed_message(&address, &first, 1).await.unwrap();
        assert_eq!(ledger.get_sequence_number(&address).await.unwrap(), 1);

        // Reusing a consumed seqno is rejected.
        let err = ledger.submit_signed_message(&address, &first, 1).await.unwrap_err();
        assert!(matches!(err, LedgerError::Rejected(_)));

        // A message signed by another key is unauthorized.
        let stranger = create_wallet_from_private_key(
            "59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d",
        )
        .unwrap();
        let forged = sign_vault_message(&stranger, &vault, 1, b"a").await.unwrap();
        let err = ledger.submit_signed_message(&address, &forged, 1).await.unwrap_err();
        assert!(matches!(err, LedgerError::Unauthorized { .. }));
    }

    #[tokio::test]
    async fn test_land_pending() {
        let ledger = PaperLedger::new();
        ledger.set_auto_land(false);
        let wallet = create_wallet_from_private_key(PAPER_KEEPER_KEY).unwrap();
        let address = wallet_address(&wallet);
        let vault = VaultAddress::new(0, [1u8; 32]);

        let msg = sign_vault_message(&wallet, &vault, 0, b"a").await.unwrap();
        ledger.submit_signed_message(&address, &msg, 1).await.unwrap();
        assert_eq!(ledger.get_sequence_number(&address).await.unwrap(), 0);

        ledger.land_pending();
        assert_eq!(ledger.get_sequence_number(&address).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_static_feed() {
        let feed = StaticMarketFeed::new();
        feed.set_quote("TON-USDT", dec!(2.5), dec!(2.5), dec!(0.0001));

        assert_eq!(feed.get_quote("TON-USDT").await.unwrap().spot_price, dec!(2.5));
        assert!(matches!(
            feed.get_quote("BTC-USDT").await,
            Err(FeedError::MissingQuote(_))
        ));

        feed.set_funding_rate("TON-USDT", dec!(-0.01));
        assert_eq!(feed.get_quote("TON-USDT").await.unwrap().funding_rate, dec!(-0.01));

        feed.set_unavailable(true);
        assert!(matches!(
            feed.get_quote("TON-USDT").await,
            Err(FeedError::Unavailable(_))
        ));
    }
}
