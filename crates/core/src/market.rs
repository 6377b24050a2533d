use crate::address::VaultAddress;
use crate::error::FeedError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Current marks and funding for one trading pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub spot_price: Decimal,
    pub perp_price: Decimal,
    /// Instantaneous funding rate per funding interval.
    pub funding_rate: Decimal,
    pub timestamp: DateTime<Utc>,
}

impl Quote {
    /// Rejects quotes the keeper cannot mark a position against.
    ///
    /// # Errors
    /// Returns [`FeedError::Malformed`] if either price is not positive.
    pub fn validate(self, pair_id: &str) -> Result<Self, FeedError> {
        if self.spot_price <= Decimal::ZERO {
            return Err(FeedError::malformed(pair_id, "spot price must be positive"));
        }
        if self.perp_price <= Decimal::ZERO {
            return Err(FeedError::malformed(pair_id, "perp price must be positive"));
        }
        Ok(self)
    }
}

/// A signed instruction for a vault contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedMessage {
    pub vault: VaultAddress,
    /// Sequence number of the controlling wallet this message consumes.
    pub seqno: u64,
    /// Hex-encoded message body.
    pub payload: String,
    /// Hex-encoded signature over vault, seqno and payload.
    pub signature: String,
}

/// Acknowledgement that the network accepted a message. Acceptance is not
/// confirmation; the effect is observed by later valuation passes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitReceipt {
    pub message_hash: String,
    pub seqno: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_quote_validation() {
        let quote = Quote {
            spot_price: dec!(2.5),
            perp_price: dec!(2.49),
            funding_rate: dec!(0.0001),
            timestamp: Utc::now(),
        };
        assert!(quote.validate("TON-USDT").is_ok());

        let broken = Quote {
            perp_price: Decimal::ZERO,
            ..quote
        };
        assert!(matches!(
            broken.validate("TON-USDT"),
            Err(FeedError::Malformed { .. })
        ));
    }
}
