use crate::address::VaultAddress;
use crate::status::{PositionStatus, StatusChange};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One hedged allocation for one user on one trading pair.
///
/// `total_equity` is derived from the two legs and is never stored on its
/// own; see [`Position::total_equity`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: Uuid,
    pub user_id: String,
    pub pair_id: String,
    pub vault_address: VaultAddress,
    pub strategy_id: i32,
    pub status: PositionStatus,

    /// Deposited principal.
    pub principal: Decimal,
    pub spot_value: Decimal,
    pub perp_value: Decimal,

    pub entry_price: Decimal,
    pub current_price: Decimal,
    pub funding_rate: Decimal,
    pub funding_rate_ema: Decimal,
    pub drift_coefficient: Decimal,
    pub principal_floor: Decimal,

    // Leg holdings used to mark the position.
    pub spot_quantity: Decimal,
    pub perp_quantity: Decimal,
    pub perp_entry_price: Decimal,
    pub perp_margin: Decimal,

    pub last_rebalance_at: Option<DateTime<Utc>>,
    pub last_valued_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Position {
    #[must_use]
    pub fn total_equity(&self) -> Decimal {
        self.spot_value + self.perp_value
    }

    /// Applies a patch in place. The caller is responsible for the status
    /// guard; stores check it before calling this.
    pub fn apply(&mut self, patch: &PositionPatch, now: DateTime<Utc>) {
        if let Some(change) = patch.status {
            self.status = change.to();
        }

        let fields = [
            (&mut self.spot_value, patch.spot_value),
            (&mut self.perp_value, patch.perp_value),
            (&mut self.entry_price, patch.entry_price),
            (&mut self.current_price, patch.current_price),
            (&mut self.funding_rate, patch.funding_rate),
            (&mut self.funding_rate_ema, patch.funding_rate_ema),
            (&mut self.drift_coefficient, patch.drift_coefficient),
            (&mut self.principal_floor, patch.principal_floor),
            (&mut self.spot_quantity, patch.spot_quantity),
            (&mut self.perp_quantity, patch.perp_quantity),
            (&mut self.perp_entry_price, patch.perp_entry_price),
            (&mut self.perp_margin, patch.perp_margin),
        ];
        for (field, value) in fields {
            if let Some(value) = value {
                *field = value;
            }
        }

        if patch.last_valued_at.is_some() {
            self.last_valued_at = patch.last_valued_at;
        }
        self.updated_at = now;
    }

    #[must_use]
    pub fn legs(&self) -> VaultLegs {
        VaultLegs {
            spot_quantity: self.spot_quantity,
            perp_quantity: self.perp_quantity,
            perp_entry_price: self.perp_entry_price,
            perp_margin: self.perp_margin,
        }
    }
}

/// A user deposit that has not been entered yet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPosition {
    pub user_id: String,
    pub pair_id: String,
    pub vault_address: VaultAddress,
    pub strategy_id: i32,
    pub principal: Decimal,
}

impl NewPosition {
    /// Builds the `pending_entry` row for this deposit.
    #[must_use]
    pub fn into_position(self, now: DateTime<Utc>) -> Position {
        Position {
            id: Uuid::new_v4(),
            user_id: self.user_id,
            pair_id: self.pair_id,
            vault_address: self.vault_address,
            strategy_id: self.strategy_id,
            status: PositionStatus::PendingEntry,
            principal: self.principal,
            spot_value: Decimal::ZERO,
            perp_value: Decimal::ZERO,
            entry_price: Decimal::ZERO,
            current_price: Decimal::ZERO,
            funding_rate: Decimal::ZERO,
            funding_rate_ema: Decimal::ZERO,
            drift_coefficient: Decimal::ZERO,
            principal_floor: Decimal::ZERO,
            spot_quantity: Decimal::ZERO,
            perp_quantity: Decimal::ZERO,
            perp_entry_price: Decimal::ZERO,
            perp_margin: Decimal::ZERO,
            last_rebalance_at: None,
            last_valued_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Leg holdings of a vault, as recorded by the keeper or observed on-ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultLegs {
    pub spot_quantity: Decimal,
    /// Size of the short derivative leg.
    pub perp_quantity: Decimal,
    pub perp_entry_price: Decimal,
    /// Collateral posted for the derivative leg.
    pub perp_margin: Decimal,
}

/// Partial update for a position. `None` fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PositionPatch {
    pub status: Option<StatusChange>,
    pub spot_value: Option<Decimal>,
    pub perp_value: Option<Decimal>,
    pub entry_price: Option<Decimal>,
    pub current_price: Option<Decimal>,
    pub funding_rate: Option<Decimal>,
    pub funding_rate_ema: Option<Decimal>,
    pub drift_coefficient: Option<Decimal>,
    pub principal_floor: Option<Decimal>,
    pub spot_quantity: Option<Decimal>,
    pub perp_quantity: Option<Decimal>,
    pub perp_entry_price: Option<Decimal>,
    pub perp_margin: Option<Decimal>,
    pub last_valued_at: Option<DateTime<Utc>>,
}

impl PositionPatch {
    #[must_use]
    pub fn transition(change: StatusChange) -> Self {
        Self {
            status: Some(change),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_legs(mut self, legs: VaultLegs) -> Self {
        self.spot_quantity = Some(legs.spot_quantity);
        self.perp_quantity = Some(legs.perp_quantity);
        self.perp_entry_price = Some(legs.perp_entry_price);
        self.perp_margin = Some(legs.perp_margin);
        self
    }

    /// Checks the patch against the status the writer expects to find.
    ///
    /// # Errors
    /// Returns an error if the patch carries a status change whose origin is
    /// not the expected status.
    pub fn check_guard(&self, expected: PositionStatus) -> anyhow::Result<()> {
        if let Some(change) = self.status {
            if change.from() != expected {
                anyhow::bail!(
                    "status change {} -> {} does not match guard {}",
                    change.from(),
                    change.to(),
                    expected
                );
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionFilter {
    /// Empty means any status.
    pub statuses: Vec<PositionStatus>,
    pub vault_address: Option<VaultAddress>,
    pub pair_id: Option<String>,
}

impl PositionFilter {
    #[must_use]
    pub fn with_status(statuses: &[PositionStatus]) -> Self {
        Self {
            statuses: statuses.to_vec(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn matches(&self, position: &Position) -> bool {
        (self.statuses.is_empty() || self.statuses.contains(&position.status))
            && self
                .vault_address
                .map_or(true, |vault| vault == position.vault_address)
            && self
                .pair_id
                .as_deref()
                .map_or(true, |pair| pair == position.pair_id)
    }
}
