//! Moves fresh deposits from `pending_entry` to `active`.

use anyhow::Result;
use chrono::Utc;
use std::sync::Arc;
use tracing::debug;
use vault_keeper_core::math::{drift_coefficient, initial_legs, principal_floor};
use vault_keeper_core::{
    AuditLogEntry, Position, PositionPatch, PositionStatus, StatusChange, TransactionKind,
    TransactionRecord, TransactionStatus,
};
use vault_keeper_scheduler::JobReport;

use crate::context::KeeperContext;
use crate::pass::{process_all, Outcome};

const COMPONENT: &str = "EntryProcessor";

pub struct EntryProcessor {
    ctx: Arc<KeeperContext>,
}

impl EntryProcessor {
    #[must_use]
    pub fn new(ctx: Arc<KeeperContext>) -> Self {
        Self { ctx }
    }

    pub async fn run_pass(&self) -> Result<JobReport> {
        let positions = self.ctx.candidates(&[PositionStatus::PendingEntry]).await?;
        process_all("entry", positions, self.ctx.max_concurrency, |p| self.enter(p)).await
    }

    async fn enter(&self, position: Position) -> Result<Outcome> {
        let Some(quote) = self.ctx.quote_for(COMPONENT, &position).await? else {
            return Ok(Outcome::Skipped);
        };

        let strategy = &self.ctx.strategy;
        let legs = initial_legs(position.principal, strategy.target_hedge_ratio, &quote);
        // Freshly sized legs mark at exactly the principal.
        let perp_value = legs.perp_margin;
        let spot_value = position.principal - perp_value;
        let floor = principal_floor(position.principal, strategy.principal_retained_fraction);

        let patch = PositionPatch {
            status: Some(StatusChange::new(PositionStatus::PendingEntry, PositionStatus::Active)?),
            spot_value: Some(spot_value),
            perp_value: Some(perp_value),
            entry_price: Some(quote.spot_price),
            current_price: Some(quote.spot_price),
            funding_rate: Some(quote.funding_rate),
            funding_rate_ema: Some(quote.funding_rate),
            drift_coefficient: Some(drift_coefficient(spot_value, perp_value)),
            principal_floor: Some(floor),
            last_valued_at: Some(Utc::now()),
            ..PositionPatch::default()
        }
        .with_legs(legs);

        let fees = position.principal * strategy.entry_fee_rate;
        let entry_tx = TransactionRecord::new(position.id, TransactionKind::Entry, TransactionStatus::Success)
            .with_fees(fees);
        let audit = AuditLogEntry::info(COMPONENT, "ENTRY_ACTIVATED")
            .for_position(&position)
            .with_detail(serde_json::json!({
                "principal": position.principal,
                "entry_price": quote.spot_price,
                "spot_value": spot_value,
                "perp_value": perp_value,
                "principal_floor": floor,
                "fees_paid": fees,
            }));

        if self.ctx.commit(&position, &patch, &[entry_tx], audit).await?.is_none() {
            debug!(position_id = %position.id, "Position already entered");
            return Ok(Outcome::Skipped);
        }

        Ok(Outcome::Updated)
    }
}
