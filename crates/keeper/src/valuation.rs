//! Marks live positions to market.
//!
//! Refreshes leg values, equity inputs, current price, funding rate and its
//! EMA, and the drift coefficient. Makes no rebalance or status decision.

use anyhow::Result;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, warn};
use vault_keeper_core::math::{drift_coefficient, mark_legs, update_ema};
use vault_keeper_core::{Position, PositionPatch, PositionStatus};
use vault_keeper_scheduler::JobReport;

use crate::context::KeeperContext;
use crate::pass::{process_all, Outcome};

const COMPONENT: &str = "ValuationProcessor";

pub struct ValuationProcessor {
    ctx: Arc<KeeperContext>,
}

impl ValuationProcessor {
    #[must_use]
    pub fn new(ctx: Arc<KeeperContext>) -> Self {
        Self { ctx }
    }

    pub async fn run_pass(&self) -> Result<JobReport> {
        let positions = self
            .ctx
            .candidates(&[PositionStatus::Active, PositionStatus::Stasis])
            .await?;
        process_all("valuation", positions, self.ctx.max_concurrency, |p| self.value(p)).await
    }

    async fn value(&self, position: Position) -> Result<Outcome> {
        let Some(quote) = self.ctx.quote_for(COMPONENT, &position).await? else {
            return Ok(Outcome::Skipped);
        };

        // Legs change on-ledger when a rebalance lands.
        let observed = match self.ctx.vault_legs(&position).await {
            Ok(legs) => legs,
            Err(e) => {
                warn!(position_id = %position.id, error = %e, "Vault legs unavailable, using recorded legs");
                None
            }
        };
        let legs = observed.unwrap_or_else(|| position.legs());

        let (spot_value, perp_value) = mark_legs(&legs, &quote);
        let ema = update_ema(position.funding_rate_ema, quote.funding_rate, self.ctx.ema_alpha);

        let mut patch = PositionPatch {
            spot_value: Some(spot_value),
            perp_value: Some(perp_value),
            current_price: Some(quote.spot_price),
            funding_rate: Some(quote.funding_rate),
            funding_rate_ema: Some(ema),
            drift_coefficient: Some(drift_coefficient(spot_value, perp_value)),
            last_valued_at: Some(Utc::now()),
            ..PositionPatch::default()
        };
        if let Some(legs) = observed {
            patch = patch.with_legs(legs);
        }

        match self
            .ctx
            .store
            .update_position(position.id, position.status, &patch)
            .await?
        {
            Some(valued) => {
                debug!(
                    component = COMPONENT,
                    position_id = %valued.id,
                    total_equity = %valued.total_equity(),
                    funding_rate_ema = %valued.funding_rate_ema,
                    drift = %valued.drift_coefficient,
                    "Position valued"
                );
                Ok(Outcome::Updated)
            }
            None => {
                debug!(position_id = %position.id, "Status changed during valuation, skipping");
                Ok(Outcome::Skipped)
            }
        }
    }
}
