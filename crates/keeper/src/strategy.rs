//! Funding-regime switching between `active` and `stasis`.
//!
//! Two bands on the smoothed funding rate: a position enters stasis when the
//! EMA drops below `stasis_enter_rate` and resumes once it is back at or
//! above `stasis_resume_rate` with equity at or above its floor. The gap
//! between the bands keeps a noisy EMA from flapping the status.

use anyhow::Result;
use std::sync::Arc;
use tracing::debug;
use vault_keeper_core::{
    AuditLogEntry, Position, PositionPatch, PositionStatus, StatusChange,
};
use vault_keeper_scheduler::JobReport;

use crate::context::KeeperContext;
use crate::pass::{process_all, Outcome};

const COMPONENT: &str = "StrategyStateMachine";

pub struct StrategyStateMachine {
    ctx: Arc<KeeperContext>,
}

impl StrategyStateMachine {
    #[must_use]
    pub fn new(ctx: Arc<KeeperContext>) -> Self {
        Self { ctx }
    }

    pub async fn run_pass(&self) -> Result<JobReport> {
        let positions = self
            .ctx
            .candidates(&[PositionStatus::Active, PositionStatus::Stasis])
            .await?;
        process_all("strategy", positions, self.ctx.max_concurrency, |p| self.evaluate(p)).await
    }

    /// Target status for `position`, if it should change.
    fn decide(&self, position: &Position) -> Option<(PositionStatus, &'static str)> {
        let bands = &self.ctx.strategy;
        let ema = position.funding_rate_ema;
        match position.status {
            PositionStatus::Active if ema < bands.stasis_enter_rate => {
                Some((PositionStatus::Stasis, "STASIS_ENTERED"))
            }
            PositionStatus::Stasis
                if ema >= bands.stasis_resume_rate
                    && position.total_equity() >= position.principal_floor =>
            {
                Some((PositionStatus::Active, "STASIS_RESUMED"))
            }
            _ => None,
        }
    }

    async fn evaluate(&self, position: Position) -> Result<Outcome> {
        let Some((target, action)) = self.decide(&position) else {
            return Ok(Outcome::Skipped);
        };

        let patch = PositionPatch::transition(StatusChange::new(position.status, target)?);
        let audit = AuditLogEntry::info(COMPONENT, action)
            .for_position(&position)
            .with_detail(serde_json::json!({
                "from": position.status,
                "to": target,
                "funding_rate_ema": position.funding_rate_ema,
                "stasis_enter_rate": self.ctx.strategy.stasis_enter_rate,
                "stasis_resume_rate": self.ctx.strategy.stasis_resume_rate,
            }));
        if self.ctx.commit(&position, &patch, &[], audit).await?.is_none() {
            debug!(position_id = %position.id, "Status changed before regime switch");
            return Ok(Outcome::Skipped);
        }
        Ok(Outcome::Updated)
    }
}
