//! Principal floor enforcement and the forced-exit flow.
//!
//! A live position whose equity falls below `floor * (1 - tolerance)` goes
//! to `emergency` in the same pass, with an ERROR audit row whose action
//! contains `PANIC`. Emergency positions are never healed back to active;
//! with `auto_forced_exit` they are sent an exit message every pass until
//! the ledger accepts one, and then move to `processing_exit`.

use anyhow::{anyhow, Result};
use std::sync::Arc;
use tracing::{debug, warn};
use vault_keeper_core::math::breach_threshold;
use vault_keeper_core::{
    AuditLogEntry, Position, PositionPatch, PositionStatus, StatusChange, TransactionKind,
    TransactionRecord, TransactionStatus,
};
use vault_keeper_scheduler::JobReport;

use crate::context::KeeperContext;
use crate::pass::{process_all, Outcome};

const COMPONENT: &str = "SafetyGuard";

pub struct SafetyGuard {
    ctx: Arc<KeeperContext>,
}

impl SafetyGuard {
    #[must_use]
    pub fn new(ctx: Arc<KeeperContext>) -> Self {
        Self { ctx }
    }

    pub async fn run_pass(&self) -> Result<JobReport> {
        let positions = self
            .ctx
            .candidates(&[
                PositionStatus::Active,
                PositionStatus::Stasis,
                PositionStatus::Emergency,
            ])
            .await?;
        process_all("safety-check", positions, self.ctx.max_concurrency, |p| self.check(p)).await
    }

    async fn check(&self, position: Position) -> Result<Outcome> {
        match position.status {
            PositionStatus::Emergency if self.ctx.strategy.auto_forced_exit => {
                self.force_exit(&position).await
            }
            PositionStatus::Emergency => Ok(Outcome::Skipped),
            _ => self.check_floor(position).await,
        }
    }

    async fn check_floor(&self, position: Position) -> Result<Outcome> {
        let equity = position.total_equity();
        let tolerance = self.ctx.strategy.floor_tolerance;
        let threshold = breach_threshold(position.principal_floor, tolerance);

        if equity >= threshold {
            if equity < position.principal_floor {
                warn!(
                    position_id = %position.id,
                    %equity,
                    floor = %position.principal_floor,
                    "Equity below principal floor within tolerance"
                );
            }
            return Ok(Outcome::Skipped);
        }

        let patch = PositionPatch::transition(StatusChange::new(
            position.status,
            PositionStatus::Emergency,
        )?);
        let audit = AuditLogEntry::error(COMPONENT, "PANIC_PRINCIPAL_FLOOR_BREACH")
            .for_position(&position)
            .with_detail(serde_json::json!({
                "from": position.status,
                "total_equity": equity,
                "principal_floor": position.principal_floor,
                "tolerance": tolerance,
                "threshold": threshold,
            }));
        let Some(breached) = self.ctx.commit(&position, &patch, &[], audit).await? else {
            debug!(position_id = %position.id, "Status changed before emergency transition");
            return Ok(Outcome::Skipped);
        };

        if self.ctx.strategy.auto_forced_exit {
            // The transition already happened; a failed exit is retried from
            // emergency on the next pass.
            if let Err(e) = self.force_exit(&breached).await {
                warn!(position_id = %breached.id, error = %format!("{e:#}"), "Forced exit deferred");
            }
        }
        Ok(Outcome::Updated)
    }

    async fn force_exit(&self, position: &Position) -> Result<Outcome> {
        if self.ctx.gateway.is_disabled(&position.vault_address) {
            debug!(position_id = %position.id, "Vault disabled, forced exit needs operator");
            return Ok(Outcome::Skipped);
        }

        let receipt = match self
            .ctx
            .gateway
            .trigger_exit(&position.vault_address, position.strategy_id)
            .await
        {
            Ok(receipt) => receipt,
            Err(e) if e.is_permanent() => {
                self.ctx
                    .audit(
                        AuditLogEntry::error(COMPONENT, "FORCED_EXIT_FAILED")
                            .for_position(position)
                            .with_detail(serde_json::json!({ "error": e.to_string() })),
                    )
                    .await?;
                return Err(anyhow!(e));
            }
            Err(e) => return Err(anyhow!(e).context("forced exit not sent")),
        };

        let patch = PositionPatch::transition(StatusChange::new(
            PositionStatus::Emergency,
            PositionStatus::ProcessingExit,
        )?);
        let exit_tx = TransactionRecord::new(position.id, TransactionKind::Exit, TransactionStatus::Submitted)
            .with_tx_hash(receipt.message_hash.clone());
        let audit = AuditLogEntry::warn(COMPONENT, "FORCED_EXIT_REQUESTED")
            .for_position(position)
            .with_detail(serde_json::json!({
                "seqno": receipt.seqno,
                "message_hash": receipt.message_hash,
                "total_equity": position.total_equity(),
            }));
        if self.ctx.commit(position, &patch, &[exit_tx], audit).await?.is_none() {
            debug!(position_id = %position.id, "Position left emergency before exit was recorded");
            return Ok(Outcome::Skipped);
        }
        Ok(Outcome::Updated)
    }
}
