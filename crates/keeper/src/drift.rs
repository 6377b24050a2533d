//! Requests an on-ledger rebalance for active positions whose hedge drifted.

use anyhow::{anyhow, Result};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, warn};
use vault_keeper_core::math::drift_coefficient;
use vault_keeper_core::{
    AuditLogEntry, LedgerError, Position, PositionStatus, TransactionKind, TransactionRecord,
    TransactionStatus,
};
use vault_keeper_scheduler::JobReport;

use crate::context::KeeperContext;
use crate::pass::{process_all, Outcome};

const COMPONENT: &str = "DriftMonitor";

pub struct DriftMonitor {
    ctx: Arc<KeeperContext>,
}

impl DriftMonitor {
    #[must_use]
    pub fn new(ctx: Arc<KeeperContext>) -> Self {
        Self { ctx }
    }

    pub async fn run_pass(&self) -> Result<JobReport> {
        let positions = self.ctx.candidates(&[PositionStatus::Active]).await?;
        process_all("drift-monitor", positions, self.ctx.max_concurrency, |p| self.check(p)).await
    }

    async fn check(&self, position: Position) -> Result<Outcome> {
        let drift = drift_coefficient(position.spot_value, position.perp_value);
        let threshold = self.ctx.strategy.drift_threshold;
        if drift <= threshold {
            return Ok(Outcome::Skipped);
        }
        if self.ctx.gateway.is_disabled(&position.vault_address) {
            debug!(position_id = %position.id, vault = %position.vault_address, "Vault disabled, not rebalancing");
            return Ok(Outcome::Skipped);
        }

        // The claim stamps last_rebalance_at, so an overlapping pass sees the
        // cooldown and backs off.
        let claimed_at = Utc::now();
        let previous = position.last_rebalance_at;
        let claimed = self
            .ctx
            .store
            .claim_rebalance(position.id, claimed_at, self.ctx.strategy.rebalance_cooldown())
            .await?;
        if !claimed {
            debug!(position_id = %position.id, %drift, "Rebalance within cooldown");
            return Ok(Outcome::Skipped);
        }

        match self
            .ctx
            .gateway
            .trigger_rebalance(&position.vault_address, position.strategy_id)
            .await
        {
            Ok(receipt) => {
                self.ctx
                    .store
                    .append_transaction(
                        &TransactionRecord::new(
                            position.id,
                            TransactionKind::Rebalance,
                            TransactionStatus::Submitted,
                        )
                        .with_tx_hash(receipt.message_hash.clone()),
                    )
                    .await?;
                self.ctx
                    .audit(
                        AuditLogEntry::info(COMPONENT, "REBALANCE_TRIGGERED")
                            .for_position(&position)
                            .with_detail(serde_json::json!({
                                "drift": drift,
                                "threshold": threshold,
                                "seqno": receipt.seqno,
                                "message_hash": receipt.message_hash,
                            })),
                    )
                    .await?;
                Ok(Outcome::Updated)
            }
            Err(e) if e.may_have_landed() => {
                // Acceptance is unknown, so the claim holds for the cooldown.
                warn!(position_id = %position.id, error = %e, "Rebalance outcome unknown, keeping cooldown");
                self.ctx
                    .audit(
                        AuditLogEntry::warn(COMPONENT, "REBALANCE_UNCONFIRMED")
                            .for_position(&position)
                            .with_detail(serde_json::json!({
                                "drift": drift,
                                "error": e.to_string(),
                            })),
                    )
                    .await?;
                Err(anyhow!(e))
            }
            Err(e) => {
                self.ctx
                    .store
                    .release_rebalance_claim(position.id, claimed_at, previous)
                    .await?;
                self.on_send_failure(&position, e).await
            }
        }
    }

    async fn on_send_failure(&self, position: &Position, e: LedgerError) -> Result<Outcome> {
        match e {
            LedgerError::SequencePending { .. } => {
                debug!(position_id = %position.id, error = %e, "Wallet busy, rebalance deferred");
                Ok(Outcome::Skipped)
            }
            e if e.is_permanent() => {
                self.ctx
                    .audit(
                        AuditLogEntry::error(COMPONENT, "REBALANCE_DISABLED")
                            .for_position(position)
                            .with_detail(serde_json::json!({ "error": e.to_string() })),
                    )
                    .await?;
                Err(anyhow!(e))
            }
            e => {
                warn!(position_id = %position.id, error = %e, "Rebalance send failed, retrying next pass");
                Err(anyhow!(e))
            }
        }
    }
}
