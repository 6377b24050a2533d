//! Transitions originated outside the keeper loop: user deposits and exit
//! confirmations.

use rust_decimal::Decimal;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;
use vault_keeper_core::{
    AuditLogEntry, KeeperStore, NewPosition, Position, PositionPatch, PositionStatus,
    StatusChange, TransactionKind, TransactionRecord, TransactionStatus, TransitionError,
};

const COMPONENT: &str = "PositionService";

#[derive(Debug, Error)]
pub enum PositionError {
    #[error("position {0} not found")]
    NotFound(Uuid),

    #[error(transparent)]
    InvalidTransition(#[from] TransitionError),

    /// The row changed between read and guarded write.
    #[error("position {0} was modified concurrently")]
    Conflict(Uuid),

    #[error("invalid deposit: {0}")]
    InvalidDeposit(String),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

pub struct PositionService {
    store: Arc<dyn KeeperStore>,
}

impl PositionService {
    #[must_use]
    pub fn new(store: Arc<dyn KeeperStore>) -> Self {
        Self { store }
    }

    /// Records a user deposit as a `pending_entry` position.
    ///
    /// # Errors
    /// Returns [`PositionError::InvalidDeposit`] for a non-positive principal
    /// or a blank user or pair.
    pub async fn deposit(&self, new: NewPosition) -> Result<Position, PositionError> {
        if new.principal <= Decimal::ZERO {
            return Err(PositionError::InvalidDeposit(format!(
                "principal must be positive, got {}",
                new.principal
            )));
        }
        if new.user_id.trim().is_empty() || new.pair_id.trim().is_empty() {
            return Err(PositionError::InvalidDeposit(
                "user and pair are required".to_string(),
            ));
        }

        let position = self.store.create_position(new).await?;
        self.store
            .append_audit_log(
                &AuditLogEntry::info(COMPONENT, "DEPOSIT_RECORDED")
                    .for_position(&position)
                    .with_detail(serde_json::json!({ "principal": position.principal })),
            )
            .await?;
        info!(position_id = %position.id, vault = %position.vault_address, "Deposit recorded");
        Ok(position)
    }

    /// User-confirmed exit: `active`, `stasis` or `emergency` to
    /// `processing_exit`.
    ///
    /// # Errors
    /// Fails if the position is missing, its status has no edge to
    /// `processing_exit`, or it changed concurrently.
    pub async fn confirm_exit(&self, id: Uuid) -> Result<Position, PositionError> {
        let current = self.load(id).await?;
        let audit = AuditLogEntry::info(COMPONENT, "EXIT_CONFIRMED")
            .for_position(&current)
            .with_detail(serde_json::json!({ "from": current.status }));
        self.transition(&current, PositionStatus::ProcessingExit, &[], &audit)
            .await
    }

    /// Settled exit: `processing_exit` to `closed`, recording realized PnL.
    ///
    /// # Errors
    /// Same as [`Self::confirm_exit`].
    pub async fn confirm_closed(&self, id: Uuid) -> Result<Position, PositionError> {
        let current = self.load(id).await?;
        let realized = current.total_equity() - current.principal;
        let exit_tx = TransactionRecord::new(id, TransactionKind::Exit, TransactionStatus::Success)
            .with_pnl(realized);
        let audit = AuditLogEntry::info(COMPONENT, "POSITION_CLOSED")
            .for_position(&current)
            .with_detail(serde_json::json!({
                "total_equity": current.total_equity(),
                "realized_pnl": realized,
            }));

        let position = self
            .transition(&current, PositionStatus::Closed, &[exit_tx], &audit)
            .await?;
        info!(position_id = %position.id, %realized, "Position closed");
        Ok(position)
    }

    async fn load(&self, id: Uuid) -> Result<Position, PositionError> {
        self.store
            .get_position(id)
            .await?
            .ok_or(PositionError::NotFound(id))
    }

    async fn transition(
        &self,
        current: &Position,
        to: PositionStatus,
        transactions: &[TransactionRecord],
        audit: &AuditLogEntry,
    ) -> Result<Position, PositionError> {
        let change = StatusChange::new(current.status, to)?;
        self.store
            .transition_position(
                current.id,
                current.status,
                &PositionPatch::transition(change),
                transactions,
                audit,
            )
            .await?
            .ok_or(PositionError::Conflict(current.id))
    }
}
