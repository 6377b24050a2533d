//! Vault rebalance gateway.
//!
//! Wraps a [`LedgerClient`] with vault message encoding and the one ordering
//! constraint of the system: a controlling wallet has a single sequence
//! number, so at most one message per wallet may be in flight. Sends for the
//! same wallet queue on an async mutex; sends for different wallets proceed
//! in parallel.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex as AsyncMutex;
use vault_keeper_core::{LedgerClient, LedgerError, SubmitReceipt, VaultAddress};

use crate::message::{OpCode, VaultInstruction};
use crate::signing::sign_vault_message;
use crate::wallet::{wallet_address, WalletRegistry};

/// How long an accepted message may stay unlanded before its sequence
/// number is considered free again. Unlanded messages expire on-ledger.
pub const DEFAULT_PENDING_TTL: Duration = Duration::from_secs(60);

#[derive(Debug, Default)]
struct WalletSlot {
    /// Sequence number consumed by the last accepted message, and when.
    last_submitted: Option<(u64, Instant)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisabledVault {
    pub vault: VaultAddress,
    pub reason: String,
}

pub struct VaultRebalanceGateway {
    ledger: Arc<dyn LedgerClient>,
    wallets: WalletRegistry,
    message_value: u64,
    call_timeout: Duration,
    pending_ttl: Duration,
    slots: Mutex<HashMap<String, Arc<AsyncMutex<WalletSlot>>>>,
    disabled: Mutex<HashMap<VaultAddress, String>>,
}

impl VaultRebalanceGateway {
    #[must_use]
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        wallets: WalletRegistry,
        message_value: u64,
        call_timeout: Duration,
    ) -> Self {
        Self {
            ledger,
            wallets,
            message_value,
            call_timeout,
            pending_ttl: DEFAULT_PENDING_TTL,
            slots: Mutex::new(HashMap::new()),
            disabled: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn with_pending_ttl(mut self, pending_ttl: Duration) -> Self {
        self.pending_ttl = pending_ttl;
        self
    }

    /// Instructs the vault to re-balance its legs under `strategy_id`.
    ///
    /// # Errors
    /// Returns [`LedgerError`] if the vault is disabled, the wallet's
    /// previous message is still pending, or the ledger rejects the message.
    pub async fn trigger_rebalance(
        &self,
        vault: &VaultAddress,
        strategy_id: i32,
    ) -> Result<SubmitReceipt, LedgerError> {
        self.send(vault, OpCode::Rebalance, strategy_id).await
    }

    /// Instructs the vault to unwind both legs.
    ///
    /// # Errors
    /// Same as [`Self::trigger_rebalance`].
    pub async fn trigger_exit(
        &self,
        vault: &VaultAddress,
        strategy_id: i32,
    ) -> Result<SubmitReceipt, LedgerError> {
        self.send(vault, OpCode::Exit, strategy_id).await
    }

    #[must_use]
    pub fn is_disabled(&self, vault: &VaultAddress) -> bool {
        self.disabled.lock().contains_key(vault)
    }

    /// Re-enables a vault after its configuration was corrected. Returns
    /// false if it was not disabled.
    pub fn enable(&self, vault: &VaultAddress) -> bool {
        let removed = self.disabled.lock().remove(vault).is_some();
        if removed {
            tracing::info!(%vault, "vault re-enabled");
        }
        removed
    }

    #[must_use]
    pub fn disabled_vaults(&self) -> Vec<DisabledVault> {
        let mut vaults: Vec<DisabledVault> = self
            .disabled
            .lock()
            .iter()
            .map(|(vault, reason)| DisabledVault {
                vault: *vault,
                reason: reason.clone(),
            })
            .collect();
        vaults.sort_by_key(|d| d.vault);
        vaults
    }

    async fn send(
        &self,
        vault: &VaultAddress,
        op: OpCode,
        strategy_id: i32,
    ) -> Result<SubmitReceipt, LedgerError> {
        let result = self.send_inner(vault, op, strategy_id).await;
        if let Err(err) = &result {
            if err.is_permanent() && !matches!(err, LedgerError::VaultDisabled(_)) {
                tracing::error!(%vault, %op, error = %err, "disabling vault after permanent failure");
                self.disabled.lock().insert(*vault, err.to_string());
            }
        }
        result
    }

    async fn send_inner(
        &self,
        vault: &VaultAddress,
        op: OpCode,
        strategy_id: i32,
    ) -> Result<SubmitReceipt, LedgerError> {
        if self.is_disabled(vault) {
            return Err(LedgerError::VaultDisabled(*vault));
        }

        let wallet = self
            .wallets
            .wallet_for(vault)
            .ok_or_else(|| LedgerError::unauthorized("unconfigured", vault.to_raw()))?;
        let address = wallet_address(wallet);

        let slot = self.slot(&address);
        let mut slot = slot.lock().await;

        let seqno = self
            .bounded(self.ledger.get_sequence_number(&address))
            .await?;

        if let Some((pending, at)) = slot.last_submitted {
            if seqno <= pending && at.elapsed() < self.pending_ttl {
                return Err(LedgerError::SequencePending {
                    wallet: address,
                    seqno: pending,
                });
            }
        }

        let body = VaultInstruction::new(op, seqno, strategy_id).encode();
        let message = sign_vault_message(wallet, vault, seqno, &body)
            .await
            .map_err(|e| LedgerError::Rejected(format!("signing failed: {e}")))?;

        let result = self
            .bounded(
                self.ledger
                    .submit_signed_message(&address, &message, self.message_value),
            )
            .await;

        match &result {
            Ok(receipt) => {
                slot.last_submitted = Some((seqno, Instant::now()));
                tracing::info!(
                    %vault,
                    %op,
                    wallet = %address,
                    seqno,
                    hash = %receipt.message_hash,
                    "vault message accepted"
                );
            }
            // The message may have been accepted before the deadline.
            Err(LedgerError::Timeout(_)) => {
                slot.last_submitted = Some((seqno, Instant::now()));
            }
            Err(_) => {}
        }
        result
    }

    fn slot(&self, wallet: &str) -> Arc<AsyncMutex<WalletSlot>> {
        self.slots
            .lock()
            .entry(wallet.to_string())
            .or_default()
            .clone()
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, LedgerError>>,
    ) -> Result<T, LedgerError> {
        tokio::time::timeout(self.call_timeout, call)
            .await
            .unwrap_or(Err(LedgerError::Timeout(self.call_timeout)))
    }
}
