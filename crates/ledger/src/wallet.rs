use anyhow::{Context, Result};
use ethers::signers::{LocalWallet, Signer};
use ethers::utils::to_checksum;
use std::collections::HashMap;
use std::str::FromStr;
use vault_keeper_core::{LedgerConfig, VaultAddress};

/// Create wallet from private key (with or without 0x prefix)
///
/// # Errors
/// Returns error if private key format is invalid
pub fn create_wallet_from_private_key(private_key: &str) -> Result<LocalWallet> {
    let key = private_key.trim();
    let key = key.strip_prefix("0x").unwrap_or(key);

    LocalWallet::from_str(key).context("Failed to create wallet from private key")
}

/// Load wallet from the named environment variable
///
/// # Errors
/// Returns error if the variable is missing or holds an invalid key
pub fn load_wallet_from_env(var: &str) -> Result<LocalWallet> {
    let private_key = std::env::var(var).with_context(|| format!("Missing {var} env var"))?;

    create_wallet_from_private_key(&private_key).with_context(|| format!("Invalid key in {var}"))
}

/// Checksummed address of a wallet; this is the account the ledger tracks
/// sequence numbers for.
#[must_use]
pub fn wallet_address(wallet: &LocalWallet) -> String {
    to_checksum(&wallet.address(), None)
}

/// Controlling wallets keyed by vault.
///
/// Vaults without their own entry are controlled by the default keeper
/// wallet, if one is configured.
#[derive(Debug, Clone, Default)]
pub struct WalletRegistry {
    default_wallet: Option<LocalWallet>,
    vault_wallets: HashMap<VaultAddress, LocalWallet>,
}

impl WalletRegistry {
    #[must_use]
    pub fn new(default_wallet: Option<LocalWallet>) -> Self {
        Self {
            default_wallet,
            vault_wallets: HashMap::new(),
        }
    }

    /// Loads the default wallet and every per-vault override.
    ///
    /// A missing default key is tolerated so a keeper can run for vaults
    /// that all have their own wallets; a malformed key is not.
    ///
    /// # Errors
    /// Returns error if a vault address or any configured key is invalid, or
    /// a per-vault key variable is unset.
    pub fn from_config(config: &LedgerConfig) -> Result<Self> {
        let default_wallet = match std::env::var(&config.keeper_key_env) {
            Ok(key) => Some(
                create_wallet_from_private_key(&key)
                    .with_context(|| format!("Invalid key in {}", config.keeper_key_env))?,
            ),
            Err(_) => {
                tracing::warn!(
                    env = %config.keeper_key_env,
                    "default keeper wallet not configured; only vaults with their own wallet can be instructed"
                );
                None
            }
        };

        let mut registry = Self::new(default_wallet);
        for entry in &config.vault_wallets {
            let vault = VaultAddress::parse(&entry.vault)
                .with_context(|| format!("Invalid vault address in ledger.vault_wallets: {}", entry.vault))?;
            let wallet = load_wallet_from_env(&entry.key_env)?;
            registry.insert(vault, wallet);
        }

        tracing::info!(
            default = ?registry.default_wallet.as_ref().map(wallet_address),
            vault_wallets = registry.vault_wallets.len(),
            "wallet registry loaded"
        );
        Ok(registry)
    }

    pub fn insert(&mut self, vault: VaultAddress, wallet: LocalWallet) {
        self.vault_wallets.insert(vault, wallet);
    }

    #[must_use]
    pub fn wallet_for(&self, vault: &VaultAddress) -> Option<&LocalWallet> {
        self.vault_wallets
            .get(vault)
            .or(self.default_wallet.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Well-known development keys; never funded.
    const KEY_A: &str =
        "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcad7f60ebb7c58f8b";
    const KEY_B: &str =
        "59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d";

    #[test]
    fn test_create_wallet_with_and_without_prefix() {
        let a = create_wallet_from_private_key(KEY_A).unwrap();
        let b = create_wallet_from_private_key(KEY_B).unwrap();
        assert_eq!(
            wallet_address(&a),
            "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"
        );
        assert_ne!(a.address(), b.address());
    }

    #[test]
    fn test_invalid_key_is_rejected() {
        assert!(create_wallet_from_private_key("not-a-key").is_err());
    }

    #[test]
    fn test_vault_override_wins_over_default() {
        let default = create_wallet_from_private_key(KEY_A).unwrap();
        let own = create_wallet_from_private_key(KEY_B).unwrap();
        let vault = VaultAddress::new(0, [9u8; 32]);
        let other = VaultAddress::new(0, [8u8; 32]);

        let mut registry = WalletRegistry::new(Some(default.clone()));
        registry.insert(vault, own.clone());

        assert_eq!(registry.wallet_for(&vault).unwrap().address(), own.address());
        assert_eq!(
            registry.wallet_for(&other).unwrap().address(),
            default.address()
        );
        assert!(WalletRegistry::default().wallet_for(&vault).is_none());
    }
}
