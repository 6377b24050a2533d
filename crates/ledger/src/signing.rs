use anyhow::{Context, Result};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, Signature};
use ethers::utils::keccak256;
use std::str::FromStr;
use vault_keeper_core::{SignedMessage, VaultAddress};

/// Bytes covered by the signature: `vault (36) | seqno (8, BE) | body`.
///
/// Binding the vault and sequence number into the signed bytes stops a
/// message from being replayed against another vault or a later seqno.
#[must_use]
pub fn signing_bytes(vault: &VaultAddress, seqno: u64, body: &[u8]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(36 + 8 + body.len());
    bytes.extend_from_slice(&vault.to_bytes());
    bytes.extend_from_slice(&seqno.to_be_bytes());
    bytes.extend_from_slice(body);
    bytes
}

/// Sign a vault instruction body for `seqno`
///
/// # Errors
/// Returns error if signing fails
pub async fn sign_vault_message(
    wallet: &LocalWallet,
    vault: &VaultAddress,
    seqno: u64,
    body: &[u8],
) -> Result<SignedMessage> {
    let bytes = signing_bytes(vault, seqno, body);
    let signature = wallet.sign_message(&bytes).await?;

    Ok(SignedMessage {
        vault: *vault,
        seqno,
        payload: hex::encode(body),
        signature: signature_to_hex(&signature),
    })
}

/// Checks that `message` was signed by `signer`.
///
/// # Errors
/// Returns error if the payload or signature cannot be decoded, or the
/// signature does not recover to `signer`.
pub fn verify_vault_message(message: &SignedMessage, signer: Address) -> Result<()> {
    let body = hex::decode(&message.payload).context("payload is not hex")?;
    let signature = Signature::from_str(&message.signature).context("malformed signature")?;
    let bytes = signing_bytes(&message.vault, message.seqno, &body);
    signature
        .verify(bytes, signer)
        .context("signature does not match wallet")?;
    Ok(())
}

/// Local identifier of a signed message, used when the network does not
/// return one.
#[must_use]
pub fn message_hash(message: &SignedMessage) -> String {
    let mut bytes = message.signature.as_bytes().to_vec();
    bytes.extend_from_slice(&message.seqno.to_be_bytes());
    format!("0x{}", hex::encode(keccak256(bytes)))
}

/// Convert signature to hex string
#[must_use]
pub fn signature_to_hex(signature: &Signature) -> String {
    format!("0x{}", hex::encode(signature.to_vec()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::create_wallet_from_private_key;

    const KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcad7f60ebb7c58f8b";

    #[tokio::test]
    async fn test_signed_message_verifies() {
        let wallet = create_wallet_from_private_key(KEY).unwrap();
        let vault = VaultAddress::new(0, [1u8; 32]);

        let message = sign_vault_message(&wallet, &vault, 3, b"body").await.unwrap();
        assert_eq!(message.payload, hex::encode(b"body"));
        assert!(message.signature.starts_with("0x"));
        verify_vault_message(&message, wallet.address()).unwrap();
    }

    #[tokio::test]
    async fn test_signature_is_bound_to_vault_and_seqno() {
        let wallet = create_wallet_from_private_key(KEY).unwrap();
        let vault = VaultAddress::new(0, [1u8; 32]);
        let message = sign_vault_message(&wallet, &vault, 3, b"body").await.unwrap();

        let replayed = SignedMessage {
            seqno: 4,
            ..message.clone()
        };
        assert!(verify_vault_message(&replayed, wallet.address()).is_err());

        let other_vault = SignedMessage {
            vault: VaultAddress::new(0, [2u8; 32]),
            ..message
        };
        assert!(verify_vault_message(&other_vault, wallet.address()).is_err());
    }
}
