//! HTTP adapter for the settlement network's account and message API.
//!
//! Endpoints, relative to `ledger.api_url`:
//! - `GET  /account/{wallet}/seqno`  -> `{ "seqno": u64 }`
//! - `POST /message`                 -> `{ "hash": str, "seqno": u64 }`
//! - `GET  /vault/{address}/legs`    -> leg holdings, 404 if unknown

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use vault_keeper_core::{LedgerClient, LedgerError, SignedMessage, SubmitReceipt, VaultAddress, VaultLegs};

use crate::client::{ApiClient, ApiError};

#[derive(Debug, Deserialize)]
struct SeqnoResponse {
    seqno: u64,
}

#[derive(Debug, Serialize)]
struct SubmitRequest<'a> {
    wallet: &'a str,
    vault: String,
    seqno: u64,
    payload: &'a str,
    signature: &'a str,
    value: String,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    hash: String,
    seqno: u64,
}

#[derive(Debug, Deserialize)]
struct LegsResponse {
    spot_quantity: Decimal,
    perp_quantity: Decimal,
    perp_entry_price: Decimal,
    perp_margin: Decimal,
}

pub struct HttpLedgerClient {
    client: ApiClient,
}

impl HttpLedgerClient {
    #[must_use]
    pub const fn new(client: ApiClient) -> Self {
        Self { client }
    }

    fn classify(err: ApiError, wallet: &str, vault: Option<&VaultAddress>) -> LedgerError {
        if err.is_server_side() {
            return match err {
                ApiError::Timeout => LedgerError::Unavailable("request timed out".to_string()),
                other => LedgerError::Unavailable(other.to_string()),
            };
        }

        let vault_raw = vault.map(VaultAddress::to_raw).unwrap_or_default();
        match (err.code(), &err) {
            (Some("invalid_address"), _) => LedgerError::InvalidAddress(vault_raw),
            (Some("unauthorized"), _) | (_, ApiError::Status { status: 401 | 403, .. }) => {
                LedgerError::unauthorized(wallet, vault_raw)
            }
            (Some("seqno_mismatch"), _) => LedgerError::Rejected(format!(
                "sequence number already used by wallet {wallet}"
            )),
            _ => LedgerError::Rejected(err.to_string()),
        }
    }
}

#[async_trait]
impl LedgerClient for HttpLedgerClient {
    async fn get_sequence_number(&self, wallet: &str) -> Result<u64, LedgerError> {
        let response: SeqnoResponse = self
            .client
            .get(&format!("/account/{wallet}/seqno"))
            .await
            .map_err(|e| Self::classify(e, wallet, None))?;
        Ok(response.seqno)
    }

    async fn submit_signed_message(
        &self,
        wallet: &str,
        message: &SignedMessage,
        value: u64,
    ) -> Result<SubmitReceipt, LedgerError> {
        let request = SubmitRequest {
            wallet,
            vault: message.vault.to_raw(),
            seqno: message.seqno,
            payload: &message.payload,
            signature: &message.signature,
            value: value.to_string(),
        };

        let response: SubmitResponse = self
            .client
            .post("/message", &request)
            .await
            .map_err(|e| Self::classify(e, wallet, Some(&message.vault)))?;

        tracing::debug!(
            wallet,
            vault = %message.vault,
            seqno = response.seqno,
            hash = %response.hash,
            "message accepted"
        );

        Ok(SubmitReceipt {
            message_hash: response.hash,
            seqno: response.seqno,
        })
    }

    async fn get_vault_legs(&self, vault: &VaultAddress) -> Result<Option<VaultLegs>, LedgerError> {
        match self
            .client
            .get::<LegsResponse>(&format!("/vault/{}/legs", vault.to_raw()))
            .await
        {
            Ok(legs) => Ok(Some(VaultLegs {
                spot_quantity: legs.spot_quantity,
                perp_quantity: legs.perp_quantity,
                perp_entry_price: legs.perp_entry_price,
                perp_margin: legs.perp_margin,
            })),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(Self::classify(e, "", Some(vault))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const WALLET: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";

    fn ledger(uri: &str) -> HttpLedgerClient {
        HttpLedgerClient::new(ApiClient::new(uri, 50, Duration::from_secs(5)).unwrap())
    }

    fn message() -> SignedMessage {
        SignedMessage {
            vault: VaultAddress::new(0, [4u8; 32]),
            seqno: 12,
            payload: "00".to_string(),
            signature: "0xabcd".to_string(),
        }
    }

    #[tokio::test]
    async fn test_get_sequence_number() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/account/{WALLET}/seqno")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "seqno": 12 })))
            .mount(&server)
            .await;

        assert_eq!(ledger(&server.uri()).get_sequence_number(WALLET).await.unwrap(), 12);
    }

    #[tokio::test]
    async fn test_submit_sends_raw_vault_and_value() {
        let server = MockServer::start().await;
        let msg = message();
        Mock::given(method("POST"))
            .and(path("/message"))
            .and(body_partial_json(json!({
                "wallet": WALLET,
                "vault": msg.vault.to_raw(),
                "seqno": 12,
                "value": "50000000"
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "hash": "0xfeed", "seqno": 12 })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let receipt = ledger(&server.uri())
            .submit_signed_message(WALLET, &msg, 50_000_000)
            .await
            .unwrap();
        assert_eq!(receipt.message_hash, "0xfeed");
    }

    #[tokio::test]
    async fn test_permanent_and_transient_failures() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/message"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "code": "invalid_address",
                "message": "no such account"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let client = ledger(&server.uri());
        let err = client
            .submit_signed_message(WALLET, &message(), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidAddress(_)));
        assert!(err.is_permanent());

        let err = client.get_sequence_number(WALLET).await.unwrap_err();
        assert!(matches!(err, LedgerError::Unavailable(_)));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_forbidden_is_unauthorized() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let err = ledger(&server.uri())
            .submit_signed_message(WALLET, &message(), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Unauthorized { .. }));
    }

    #[tokio::test]
    async fn test_vault_legs() {
        let server = MockServer::start().await;
        let known = VaultAddress::new(0, [4u8; 32]);
        Mock::given(method("GET"))
            .and(path(format!("/vault/{}/legs", known.to_raw())))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "spot_quantity": "200",
                "perp_quantity": "200",
                "perp_entry_price": "2.5",
                "perp_margin": "500"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = ledger(&server.uri());
        let legs = client.get_vault_legs(&known).await.unwrap().unwrap();
        assert_eq!(legs.perp_margin, dec!(500));

        let unknown = VaultAddress::new(0, [5u8; 32]);
        assert_eq!(client.get_vault_legs(&unknown).await.unwrap(), None);
    }
}
