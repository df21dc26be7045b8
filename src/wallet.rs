//! Wallet used to sign outbound payloads.
//!
//! # Security
//! - Private keys are loaded from the environment or passed in by the caller
//! - Keys are never logged or serialized
//!
//! Signing itself is delegated to the alloy local signer; this module only
//! fixes which bytes get signed (canonical JSON) and how the result is encoded.

use alloy::primitives::{hex, Address};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::{Signature, Signer};
use serde_json::Value;

use crate::error::{ApiError, ApiResult};
use crate::http::canonical_json;

/// Environment variable name for the private key.
pub const PRIVATE_KEY_ENV_VAR: &str = "PIPEIQ_WALLET_PRIVATE_KEY";

/// A payload together with the signature over its canonical form.
#[derive(Debug, Clone, PartialEq)]
pub struct SignedPayload {
    pub payload: Value,
    /// 0x-prefixed 65-byte signature.
    pub signature: String,
    /// Checksummed signer address.
    pub signer: String,
}

#[derive(Debug, Clone)]
pub struct Wallet {
    signer: PrivateKeySigner,
}

impl Wallet {
    /// Create a wallet from a hex-encoded private key string (with or without 0x).
    pub fn from_private_key(private_key_hex: &str) -> ApiResult<Self> {
        let key_hex = private_key_hex.strip_prefix("0x").unwrap_or(private_key_hex);

        let signer: PrivateKeySigner = key_hex
            .parse()
            .map_err(|e| ApiError::Signing(format!("Invalid private key format: {}", e)))?;

        tracing::info!(address = %signer.address(), "Wallet initialized");

        Ok(Self { signer })
    }

    /// Load wallet from `PIPEIQ_WALLET_PRIVATE_KEY`.
    pub fn from_env() -> ApiResult<Self> {
        let private_key = std::env::var(PRIVATE_KEY_ENV_VAR).map_err(|_| {
            ApiError::Signing(format!("Environment variable {} not set", PRIVATE_KEY_ENV_VAR))
        })?;

        Self::from_private_key(&private_key)
    }

    /// Fresh random key, for callers that do not bring their own.
    pub fn random() -> Self {
        let signer = PrivateKeySigner::random();
        tracing::info!(address = %signer.address(), "Generated new wallet");
        Self { signer }
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// Sign arbitrary message bytes (with Ethereum prefix).
    pub async fn sign_message(&self, message: &[u8]) -> ApiResult<Signature> {
        self.signer
            .sign_message(message)
            .await
            .map_err(|e| ApiError::Signing(format!("Message signing failed: {}", e)))
    }

    /// Sign the canonical JSON form of `payload`.
    pub async fn sign_payload(&self, payload: Value) -> ApiResult<SignedPayload> {
        let message = canonical_json(&payload);
        let signature = self.sign_message(message.as_bytes()).await?;

        Ok(SignedPayload {
            payload,
            signature: hex::encode_prefixed(signature.as_bytes()),
            signer: self.address().to_string(),
        })
    }
}

impl SignedPayload {
    /// Request body: the payload fields plus `wallet_address` and `signature`.
    /// Non-object payloads are nested under `payload`.
    pub fn into_body(self) -> Value {
        let mut body = match self.payload {
            Value::Object(map) => map,
            other => {
                let mut map = serde_json::Map::new();
                map.insert("payload".to_string(), other);
                map
            }
        };
        body.insert("wallet_address".to_string(), Value::String(self.signer));
        body.insert("signature".to_string(), Value::String(self.signature));
        Value::Object(body)
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // Well-known test private key (Anvil's first account)
    const TEST_PRIVATE_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    #[test]
    fn test_wallet_from_private_key() {
        let wallet = Wallet::from_private_key(TEST_PRIVATE_KEY).unwrap();
        assert_eq!(
            wallet.address().to_string().to_lowercase(),
            "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266"
        );

        let prefixed = Wallet::from_private_key(&format!("0x{}", TEST_PRIVATE_KEY)).unwrap();
        assert_eq!(prefixed.address(), wallet.address());
    }

    #[test]
    fn test_invalid_private_key() {
        let result = Wallet::from_private_key("invalid_key");
        assert!(matches!(result, Err(ApiError::Signing(_))));
        assert!(result.unwrap_err().to_string().contains("Invalid private key"));
    }

    #[tokio::test]
    async fn test_sign_payload_is_key_order_independent() {
        let wallet = Wallet::from_private_key(TEST_PRIVATE_KEY).unwrap();

        let a = wallet.sign_payload(json!({"amount": "1.5", "token": "usdc"})).await.unwrap();
        let b = wallet.sign_payload(json!({"token": "usdc", "amount": "1.5"})).await.unwrap();
        assert_eq!(a.signature, b.signature);
        assert_eq!(a.signature.len(), 2 + 65 * 2);
        assert_eq!(a.signer, wallet.address().to_string());
    }

    #[tokio::test]
    async fn test_signature_recovers_signer() {
        let wallet = Wallet::random();
        let payload = json!({"action": "verify", "nonce": 1});

        let signature = wallet
            .sign_message(canonical_json(&payload).as_bytes())
            .await
            .unwrap();
        let recovered = signature
            .recover_address_from_msg(canonical_json(&payload).as_bytes())
            .unwrap();
        assert_eq!(recovered, wallet.address());
    }

    #[tokio::test]
    async fn test_into_body() {
        let wallet = Wallet::from_private_key(TEST_PRIVATE_KEY).unwrap();
        let body = wallet.sign_payload(json!({"amount": "2"})).await.unwrap().into_body();
        assert_eq!(body["amount"], "2");
        assert_eq!(body["wallet_address"], wallet.address().to_string());
        assert!(body["signature"].as_str().unwrap().starts_with("0x"));

        let nested = wallet.sign_payload(json!([1, 2])).await.unwrap().into_body();
        assert_eq!(nested["payload"], json!([1, 2]));
    }
}
