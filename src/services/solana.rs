//! Solana JSON-RPC client with endpoint failover.
//!
//! Calls go to `client.base_url` first, then to each of `failover_urls` in
//! order. Only transport failures and 5xx responses move on to the next
//! endpoint; anything else is returned as-is.

use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::config::schema::SolanaConfig;
use crate::error::{ApiError, ApiResult};
use crate::http::{ApiRequest, RequestPipeline};

const BASE58_ALPHABET: &[u8; 58] = b"123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";
const PUBKEY_LEN: usize = 32;

/// Check that `key` is a base58 encoded 32-byte public key.
pub fn validate_pubkey(key: &str) -> ApiResult<()> {
    match base58_decoded_len(key) {
        Some(PUBKEY_LEN) => Ok(()),
        Some(len) => Err(ApiError::invalid(format!(
            "public key {key:?} decodes to {len} bytes, expected {PUBKEY_LEN}"
        ))),
        None => Err(ApiError::invalid(format!("public key {key:?} is not valid base58"))),
    }
}

fn base58_decoded_len(input: &str) -> Option<usize> {
    if input.is_empty() {
        return None;
    }
    // Big-endian base-256 accumulator.
    let mut bytes: Vec<u8> = Vec::with_capacity(input.len());
    for c in input.bytes() {
        let mut carry = BASE58_ALPHABET.iter().position(|&a| a == c)? as u32;
        for byte in bytes.iter_mut().rev() {
            carry += u32::from(*byte) * 58;
            *byte = (carry & 0xff) as u8;
            carry >>= 8;
        }
        while carry > 0 {
            bytes.insert(0, (carry & 0xff) as u8);
            carry >>= 8;
        }
    }
    let leading_zeros = input.bytes().take_while(|&c| c == b'1').count();
    let significant = bytes.iter().skip_while(|&&b| b == 0).count();
    Some(leading_zeros + significant)
}

#[derive(Debug)]
pub struct SolanaRpcClient {
    pipeline: RequestPipeline,
    endpoints: Vec<String>,
    commitment: String,
    next_id: AtomicU64,
}

impl SolanaRpcClient {
    pub fn new(config: SolanaConfig) -> ApiResult<Self> {
        let pipeline = RequestPipeline::new("solana", &config.client)?;
        let mut endpoints = vec![config.client.base_url.clone()];
        endpoints.extend(config.failover_urls.iter().cloned());
        Ok(Self {
            pipeline,
            endpoints,
            commitment: config.commitment,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn pipeline(&self) -> &RequestPipeline {
        &self.pipeline
    }

    pub fn endpoints(&self) -> &[String] {
        &self.endpoints
    }

    /// Balance in lamports.
    pub async fn get_balance(&self, pubkey: &str) -> ApiResult<u64> {
        validate_pubkey(pubkey)?;
        let result = self
            .call("getBalance", json!([pubkey, { "commitment": self.commitment }]))
            .await?;
        result
            .get("value")
            .and_then(Value::as_u64)
            .ok_or_else(|| ApiError::Decode("getBalance result has no numeric value".to_string()))
    }

    /// Account state, or `Value::Null` when the account does not exist.
    pub async fn get_account_info(&self, pubkey: &str) -> ApiResult<Value> {
        validate_pubkey(pubkey)?;
        let mut result = self
            .call(
                "getAccountInfo",
                json!([pubkey, { "commitment": self.commitment, "encoding": "base64" }]),
            )
            .await?;
        Ok(result.get_mut("value").map(Value::take).unwrap_or(Value::Null))
    }

    pub async fn get_slot(&self) -> ApiResult<u64> {
        let result = self.call("getSlot", json!([{ "commitment": self.commitment }])).await?;
        result
            .as_u64()
            .ok_or_else(|| ApiError::Decode("getSlot result is not a number".to_string()))
    }

    pub async fn get_latest_blockhash(&self) -> ApiResult<Value> {
        let mut result = self
            .call("getLatestBlockhash", json!([{ "commitment": self.commitment }]))
            .await?;
        Ok(result.get_mut("value").map(Value::take).unwrap_or(Value::Null))
    }

    /// Raw JSON-RPC call returning the `result` member.
    pub async fn call(&self, method: &str, params: Value) -> ApiResult<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let mut last_error = None;
        for (index, endpoint) in self.endpoints.iter().enumerate() {
            let request = ApiRequest::post("").json(body.clone()).with_base_url(endpoint.as_str());
            match self.pipeline.execute_json(request).await {
                Ok(response) => return rpc_result(method, response),
                Err(e) if fails_over(&e) => {
                    tracing::warn!(
                        service = "solana",
                        method,
                        endpoint = %endpoint,
                        remaining = self.endpoints.len() - index - 1,
                        error = %e,
                        "RPC endpoint failed"
                    );
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_error.unwrap_or_else(|| ApiError::Service("no RPC endpoints configured".to_string())))
    }

    pub fn close(self) {
        self.pipeline.close();
    }
}

fn fails_over(error: &ApiError) -> bool {
    error.is_transport() || matches!(error, ApiError::Server { .. })
}

fn rpc_result(method: &str, mut response: Value) -> ApiResult<Value> {
    if let Some(error) = response.get("error").filter(|e| !e.is_null()) {
        let code = error.get("code").and_then(Value::as_i64).unwrap_or_default();
        let message = error.get("message").and_then(Value::as_str).unwrap_or("unknown error");
        return Err(ApiError::Service(format!("{method} failed ({code}): {message}")));
    }
    match response.get_mut("result") {
        Some(result) => Ok(result.take()),
        None => Err(ApiError::Decode(format!("{method} response has no result"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_pubkey() {
        assert!(validate_pubkey("11111111111111111111111111111111").is_ok());
        assert!(validate_pubkey("TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA").is_ok());
        assert!(validate_pubkey("").is_err());
        // '0', 'O', 'I' and 'l' are not in the alphabet
        assert!(validate_pubkey("0OIl1111111111111111111111111111").is_err());
        assert!(validate_pubkey("abc").is_err());
    }

    #[test]
    fn test_rpc_result() {
        assert_eq!(rpc_result("getSlot", json!({"jsonrpc": "2.0", "result": 42, "id": 1})).unwrap(), json!(42));

        let err = rpc_result(
            "getBalance",
            json!({"jsonrpc": "2.0", "error": {"code": -32602, "message": "Invalid param"}, "id": 1}),
        )
        .unwrap_err();
        assert!(matches!(err, ApiError::Service(ref m) if m.contains("-32602")));

        assert!(matches!(rpc_result("getSlot", json!({})), Err(ApiError::Decode(_))));
    }

    #[test]
    fn test_failover_classification() {
        assert!(fails_over(&ApiError::Network("refused".into())));
        assert!(fails_over(&ApiError::Server { status: 503, message: String::new() }));
        assert!(!fails_over(&ApiError::Authentication { status: 401, message: String::new() }));
        assert!(!fails_over(&ApiError::Service("rpc".into())));
    }
}
