//! World Chain API: human verification, mini apps, bridging and node queries.
//!
//! Every mutating call is signed with the client's [`Wallet`]. Successful and
//! failed operations are kept in a local transaction history; successes are
//! also written to the audit log when `audit_logging` is enabled.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::config::schema::WorldChainConfig;
use crate::error::{ApiError, ApiResult, BatchFailure};
use crate::http::{segment, ApiRequest, RequestPipeline};
use crate::resilience::RateLimitStatus;
use crate::services::audit::{AuditEntry, AuditFilter, AuditLog};
use crate::wallet::Wallet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Usdc,
    Wld,
    Eth,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Active,
    Syncing,
    Offline,
}

impl NodeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeStatus::Active => "active",
            NodeStatus::Syncing => "syncing",
            NodeStatus::Offline => "offline",
        }
    }
}

/// Kind of operation stored in the transaction history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionType {
    Bridge,
    Deploy,
    Update,
    Verify,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Bridge => "bridge",
            TransactionType::Deploy => "deploy",
            TransactionType::Update => "update",
            TransactionType::Verify => "verify",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BridgeRequest {
    pub token_type: TokenType,
    /// Decimal string, e.g. `"1.5"`.
    pub amount: String,
    pub destination_chain: String,
    #[serde(skip)]
    pub metadata: Option<Value>,
}

impl BridgeRequest {
    fn validate(&self) -> ApiResult<()> {
        match self.amount.trim().parse::<f64>() {
            Ok(amount) if amount > 0.0 && amount.is_finite() => {}
            _ => return Err(ApiError::invalid(format!("invalid bridge amount {:?}", self.amount))),
        }
        if self.destination_chain.trim().is_empty() {
            return Err(ApiError::invalid("destination_chain is required"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct MiniAppDeployment {
    pub app_data: Value,
    pub metadata: Option<Value>,
}

/// Snapshot returned by [`WorldChainClient::get_service_status`].
#[derive(Debug, Clone)]
pub struct ServiceStatus {
    pub rate_limit: RateLimitStatus,
    pub cache_entries: usize,
    pub transaction_count: usize,
    pub audit_log_count: usize,
}

#[derive(Debug)]
pub struct WorldChainClient {
    pipeline: RequestPipeline,
    wallet: Wallet,
    audit: AuditLog,
    transactions: AuditLog,
}

impl WorldChainClient {
    pub fn new(config: WorldChainConfig, wallet: Wallet) -> ApiResult<Self> {
        Ok(Self {
            pipeline: RequestPipeline::new("world_chain", &config.client)?,
            wallet,
            audit: AuditLog::new(config.audit_logging),
            transactions: AuditLog::new(true),
        })
    }

    pub fn pipeline(&self) -> &RequestPipeline {
        &self.pipeline
    }

    pub fn wallet_address(&self) -> String {
        self.wallet.address().to_string()
    }

    pub async fn verify_human(&self, proof: Value) -> ApiResult<Value> {
        let outcome = self
            .signed_post("verify", json!({ "proof": proof.clone() }))
            .await;
        self.finish(TransactionType::Verify, "verify_human", outcome, json!({ "proof": proof }), |result| {
            json!({ "proof_id": result.get("id") })
        })
        .await
    }

    pub async fn get_gas_status(&self) -> ApiResult<Value> {
        let address = self.wallet_address();
        self.pipeline
            .execute(ApiRequest::get(format!("gas/{address}")).bypass_cache())
            .await
    }

    pub async fn deploy_mini_app(&self, deployment: &MiniAppDeployment) -> ApiResult<Value> {
        if !deployment.app_data.is_object() {
            return Err(ApiError::invalid("app_data must be a JSON object"));
        }
        let payload = json!({
            "app_data": deployment.app_data,
            "metadata": deployment.metadata.clone().unwrap_or_else(|| json!({})),
        });
        let outcome = self.signed_post("apps", payload).await;
        let failure = json!({ "app_data": deployment.app_data });
        self.finish(TransactionType::Deploy, "deploy_mini_app", outcome, failure, |result| {
            json!({ "app_id": result.get("id"), "app_data": deployment.app_data })
        })
        .await
    }

    pub async fn get_mini_app_status(&self, app_id: &str) -> ApiResult<Value> {
        let app_id = segment("app_id", app_id)?;
        self.pipeline.execute(ApiRequest::get(format!("apps/{app_id}"))).await
    }

    pub async fn update_mini_app(&self, app_id: &str, updates: Value, metadata: Option<Value>) -> ApiResult<Value> {
        let app_id = segment("app_id", app_id)?;
        let payload = json!({
            "updates": updates,
            "metadata": metadata.unwrap_or_else(|| json!({})),
        });
        let signed = self.wallet.sign_payload(payload).await?;
        let outcome = self
            .pipeline
            .execute(ApiRequest::put(format!("apps/{app_id}")).json(signed.into_body()))
            .await;
        let version = updates.get("version").cloned();
        self.finish(TransactionType::Update, "update_mini_app", outcome, json!({ "app_id": app_id }), |_| {
            json!({ "app_id": app_id, "version": version })
        })
        .await
    }

    pub async fn bridge_token(&self, request: &BridgeRequest) -> ApiResult<Value> {
        request.validate()?;
        let mut payload = serde_json::to_value(request)?;
        if let Value::Object(map) = &mut payload {
            map.insert(
                "metadata".to_string(),
                request.metadata.clone().unwrap_or_else(|| json!({})),
            );
        }
        let outcome = self.signed_post("bridge", payload).await;
        let summary = json!({ "token_type": request.token_type, "amount": request.amount });
        self.finish(TransactionType::Bridge, "bridge_token", outcome, summary.clone(), |result| {
            let mut details = summary;
            details["bridge_id"] = result.get("id").cloned().unwrap_or(Value::Null);
            details
        })
        .await
    }

    pub async fn get_bridge_status(&self, bridge_id: &str) -> ApiResult<Value> {
        let bridge_id = segment("bridge_id", bridge_id)?;
        self.pipeline
            .execute(ApiRequest::get(format!("bridge/{bridge_id}")).bypass_cache())
            .await
    }

    pub async fn get_node_status(&self, node_id: &str) -> ApiResult<Value> {
        let node_id = segment("node_id", node_id)?;
        self.pipeline.execute(ApiRequest::get(format!("nodes/{node_id}"))).await
    }

    pub async fn list_nodes(&self, status: Option<NodeStatus>, region: Option<&str>) -> ApiResult<Value> {
        let request = ApiRequest::get("nodes")
            .query_opt("status", status.map(|s| s.as_str()))
            .query_opt("region", region);
        self.pipeline.execute(request).await
    }

    pub async fn get_network_info(&self) -> ApiResult<Value> {
        self.pipeline.execute(ApiRequest::get("network-info")).await
    }

    /// Bridges every request in order. Items that fail are reported together
    /// in [`ApiError::Batch`] after the whole batch has been attempted.
    pub async fn batch_bridge_tokens(&self, requests: &[BridgeRequest]) -> ApiResult<Vec<Value>> {
        let mut results = Vec::with_capacity(requests.len());
        let mut failures = Vec::new();
        for (index, request) in requests.iter().enumerate() {
            match self.bridge_token(request).await {
                Ok(result) => results.push(result),
                Err(e) => failures.push(BatchFailure { index, message: e.to_string() }),
            }
        }
        batch_outcome("bridge", results, failures)
    }

    pub async fn batch_deploy_mini_apps(&self, deployments: &[MiniAppDeployment]) -> ApiResult<Vec<Value>> {
        let mut results = Vec::with_capacity(deployments.len());
        let mut failures = Vec::new();
        for (index, deployment) in deployments.iter().enumerate() {
            match self.deploy_mini_app(deployment).await {
                Ok(result) => results.push(result),
                Err(e) => failures.push(BatchFailure { index, message: e.to_string() }),
            }
        }
        batch_outcome("deploy", results, failures)
    }

    pub async fn get_audit_logs(&self, filter: &AuditFilter) -> Vec<AuditEntry> {
        self.audit.entries(filter).await
    }

    /// History entries matching `filter`, keeping only the most recent `limit`.
    pub async fn get_transaction_history(&self, filter: &AuditFilter, limit: Option<usize>) -> Vec<AuditEntry> {
        let mut entries = self.transactions.entries(filter).await;
        if let Some(limit) = limit {
            let skip = entries.len().saturating_sub(limit);
            entries.drain(..skip);
        }
        entries
    }

    pub async fn get_rate_limit_status(&self) -> RateLimitStatus {
        self.pipeline.rate_limit_status().await
    }

    pub async fn get_service_status(&self) -> ServiceStatus {
        ServiceStatus {
            rate_limit: self.pipeline.rate_limit_status().await,
            cache_entries: self.pipeline.cache_len().await,
            transaction_count: self.transactions.len().await,
            audit_log_count: self.audit.len().await,
        }
    }

    pub async fn clear_caches(&self) {
        self.pipeline.clear_cache().await;
    }

    pub async fn clear_transaction_history(&self) {
        self.transactions.clear().await;
    }

    pub fn close(self) {
        self.pipeline.close();
    }

    async fn signed_post(&self, endpoint: &str, payload: Value) -> ApiResult<Value> {
        let signed = self.wallet.sign_payload(payload).await?;
        self.pipeline
            .execute(ApiRequest::post(endpoint).json(signed.into_body()))
            .await
    }

    /// Record `outcome` in the history (and the audit log on success).
    async fn finish<F>(
        &self,
        kind: TransactionType,
        operation: &str,
        outcome: ApiResult<Value>,
        on_failure: Value,
        on_success: F,
    ) -> ApiResult<Value>
    where
        F: FnOnce(&Value) -> Value,
    {
        let actor = Some(self.wallet_address());
        match outcome {
            Ok(result) => {
                let details = on_success(&result);
                self.audit.record(operation, actor.clone(), details.clone()).await;
                self.transactions.record(kind.as_str(), actor, details).await;
                tracing::info!(service = "world_chain", operation, "Operation completed");
                Ok(result)
            }
            Err(e) => {
                let mut details = on_failure;
                if let Value::Object(map) = &mut details {
                    map.insert("error".to_string(), Value::String(e.to_string()));
                }
                self.transactions.record(kind.as_str(), actor, details).await;
                tracing::warn!(service = "world_chain", operation, error = %e, "Operation failed");
                Err(e)
            }
        }
    }
}

fn batch_outcome(operation: &str, results: Vec<Value>, failures: Vec<BatchFailure>) -> ApiResult<Vec<Value>> {
    if failures.is_empty() {
        return Ok(results);
    }
    tracing::warn!(
        service = "world_chain",
        operation,
        succeeded = results.len(),
        failed = failures.len(),
        "Batch completed with errors"
    );
    Err(ApiError::Batch { failures })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bridge(amount: &str) -> BridgeRequest {
        BridgeRequest {
            token_type: TokenType::Usdc,
            amount: amount.into(),
            destination_chain: "ethereum".into(),
            metadata: None,
        }
    }

    #[test]
    fn test_bridge_validation() {
        assert!(bridge("1.5").validate().is_ok());
        assert!(bridge("0").validate().is_err());
        assert!(bridge("abc").validate().is_err());
        assert!(BridgeRequest { destination_chain: "".into(), ..bridge("1") }.validate().is_err());
    }

    #[test]
    fn test_bridge_serialization() {
        let value = serde_json::to_value(bridge("2")).unwrap();
        assert_eq!(
            value,
            json!({"token_type": "usdc", "amount": "2", "destination_chain": "ethereum"})
        );
    }

    #[test]
    fn test_batch_outcome() {
        assert_eq!(batch_outcome("bridge", vec![json!(1)], vec![]).unwrap(), vec![json!(1)]);

        let err = batch_outcome(
            "bridge",
            vec![],
            vec![BatchFailure { index: 1, message: "boom".into() }],
        )
        .unwrap_err();
        match err {
            ApiError::Batch { failures } => assert_eq!(failures[0].index, 1),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_invalid_bridge_is_not_recorded() {
        let client = WorldChainClient::new(WorldChainConfig::default(), Wallet::random()).unwrap();
        assert!(matches!(
            client.bridge_token(&bridge("-1")).await,
            Err(ApiError::Validation { .. })
        ));
        assert!(client
            .get_transaction_history(&AuditFilter::default(), None)
            .await
            .is_empty());
    }
}
