//! PipeIQ gateway: connect a wallet to a hosted model, optionally through an
//! MCP server.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;

use crate::config::schema::GatewayConfig;
use crate::error::{ApiError, ApiResult};
use crate::http::{ApiRequest, RequestPipeline};
use crate::services::audit::unix_now;
use crate::wallet::Wallet;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub model_id: String,
    /// e.g. `llm`, `image`, `audio`.
    pub model_type: String,
    #[serde(default)]
    pub parameters: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McpConfig {
    pub server_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default = "default_mcp_timeout")]
    pub timeout: u64,
    #[serde(default = "default_mcp_retries")]
    pub retry_attempts: u32,
    #[serde(default)]
    pub additional_headers: BTreeMap<String, String>,
}

fn default_mcp_timeout() -> u64 {
    30
}

fn default_mcp_retries() -> u32 {
    3
}

impl McpConfig {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            api_key: None,
            timeout: default_mcp_timeout(),
            retry_attempts: default_mcp_retries(),
            additional_headers: BTreeMap::new(),
        }
    }
}

#[derive(Debug)]
pub struct GatewayClient {
    pipeline: RequestPipeline,
    wallet: Wallet,
    network: String,
}

impl GatewayClient {
    pub fn new(config: GatewayConfig, wallet: Wallet) -> ApiResult<Self> {
        let pipeline = RequestPipeline::new("gateway", &config.client)?;
        tracing::info!(network = %config.network, "Gateway client initialized");
        Ok(Self {
            pipeline,
            wallet,
            network: config.network,
        })
    }

    pub fn pipeline(&self) -> &RequestPipeline {
        &self.pipeline
    }

    pub async fn connect_to_model(&self, model: &ModelConfig, mcp: Option<&McpConfig>) -> ApiResult<Value> {
        if model.model_id.is_empty() {
            return Err(ApiError::invalid("model_id is required"));
        }
        if let Some(mcp) = mcp {
            url::Url::parse(&mcp.server_url)
                .map_err(|e| ApiError::invalid(format!("invalid MCP server_url {:?}: {e}", mcp.server_url)))?;
        }

        let mut payload = json!({
            "model_config": model,
            "network": self.network,
            "timestamp": unix_now(),
        });
        if let Some(mcp) = mcp {
            payload["mcp_config"] = serde_json::to_value(mcp)?;
        }

        let signed = self.wallet.sign_payload(payload).await?;
        let result = self
            .pipeline
            .execute(ApiRequest::post("connect").json(signed.into_body()))
            .await?;
        tracing::info!(model_id = %model.model_id, "Connected to model");
        Ok(result)
    }

    pub fn close(self) {
        self.pipeline.close();
    }
}
