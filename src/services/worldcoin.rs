//! World ID developer API: proof verification, action precheck and JWKS.

use serde::Serialize;
use serde_json::{json, Value};

use crate::config::schema::WorldcoinConfig;
use crate::error::{ApiError, ApiResult};
use crate::http::{segment, ApiRequest, RequestPipeline};

pub const DEFAULT_VERIFICATION_LEVEL: &str = "orb";

/// Zero-knowledge proof produced by the World ID widget.
#[derive(Debug, Clone, Serialize)]
pub struct WorldIdProof {
    pub nullifier_hash: String,
    pub merkle_root: String,
    pub proof: String,
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signal_hash: Option<String>,
    pub verification_level: String,
}

impl WorldIdProof {
    pub fn new(
        nullifier_hash: impl Into<String>,
        merkle_root: impl Into<String>,
        proof: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            nullifier_hash: nullifier_hash.into(),
            merkle_root: merkle_root.into(),
            proof: proof.into(),
            action: action.into(),
            signal_hash: None,
            verification_level: DEFAULT_VERIFICATION_LEVEL.to_string(),
        }
    }

    fn validate(&self) -> ApiResult<()> {
        for (field, value) in [
            ("nullifier_hash", &self.nullifier_hash),
            ("merkle_root", &self.merkle_root),
            ("proof", &self.proof),
            ("action", &self.action),
        ] {
            if value.is_empty() {
                return Err(ApiError::invalid(format!("{field} is required")));
            }
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct WorldcoinClient {
    pipeline: RequestPipeline,
    app_id: String,
}

impl WorldcoinClient {
    pub fn new(config: WorldcoinConfig) -> ApiResult<Self> {
        let app_id = segment("app_id", &config.app_id)?.to_string();
        let pipeline = RequestPipeline::builder("worldcoin", &config.client)
            .user_agent(config.user_agent.as_str())
            .build()?;
        tracing::info!(service = "worldcoin", %app_id, "Client ready");
        Ok(Self { pipeline, app_id })
    }

    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    pub fn pipeline(&self) -> &RequestPipeline {
        &self.pipeline
    }

    pub async fn verify_proof(&self, proof: &WorldIdProof) -> ApiResult<Value> {
        proof.validate()?;
        let request = ApiRequest::post(format!("api/v2/verify/{}", self.app_id)).json(serde_json::to_value(proof)?);
        self.pipeline.execute(request).await
    }

    pub async fn get_action_metadata(&self, action: &str) -> ApiResult<Value> {
        if action.is_empty() {
            return Err(ApiError::invalid("action is required"));
        }
        let request = ApiRequest::post(format!("api/v1/precheck/{}", self.app_id)).json(json!({ "action": action }));
        self.pipeline.execute(request).await
    }

    pub async fn get_jwks(&self) -> ApiResult<Value> {
        self.pipeline.execute(ApiRequest::get("api/v1/jwks")).await
    }

    pub fn close(self) {
        self.pipeline.close();
    }
}
