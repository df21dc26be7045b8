//! Solana attestation service.
//!
//! Attestations are versioned by content: the version is the first ten hex
//! characters of a SHA-256 over the attested data, and updates link the
//! previous version. All writes are signed with the client's [`Wallet`].

use alloy::primitives::hex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};
use std::fmt::Write as _;

use crate::config::schema::AttestationConfig;
use crate::error::{ApiError, ApiResult};
use crate::http::{segment, ApiRequest, RequestPipeline};
use crate::services::audit::{unix_now, AuditEntry, AuditFilter, AuditLog};
use crate::wallet::Wallet;

const VERSION_LEN: usize = 10;
const SECONDS_PER_DAY: u64 = 86_400;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttestationStatus {
    Active,
    Revoked,
    Expired,
    Pending,
    Failed,
}

impl AttestationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttestationStatus::Active => "active",
            AttestationStatus::Revoked => "revoked",
            AttestationStatus::Expired => "expired",
            AttestationStatus::Pending => "pending",
            AttestationStatus::Failed => "failed",
        }
    }
}

/// Content version of attestation data.
///
/// Hashes the sorted-key text form with `", "` and `": "` separators and
/// ASCII-only strings, so versions match those issued by other PipeIQ clients.
pub fn attestation_version(data: &Value) -> String {
    let mut text = String::new();
    write_versioned(&mut text, data);
    let mut hash = hex::encode(Sha256::digest(text.as_bytes()));
    hash.truncate(VERSION_LEN);
    hash
}

fn write_versioned(out: &mut String, value: &Value) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_ascii_string(out, key);
                out.push_str(": ");
                write_versioned(out, &map[key.as_str()]);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_versioned(out, item);
            }
            out.push(']');
        }
        Value::String(s) => write_ascii_string(out, s),
        other => out.push_str(&other.to_string()),
    }
}

fn write_ascii_string(out: &mut String, s: &str) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{08}' => out.push_str("\\b"),
            '\u{0c}' => out.push_str("\\f"),
            ' '..='~' => out.push(c),
            _ => {
                let mut units = [0u16; 2];
                for unit in c.encode_utf16(&mut units) {
                    let _ = write!(out, "\\u{unit:04x}");
                }
            }
        }
    }
    out.push('"');
}

#[derive(Debug, Clone, Default)]
pub struct NewAttestation {
    pub data: Value,
    pub attestation_type: String,
    pub metadata: Option<Value>,
    /// Unix seconds.
    pub expires_at: Option<u64>,
    pub tags: Vec<String>,
}

/// Reusable attestation shape with defaults merged into each creation.
#[derive(Debug, Clone)]
pub struct AttestationTemplate {
    pub name: String,
    pub schema: Value,
    pub required_fields: Vec<String>,
    pub default_metadata: Map<String, Value>,
    pub default_tags: Vec<String>,
    pub default_expiry_days: Option<u64>,
    pub version: String,
}

impl AttestationTemplate {
    pub fn new(name: impl Into<String>, required_fields: &[&str]) -> Self {
        Self {
            name: name.into(),
            schema: json!({}),
            required_fields: required_fields.iter().map(|f| f.to_string()).collect(),
            default_metadata: Map::new(),
            default_tags: Vec::new(),
            default_expiry_days: None,
            version: "1.0.0".to_string(),
        }
    }

    pub fn validate_data(&self, data: &Value) -> ApiResult<()> {
        let Some(fields) = data.as_object() else {
            return Err(ApiError::invalid("attestation data must be a JSON object"));
        };
        match self.required_fields.iter().find(|f| !fields.contains_key(f.as_str())) {
            Some(missing) => Err(ApiError::invalid(format!("Missing required field: {missing}"))),
            None => Ok(()),
        }
    }

    /// Apply template defaults; caller-supplied metadata keys win.
    fn apply(&self, data: Value, metadata: Option<Value>, tags: Vec<String>, expires_at: Option<u64>) -> NewAttestation {
        let mut merged = self.default_metadata.clone();
        if let Some(Value::Object(extra)) = metadata {
            merged.extend(extra);
        }
        let mut all_tags = self.default_tags.clone();
        all_tags.extend(tags);

        NewAttestation {
            data,
            attestation_type: self.name.clone(),
            metadata: Some(Value::Object(merged)),
            expires_at: expires_at
                .or_else(|| {
                    self.default_expiry_days
                        .map(|days| unix_now().saturating_add(days.saturating_mul(SECONDS_PER_DAY)))
                }),
            tags: all_tags,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AttestationSearch {
    pub query: Option<String>,
    pub attestation_type: Option<String>,
    pub tags: Vec<String>,
    pub wallet_address: Option<String>,
    pub status: Option<AttestationStatus>,
    pub page: u32,
    pub per_page: u32,
}

#[derive(Debug)]
pub struct AttestationClient {
    pipeline: RequestPipeline,
    wallet: Wallet,
    network: String,
    audit: AuditLog,
}

impl AttestationClient {
    pub fn new(config: AttestationConfig, wallet: Wallet) -> ApiResult<Self> {
        Ok(Self {
            pipeline: RequestPipeline::new("attestation", &config.client)?,
            wallet,
            network: config.network,
            audit: AuditLog::new(config.audit_logging),
        })
    }

    pub fn pipeline(&self) -> &RequestPipeline {
        &self.pipeline
    }

    pub async fn create_attestation(&self, attestation: NewAttestation) -> ApiResult<Value> {
        if attestation.attestation_type.trim().is_empty() {
            return Err(ApiError::invalid("attestation_type is required"));
        }
        let version = attestation_version(&attestation.data);

        let mut payload = json!({
            "data": attestation.data,
            "type": attestation.attestation_type,
            "network": self.network,
            "timestamp": unix_now(),
            "version": version,
        });
        if let Some(metadata) = attestation.metadata {
            payload["metadata"] = metadata;
        }
        if let Some(expires_at) = attestation.expires_at {
            payload["expires_at"] = json!(expires_at);
        }
        if !attestation.tags.is_empty() {
            payload["tags"] = json!(attestation.tags);
        }

        let result = self.signed(ApiRequest::post("v1/attestations"), payload).await?;
        let id = result.get("id").cloned().unwrap_or(Value::Null);
        tracing::info!(service = "attestation", id = %id, %version, "Attestation created");
        self.audit(
            "create",
            json!({
                "attestation_id": id,
                "type": attestation.attestation_type,
                "version": version,
                "status": AttestationStatus::Active.as_str(),
            }),
        )
        .await;
        Ok(result)
    }

    pub async fn create_attestation_from_template(
        &self,
        template: &AttestationTemplate,
        data: Value,
        metadata: Option<Value>,
        tags: Vec<String>,
        expires_at: Option<u64>,
    ) -> ApiResult<Value> {
        template.validate_data(&data)?;
        self.create_attestation(template.apply(data, metadata, tags, expires_at))
            .await
    }

    pub async fn get_attestation(&self, attestation_id: &str) -> ApiResult<Value> {
        let id = segment("attestation_id", attestation_id)?;
        self.pipeline.execute(ApiRequest::get(format!("v1/attestations/{id}"))).await
    }

    /// Replace the attested data with a new version linked to the current one.
    pub async fn update_attestation(
        &self,
        attestation_id: &str,
        data: Value,
        metadata: Option<Value>,
        reason: Option<&str>,
    ) -> ApiResult<Value> {
        let id = segment("attestation_id", attestation_id)?;
        let current: Value = self
            .pipeline
            .execute(ApiRequest::get(format!("v1/attestations/{id}")).bypass_cache())
            .await?;
        let previous_version = current
            .get("version")
            .and_then(Value::as_str)
            .ok_or_else(|| ApiError::Decode(format!("attestation {id} has no version")))?
            .to_string();
        let new_version = attestation_version(&data);

        let mut payload = json!({
            "data": data,
            "timestamp": unix_now(),
            "version": new_version,
            "previous_version": previous_version,
        });
        if let Some(metadata) = metadata {
            payload["metadata"] = metadata;
        }
        if let Some(reason) = reason {
            payload["reason"] = json!(reason);
        }

        let result = self
            .signed(ApiRequest::put(format!("v1/attestations/{id}")), payload)
            .await?;
        self.audit(
            "update",
            json!({
                "attestation_id": id,
                "previous_version": previous_version,
                "new_version": new_version,
                "reason": reason,
            }),
        )
        .await;
        Ok(result)
    }

    pub async fn get_attestation_versions(&self, attestation_id: &str) -> ApiResult<Value> {
        let id = segment("attestation_id", attestation_id)?;
        self.pipeline
            .execute(ApiRequest::get(format!("v1/attestations/{id}/versions")))
            .await
    }

    pub async fn revoke_attestation(&self, attestation_id: &str, reason: Option<&str>) -> ApiResult<Value> {
        let id = segment("attestation_id", attestation_id)?;
        let mut payload = json!({ "timestamp": unix_now() });
        if let Some(reason) = reason {
            payload["reason"] = json!(reason);
        }
        let result = self
            .signed(ApiRequest::post(format!("v1/attestations/{id}/revoke")), payload)
            .await?;
        self.audit(
            "revoke",
            json!({
                "attestation_id": id,
                "reason": reason,
                "status": AttestationStatus::Revoked.as_str(),
            }),
        )
        .await;
        Ok(result)
    }

    pub async fn verify_attestation(&self, attestation_id: &str) -> ApiResult<Value> {
        let id = segment("attestation_id", attestation_id)?;
        self.pipeline
            .execute(ApiRequest::get(format!("v1/attestations/{id}/verify")).bypass_cache())
            .await
    }

    pub async fn search_attestations(&self, search: &AttestationSearch) -> ApiResult<Value> {
        let tags = (!search.tags.is_empty()).then(|| search.tags.join(","));
        let request = ApiRequest::get("v1/attestations/search")
            .query("page", search.page.max(1))
            .query("per_page", if search.per_page == 0 { 20 } else { search.per_page })
            .query_opt("q", search.query.as_deref())
            .query_opt("type", search.attestation_type.as_deref())
            .query_opt("tags", tags)
            .query_opt("wallet_address", search.wallet_address.as_deref())
            .query_opt("status", search.status.map(|s| s.as_str()));
        self.pipeline.execute(request).await
    }

    pub async fn create_batch_attestations(&self, attestations: Vec<Value>) -> ApiResult<Value> {
        if attestations.is_empty() {
            return Err(ApiError::invalid("at least one attestation is required"));
        }
        let count = attestations.len();
        let payload = json!({
            "attestations": attestations,
            "network": self.network,
            "timestamp": unix_now(),
        });
        let result = self.signed(ApiRequest::post("v1/attestations/batch"), payload).await?;
        self.audit("batch_create", json!({ "count": count })).await;
        Ok(result)
    }

    /// Server-side audit trail, paginated.
    pub async fn get_audit_logs(
        &self,
        attestation_id: Option<&str>,
        operation: Option<&str>,
        page: u32,
        per_page: u32,
    ) -> ApiResult<Value> {
        let request = ApiRequest::get("v1/audit-logs")
            .query("page", page.max(1))
            .query("per_page", per_page.max(1))
            .query_opt("attestation_id", attestation_id)
            .query_opt("operation", operation)
            .bypass_cache();
        self.pipeline.execute(request).await
    }

    /// Operations this client performed, from the local audit log.
    pub async fn local_audit_logs(&self, filter: &AuditFilter) -> Vec<AuditEntry> {
        self.audit.entries(filter).await
    }

    pub async fn register_webhook(&self, url: &str, events: &[String], secret: Option<&str>) -> ApiResult<Value> {
        url::Url::parse(url).map_err(|e| ApiError::invalid(format!("invalid webhook url {url:?}: {e}")))?;
        if events.is_empty() {
            return Err(ApiError::invalid("at least one event is required"));
        }
        let mut payload = json!({
            "url": url,
            "events": events,
            "network": self.network,
        });
        if let Some(secret) = secret {
            payload["secret"] = json!(secret);
        }
        self.signed(ApiRequest::post("v1/webhooks"), payload).await
    }

    pub async fn list_webhooks(&self) -> ApiResult<Value> {
        self.pipeline.execute(ApiRequest::get("v1/webhooks").bypass_cache()).await
    }

    pub async fn delete_webhook(&self, webhook_id: &str) -> ApiResult<()> {
        let id = segment("webhook_id", webhook_id)?;
        let _: Value = self
            .pipeline
            .execute(ApiRequest::delete(format!("v1/webhooks/{id}")))
            .await?;
        Ok(())
    }

    pub fn close(self) {
        self.pipeline.close();
    }

    async fn signed(&self, request: ApiRequest, payload: Value) -> ApiResult<Value> {
        let signed = self.wallet.sign_payload(payload).await?;
        self.pipeline.execute(request.json(signed.into_body())).await
    }

    async fn audit(&self, operation: &str, details: Value) {
        self.audit
            .record(operation, Some(self.wallet.address().to_string()), details)
            .await;
    }
}
