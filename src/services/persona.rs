//! Persona identity verification API.
//!
//! Requests and responses use Persona's JSON:API envelope
//! (`{"data": {"type", "attributes"}}`). The resilience settings of the
//! underlying pipeline can be changed at runtime.

use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::config::schema::{CacheConfig, PersonaConfig, RateLimitConfig, RetryConfig};
use crate::error::{ApiError, ApiResult};
use crate::http::{segment, ApiRequest, RequestPipeline};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InquiryStatus {
    Created,
    Pending,
    Completed,
    Approved,
    Declined,
    NeedsReview,
    Expired,
    Failed,
}

impl InquiryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InquiryStatus::Created => "created",
            InquiryStatus::Pending => "pending",
            InquiryStatus::Completed => "completed",
            InquiryStatus::Approved => "approved",
            InquiryStatus::Declined => "declined",
            InquiryStatus::NeedsReview => "needs_review",
            InquiryStatus::Expired => "expired",
            InquiryStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationType {
    GovernmentId,
    Selfie,
    Database,
    Document,
    PhoneNumber,
    Email,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportType {
    Watchlist,
    PoliticallyExposedPerson,
    AdverseMedia,
    AddressLookup,
    PhoneRisk,
    EmailRisk,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    Open,
    Pending,
    Review,
    Resolved,
    Closed,
}

impl CaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaseStatus::Open => "open",
            CaseStatus::Pending => "pending",
            CaseStatus::Review => "review",
            CaseStatus::Resolved => "resolved",
            CaseStatus::Closed => "closed",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct InquiryConfig {
    pub template_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    /// RFC 3339 timestamp.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
}

impl InquiryConfig {
    fn validate(&self) -> ApiResult<()> {
        if self.template_id.trim().is_empty() {
            return Err(ApiError::invalid("template_id is required"));
        }
        for (field, url) in [("redirect_url", &self.redirect_url), ("webhook_url", &self.webhook_url)] {
            if let Some(url) = url {
                url::Url::parse(url).map_err(|e| ApiError::invalid(format!("invalid {field} {url:?}: {e}")))?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct VerificationConfig {
    #[serde(rename = "type")]
    pub verification_type: VerificationType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportConfig {
    #[serde(rename = "type")]
    pub report_type: ReportType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CaseConfig {
    pub reference_id: String,
    pub status: CaseStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

/// Partial case update; unset fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CaseUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<CaseStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

#[derive(Debug)]
pub struct PersonaClient {
    pipeline: RequestPipeline,
}

impl PersonaClient {
    pub fn new(config: PersonaConfig) -> ApiResult<Self> {
        let pipeline = RequestPipeline::builder("persona", &config.client)
            .header("Persona-Version", config.api_version.as_str())
            .build()?;
        Ok(Self { pipeline })
    }

    pub fn pipeline(&self) -> &RequestPipeline {
        &self.pipeline
    }

    pub async fn create_inquiry(&self, config: &InquiryConfig) -> ApiResult<Value> {
        config.validate()?;
        let body = envelope("inquiry", config)?;
        self.pipeline.execute(ApiRequest::post("inquiries").json(body)).await
    }

    pub async fn get_inquiry(&self, inquiry_id: &str) -> ApiResult<Value> {
        let id = segment("inquiry_id", inquiry_id)?;
        self.pipeline.execute(ApiRequest::get(format!("inquiries/{id}"))).await
    }

    pub async fn list_inquiries(&self, page_size: u32, page_number: u32, status: Option<InquiryStatus>) -> ApiResult<Value> {
        if page_size == 0 {
            return Err(ApiError::invalid("page_size must be at least 1"));
        }
        let request = ApiRequest::get("inquiries")
            .query("page[size]", page_size)
            .query("page[number]", page_number.max(1))
            .query_opt("filter[status]", status.map(|s| s.as_str()));
        self.pipeline.execute(request).await
    }

    pub async fn approve_inquiry(&self, inquiry_id: &str) -> ApiResult<Value> {
        self.inquiry_action(inquiry_id, "approve").await
    }

    pub async fn decline_inquiry(&self, inquiry_id: &str) -> ApiResult<Value> {
        self.inquiry_action(inquiry_id, "decline").await
    }

    pub async fn mark_for_review(&self, inquiry_id: &str) -> ApiResult<Value> {
        self.inquiry_action(inquiry_id, "mark-for-review").await
    }

    async fn inquiry_action(&self, inquiry_id: &str, action: &str) -> ApiResult<Value> {
        let id = segment("inquiry_id", inquiry_id)?;
        let result = self
            .pipeline
            .execute(ApiRequest::post(format!("inquiries/{id}/{action}")))
            .await?;
        tracing::info!(service = "persona", inquiry_id = id, action, "Inquiry transitioned");
        Ok(result)
    }

    pub async fn create_verification(&self, inquiry_id: &str, config: &VerificationConfig) -> ApiResult<Value> {
        let id = segment("inquiry_id", inquiry_id)?;
        let body = envelope("verification", config)?;
        self.pipeline
            .execute(ApiRequest::post(format!("inquiries/{id}/verifications")).json(body))
            .await
    }

    pub async fn get_verification(&self, inquiry_id: &str, verification_id: &str) -> ApiResult<Value> {
        let id = segment("inquiry_id", inquiry_id)?;
        let verification_id = segment("verification_id", verification_id)?;
        self.pipeline
            .execute(ApiRequest::get(format!("inquiries/{id}/verifications/{verification_id}")))
            .await
    }

    pub async fn create_report(&self, inquiry_id: &str, config: &ReportConfig) -> ApiResult<Value> {
        let id = segment("inquiry_id", inquiry_id)?;
        let body = envelope("report", config)?;
        self.pipeline
            .execute(ApiRequest::post(format!("inquiries/{id}/reports")).json(body))
            .await
    }

    pub async fn get_report(&self, inquiry_id: &str, report_id: &str) -> ApiResult<Value> {
        let id = segment("inquiry_id", inquiry_id)?;
        let report_id = segment("report_id", report_id)?;
        self.pipeline
            .execute(ApiRequest::get(format!("inquiries/{id}/reports/{report_id}")))
            .await
    }

    pub async fn create_case(&self, config: &CaseConfig) -> ApiResult<Value> {
        segment("reference_id", &config.reference_id)?;
        let body = envelope("case", config)?;
        self.pipeline.execute(ApiRequest::post("cases").json(body)).await
    }

    pub async fn get_case(&self, case_id: &str) -> ApiResult<Value> {
        let id = segment("case_id", case_id)?;
        self.pipeline.execute(ApiRequest::get(format!("cases/{id}"))).await
    }

    pub async fn update_case(&self, case_id: &str, update: &CaseUpdate) -> ApiResult<Value> {
        let id = segment("case_id", case_id)?;
        let body = envelope("case", update)?;
        if body["data"]["attributes"].as_object().map_or(true, Map::is_empty) {
            return Err(ApiError::invalid("case update has no fields"));
        }
        self.pipeline
            .execute(ApiRequest::new(Method::PATCH, format!("cases/{id}")).json(body))
            .await
    }

    pub async fn list_cases(&self, status: Option<CaseStatus>, assignee: Option<&str>, page_size: u32) -> ApiResult<Value> {
        let request = ApiRequest::get("cases")
            .query("page[size]", page_size.max(1))
            .query_opt("filter[status]", status.map(|s| s.as_str()))
            .query_opt("filter[assignee]", assignee);
        self.pipeline.execute(request).await
    }

    /// Start an asynchronous batch creating every inquiry; poll with
    /// [`PersonaClient::get_batch_operation_status`].
    pub async fn create_batch_inquiries(&self, inquiries: &[InquiryConfig]) -> ApiResult<Value> {
        if inquiries.is_empty() {
            return Err(ApiError::invalid("at least one inquiry is required"));
        }
        for inquiry in inquiries {
            inquiry.validate()?;
        }
        let body = json!({
            "data": {
                "type": "batch_operation",
                "attributes": {
                    "operation_type": "create_inquiries",
                    "items": inquiries,
                },
            },
        });
        self.pipeline.execute(ApiRequest::post("batch-operations").json(body)).await
    }

    pub async fn get_batch_operation_status(&self, batch_id: &str) -> ApiResult<Value> {
        let id = segment("batch_id", batch_id)?;
        self.pipeline
            .execute(ApiRequest::get(format!("batch-operations/{id}")).bypass_cache())
            .await
    }

    pub async fn update_rate_limit(&self, config: RateLimitConfig) {
        self.pipeline.update_rate_limit(config).await;
    }

    pub fn update_retry_config(&self, config: &RetryConfig) {
        self.pipeline.update_retry_config(config);
    }

    pub async fn update_cache_config(&self, config: CacheConfig) {
        self.pipeline.update_cache_config(config).await;
    }

    pub async fn clear_cache(&self) {
        self.pipeline.clear_cache().await;
    }

    pub fn close(self) {
        self.pipeline.close();
    }
}

fn envelope<T: Serialize>(kind: &str, attributes: &T) -> ApiResult<Value> {
    Ok(json!({
        "data": {
            "type": kind,
            "attributes": serde_json::to_value(attributes)?,
        }
    }))
}
