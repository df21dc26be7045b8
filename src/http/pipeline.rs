//! The request pipeline every service client sends through.
//!
//! ```text
//! execute(request)
//!     → GET and cacheable? fresh cache entry → return
//!     → retry loop (policy from ArcSwap)
//!         → acquire rate-limit token
//!         → send with x-request-id, under the per-attempt deadline
//!         → classify status, then the optional body check
//!     → store GET result in cache
//!     → decode into T
//! ```
//!
//! Two concurrent identical GETs that both miss will both reach the server;
//! there is no single-flight de-duplication.

use arc_swap::ArcSwap;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use url::Url;
use uuid::Uuid;

use crate::config::schema::{CacheConfig, ClientConfig, RateLimitConfig, RetryConfig};
use crate::config::validation::validate_client;
use crate::error::{ApiError, ApiResult};
use crate::http::request::ApiRequest;
use crate::http::response::classify;
use crate::observability::metrics;
use crate::resilience::{retry, RateLimitStatus, RateLimiter, RetryPolicy, TtlCache};
use crate::resilience::timeouts::with_timeout;

/// Header carrying a fresh UUID on every attempt.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Inspects a 2xx body and reports a failure the service embedded in it.
pub type BodyCheck = fn(&Value) -> Option<ApiError>;

/// Builder for [`RequestPipeline`].
#[derive(Debug)]
pub struct PipelineBuilder {
    service: String,
    config: ClientConfig,
    headers: Vec<(String, String)>,
    user_agent: Option<String>,
    body_check: Option<BodyCheck>,
}

impl PipelineBuilder {
    /// Add a default header sent with every request.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Treat 2xx bodies flagged by `check` as failures. They are never cached.
    pub fn body_error(mut self, check: BodyCheck) -> Self {
        self.body_check = Some(check);
        self
    }

    pub fn build(self) -> ApiResult<RequestPipeline> {
        validate_client(&self.service, &self.config).map_err(|errors| {
            let joined = errors.iter().map(|e| e.to_string()).collect::<Vec<_>>().join(", ");
            ApiError::invalid(format!("invalid {} configuration: {}", self.service, joined))
        })?;

        let mut headers = HeaderMap::new();
        if let Some(key) = self.config.api_key.as_deref().filter(|k| !k.is_empty()) {
            let mut value = HeaderValue::from_str(&format!("Bearer {key}"))
                .map_err(|_| ApiError::invalid("api_key contains invalid header characters"))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }
        for (name, value) in &self.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| ApiError::invalid(format!("invalid header name {name:?}: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| ApiError::invalid(format!("invalid value for header {name}: {e}")))?;
            headers.insert(name, value);
        }

        let timeout = Duration::from_secs(self.config.timeout_secs);
        let mut http = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers);
        if let Some(user_agent) = &self.user_agent {
            http = http.user_agent(user_agent.clone());
        }
        let http = http.build().map_err(|e| ApiError::Service(format!("failed to build HTTP client: {e}")))?;

        tracing::info!(
            service = %self.service,
            base_url = %self.config.base_url,
            timeout_secs = self.config.timeout_secs,
            "Client opened"
        );

        Ok(RequestPipeline {
            limiter: RateLimiter::new(self.service.clone(), self.config.rate_limit.clone()),
            cache: TtlCache::new(self.service.clone(), self.config.cache.clone()),
            retry_policy: ArcSwap::from_pointee(RetryPolicy::from(&self.config.retries)),
            base_url: self.config.base_url,
            body_check: self.body_check,
            service: self.service,
            timeout,
            http,
        })
    }
}

/// Rate limit → cache → retrying HTTP → classification, owned by one client.
#[derive(Debug)]
pub struct RequestPipeline {
    service: String,
    base_url: String,
    timeout: Duration,
    http: reqwest::Client,
    limiter: RateLimiter,
    cache: TtlCache<Value>,
    retry_policy: ArcSwap<RetryPolicy>,
    body_check: Option<BodyCheck>,
}

impl RequestPipeline {
    pub fn builder(service: impl Into<String>, config: &ClientConfig) -> PipelineBuilder {
        PipelineBuilder {
            service: service.into(),
            config: config.clone(),
            headers: Vec::new(),
            user_agent: None,
            body_check: None,
        }
    }

    /// Pipeline with bearer auth from `config` and no extra headers.
    pub fn new(service: impl Into<String>, config: &ClientConfig) -> ApiResult<Self> {
        Self::builder(service, config).build()
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send `request` and decode the JSON result into `T`.
    pub async fn execute<T: DeserializeOwned>(&self, request: ApiRequest) -> ApiResult<T> {
        let endpoint = request.endpoint.clone();
        let value = self.execute_json(request).await?;
        serde_json::from_value(value).map_err(|e| {
            tracing::error!(service = %self.service, endpoint = %endpoint, error = %e, "Unexpected response shape");
            ApiError::Decode(format!("{endpoint}: {e}"))
        })
    }

    /// Send `request` and return the raw JSON result.
    pub async fn execute_json(&self, request: ApiRequest) -> ApiResult<Value> {
        let start = Instant::now();
        let method = request.method.as_str().to_string();

        let cache_key = request.is_cacheable().then(|| request.cache_key());
        if let Some(key) = &cache_key {
            if let Some(hit) = self.cache.get(key).await {
                tracing::debug!(service = %self.service, endpoint = %request.endpoint, "Cache hit");
                metrics::record_cache_hit(&self.service);
                metrics::record_request(&self.service, &method, "cache_hit", start);
                return Ok(hit);
            }
            metrics::record_cache_miss(&self.service);
        }

        let policy = self.retry_policy.load_full();
        let req = &request;
        let result = retry(&self.service, &policy, |attempt| self.attempt(req, attempt)).await;

        match result {
            Ok(value) => {
                if let Some(key) = cache_key {
                    match request.cache_ttl {
                        Some(ttl) => self.cache.insert_with_ttl(key, value.clone(), ttl).await,
                        None => self.cache.insert(key, value.clone()).await,
                    }
                }
                metrics::record_request(&self.service, &method, "success", start);
                Ok(value)
            }
            Err(error) => {
                tracing::error!(
                    service = %self.service,
                    method = %method,
                    endpoint = %request.endpoint,
                    error = %error,
                    "Request failed"
                );
                metrics::record_request(&self.service, &method, error.kind(), start);
                Err(error)
            }
        }
    }

    async fn attempt(&self, request: &ApiRequest, attempt: u32) -> ApiResult<Value> {
        self.limiter.acquire().await?;

        let url = self.url_for(request)?;
        let request_id = Uuid::new_v4();
        tracing::debug!(
            service = %self.service,
            method = %request.method,
            url = %url,
            attempt,
            request_id = %request_id,
            "Sending request"
        );

        with_timeout(self.timeout, async {
            let mut builder = self
                .http
                .request(request.method.clone(), url)
                .header(REQUEST_ID_HEADER, request_id.to_string());
            if !request.query.is_empty() {
                builder = builder.query(&request.query);
            }
            if let Some(body) = &request.body {
                builder = builder.json(body);
            }

            let response = builder.send().await.map_err(|e| self.transport_error(e))?;
            let status = response.status();
            let headers = response.headers().clone();
            let body = response.text().await.map_err(|e| self.transport_error(e))?;

            tracing::debug!(service = %self.service, status = status.as_u16(), request_id = %request_id, "Response received");
            let value = classify(status, &headers, &body)?;
            match self.body_check.and_then(|check| check(&value)) {
                Some(error) => {
                    tracing::error!(service = %self.service, request_id = %request_id, error = %error, "Error in response body");
                    Err(error)
                }
                None => Ok(value),
            }
        })
        .await
    }

    fn transport_error(&self, error: reqwest::Error) -> ApiError {
        if error.is_timeout() {
            ApiError::Timeout(self.timeout)
        } else {
            ApiError::from(error)
        }
    }

    fn url_for(&self, request: &ApiRequest) -> ApiResult<Url> {
        let base = request.base_url.as_deref().unwrap_or(&self.base_url);
        let endpoint = request.endpoint.trim_start_matches('/');
        let joined = if endpoint.is_empty() {
            base.to_string()
        } else {
            format!("{}/{}", base.trim_end_matches('/'), endpoint)
        };
        Url::parse(&joined).map_err(|e| ApiError::invalid(format!("invalid URL {joined:?}: {e}")))
    }

    /// Apply the resilience parts of a reloaded configuration.
    ///
    /// The cache is only reset when its settings actually changed.
    pub async fn reconfigure(&self, config: &ClientConfig) {
        self.update_rate_limit(config.rate_limit.clone()).await;
        self.update_retry_config(&config.retries);
        if self.cache.config().await != config.cache {
            self.update_cache_config(config.cache.clone()).await;
        }
    }

    pub async fn update_rate_limit(&self, config: RateLimitConfig) {
        self.limiter.update_config(config).await;
    }

    pub fn update_retry_config(&self, config: &RetryConfig) {
        self.retry_policy.store(Arc::new(RetryPolicy::from(config)));
        tracing::info!(
            service = %self.service,
            max_retries = config.max_retries,
            strategy = ?config.strategy,
            "Retry configuration updated"
        );
    }

    /// Replace cache settings; existing entries are dropped.
    pub async fn update_cache_config(&self, config: CacheConfig) {
        self.cache.update_config(config).await;
    }

    pub async fn clear_cache(&self) {
        self.cache.clear().await;
    }

    pub async fn cache_len(&self) -> usize {
        self.cache.len().await
    }

    pub async fn rate_limit_status(&self) -> RateLimitStatus {
        self.limiter.status().await
    }

    pub fn retry_policy(&self) -> Arc<RetryPolicy> {
        self.retry_policy.load_full()
    }

    /// Release the connection pool.
    pub fn close(self) {
        tracing::info!(service = %self.service, "Client closed");
    }
}
