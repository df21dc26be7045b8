//! OpenRouter LLM API.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

use crate::config::schema::OpenRouterConfig;
use crate::error::{ApiError, ApiResult};
use crate::http::{ApiRequest, RequestPipeline};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".into(), content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".into(), content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: "assistant".into(), content: content.into() }
    }
}

/// Optional generation parameters; unset fields are left to the server.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CompletionOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

#[derive(Debug)]
pub struct OpenRouterClient {
    pipeline: RequestPipeline,
    models_cache_ttl: Duration,
}

impl OpenRouterClient {
    pub fn new(config: OpenRouterConfig) -> ApiResult<Self> {
        let mut builder = RequestPipeline::builder("openrouter", &config.client).body_error(body_error);
        if let Some(site_url) = &config.site_url {
            builder = builder.header("HTTP-Referer", site_url.as_str());
        }
        if let Some(site_name) = &config.site_name {
            builder = builder.header("X-Title", site_name.as_str());
        }

        Ok(Self {
            pipeline: builder.build()?,
            models_cache_ttl: Duration::from_secs(config.models_cache_ttl_secs),
        })
    }

    pub fn pipeline(&self) -> &RequestPipeline {
        &self.pipeline
    }

    pub async fn chat_completion(&self, messages: &[ChatMessage], options: &CompletionOptions) -> ApiResult<Value> {
        if messages.is_empty() {
            return Err(ApiError::invalid("messages must not be empty"));
        }
        let body = with_options(json!({ "messages": messages, "stream": false }), options)?;
        self.send(ApiRequest::post("chat/completions").json(body)).await
    }

    pub async fn text_completion(&self, prompt: &str, options: &CompletionOptions) -> ApiResult<Value> {
        if prompt.trim().is_empty() {
            return Err(ApiError::invalid("prompt must not be empty"));
        }
        let body = with_options(json!({ "prompt": prompt, "stream": false }), options)?;
        self.send(ApiRequest::post("completions").json(body)).await
    }

    /// Available models (the `data` array), cached for `models_cache_ttl_secs`.
    pub async fn list_models(&self) -> ApiResult<Vec<Value>> {
        let response = self
            .send(ApiRequest::get("models").cache_ttl(self.models_cache_ttl))
            .await?;
        match response.get("data") {
            Some(Value::Array(models)) => Ok(models.clone()),
            _ => Err(ApiError::Decode("models response has no data array".to_string())),
        }
    }

    pub async fn get_credits(&self) -> ApiResult<Value> {
        self.send(ApiRequest::get("credits")).await
    }

    async fn send(&self, request: ApiRequest) -> ApiResult<Value> {
        self.pipeline.execute_json(request).await
    }

    pub fn close(self) {
        self.pipeline.close();
    }
}

/// OpenRouter can report failures inside a 2xx body.
fn body_error(value: &Value) -> Option<ApiError> {
    let error = value.get("error").filter(|e| !e.is_null())?;
    let message = error
        .get("message")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| error.to_string());
    Some(ApiError::Service(message))
}

fn with_options(mut body: Value, options: &CompletionOptions) -> ApiResult<Value> {
    if let (Value::Object(target), Value::Object(extra)) = (&mut body, serde_json::to_value(options)?) {
        target.extend(extra);
    }
    Ok(body)
}
