//! Outbound request description and cache-key derivation.

use reqwest::Method;
use serde_json::{Map, Value};
use std::time::Duration;

use crate::error::{ApiError, ApiResult};

/// One logical call to a service endpoint.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    /// Path relative to the client's base URL.
    pub endpoint: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    /// Target a different base URL than the client default.
    pub base_url: Option<String>,
    /// TTL for this response instead of the cache default.
    pub cache_ttl: Option<Duration>,
    /// Skip the cache for this GET (both lookup and store).
    pub bypass_cache: bool,
}

impl ApiRequest {
    pub fn new(method: Method, endpoint: impl Into<String>) -> Self {
        Self {
            method,
            endpoint: endpoint.into(),
            query: Vec::new(),
            body: None,
            base_url: None,
            cache_ttl: None,
            bypass_cache: false,
        }
    }

    pub fn get(endpoint: impl Into<String>) -> Self {
        Self::new(Method::GET, endpoint)
    }

    pub fn post(endpoint: impl Into<String>) -> Self {
        Self::new(Method::POST, endpoint)
    }

    pub fn put(endpoint: impl Into<String>) -> Self {
        Self::new(Method::PUT, endpoint)
    }

    pub fn delete(endpoint: impl Into<String>) -> Self {
        Self::new(Method::DELETE, endpoint)
    }

    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    /// Add a query parameter only when a value is present.
    pub fn query_opt<V: ToString>(self, key: impl Into<String>, value: Option<V>) -> Self {
        match value {
            Some(value) => self.query(key, value),
            None => self,
        }
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }

    pub fn bypass_cache(mut self) -> Self {
        self.bypass_cache = true;
        self
    }

    /// Only GET responses are ever cached.
    pub fn is_cacheable(&self) -> bool {
        self.method == Method::GET && !self.bypass_cache
    }

    pub fn cache_key(&self) -> String {
        let mut key = cache_key(&self.method, &self.endpoint, &self.query, self.body.as_ref());
        if let Some(base) = &self.base_url {
            key = format!("{base}|{key}");
        }
        key
    }
}

/// Deterministic key over method, endpoint, sorted query and canonical body.
pub fn cache_key(method: &Method, endpoint: &str, query: &[(String, String)], body: Option<&Value>) -> String {
    let mut pairs: Vec<&(String, String)> = query.iter().collect();
    pairs.sort();
    let query = pairs
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");

    let body = body.map(canonical_json).unwrap_or_default();

    format!(
        "{}:{}?{}#{}",
        method.as_str(),
        endpoint.trim_matches('/'),
        query,
        body
    )
}

/// JSON text with object keys sorted at every depth.
///
/// Used for cache keys and as the exact bytes a wallet signs.
pub fn canonical_json(value: &Value) -> String {
    sorted(value).to_string()
}

fn sorted(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut out = Map::new();
            for key in keys {
                out.insert(key.clone(), sorted(&map[key.as_str()]));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(sorted).collect()),
        other => other.clone(),
    }
}

/// Validate a caller-supplied identifier that is interpolated into a path.
pub fn segment<'a>(name: &str, value: &'a str) -> ApiResult<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ApiError::invalid(format!("{name} must not be empty")));
    }
    if trimmed.contains(['/', '?', '#']) || trimmed.contains(char::is_whitespace) {
        return Err(ApiError::invalid(format!("{name} contains invalid characters: {value:?}")));
    }
    Ok(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_key_ignores_parameter_order() {
        let a = ApiRequest::get("token/abc/holders").query("limit", 10).query("offset", 0);
        let b = ApiRequest::get("token/abc/holders").query("offset", 0).query("limit", 10);
        assert_eq!(a.cache_key(), b.cache_key());

        let c = ApiRequest::get("token/abc/holders").query("limit", 11).query("offset", 0);
        assert_ne!(a.cache_key(), c.cache_key());
    }

    #[test]
    fn test_key_ignores_body_key_order() {
        let a = ApiRequest::post("search").json(json!({"b": 1, "a": {"y": 2, "x": [1, {"q": 1, "p": 2}]}}));
        let b = ApiRequest::post("search").json(json!({"a": {"x": [1, {"p": 2, "q": 1}], "y": 2}, "b": 1}));
        assert_eq!(a.cache_key(), b.cache_key());
    }

    #[test]
    fn test_key_distinguishes_method_and_base() {
        let get = ApiRequest::get("pods");
        let delete = ApiRequest::delete("pods");
        assert_ne!(get.cache_key(), delete.cache_key());

        let other = ApiRequest::get("pods").with_base_url("http://backup");
        assert_ne!(get.cache_key(), other.cache_key());
    }

    #[test]
    fn test_canonical_json() {
        assert_eq!(
            canonical_json(&json!({"z": null, "a": [true, {"d": 1, "c": "x"}]})),
            r#"{"a":[true,{"c":"x","d":1}],"z":null}"#
        );
    }

    #[test]
    fn test_cacheable_only_for_get() {
        assert!(ApiRequest::get("models").is_cacheable());
        assert!(!ApiRequest::get("pods/1/status").bypass_cache().is_cacheable());
        assert!(!ApiRequest::post("chat/completions").is_cacheable());
    }

    #[test]
    fn test_query_opt_skips_none() {
        let req = ApiRequest::get("token/x/transfers")
            .query("limit", 100)
            .query_opt("before", None::<String>);
        assert_eq!(req.query, vec![("limit".to_string(), "100".to_string())]);
    }

    #[test]
    fn test_segment_validation() {
        assert_eq!(segment("pod_id", " pod-1 ").unwrap(), "pod-1");
        assert!(matches!(segment("pod_id", ""), Err(ApiError::Validation { .. })));
        assert!(segment("pod_id", "../admin").is_err());
        assert!(segment("mint", "a b").is_err());
    }
}
