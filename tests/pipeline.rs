//! End-to-end behavior of the request pipeline against a local mock backend.

use serde_json::{json, Value};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use pipeiq::config::schema::{ExhaustionPolicy, RateLimitConfig, RetryConfig, RetryStrategy};
use pipeiq::http::REQUEST_ID_HEADER;
use pipeiq::{ApiError, ApiRequest, RequestPipeline};

mod common;
use common::{start_json_backend, start_mock_backend, test_client_config, unused_url, MockResponse};

fn pipeline_for(url: &str) -> RequestPipeline {
    RequestPipeline::new("test", &test_client_config(url)).unwrap()
}

#[tokio::test]
async fn test_get_is_cached() {
    let server = start_json_backend(200, json!({"slot": 7})).await;
    let pipeline = pipeline_for(&server.url());

    let first = pipeline.execute_json(ApiRequest::get("slot").query("a", 1)).await.unwrap();
    let second = pipeline.execute_json(ApiRequest::get("slot").query("a", 1)).await.unwrap();

    assert_eq!(first, json!({"slot": 7}));
    assert_eq!(first, second);
    assert_eq!(server.request_count(), 1, "second GET must be served from cache");
    assert_eq!(pipeline.cache_len().await, 1);

    // Different query, different key
    pipeline.execute_json(ApiRequest::get("slot").query("a", 2)).await.unwrap();
    assert_eq!(server.request_count(), 2);

    // Explicit bypass always reaches the server
    pipeline.execute_json(ApiRequest::get("slot").query("a", 1).bypass_cache()).await.unwrap();
    assert_eq!(server.request_count(), 3);

    pipeline.clear_cache().await;
    pipeline.execute_json(ApiRequest::get("slot").query("a", 1)).await.unwrap();
    assert_eq!(server.request_count(), 4);
}

#[tokio::test]
async fn test_post_is_never_cached() {
    let server = start_json_backend(200, json!({"ok": true})).await;
    let pipeline = pipeline_for(&server.url());

    for _ in 0..2 {
        pipeline
            .execute_json(ApiRequest::post("pods").json(json!({"name": "a"})))
            .await
            .unwrap();
    }
    assert_eq!(server.request_count(), 2);
    assert_eq!(pipeline.cache_len().await, 0);

    let requests = server.requests();
    assert_eq!(requests[0].method, "POST");
    assert_eq!(requests[0].path(), "/pods");
    assert_eq!(requests[0].json(), json!({"name": "a"}));
}

#[tokio::test]
async fn test_sends_auth_and_request_id() {
    let server = start_json_backend(200, json!({})).await;
    let pipeline = pipeline_for(&server.url());

    pipeline.execute_json(ApiRequest::post("a")).await.unwrap();
    pipeline.execute_json(ApiRequest::post("a")).await.unwrap();

    let requests = server.requests();
    assert_eq!(requests[0].header("authorization"), Some("Bearer test-key"));
    let first_id = requests[0].header(REQUEST_ID_HEADER).unwrap();
    let second_id = requests[1].header(REQUEST_ID_HEADER).unwrap();
    assert_eq!(first_id.len(), 36);
    assert_ne!(first_id, second_id);
}

#[tokio::test]
async fn test_server_errors_are_retried() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    let server = start_mock_backend(move |_| {
        if counter.fetch_add(1, Ordering::SeqCst) < 2 {
            MockResponse::text(503, "unavailable")
        } else {
            MockResponse::json(200, json!({"ok": true}))
        }
    })
    .await;
    let pipeline = pipeline_for(&server.url());

    let result = pipeline.execute_json(ApiRequest::post("work")).await.unwrap();
    assert_eq!(result, json!({"ok": true}));
    assert_eq!(server.request_count(), 3);
}

#[tokio::test]
async fn test_retries_exhausted_returns_last_error() {
    let server = start_mock_backend(|_| MockResponse::text(502, "bad gateway")).await;
    let pipeline = pipeline_for(&server.url());

    let err = pipeline.execute_json(ApiRequest::get("x")).await.unwrap_err();
    assert!(matches!(err, ApiError::Server { status: 502, .. }));
    assert_eq!(server.request_count(), 3, "max_retries counts total attempts");
}

#[tokio::test]
async fn test_auth_failure_is_not_retried() {
    let server = start_mock_backend(|_| MockResponse::text(401, "bad key")).await;
    let pipeline = pipeline_for(&server.url());

    let err = pipeline.execute_json(ApiRequest::get("me")).await.unwrap_err();
    match err {
        ApiError::Authentication { status, message } => {
            assert_eq!(status, 401);
            assert_eq!(message, "bad key");
        }
        other => panic!("expected authentication error, got {other:?}"),
    }
    assert_eq!(server.request_count(), 1);
}

#[tokio::test]
async fn test_client_error_carries_body() {
    let body = json!({"errors": [{"title": "template_id is invalid"}]});
    let server = start_json_backend(422, body.clone()).await;
    let pipeline = pipeline_for(&server.url());

    let err = pipeline.execute_json(ApiRequest::post("inquiries")).await.unwrap_err();
    match err {
        ApiError::Validation { status, message } => {
            assert_eq!(status, Some(422));
            assert_eq!(serde_json::from_str::<Value>(&message).unwrap(), body);
        }
        other => panic!("expected validation error, got {other:?}"),
    }
    assert_eq!(server.request_count(), 1);
}

#[tokio::test]
async fn test_429_is_retried_and_reports_retry_after() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    let server = start_mock_backend(move |_| {
        if counter.fetch_add(1, Ordering::SeqCst) == 0 {
            MockResponse::text(429, "slow down").with_header("Retry-After", "1")
        } else {
            MockResponse::json(200, json!("done"))
        }
    })
    .await;
    let pipeline = pipeline_for(&server.url());

    let started = std::time::Instant::now();
    let result = pipeline.execute_json(ApiRequest::post("x")).await.unwrap();
    assert_eq!(result, json!("done"));
    assert_eq!(server.request_count(), 2);
    // Retry-After of 1s is clamped to the 50ms max delay
    assert!(started.elapsed() < Duration::from_millis(900));

    let limited = start_mock_backend(|_| MockResponse::text(429, "no").with_header("Retry-After", "3")).await;
    let pipeline = pipeline_for(&limited.url());
    let err = pipeline.execute_json(ApiRequest::post("x")).await.unwrap_err();
    assert!(matches!(
        err,
        ApiError::RateLimited { retry_after: Some(d), .. } if d == Duration::from_secs(3)
    ));
}

#[tokio::test]
async fn test_timeout() {
    // Accept connections but never answer.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });

    let mut config = common::test_client_config(&format!("http://{addr}"));
    config.timeout_secs = 1;
    config.retries.max_retries = 1;
    let pipeline = RequestPipeline::new("test", &config).unwrap();

    let err = pipeline.execute_json(ApiRequest::get("slow")).await.unwrap_err();
    assert!(matches!(err, ApiError::Timeout(_)), "got {err:?}");
}

#[tokio::test]
async fn test_connection_refused_is_network_error() {
    let pipeline = pipeline_for(&unused_url().await);
    let err = pipeline.execute_json(ApiRequest::get("x")).await.unwrap_err();
    assert!(matches!(err, ApiError::Network(_)), "got {err:?}");
    assert!(err.is_transport());
}

#[tokio::test]
async fn test_fail_fast_rate_limit_does_not_send() {
    let server = start_json_backend(200, json!({})).await;
    let mut config = test_client_config(&server.url());
    config.rate_limit = RateLimitConfig {
        requests_per_window: 1,
        window_secs: 3600,
        on_exhaustion: ExhaustionPolicy::FailFast,
        ..Default::default()
    };
    config.retries.max_retries = 1;
    let pipeline = RequestPipeline::new("test", &config).unwrap();

    pipeline.execute_json(ApiRequest::post("a")).await.unwrap();
    let err = pipeline.execute_json(ApiRequest::post("a")).await.unwrap_err();
    assert!(matches!(err, ApiError::RateLimitExceeded { .. }));
    assert_eq!(server.request_count(), 1);

    let status = pipeline.rate_limit_status().await;
    assert!(status.available_tokens < 1.0);
}

#[tokio::test]
async fn test_runtime_retry_update() {
    let server = start_mock_backend(|_| MockResponse::text(500, "boom")).await;
    let pipeline = pipeline_for(&server.url());

    pipeline.update_retry_config(&RetryConfig {
        max_retries: 1,
        ..Default::default()
    });
    assert!(pipeline.execute_json(ApiRequest::get("x")).await.is_err());
    assert_eq!(server.request_count(), 1);
}

#[tokio::test]
async fn test_per_request_base_url_and_typed_decode() {
    #[derive(serde::Deserialize)]
    struct Slot {
        slot: u64,
    }

    let primary = start_json_backend(200, json!({"slot": 1})).await;
    let other = start_json_backend(200, json!({"slot": 2})).await;
    let pipeline = pipeline_for(&primary.url());

    let slot: Slot = pipeline
        .execute(ApiRequest::post("").with_base_url(other.url()))
        .await
        .unwrap();
    assert_eq!(slot.slot, 2);
    assert_eq!(primary.request_count(), 0);

    let err = pipeline
        .execute::<Vec<u64>>(ApiRequest::post("slot"))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Decode(_)));
}

#[tokio::test]
async fn test_dropping_execute_stops_retries() {
    let server = start_mock_backend(|_| MockResponse::text(503, "unavailable")).await;
    let mut config = test_client_config(&server.url());
    config.retries = RetryConfig {
        max_retries: 3,
        initial_delay_ms: 300,
        max_delay_ms: 300,
        strategy: RetryStrategy::Constant,
        ..Default::default()
    };
    let pipeline = RequestPipeline::new("test", &config).unwrap();

    // Gives up while the first backoff sleep is pending.
    let outcome = tokio::time::timeout(
        Duration::from_millis(150),
        pipeline.execute_json(ApiRequest::get("flaky")),
    )
    .await;
    assert!(outcome.is_err());

    // Past every remaining backoff: a live retry loop would have sent two more.
    tokio::time::sleep(Duration::from_millis(900)).await;
    assert_eq!(server.request_count(), 1);
}
