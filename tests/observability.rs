//! Metrics emitted by the pipeline, rendered through the Prometheus recorder.

use serde_json::json;

use pipeiq::observability::metrics::install_recorder;
use pipeiq::{ApiRequest, RequestPipeline};

mod common;
use common::{start_json_backend, test_client_config};

#[tokio::test]
async fn test_pipeline_metrics_are_exported() {
    let handle = install_recorder().expect("recorder installs once per test binary");

    let server = start_json_backend(200, json!({"ok": true})).await;
    let pipeline = RequestPipeline::new("metrics_test", &test_client_config(&server.url())).unwrap();

    pipeline.execute_json(ApiRequest::get("status")).await.unwrap();
    pipeline.execute_json(ApiRequest::get("status")).await.unwrap();

    let rendered = handle.render();
    assert!(rendered.contains("pipeiq_requests_total"), "{rendered}");
    assert!(rendered.contains("service=\"metrics_test\""));
    assert!(rendered.contains("outcome=\"success\""));
    assert!(rendered.contains("outcome=\"cache_hit\""));
    assert!(rendered.contains("pipeiq_cache_hits_total"));
    assert!(rendered.contains("pipeiq_cache_misses_total"));
    assert!(rendered.contains("pipeiq_request_duration_seconds"));
}
