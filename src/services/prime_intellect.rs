//! Prime Intellect GPU compute API.
//!
//! Pod lifecycle, availability and cost queries go through the pipeline.
//! [`ResourceMetrics`] is a purely local, bounded history of samples the
//! caller chooses to track.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;
use tokio::time::Instant;

use crate::config::schema::PrimeIntellectConfig;
use crate::error::{ApiError, ApiResult};
use crate::http::{segment, ApiRequest, RequestPipeline};

macro_rules! str_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $value:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $value),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

str_enum!(
    /// Cloud provider hosting the GPUs.
    GpuProvider { Aws => "aws", Gcp => "gcp", Azure => "azure" }
);

str_enum!(
    PodStatus {
        Pending => "pending",
        Running => "running",
        Stopped => "stopped",
        Error => "error",
        Terminated => "terminated",
    }
);

str_enum!(
    ResourceType {
        Gpu => "gpu",
        Cpu => "cpu",
        Memory => "memory",
        Storage => "storage",
        Network => "network",
    }
);

str_enum!(
    CostPeriod { Hourly => "hourly", Daily => "daily", Weekly => "weekly", Monthly => "monthly" }
);

/// Pod creation request.
#[derive(Debug, Clone, Serialize)]
pub struct PodSpec {
    pub name: String,
    pub gpu_type: String,
    pub provider: GpuProvider,
    pub region: String,
    pub image: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub env: Option<BTreeMap<String, String>>,
}

impl PodSpec {
    fn validate(&self) -> ApiResult<()> {
        for (field, value) in [
            ("name", &self.name),
            ("gpu_type", &self.gpu_type),
            ("region", &self.region),
            ("image", &self.image),
        ] {
            if value.trim().is_empty() {
                return Err(ApiError::invalid(format!("{field} is required")));
            }
        }
        Ok(())
    }
}

/// Optional time window for usage and cost queries (RFC 3339 strings).
#[derive(Debug, Clone, Default)]
pub struct TimeRange {
    pub start: Option<String>,
    pub end: Option<String>,
}

#[derive(Debug)]
pub struct PrimeIntellectClient {
    pipeline: RequestPipeline,
    poll_interval: Duration,
    metrics: ResourceMetrics,
}

impl PrimeIntellectClient {
    pub fn new(config: PrimeIntellectConfig) -> ApiResult<Self> {
        Ok(Self {
            pipeline: RequestPipeline::new("prime_intellect", &config.client)?,
            poll_interval: Duration::from_secs(config.scale_poll_interval_secs.max(1)),
            metrics: ResourceMetrics::new(config.metrics_history),
        })
    }

    pub fn pipeline(&self) -> &RequestPipeline {
        &self.pipeline
    }

    pub fn metrics(&self) -> &ResourceMetrics {
        &self.metrics
    }

    pub async fn get_gpu_availability(&self, provider: Option<GpuProvider>, region: Option<&str>) -> ApiResult<Value> {
        self.availability("availability/gpu", provider, region).await
    }

    pub async fn get_cluster_availability(&self, provider: Option<GpuProvider>, region: Option<&str>) -> ApiResult<Value> {
        self.availability("availability/cluster", provider, region).await
    }

    async fn availability(&self, endpoint: &str, provider: Option<GpuProvider>, region: Option<&str>) -> ApiResult<Value> {
        let request = ApiRequest::get(endpoint)
            .query_opt("provider", provider.map(|p| p.as_str()))
            .query_opt("region", region);
        self.pipeline.execute(request).await
    }

    pub async fn create_pod(&self, spec: &PodSpec) -> ApiResult<Value> {
        spec.validate()?;
        let body = serde_json::to_value(spec)?;
        self.pipeline.execute(ApiRequest::post("pods").json(body)).await
    }

    pub async fn get_pods(&self, status: Option<PodStatus>, provider: Option<GpuProvider>) -> ApiResult<Value> {
        let request = ApiRequest::get("pods")
            .query_opt("status", status.map(|s| s.as_str()))
            .query_opt("provider", provider.map(|p| p.as_str()));
        self.pipeline.execute(request).await
    }

    pub async fn get_pod(&self, pod_id: &str) -> ApiResult<Value> {
        let pod_id = segment("pod_id", pod_id)?;
        self.pipeline.execute(ApiRequest::get(format!("pods/{pod_id}"))).await
    }

    pub async fn delete_pod(&self, pod_id: &str) -> ApiResult<Value> {
        let pod_id = segment("pod_id", pod_id)?;
        self.pipeline.execute(ApiRequest::delete(format!("pods/{pod_id}"))).await
    }

    /// Live status; never served from cache.
    pub async fn get_pod_status(&self, pod_id: &str) -> ApiResult<Value> {
        let pod_id = segment("pod_id", pod_id)?;
        self.pipeline
            .execute(ApiRequest::get(format!("pods/{pod_id}/status")).bypass_cache())
            .await
    }

    pub async fn get_pod_history(&self, pod_id: &str) -> ApiResult<Value> {
        let pod_id = segment("pod_id", pod_id)?;
        self.pipeline.execute(ApiRequest::get(format!("pods/{pod_id}/history"))).await
    }

    pub async fn get_pod_logs(&self, pod_id: &str, lines: u32, follow: bool) -> ApiResult<Value> {
        let pod_id = segment("pod_id", pod_id)?;
        let request = ApiRequest::get(format!("pods/{pod_id}/logs"))
            .query("lines", lines)
            .query_opt("follow", follow.then_some("true"))
            .bypass_cache();
        self.pipeline.execute(request).await
    }

    pub async fn get_resource_usage(&self, pod_id: &str, resource_type: ResourceType, range: &TimeRange) -> ApiResult<Value> {
        let pod_id = segment("pod_id", pod_id)?;
        let request = ApiRequest::get(format!("pods/{pod_id}/resources"))
            .query("resource_type", resource_type)
            .query_opt("start_time", range.start.as_deref())
            .query_opt("end_time", range.end.as_deref());
        self.pipeline.execute(request).await
    }

    pub async fn get_cost_estimate(
        &self,
        gpu_type: &str,
        provider: GpuProvider,
        region: &str,
        duration_hours: f64,
    ) -> ApiResult<Value> {
        if !(duration_hours > 0.0) {
            return Err(ApiError::invalid("duration_hours must be positive"));
        }
        let request = ApiRequest::post("costs/estimate").json(json!({
            "gpu_type": gpu_type,
            "provider": provider,
            "region": region,
            "duration_hours": duration_hours,
        }));
        self.pipeline.execute(request).await
    }

    pub async fn get_cost_history(&self, period: CostPeriod, pod_id: Option<&str>, range: &TimeRange) -> ApiResult<Value> {
        let request = ApiRequest::get("costs/history")
            .query("period", period)
            .query_opt("pod_id", pod_id)
            .query_opt("start_date", range.start.as_deref())
            .query_opt("end_date", range.end.as_deref());
        self.pipeline.execute(request).await
    }

    /// Change a pod's GPU count. With `wait`, polls until the pod is running
    /// again or the wait elapses.
    pub async fn scale_pod(&self, pod_id: &str, gpu_count: u32, wait: Option<Duration>) -> ApiResult<Value> {
        let pod_id = segment("pod_id", pod_id)?;
        if gpu_count == 0 {
            return Err(ApiError::invalid("gpu_count must be at least 1"));
        }

        let result = self
            .pipeline
            .execute(ApiRequest::post(format!("pods/{pod_id}/scale")).json(json!({ "gpu_count": gpu_count })))
            .await?;

        if let Some(limit) = wait {
            self.wait_for_status(pod_id, PodStatus::Running, limit).await?;
        }
        Ok(result)
    }

    /// Poll until `target`. A `limit` too large to represent means no deadline.
    async fn wait_for_status(&self, pod_id: &str, target: PodStatus, limit: Duration) -> ApiResult<()> {
        let deadline = Instant::now().checked_add(limit);
        loop {
            let status = self.get_pod_status(pod_id).await?;
            let current = status.get("status").and_then(Value::as_str).unwrap_or_default();
            if current == target.as_str() {
                return Ok(());
            }
            if current == PodStatus::Error.as_str() {
                return Err(ApiError::Service(format!("pod {pod_id} entered error state")));
            }
            let next_poll = Instant::now().checked_add(self.poll_interval);
            let out_of_time = match (deadline, next_poll) {
                (None, _) => false,
                (Some(_), None) => true,
                (Some(deadline), Some(next_poll)) => next_poll > deadline,
            };
            if out_of_time {
                tracing::warn!(pod_id, target = %target, current, "Gave up waiting for pod status");
                return Err(ApiError::Timeout(limit));
            }
            tracing::debug!(pod_id, current, "Waiting for pod status");
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    pub async fn batch_create_pods(&self, specs: &[PodSpec]) -> ApiResult<Value> {
        if specs.is_empty() {
            return Err(ApiError::invalid("at least one pod spec is required"));
        }
        for spec in specs {
            spec.validate()?;
        }
        let request = ApiRequest::post("pods/batch").json(json!({ "pods": specs }));
        self.pipeline.execute(request).await
    }

    pub async fn batch_delete_pods(&self, pod_ids: &[String]) -> ApiResult<Value> {
        if pod_ids.is_empty() {
            return Err(ApiError::invalid("at least one pod id is required"));
        }
        let request = ApiRequest::delete("pods/batch").json(json!({ "pod_ids": pod_ids }));
        self.pipeline.execute(request).await
    }

    pub async fn get_batch_operation_status(&self, operation_id: &str) -> ApiResult<Value> {
        let operation_id = segment("operation_id", operation_id)?;
        self.pipeline
            .execute(ApiRequest::get(format!("batch/{operation_id}")).bypass_cache())
            .await
    }

    pub async fn get_quotas(&self) -> ApiResult<Value> {
        self.pipeline.execute(ApiRequest::get("quotas")).await
    }

    pub async fn get_health_check(&self) -> ApiResult<Value> {
        self.pipeline.execute(ApiRequest::get("health").bypass_cache()).await
    }

    pub async fn get_api_status(&self) -> ApiResult<Value> {
        self.pipeline.execute(ApiRequest::get("status").bypass_cache()).await
    }

    pub fn close(self) {
        self.pipeline.close();
    }
}

#[derive(Debug, Clone, Copy)]
struct MetricSample {
    value: f64,
    recorded_at: Instant,
}

/// Summary over the samples of one window.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricStatistics {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub avg: f64,
    /// Sample standard deviation; 0 for a single sample.
    pub std_dev: f64,
}

/// Bounded in-memory history of locally tracked resource samples.
#[derive(Debug)]
pub struct ResourceMetrics {
    max_history: usize,
    samples: DashMap<ResourceType, VecDeque<MetricSample>>,
}

impl ResourceMetrics {
    pub fn new(max_history: usize) -> Self {
        Self {
            max_history: max_history.max(1),
            samples: DashMap::new(),
        }
    }

    pub fn track_metric(&self, resource: ResourceType, value: f64) {
        let mut history = self.samples.entry(resource).or_default();
        history.push_back(MetricSample {
            value,
            recorded_at: Instant::now(),
        });
        while history.len() > self.max_history {
            history.pop_front();
        }
    }

    pub fn latest(&self, resource: ResourceType) -> Option<f64> {
        self.samples.get(&resource)?.back().map(|s| s.value)
    }

    pub fn average(&self, resource: ResourceType, period: Duration) -> Option<f64> {
        self.statistics(resource, period).map(|s| s.avg)
    }

    pub fn statistics(&self, resource: ResourceType, period: Duration) -> Option<MetricStatistics> {
        let history = self.samples.get(&resource)?;
        let now = Instant::now();
        let values: Vec<f64> = history
            .iter()
            .filter(|s| now.duration_since(s.recorded_at) <= period)
            .map(|s| s.value)
            .collect();
        if values.is_empty() {
            return None;
        }

        let count = values.len();
        let avg = values.iter().sum::<f64>() / count as f64;
        let std_dev = if count > 1 {
            let variance = values.iter().map(|v| (v - avg).powi(2)).sum::<f64>() / (count - 1) as f64;
            variance.sqrt()
        } else {
            0.0
        };

        Some(MetricStatistics {
            count,
            min: values.iter().copied().fold(f64::INFINITY, f64::min),
            max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            avg,
            std_dev,
        })
    }

    pub fn len(&self, resource: ResourceType) -> usize {
        self.samples.get(&resource).map_or(0, |h| h.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_resource_metrics_window() {
        let metrics = ResourceMetrics::new(10);
        metrics.track_metric(ResourceType::Gpu, 10.0);
        tokio::time::advance(Duration::from_secs(120)).await;
        metrics.track_metric(ResourceType::Gpu, 20.0);
        metrics.track_metric(ResourceType::Gpu, 30.0);

        assert_eq!(metrics.latest(ResourceType::Gpu), Some(30.0));
        assert_eq!(metrics.average(ResourceType::Gpu, Duration::from_secs(60)), Some(25.0));
        assert_eq!(metrics.average(ResourceType::Gpu, Duration::from_secs(600)), Some(20.0));

        let stats = metrics.statistics(ResourceType::Gpu, Duration::from_secs(600)).unwrap();
        assert_eq!(stats.count, 3);
        assert_eq!(stats.min, 10.0);
        assert_eq!(stats.max, 30.0);
        assert!((stats.std_dev - 10.0).abs() < 1e-9);

        assert!(metrics.latest(ResourceType::Memory).is_none());
    }

    #[test]
    fn test_resource_metrics_bounded() {
        let metrics = ResourceMetrics::new(3);
        for i in 0..10 {
            metrics.track_metric(ResourceType::Cpu, i as f64);
        }
        assert_eq!(metrics.len(ResourceType::Cpu), 3);
        assert_eq!(metrics.latest(ResourceType::Cpu), Some(9.0));
    }

    #[test]
    fn test_pod_spec_serialization() {
        let spec = PodSpec {
            name: "trainer".into(),
            gpu_type: "A100".into(),
            provider: GpuProvider::Aws,
            region: "us-east-1".into(),
            image: "pytorch:latest".into(),
            command: None,
            env: None,
        };
        assert!(spec.validate().is_ok());
        assert_eq!(
            serde_json::to_value(&spec).unwrap(),
            json!({
                "name": "trainer",
                "gpu_type": "A100",
                "provider": "aws",
                "region": "us-east-1",
                "image": "pytorch:latest"
            })
        );

        let invalid = PodSpec { image: " ".into(), ..spec };
        assert!(matches!(invalid.validate(), Err(ApiError::Validation { .. })));
    }

    #[test]
    fn test_enum_strings() {
        assert_eq!(PodStatus::Terminated.as_str(), "terminated");
        assert_eq!(CostPeriod::Monthly.to_string(), "monthly");
        assert_eq!(serde_json::to_value(ResourceType::Gpu).unwrap(), json!("gpu"));
    }
}
