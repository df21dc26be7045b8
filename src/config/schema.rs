//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the service
//! clients. All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration holding one section per service client.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct PipeIqConfig {
    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// HelloMoon Solana data API.
    pub hellomoon: HelloMoonConfig,

    /// OpenRouter LLM API.
    pub openrouter: OpenRouterConfig,

    /// Prime Intellect GPU compute API.
    pub prime_intellect: PrimeIntellectConfig,

    /// World Chain API.
    pub world_chain: WorldChainConfig,

    /// Solana attestation service.
    pub attestation: AttestationConfig,

    /// Worldcoin developer API.
    pub worldcoin: WorldcoinConfig,

    /// Persona identity verification API.
    pub persona: PersonaConfig,

    /// Solana JSON-RPC endpoints.
    pub solana: SolanaConfig,

    /// PipeIQ model gateway.
    pub gateway: GatewayConfig,
}

impl PipeIqConfig {
    /// Restore service base URLs left empty by a partial `[<service>.client]` table.
    pub fn fill_default_base_urls(&mut self) {
        fn fill(client: &mut ClientConfig, default: ClientConfig) {
            if client.base_url.trim().is_empty() {
                client.base_url = default.base_url;
            }
        }

        fill(&mut self.hellomoon.client, HelloMoonConfig::default().client);
        fill(&mut self.openrouter.client, OpenRouterConfig::default().client);
        fill(&mut self.prime_intellect.client, PrimeIntellectConfig::default().client);
        fill(&mut self.world_chain.client, WorldChainConfig::default().client);
        fill(&mut self.attestation.client, AttestationConfig::default().client);
        fill(&mut self.worldcoin.client, WorldcoinConfig::default().client);
        fill(&mut self.persona.client, PersonaConfig::default().client);
        fill(&mut self.solana.client, SolanaConfig::default().client);
        fill(&mut self.gateway.client, GatewayConfig::default().client);
    }
}

/// Settings shared by every service client: where to send requests and how
/// the resilience pipeline behaves.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL every endpoint path is appended to.
    pub base_url: String,

    /// Bearer token, when the service requires one.
    pub api_key: Option<String>,

    /// Per-attempt request timeout in seconds.
    pub timeout_secs: u64,

    /// Token bucket settings.
    pub rate_limit: RateLimitConfig,

    /// GET response cache settings.
    pub cache: CacheConfig,

    /// Retry settings.
    pub retries: RetryConfig,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_key: None,
            timeout_secs: 30,
            rate_limit: RateLimitConfig::default(),
            cache: CacheConfig::default(),
            retries: RetryConfig::default(),
        }
    }
}

/// What the limiter does when the bucket is empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExhaustionPolicy {
    /// Reject immediately with a rate-limit error.
    FailFast,
    /// Sleep until a token is available, bounded by `max_wait_ms`.
    #[default]
    WaitAndRetry,
}

/// Token bucket configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Requests allowed per window at the steady rate.
    pub requests_per_window: u32,

    /// Window length in seconds.
    pub window_secs: u64,

    /// Optional bucket capacity overriding `requests_per_window`.
    pub burst_size: Option<u32>,

    /// Behaviour when no token is available.
    pub on_exhaustion: ExhaustionPolicy,

    /// Upper bound on the total time spent waiting for a token.
    pub max_wait_ms: u64,
}

impl RateLimitConfig {
    /// Bucket capacity in tokens.
    pub fn capacity(&self) -> f64 {
        f64::from(self.burst_size.unwrap_or(self.requests_per_window))
    }

    /// Refill rate in tokens per second.
    pub fn refill_rate(&self) -> f64 {
        f64::from(self.requests_per_window) / self.window_secs.max(1) as f64
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_window: 100,
            window_secs: 60,
            burst_size: None,
            on_exhaustion: ExhaustionPolicy::WaitAndRetry,
            max_wait_ms: 30_000,
        }
    }
}

/// TTL cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    /// When false every lookup misses and every store is dropped.
    pub enabled: bool,

    /// Entry time-to-live in seconds.
    pub ttl_secs: u64,

    /// Maximum number of live entries.
    pub max_size: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: 300,
            max_size: 1000,
        }
    }
}

/// Backoff growth between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RetryStrategy {
    Constant,
    Linear,
    #[default]
    ExponentialBackoff,
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    /// Total number of attempts, the first one included.
    pub max_retries: u32,

    /// Delay before the first retry in milliseconds.
    pub initial_delay_ms: u64,

    /// Cap on any single delay in milliseconds.
    pub max_delay_ms: u64,

    /// How the delay grows between attempts.
    pub strategy: RetryStrategy,

    /// Add 0-10% random jitter to each delay.
    pub jitter: bool,

    /// HTTP statuses that are worth another attempt.
    pub retryable_status_codes: Vec<u16>,

    /// Retry connection failures and timeouts.
    pub retry_on_network: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 1000,
            max_delay_ms: 30_000,
            strategy: RetryStrategy::ExponentialBackoff,
            jitter: false,
            retryable_status_codes: vec![429, 500, 502, 503, 504],
            retry_on_network: true,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error) or a full filter directive.
    pub log_level: String,

    /// Emit JSON log lines instead of the human-readable format.
    pub json_logs: bool,

    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

/// HelloMoon client configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HelloMoonConfig {
    pub client: ClientConfig,

    /// WebSocket endpoint for account and transfer subscriptions.
    pub ws_url: String,
}

impl Default for HelloMoonConfig {
    fn default() -> Self {
        Self {
            client: ClientConfig::new("https://api.hellomoon.io/v1"),
            ws_url: "wss://api.hellomoon.io/v1/ws".to_string(),
        }
    }
}

/// OpenRouter client configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OpenRouterConfig {
    pub client: ClientConfig,

    /// Sent as `HTTP-Referer` for OpenRouter rankings.
    pub site_url: Option<String>,

    /// Sent as `X-Title`.
    pub site_name: Option<String>,

    /// How long the model list stays cached, in seconds.
    pub models_cache_ttl_secs: u64,
}

impl Default for OpenRouterConfig {
    fn default() -> Self {
        Self {
            client: ClientConfig::new("https://openrouter.ai/api/v1"),
            site_url: None,
            site_name: None,
            models_cache_ttl_secs: 3600,
        }
    }
}

/// Prime Intellect client configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PrimeIntellectConfig {
    pub client: ClientConfig,

    /// Samples kept per tracked resource metric.
    pub metrics_history: usize,

    /// Interval between status polls while waiting for a scale operation.
    pub scale_poll_interval_secs: u64,
}

impl Default for PrimeIntellectConfig {
    fn default() -> Self {
        Self {
            client: ClientConfig::new("https://api.primeintellect.ai/v1"),
            metrics_history: 1000,
            scale_poll_interval_secs: 5,
        }
    }
}

/// World Chain client configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WorldChainConfig {
    pub client: ClientConfig,

    /// Record every signed operation in the local audit log.
    pub audit_logging: bool,
}

impl Default for WorldChainConfig {
    fn default() -> Self {
        Self {
            client: ClientConfig::new("https://api.world.org/v1"),
            audit_logging: true,
        }
    }
}

/// Attestation client configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AttestationConfig {
    pub client: ClientConfig,

    /// Network name attached to every attestation payload.
    pub network: String,

    /// Record every signed operation in the local audit log.
    pub audit_logging: bool,
}

impl Default for AttestationConfig {
    fn default() -> Self {
        Self {
            client: ClientConfig::new("https://attestation.solana.com"),
            network: "mainnet".to_string(),
            audit_logging: true,
        }
    }
}

/// Worldcoin client configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WorldcoinConfig {
    pub client: ClientConfig,

    /// Developer portal application id.
    pub app_id: String,

    /// Sent as `User-Agent`.
    pub user_agent: String,
}

impl Default for WorldcoinConfig {
    fn default() -> Self {
        let mut client = ClientConfig::new("https://developer.worldcoin.org");
        client.timeout_secs = 10;
        Self {
            client,
            app_id: String::new(),
            user_agent: format!("pipeiq/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Persona client configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PersonaConfig {
    pub client: ClientConfig,

    /// Sent as `Persona-Version`.
    pub api_version: String,
}

impl Default for PersonaConfig {
    fn default() -> Self {
        Self {
            client: ClientConfig::new("https://withpersona.com/api/v1"),
            api_version: "2023-01-05".to_string(),
        }
    }
}

/// Solana JSON-RPC configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SolanaConfig {
    pub client: ClientConfig,

    /// Failover JSON-RPC endpoint URLs, tried in order after `client.base_url`.
    pub failover_urls: Vec<String>,

    /// Commitment level passed to state queries.
    pub commitment: String,
}

impl Default for SolanaConfig {
    fn default() -> Self {
        Self {
            client: ClientConfig::new("https://api.mainnet-beta.solana.com"),
            failover_urls: Vec::new(),
            commitment: "confirmed".to_string(),
        }
    }
}

/// PipeIQ gateway configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub client: ClientConfig,

    /// Network label included in connection payloads.
    pub network: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            client: ClientConfig::new("https://api.pipeiq.io/v1"),
            network: "mainnet".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipeIqConfig::default();
        assert_eq!(config.hellomoon.client.base_url, "https://api.hellomoon.io/v1");
        assert_eq!(config.hellomoon.client.timeout_secs, 30);
        assert_eq!(config.worldcoin.client.timeout_secs, 10);
        assert_eq!(config.openrouter.models_cache_ttl_secs, 3600);
        assert_eq!(config.persona.client.retries.max_retries, 3);
        assert_eq!(
            config.persona.client.retries.retryable_status_codes,
            vec![429, 500, 502, 503, 504]
        );
    }

    #[test]
    fn test_rate_limit_capacity() {
        let mut config = RateLimitConfig {
            requests_per_window: 2,
            window_secs: 60,
            ..Default::default()
        };
        assert_eq!(config.capacity(), 2.0);
        assert!((config.refill_rate() - 2.0 / 60.0).abs() < f64::EPSILON);

        config.burst_size = Some(5);
        assert_eq!(config.capacity(), 5.0);
    }

    #[test]
    fn test_partial_toml() {
        let mut config: PipeIqConfig = toml::from_str(
            r#"
            [hellomoon]
            ws_url = "ws://localhost:9000"

            [hellomoon.client]
            api_key = "hm-key"

            [hellomoon.client.rate_limit]
            requests_per_window = 10
            on_exhaustion = "fail_fast"

            [persona.client.retries]
            strategy = "linear"
            "#,
        )
        .unwrap();

        assert!(config.hellomoon.client.base_url.is_empty());
        config.fill_default_base_urls();
        assert_eq!(config.hellomoon.client.base_url, "https://api.hellomoon.io/v1");
        assert_eq!(config.persona.client.base_url, "https://withpersona.com/api/v1");

        assert_eq!(config.hellomoon.ws_url, "ws://localhost:9000");
        assert_eq!(config.hellomoon.client.api_key.as_deref(), Some("hm-key"));
        assert_eq!(config.hellomoon.client.rate_limit.requests_per_window, 10);
        assert_eq!(
            config.hellomoon.client.rate_limit.on_exhaustion,
            ExhaustionPolicy::FailFast
        );
        assert_eq!(config.persona.client.retries.strategy, RetryStrategy::Linear);
    }
}
