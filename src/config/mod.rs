//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse, fill defaults, env overrides)
//!     → validation.rs (semantic checks)
//!     → PipeIqConfig (validated)
//!     → one ClientConfig handed to each service client
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → receiver calls `reconfigure` on the live clients
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Hot reload touches rate limit, cache and retry settings only; base URL
//!   and timeout changes need a new client

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use schema::{
    AttestationConfig, CacheConfig, ClientConfig, ExhaustionPolicy, GatewayConfig,
    HelloMoonConfig, ObservabilityConfig, OpenRouterConfig, PersonaConfig, PipeIqConfig,
    PrimeIntellectConfig, RateLimitConfig, RetryConfig, RetryStrategy, SolanaConfig,
    WorldChainConfig, WorldcoinConfig,
};
