//! Service clients. Each wraps its own [`crate::http::RequestPipeline`].

pub mod attestation;
pub mod audit;
pub mod gateway;
pub mod hellomoon;
pub mod openrouter;
pub mod persona;
pub mod prime_intellect;
pub mod solana;
pub mod world_chain;
pub mod worldcoin;

pub use attestation::AttestationClient;
pub use audit::{AuditEntry, AuditFilter, AuditLog};
pub use gateway::GatewayClient;
pub use hellomoon::HelloMoonClient;
pub use openrouter::OpenRouterClient;
pub use persona::PersonaClient;
pub use prime_intellect::PrimeIntellectClient;
pub use solana::SolanaRpcClient;
pub use world_chain::WorldChainClient;
pub use worldcoin::WorldcoinClient;
