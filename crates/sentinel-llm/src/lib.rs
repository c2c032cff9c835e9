//! LLM-backed verdict generation with a StrictJSON -> (Ensemble) decorator
//! chain (outermost first, Ensemble only present when configured). The raw
//! [`LlmProvider`] contract returns whatever text the backend produced;
//! [`LlmClient`] always returns a usable [`LlmVerdict`], synthesising a
//! fallback rather than propagating a parse failure to its caller.

mod base;
mod ensemble;
mod strict_json;

pub use base::{HttpLlmProvider, MockLlmProvider};
pub use ensemble::EnsembleClient;
pub use strict_json::{extract_json, StrictJsonClient, StrictJsonStats};

use async_trait::async_trait;
use sentinel_common::types::{ComponentHealth, LlmVerdict, LogEvent, VectorPoint};
use sentinel_common::Result;

/// A raw LLM backend. Can fail; its output is not guaranteed to be valid
/// JSON even on success.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn analyze(&self, event: &LogEvent, neighbors: &[VectorPoint]) -> Result<String>;
    async fn generate(&self, system_prompt: &str, user_prompt: &str) -> Result<String>;
    fn identity(&self) -> &str;
}

/// The verdict layer callers actually use. Never errors: a provider that
/// fails, times out, or returns unparseable output still yields a verdict,
/// via [`LlmVerdict::fallback`].
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn analyze(&self, event: &LogEvent, neighbors: &[VectorPoint]) -> LlmVerdict;
    async fn health_check(&self) -> ComponentHealth;
}

/// Build a single StrictJSON-wrapped client over one provider.
pub fn build_client(
    provider: std::sync::Arc<dyn LlmProvider>,
    config: sentinel_common::config::StrictJsonConfig,
) -> std::sync::Arc<dyn LlmClient> {
    std::sync::Arc::new(StrictJsonClient::new(provider, config))
}

/// Build the full chain over a set of named providers: each provider gets
/// its own StrictJSON wrapper, and if ensemble is enabled in configuration
/// they are combined behind an [`EnsembleClient`]; otherwise the first
/// provider's StrictJSON client is returned directly.
pub fn build_llm_client(
    providers: Vec<(std::sync::Arc<dyn LlmProvider>, f32)>,
    strict_json: sentinel_common::config::StrictJsonConfig,
    ensemble: sentinel_common::config::EnsembleConfig,
) -> std::sync::Arc<dyn LlmClient> {
    let clients: Vec<(std::sync::Arc<dyn LlmClient>, f32)> = providers
        .into_iter()
        .map(|(provider, weight)| (build_client(provider, strict_json.clone()), weight))
        .collect();

    if ensemble.enabled && clients.len() > 1 {
        std::sync::Arc::new(EnsembleClient::new(clients, 0, ensemble.min_quorum, ensemble.deadline_ms))
    } else {
        clients
            .into_iter()
            .next()
            .map(|(client, _)| client)
            .expect("at least one llm provider must be configured")
    }
}
