//! Builds the full dependency graph described in configuration: one
//! connection pool per remote backend, the decorator chain over each, the
//! durable store, the broadcaster, and the [`Pipeline`] that ties them
//! together. Kept separate from `bin/main.rs` so tests can build a
//! pipeline without going through argv/env.

use crate::Pipeline;
use sentinel_broadcast::Broadcaster;
use sentinel_common::config::{Config, EmbeddingProvider, EnsembleModelConfig, HttpClientPoolConfig};
use sentinel_common::Result;
use sentinel_detect::StandardRulesEngine;
use sentinel_embed::{build_embedder, HttpEmbeddingBackend, MockEmbeddingBackend};
use sentinel_llm::{build_llm_client, HttpLlmProvider, LlmProvider, MockLlmProvider};
use sentinel_pool::{ConnectionPool, Instance};
use sentinel_store::SecurityEventStore;
use sentinel_vector::build_vector_store;
use std::sync::Arc;

fn instances_for(name: &str, default_url: &str, pools: &std::collections::HashMap<String, HttpClientPoolConfig>) -> (Vec<Instance>, u32) {
    match pools.get(name) {
        Some(pool) => (vec![Instance { id: name.to_string(), base_url: default_url.to_string(), weight: 1.0 }], pool.max_pool_size),
        None => (vec![Instance { id: name.to_string(), base_url: default_url.to_string(), weight: 1.0 }], 10),
    }
}

fn build_pool(config: &Config, name: &str, default_url: &str) -> Arc<ConnectionPool> {
    let (instances, max_pool_size) = instances_for(name, default_url, &config.connection_pools.http_client_pools);
    Arc::new(ConnectionPool::new(
        name.to_string(),
        instances,
        max_pool_size,
        config.connection_pools.load_balancing.clone(),
        config.connection_pools.health_check.clone(),
    ))
}

fn llm_provider_for(name: &str, provider: &str, config: &Config) -> Arc<dyn LlmProvider> {
    if provider.eq_ignore_ascii_case("mock") {
        return Arc::new(MockLlmProvider::new(name, r#"{"risk":"low","confidence":30,"summary":"mock verdict","mitre":[],"recommended_actions":[]}"#));
    }
    let default_url = if provider.eq_ignore_ascii_case("openai") { "https://api.openai.com" } else { "http://localhost:11434" };
    let pool = build_pool(config, name, default_url);
    Arc::new(HttpLlmProvider::new(pool, name.to_string()))
}

/// Wires every component per configuration and returns a ready-to-run
/// pipeline. The durable store is opened (and, if missing, created) at
/// `config.store.data_dir`.
pub fn build_pipeline(config: Config) -> Result<Arc<Pipeline>> {
    let embedder = match config.embeddings.provider {
        EmbeddingProvider::Mock => build_embedder(
            Arc::new(MockEmbeddingBackend::new(config.embeddings.vector_size)),
            config.resilience.embedding.clone(),
            config.embedding_cache.clone(),
        ),
        EmbeddingProvider::Ollama | EmbeddingProvider::OpenAI => {
            let default_url = if matches!(config.embeddings.provider, EmbeddingProvider::OpenAI) {
                "https://api.openai.com"
            } else {
                "http://localhost:11434"
            };
            let pool = build_pool(&config, "embeddings", default_url);
            build_embedder(
                Arc::new(HttpEmbeddingBackend::new(pool, config.embeddings.model.clone(), config.embeddings.vector_size)),
                config.resilience.embedding.clone(),
                config.embedding_cache.clone(),
            )
        }
    };

    let llm_providers: Vec<(Arc<dyn LlmProvider>, f32)> = if config.ensemble.enabled && !config.ensemble.models.is_empty() {
        config
            .ensemble
            .models
            .iter()
            .map(|EnsembleModelConfig { name, provider, weight }| (llm_provider_for(name, provider, &config), *weight))
            .collect()
    } else {
        vec![(llm_provider_for("llm", &config.llm.provider, &config), 1.0)]
    };
    let llm = build_llm_client(llm_providers, config.strict_json.clone(), config.ensemble.clone());

    let qdrant_url = format!("{}://{}:{}", if config.qdrant.https { "https" } else { "http" }, config.qdrant.host, config.qdrant.port);
    let vector_pool = build_pool(&config, "qdrant", &qdrant_url);
    let vector_store = build_vector_store(vector_pool, config.qdrant.clone(), config.hybrid_search.clone());

    let store = Arc::new(SecurityEventStore::open(&config.store.data_dir)?);
    let broadcaster = Arc::new(Broadcaster::new());
    let detector = Arc::new(StandardRulesEngine::with_defaults());

    Ok(Arc::new(Pipeline::new(config, detector, embedder, llm, vector_store, store, broadcaster)))
}
