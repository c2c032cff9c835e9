//! Text embedding with a Telemetry -> Caching -> Resilience -> Base
//! decorator chain (outermost first). Each layer wraps the one inside it
//! and implements the same [`Embedder`] trait; there is no inheritance,
//! just small structs holding an `Arc<dyn Embedder>` (or, at the base,
//! `Arc<dyn EmbeddingBackend>`).

mod base;
mod caching;
mod resilience;
mod telemetry;

pub use base::{HttpEmbeddingBackend, MockEmbeddingBackend};
pub use caching::{CacheStats, CachingEmbedder};
pub use resilience::{ResilienceEmbedder, ResilienceStats};
pub use telemetry::TelemetryEmbedder;

use async_trait::async_trait;
use sentinel_common::types::{ComponentHealth, Embedding};
use std::sync::Arc;

/// A text embedder. `embed` never errors: a failing or degraded backend
/// yields the empty vector, which callers treat as "skip similarity
/// retrieval, continue pipeline".
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Embedding;
    async fn health_check(&self) -> ComponentHealth;
}

/// A raw embedding provider. Unlike [`Embedder`], this can fail — the
/// [`ResilienceEmbedder`] is what turns failures into an empty vector.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    async fn call(&self, text: &str) -> sentinel_common::Result<Embedding>;
    fn identity(&self) -> &str;
}

/// Build the full decorator chain over `backend` per the fixed order:
/// Telemetry -> Caching -> Resilience -> Base.
pub fn build_embedder(
    backend: Arc<dyn EmbeddingBackend>,
    resilience: sentinel_common::config::EmbeddingResilienceConfig,
    cache: sentinel_common::config::EmbeddingCacheConfig,
) -> Arc<dyn Embedder> {
    let resilient = Arc::new(ResilienceEmbedder::new(backend, resilience));
    let cached = Arc::new(CachingEmbedder::new(resilient, cache));
    Arc::new(TelemetryEmbedder::new(cached))
}
