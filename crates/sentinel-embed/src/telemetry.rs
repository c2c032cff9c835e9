//! Telemetry decorator: records duration and success/failure to a tracing
//! span named exactly `embedder.embed`.

use crate::Embedder;
use async_trait::async_trait;
use sentinel_common::types::{ComponentHealth, Embedding};
use std::sync::Arc;
use std::time::Instant;
use tracing::instrument;

pub struct TelemetryEmbedder {
    inner: Arc<dyn Embedder>,
}

impl TelemetryEmbedder {
    pub fn new(inner: Arc<dyn Embedder>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl Embedder for TelemetryEmbedder {
    #[instrument(name = "embedder.embed", skip(self, text), fields(text.len = text.len(), degraded))]
    async fn embed(&self, text: &str) -> Embedding {
        let started = Instant::now();
        let vector = self.inner.embed(text).await;
        let degraded = vector.is_empty();
        tracing::Span::current().record("degraded", degraded);
        tracing::debug!(duration_ms = started.elapsed().as_millis() as u64, degraded, "embed call complete");
        vector
    }

    async fn health_check(&self) -> ComponentHealth {
        self.inner.health_check().await
    }
}
