//! Resilience decorator: retries, timeout, and a circuit breaker around a
//! raw [`EmbeddingBackend`]. Never propagates an error to its caller — on
//! terminal failure it returns the empty vector (graceful degradation).

use crate::{Embedder, EmbeddingBackend};
use async_trait::async_trait;
use sentinel_common::config::EmbeddingResilienceConfig;
use sentinel_common::types::{ComponentHealth, Embedding, HealthLevel};
use sentinel_common::{CircuitBreaker, CircuitBreakerConfig};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Default, Clone, Copy)]
pub struct ResilienceStats {
    pub total_calls: u64,
    pub successful_calls: u64,
    pub failed_calls: u64,
    pub retried_calls: u64,
    pub circuit_breaker_opens: u64,
    pub timeouts: u64,
}

impl ResilienceStats {
    pub fn success_rate(&self) -> f64 {
        if self.total_calls == 0 {
            return 1.0;
        }
        self.successful_calls as f64 / self.total_calls as f64
    }
}

pub struct ResilienceEmbedder {
    backend: Arc<dyn EmbeddingBackend>,
    config: EmbeddingResilienceConfig,
    breaker: CircuitBreaker,
    total_calls: AtomicU64,
    successful_calls: AtomicU64,
    failed_calls: AtomicU64,
    retried_calls: AtomicU64,
    circuit_breaker_opens: AtomicU64,
    timeouts: AtomicU64,
}

impl ResilienceEmbedder {
    pub fn new(backend: Arc<dyn EmbeddingBackend>, config: EmbeddingResilienceConfig) -> Self {
        let breaker_config = CircuitBreakerConfig {
            failure_threshold: config.circuit_breaker_threshold,
            success_threshold: 1,
            timeout: Duration::from_secs(config.circuit_breaker_duration_minutes as u64 * 60),
            window_size: config.circuit_breaker_threshold.max(5) * 2,
            minimum_requests: 1,
        };
        Self {
            breaker: CircuitBreaker::new(format!("embedder-{}", backend.identity()), breaker_config),
            backend,
            config,
            total_calls: AtomicU64::new(0),
            successful_calls: AtomicU64::new(0),
            failed_calls: AtomicU64::new(0),
            retried_calls: AtomicU64::new(0),
            circuit_breaker_opens: AtomicU64::new(0),
            timeouts: AtomicU64::new(0),
        }
    }

    pub fn stats(&self) -> ResilienceStats {
        ResilienceStats {
            total_calls: self.total_calls.load(Ordering::Relaxed),
            successful_calls: self.successful_calls.load(Ordering::Relaxed),
            failed_calls: self.failed_calls.load(Ordering::Relaxed),
            retried_calls: self.retried_calls.load(Ordering::Relaxed),
            circuit_breaker_opens: self.circuit_breaker_opens.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
        }
    }
}

#[async_trait]
impl Embedder for ResilienceEmbedder {
    async fn embed(&self, text: &str) -> Embedding {
        if !self.config.enabled {
            return self.backend.call(text).await.unwrap_or_default();
        }

        self.total_calls.fetch_add(1, Ordering::Relaxed);

        if !self.breaker.should_allow_call().await {
            self.circuit_breaker_opens.fetch_add(1, Ordering::Relaxed);
            self.failed_calls.fetch_add(1, Ordering::Relaxed);
            return Embedding::new();
        }

        let attempts = self.config.retry_count.max(1);
        let mut last_failed = false;

        for attempt in 0..attempts {
            if attempt > 0 {
                self.retried_calls.fetch_add(1, Ordering::Relaxed);
                let jitter = fastrand_like_jitter(attempt);
                let base = self.config.retry_base_delay_ms * 2u64.pow(attempt - 1);
                tokio::time::sleep(Duration::from_millis(base.min(30_000) + jitter)).await;
            }

            let timeout = Duration::from_secs(self.config.timeout_seconds);
            let result = tokio::time::timeout(timeout, self.backend.call(text)).await;

            match result {
                Ok(Ok(vector)) if !vector.is_empty() => {
                    self.breaker.record_call_result(true).await;
                    self.successful_calls.fetch_add(1, Ordering::Relaxed);
                    return vector;
                }
                Ok(Ok(_)) => {
                    // Empty-vector results from the base provider count as a
                    // provider failure, per the retriable conditions.
                    last_failed = true;
                    self.breaker.record_call_result(false).await;
                }
                Ok(Err(err)) => {
                    warn!(error = %err, attempt, "embedding call failed");
                    last_failed = true;
                    self.breaker.record_call_result(false).await;
                }
                Err(_) => {
                    self.timeouts.fetch_add(1, Ordering::Relaxed);
                    last_failed = true;
                    self.breaker.record_call_result(false).await;
                }
            }
        }

        if last_failed {
            self.failed_calls.fetch_add(1, Ordering::Relaxed);
        }
        Embedding::new()
    }

    async fn health_check(&self) -> ComponentHealth {
        let stats = self.stats();
        let status = if stats.total_calls == 0 || stats.success_rate() > 0.9 {
            HealthLevel::Healthy
        } else if stats.success_rate() > 0.5 {
            HealthLevel::Degraded
        } else {
            HealthLevel::Critical
        };
        ComponentHealth {
            status,
            message: format!("success_rate={:.2}", stats.success_rate()),
            last_check: sentinel_common::utils::current_timestamp(),
            metrics: Default::default(),
        }
    }
}

fn fastrand_like_jitter(attempt: u32) -> u64 {
    // Bounded, deterministic-enough jitter (<= base/4) without pulling in a
    // dedicated RNG crate for one call site.
    (attempt as u64 * 37) % 250
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::MockEmbeddingBackend;

    #[tokio::test]
    async fn successful_embed_is_recorded() {
        let config = EmbeddingResilienceConfig {
            enabled: true,
            retry_count: 2,
            retry_base_delay_ms: 1,
            timeout_seconds: 5,
            circuit_breaker_threshold: 5,
            circuit_breaker_duration_minutes: 1,
        };
        let embedder = ResilienceEmbedder::new(Arc::new(MockEmbeddingBackend::new(4)), config);
        let vector = embedder.embed("hello").await;
        assert_eq!(vector.len(), 4);
        assert_eq!(embedder.stats().successful_calls, 1);
    }

    struct AlwaysFails;
    #[async_trait]
    impl EmbeddingBackend for AlwaysFails {
        async fn call(&self, _text: &str) -> sentinel_common::Result<Embedding> {
            Err(sentinel_common::Error::TransientRemote("boom".into()))
        }
        fn identity(&self) -> &str {
            "always-fails"
        }
    }

    #[tokio::test]
    async fn terminal_failure_degrades_to_empty_vector() {
        let config = EmbeddingResilienceConfig {
            enabled: true,
            retry_count: 2,
            retry_base_delay_ms: 1,
            timeout_seconds: 1,
            circuit_breaker_threshold: 10,
            circuit_breaker_duration_minutes: 1,
        };
        let embedder = ResilienceEmbedder::new(Arc::new(AlwaysFails), config);
        let vector = embedder.embed("hello").await;
        assert!(vector.is_empty());
        assert_eq!(embedder.stats().failed_calls, 1);
    }
}
