//! Caching decorator: keys on normalised text, TTL + bounded-size LRU
//! eviction. Disabled caches pass through and never record a hit.

use crate::Embedder;
use async_trait::async_trait;
use sentinel_common::config::EmbeddingCacheConfig;
use sentinel_common::types::{ComponentHealth, Embedding, HealthLevel};
use sentinel_common::utils::normalise_text;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

#[derive(Debug, Default, Clone, Copy)]
pub struct CacheStats {
    pub total_requests: u64,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        if self.total_requests == 0 {
            return 0.0;
        }
        self.hits as f64 / self.total_requests as f64
    }
}

struct Entry {
    vector: Embedding,
    inserted_at: Instant,
    last_used: u64,
}

struct Storage {
    entries: HashMap<String, Entry>,
    clock: u64,
}

pub struct CachingEmbedder {
    inner: Arc<dyn Embedder>,
    config: EmbeddingCacheConfig,
    storage: RwLock<Storage>,
    total_requests: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl CachingEmbedder {
    pub fn new(inner: Arc<dyn Embedder>, config: EmbeddingCacheConfig) -> Self {
        Self {
            inner,
            config,
            storage: RwLock::new(Storage {
                entries: HashMap::new(),
                clock: 0,
            }),
            total_requests: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    fn ttl(&self) -> Duration {
        Duration::from_secs(self.config.ttl_minutes as u64 * 60)
    }

    async fn evict_if_needed(&self, storage: &mut Storage) {
        while storage.entries.len() as u32 >= self.config.max_entries && !storage.entries.is_empty() {
            if let Some(key) = storage
                .entries
                .iter()
                .min_by_key(|(_, e)| e.last_used)
                .map(|(k, _)| k.clone())
            {
                storage.entries.remove(&key);
                self.evictions.fetch_add(1, Ordering::Relaxed);
            } else {
                break;
            }
        }
    }
}

#[async_trait]
impl Embedder for CachingEmbedder {
    async fn embed(&self, text: &str) -> Embedding {
        if !self.config.enabled {
            return self.inner.embed(text).await;
        }

        let key = normalise_text(text);
        self.total_requests.fetch_add(1, Ordering::Relaxed);

        {
            let mut storage = self.storage.write().await;
            storage.clock += 1;
            let clock = storage.clock;
            if let Some(entry) = storage.entries.get_mut(&key) {
                if entry.inserted_at.elapsed() < self.ttl() {
                    entry.last_used = clock;
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return entry.vector.clone();
                }
                storage.entries.remove(&key);
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let vector = self.inner.embed(text).await;

        if !vector.is_empty() {
            let mut storage = self.storage.write().await;
            self.evict_if_needed(&mut storage).await;
            let clock = storage.clock;
            storage.entries.insert(
                key,
                Entry {
                    vector: vector.clone(),
                    inserted_at: Instant::now(),
                    last_used: clock,
                },
            );
        }

        vector
    }

    async fn health_check(&self) -> ComponentHealth {
        let mut inner_health = self.inner.health_check().await;
        let stats = self.stats();
        inner_health
            .metrics
            .insert("cache_hit_rate".to_string(), stats.hit_rate());
        if inner_health.status == HealthLevel::Healthy && stats.total_requests > 100 && stats.hit_rate() < 0.05 {
            inner_health.status = HealthLevel::Degraded;
            inner_health.message = "embedding cache hit rate unusually low".to_string();
        }
        inner_health
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::MockEmbeddingBackend;
    use crate::resilience::ResilienceEmbedder;
    use sentinel_common::config::EmbeddingResilienceConfig;

    fn embedder() -> CachingEmbedder {
        let resilience = ResilienceEmbedder::new(
            Arc::new(MockEmbeddingBackend::new(4)),
            EmbeddingResilienceConfig {
                enabled: true,
                retry_count: 1,
                retry_base_delay_ms: 1,
                timeout_seconds: 1,
                circuit_breaker_threshold: 5,
                circuit_breaker_duration_minutes: 1,
            },
        );
        CachingEmbedder::new(
            Arc::new(resilience),
            EmbeddingCacheConfig {
                enabled: true,
                ttl_minutes: 60,
                max_entries: 10,
            },
        )
    }

    #[tokio::test]
    async fn whitespace_and_case_variants_share_a_cache_key() {
        let cache = embedder();
        let a = cache.embed("  Hello   World ").await;
        let b = cache.embed("hello world").await;
        assert_eq!(a, b);
        assert_eq!(cache.stats().hits, 1);
        assert_eq!(cache.stats().misses, 1);
    }

    #[tokio::test]
    async fn eviction_respects_max_entries() {
        let cache = CachingEmbedder::new(
            Arc::new(ResilienceEmbedder::new(
                Arc::new(MockEmbeddingBackend::new(4)),
                EmbeddingResilienceConfig {
                    enabled: true,
                    retry_count: 1,
                    retry_base_delay_ms: 1,
                    timeout_seconds: 1,
                    circuit_breaker_threshold: 5,
                    circuit_breaker_duration_minutes: 1,
                },
            )),
            EmbeddingCacheConfig {
                enabled: true,
                ttl_minutes: 60,
                max_entries: 2,
            },
        );
        cache.embed("one").await;
        cache.embed("two").await;
        cache.embed("three").await;
        let storage = cache.storage.read().await;
        assert!(storage.entries.len() <= 2);
    }
}
