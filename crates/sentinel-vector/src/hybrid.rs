//! Hybrid decorator: re-ranks the base store's vector search using event
//! recency. Falls back to pure vector search on any internal failure.

use crate::VectorStore;
use async_trait::async_trait;
use chrono::Utc;
use sentinel_common::config::HybridSearchConfig;
use sentinel_common::types::{ComponentHealth, Embedding, LogEvent};
use sentinel_common::Result;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Default, Clone, Copy)]
pub struct HybridStats {
    pub searches: u64,
    pub fallback_searches: u64,
}

pub struct HybridVectorStore {
    inner: Arc<dyn VectorStore>,
    config: HybridSearchConfig,
    searches: AtomicU64,
    fallback_searches: AtomicU64,
}

impl HybridVectorStore {
    pub fn new(inner: Arc<dyn VectorStore>, config: HybridSearchConfig) -> Self {
        Self {
            inner,
            config,
            searches: AtomicU64::new(0),
            fallback_searches: AtomicU64::new(0),
        }
    }

    pub fn stats(&self) -> HybridStats {
        HybridStats {
            searches: self.searches.load(Ordering::Relaxed),
            fallback_searches: self.fallback_searches.load(Ordering::Relaxed),
        }
    }

    fn metadata_score(&self, event: &LogEvent) -> f32 {
        let age_hours = (Utc::now() - event.time).num_seconds() as f32 / 3600.0;
        let raw = self.config.recency_weight * (-age_hours / self.config.recency_decay_hours).exp();
        raw.clamp(0.0, 1.0)
    }

    async fn hybrid_search(&self, query: &Embedding, k: usize) -> Result<Vec<(LogEvent, f32)>> {
        let over_fetch = ((k as f32) * self.config.over_fetch_multiplier).ceil() as usize;
        let hits = self.inner.search(query, over_fetch.max(k)).await?;

        let mut scored: Vec<(LogEvent, f32)> = hits
            .into_iter()
            .map(|(event, vector_score)| {
                let metadata_score = self.metadata_score(&event);
                let hybrid_score = self.config.vector_weight * vector_score + self.config.metadata_weight * metadata_score;
                (event, hybrid_score)
            })
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }
}

#[async_trait]
impl VectorStore for HybridVectorStore {
    async fn ensure_collection(&self) -> Result<()> {
        self.inner.ensure_collection().await
    }

    async fn upsert(&self, event: &LogEvent, embedding: &Embedding) -> Result<()> {
        self.inner.upsert(event, embedding).await
    }

    async fn batch_upsert(&self, items: &[(LogEvent, Embedding)]) -> Result<()> {
        self.inner.batch_upsert(items).await
    }

    async fn search(&self, query: &Embedding, k: usize) -> Result<Vec<(LogEvent, f32)>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        if !self.config.enabled {
            return self.inner.search(query, k).await;
        }

        self.searches.fetch_add(1, Ordering::Relaxed);
        match self.hybrid_search(query, k).await {
            Ok(results) => Ok(results),
            Err(err) => {
                tracing::warn!(error = %err, "hybrid search failed, falling back to pure vector search");
                self.fallback_searches.fetch_add(1, Ordering::Relaxed);
                self.inner.search(query, k).await
            }
        }
    }

    async fn has_24_hours_of_data(&self) -> Result<bool> {
        self.inner.has_24_hours_of_data().await
    }

    async fn delete_older_than_24_hours(&self) -> Result<u64> {
        self.inner.delete_older_than_24_hours().await
    }

    async fn health_check(&self) -> ComponentHealth {
        let mut health = self.inner.health_check().await;
        let stats = self.stats();
        health.metrics.insert("hybrid_fallback_searches".to_string(), stats.fallback_searches as f64);
        health
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use sentinel_common::types::ComponentHealth;
    use std::sync::Mutex;

    struct StubStore {
        hits: Vec<(LogEvent, f32)>,
        fail: bool,
        delete_calls: Mutex<u64>,
        search_calls: AtomicU64,
    }

    fn sample_event(age_hours: i64) -> LogEvent {
        LogEvent {
            time: Utc::now() - Duration::hours(age_hours),
            host: "host1".into(),
            channel: "Security".into(),
            event_id: 4625,
            level: "Warning".into(),
            user: "alice".into(),
            message: "m".into(),
            unique_id: format!("u-{age_hours}"),
        }
    }

    #[async_trait]
    impl VectorStore for StubStore {
        async fn ensure_collection(&self) -> Result<()> {
            Ok(())
        }
        async fn upsert(&self, _event: &LogEvent, _embedding: &Embedding) -> Result<()> {
            Ok(())
        }
        async fn batch_upsert(&self, _items: &[(LogEvent, Embedding)]) -> Result<()> {
            Ok(())
        }
        async fn search(&self, _query: &Embedding, _k: usize) -> Result<Vec<(LogEvent, f32)>> {
            self.search_calls.fetch_add(1, Ordering::Relaxed);
            if self.fail {
                return Err(sentinel_common::Error::TransientRemote("boom".into()));
            }
            Ok(self.hits.clone())
        }
        async fn has_24_hours_of_data(&self) -> Result<bool> {
            Ok(true)
        }
        async fn delete_older_than_24_hours(&self) -> Result<u64> {
            *self.delete_calls.lock().unwrap() += 1;
            Ok(0)
        }
        async fn health_check(&self) -> ComponentHealth {
            ComponentHealth {
                status: sentinel_common::types::HealthLevel::Healthy,
                message: "ok".into(),
                last_check: Utc::now(),
                metrics: Default::default(),
            }
        }
    }

    fn config() -> HybridSearchConfig {
        HybridSearchConfig {
            enabled: true,
            vector_weight: 0.8,
            metadata_weight: 0.2,
            recency_weight: 0.2,
            recency_decay_hours: 24.0,
            over_fetch_multiplier: 2.0,
        }
    }

    #[tokio::test]
    async fn recent_event_outranks_older_event_with_equal_vector_score() {
        let store = HybridVectorStore::new(
            Arc::new(StubStore {
                hits: vec![(sample_event(20), 0.5), (sample_event(1), 0.5)],
                fail: false,
                delete_calls: Mutex::new(0),
                search_calls: AtomicU64::new(0),
            }),
            config(),
        );
        let results = store.search(&vec![0.1; 4], 2).await.unwrap();
        assert_eq!(results[0].0.unique_id, "u-1");
    }

    #[tokio::test]
    async fn failure_falls_back_to_pure_vector_search() {
        let store = HybridVectorStore::new(
            Arc::new(StubStore {
                hits: vec![],
                fail: true,
                delete_calls: Mutex::new(0),
                search_calls: AtomicU64::new(0),
            }),
            config(),
        );
        // inner.search also fails, but the fallback path is still exercised
        // (fallback_searches increments even though it surfaces the error).
        let _ = store.search(&vec![0.1; 4], 2).await;
        assert_eq!(store.stats().fallback_searches, 1);
    }

    #[tokio::test]
    async fn search_with_zero_k_never_calls_the_inner_store() {
        let inner = Arc::new(StubStore {
            hits: vec![],
            fail: false,
            delete_calls: Mutex::new(0),
            search_calls: AtomicU64::new(0),
        });
        let store = HybridVectorStore::new(inner.clone(), config());
        let results = store.search(&vec![0.1; 4], 0).await.unwrap();
        assert!(results.is_empty());
        assert_eq!(inner.search_calls.load(Ordering::Relaxed), 0);
    }

    proptest::proptest! {
        #[test]
        fn search_never_returns_more_than_k_hits_in_descending_order(
            scores in proptest::collection::vec(0.0f32..1.0, 0..20),
            k in 0usize..10,
        ) {
            let hits: Vec<(LogEvent, f32)> = scores
                .into_iter()
                .enumerate()
                .map(|(i, score)| (sample_event(i as i64), score))
                .collect();

            let runtime = tokio::runtime::Runtime::new().unwrap();
            let results = runtime.block_on(async {
                let store = HybridVectorStore::new(
                    Arc::new(StubStore { hits, fail: false, delete_calls: Mutex::new(0), search_calls: AtomicU64::new(0) }),
                    config(),
                );
                store.search(&vec![0.1; 4], k).await.unwrap()
            });

            proptest::prop_assert!(results.len() <= k);
            for window in results.windows(2) {
                proptest::prop_assert!(window[0].1 >= window[1].1);
            }
        }
    }
}
