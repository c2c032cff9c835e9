//! Per-event orchestration: ignore-filter, detect, embed, retrieve similar
//! neighbours, analyze, merge, persist, upsert, broadcast. Events with
//! different `unique_id`s run concurrently, bounded by `maxInFlight`;
//! events sharing a `unique_id` are serialized in the order they arrived.

use crate::ignore::IgnoreFilter;
use crate::sink::BroadcastingCorrelationSink;
use crate::source::LogEventSource;
use dashmap::DashMap;
use sentinel_broadcast::{Broadcaster, Topic};
use sentinel_common::config::Config;
use sentinel_common::types::{ComponentHealth, LogEvent, RiskLevel, VectorPoint};
use sentinel_common::Result;
use sentinel_correlate::{CorrelationEngine, EventSource};
use sentinel_detect::SecurityEventDetector;
use sentinel_embed::Embedder;
use sentinel_llm::LlmClient;
use sentinel_store::SecurityEventStore;
use sentinel_telemetry::MetricsRegistry;
use sentinel_vector::VectorStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};
use tokio_util::sync::CancellationToken;

pub struct Pipeline {
    config: Config,
    ignore_filter: IgnoreFilter,
    detector: Arc<dyn SecurityEventDetector>,
    embedder: Arc<dyn Embedder>,
    llm: Arc<dyn LlmClient>,
    vector_store: Arc<dyn VectorStore>,
    store: Arc<SecurityEventStore>,
    broadcaster: Arc<Broadcaster>,
    metrics: Arc<MetricsRegistry>,
    key_locks: DashMap<String, Arc<Mutex<()>>>,
    in_flight: Arc<Semaphore>,
    cancellation: CancellationToken,
    correlation_engine: Mutex<CorrelationEngine>,
}

impl Pipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Config,
        detector: Arc<dyn SecurityEventDetector>,
        embedder: Arc<dyn Embedder>,
        llm: Arc<dyn LlmClient>,
        vector_store: Arc<dyn VectorStore>,
        store: Arc<SecurityEventStore>,
        broadcaster: Arc<Broadcaster>,
    ) -> Self {
        let ignore_filter = IgnoreFilter::new(&config.ignore_patterns);
        let in_flight = Arc::new(Semaphore::new(config.pipeline.max_in_flight.max(1) as usize));

        let event_source: Arc<dyn EventSource> = store.clone();
        let correlation_sink = Arc::new(BroadcastingCorrelationSink::new(store.clone(), broadcaster.clone()));
        let correlation_engine = CorrelationEngine::new(config.correlation.clone(), event_source, correlation_sink);

        Self {
            config,
            ignore_filter,
            detector,
            embedder,
            llm,
            vector_store,
            store,
            broadcaster,
            metrics: Arc::new(MetricsRegistry::new()),
            key_locks: DashMap::new(),
            in_flight,
            cancellation: CancellationToken::new(),
            correlation_engine: Mutex::new(correlation_engine),
        }
    }

    pub fn cancellation(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    pub fn metrics(&self) -> Arc<MetricsRegistry> {
        self.metrics.clone()
    }

    pub fn broadcaster(&self) -> Arc<Broadcaster> {
        self.broadcaster.clone()
    }

    pub fn store(&self) -> Arc<SecurityEventStore> {
        self.store.clone()
    }

    /// Runs a single event through the same per-key-locked, deadline-bounded
    /// path `dispatch` uses, without going through the semaphore or a spawned
    /// task. Exists so integration tests can drive the pipeline one event at
    /// a time and await the result directly.
    pub async fn process_event_for_test(&self, event: LogEvent) -> Result<()> {
        self.process_event(event).await
    }

    /// Starts the correlation engine's background loop and consumes
    /// `source` until it is exhausted or cancellation fires.
    pub async fn run(self: Arc<Self>, mut source: impl LogEventSource + 'static) {
        self.correlation_engine.lock().await.start();

        loop {
            tokio::select! {
                _ = self.cancellation.cancelled() => {
                    tracing::info!("pipeline cancelled, draining in-flight work");
                    break;
                }
                next = source.next() => {
                    match next {
                        None => {
                            tracing::info!("event source exhausted");
                            break;
                        }
                        Some(event) => self.dispatch(event).await,
                    }
                }
            }
        }

        self.correlation_engine.lock().await.stop();
        let _ = self.in_flight.acquire_many(self.config.pipeline.max_in_flight.max(1)).await;
    }

    async fn dispatch(self: &Arc<Self>, event: LogEvent) {
        let permit = match self.in_flight.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => return,
        };
        let pipeline = self.clone();
        tokio::spawn(async move {
            let _permit = permit;
            if let Err(error) = pipeline.process_event(event).await {
                tracing::error!(%error, "event processing failed");
            }
        });
    }

    fn key_lock(&self, unique_id: &str) -> Arc<Mutex<()>> {
        self.key_locks.entry(unique_id.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    async fn process_event(&self, event: LogEvent) -> Result<()> {
        let lock = self.key_lock(&event.unique_id);
        let _guard = lock.lock().await;

        let deadline = Duration::from_millis(self.config.pipeline.per_event_deadline_ms);
        match tokio::time::timeout(deadline, self.process_event_inner(&event)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(unique_id = %event.unique_id, "event processing exceeded its deadline");
                Ok(())
            }
        }
    }

    async fn process_event_inner(&self, event: &LogEvent) -> Result<()> {
        self.metrics.record_processed();

        if self.ignore_filter.should_ignore(event) {
            self.metrics.record_ignored();
            return Ok(());
        }

        let deterministic = self.detector.detect(event);
        let embedding = self.embedder.embed(&event.message).await;
        if embedding.is_empty() {
            self.metrics.record_empty_embedding();
        }

        let neighbors = if embedding.is_empty() {
            Vec::new()
        } else {
            self.vector_store
                .search(&embedding, self.config.pipeline.neighbor_k as usize)
                .await
                .unwrap_or_default()
                .into_iter()
                .map(|(neighbor_event, _score)| VectorPoint {
                    id: sentinel_vector::point_id_for(&neighbor_event.unique_id),
                    vector: Vec::new(),
                    payload: neighbor_event,
                })
                .collect::<Vec<_>>()
        };

        let verdict = self.llm.analyze(event, &neighbors).await;
        let merged = sentinel_detect::merge_verdicts(event, deterministic, verdict);

        let min_risk: RiskLevel = self.config.pipeline.min_risk_to_persist.parse().unwrap_or(RiskLevel::Low);
        if merged.risk_level >= min_risk {
            self.store.save(merged.clone()).await?;
            self.metrics.record_persisted();
        }

        if let Err(error) = self.vector_store.upsert(event, &embedding).await {
            tracing::warn!(%error, unique_id = %event.unique_id, "vector upsert failed");
        }

        let payload = serde_json::to_value(&merged).unwrap_or_default();
        self.broadcaster.publish(Topic::SecurityEvents, payload);
        self.metrics.record_broadcast();

        Ok(())
    }

    pub async fn health_check(&self) -> Vec<(&'static str, ComponentHealth)> {
        vec![
            ("detect", self.detector.health_check()),
            ("embed", self.embedder.health_check().await),
            ("llm", self.llm.health_check().await),
            ("vector", self.vector_store.health_check().await),
        ]
    }

    pub async fn health_snapshot(&self) -> crate::PipelineHealth {
        crate::PipelineHealth::from_components(self.health_check().await)
    }
}
