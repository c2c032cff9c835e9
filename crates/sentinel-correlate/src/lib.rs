//! Correlation engine: scans recent event history for multi-event patterns
//! and emits [`Correlation`] records. Runs as a supervised background loop
//! on an `analysis_interval_seconds` cadence.

mod detectors;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sentinel_common::config::CorrelationConfig;
use sentinel_common::types::{AttackChain, Correlation, CorrelationType, SecurityEvent};
use sentinel_common::Result;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration as StdDuration, Instant};
use parking_lot::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Read side the engine needs from the durable event store. Defined here
/// rather than depending on the store crate directly, so the store
/// implements this rather than the engine depending downward on it.
#[async_trait]
pub trait EventSource: Send + Sync {
    async fn get_in_range(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<SecurityEvent>>;
    async fn update_scores(&self, event_id: Uuid, correlation_score: f32, burst_score: f32, anomaly_score: f32) -> Result<()>;
}

/// Write side the engine needs from the durable correlation store.
#[async_trait]
pub trait CorrelationSink: Send + Sync {
    async fn save_correlation(&self, correlation: &Correlation) -> Result<()>;
    async fn has_correlation(&self, dedup_key: &(CorrelationType, Vec<Uuid>)) -> Result<bool>;
    async fn save_attack_chain(&self, chain: &AttackChain) -> Result<()>;
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct CorrelationStats {
    pub total_events_processed: u64,
    pub correlations_detected: u64,
    pub correlations_by_type: HashMap<CorrelationType, u64>,
    pub average_confidence_score: f32,
    pub average_processing_time_ms: f64,
    pub last_updated: Option<DateTime<Utc>>,
    pub top_patterns: Vec<(String, u64)>,
    pub events_correlated: u64,
}

struct StatsAccumulator {
    stats: CorrelationStats,
    pattern_counts: HashMap<String, u64>,
    confidence_sum: f64,
}

impl StatsAccumulator {
    fn new() -> Self {
        Self { stats: CorrelationStats::default(), pattern_counts: HashMap::new(), confidence_sum: 0.0 }
    }

    fn record_cycle(&mut self, events_processed: usize, correlations: &[Correlation], elapsed: StdDuration) {
        self.stats.total_events_processed += events_processed as u64;
        self.stats.correlations_detected += correlations.len() as u64;
        self.stats.last_updated = Some(Utc::now());

        let previous_time = self.stats.average_processing_time_ms;
        let cycles = self.stats.correlations_detected.max(1) as f64;
        self.stats.average_processing_time_ms = ((previous_time * (cycles - 1.0)) + elapsed.as_secs_f64() * 1000.0) / cycles;

        let mut correlated_events: std::collections::HashSet<Uuid> = std::collections::HashSet::new();
        for correlation in correlations {
            *self.stats.correlations_by_type.entry(correlation.correlation_type).or_insert(0) += 1;
            *self.pattern_counts.entry(correlation.pattern.clone()).or_insert(0) += 1;
            self.confidence_sum += correlation.confidence_score as f64;
            correlated_events.extend(correlation.event_ids.iter().copied());
        }
        self.stats.events_correlated += correlated_events.len() as u64;

        if self.stats.correlations_detected > 0 {
            self.stats.average_confidence_score = (self.confidence_sum / self.stats.correlations_detected as f64) as f32;
        }

        let mut top: Vec<(String, u64)> = self.pattern_counts.iter().map(|(k, v)| (k.clone(), *v)).collect();
        top.sort_by(|a, b| b.1.cmp(&a.1));
        top.truncate(10);
        self.stats.top_patterns = top;
    }

    fn snapshot(&self) -> CorrelationStats {
        self.stats.clone()
    }
}

pub struct CorrelationEngine {
    config: CorrelationConfig,
    source: Arc<dyn EventSource>,
    sink: Arc<dyn CorrelationSink>,
    stats: Arc<RwLock<StatsAccumulator>>,
    cancellation: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl CorrelationEngine {
    pub fn new(config: CorrelationConfig, source: Arc<dyn EventSource>, sink: Arc<dyn CorrelationSink>) -> Self {
        Self {
            config,
            source,
            sink,
            stats: Arc::new(RwLock::new(StatsAccumulator::new())),
            cancellation: CancellationToken::new(),
            handle: None,
        }
    }

    /// Spawns the supervised background loop. Idempotent: a second call
    /// replaces the previous loop, cancelling it first.
    pub fn start(&mut self) {
        self.stop();
        self.cancellation = CancellationToken::new();

        let config = self.config.clone();
        let source = self.source.clone();
        let sink = self.sink.clone();
        let stats = self.stats.clone();
        let cancellation = self.cancellation.clone();

        self.handle = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(StdDuration::from_secs(config.analysis_interval_seconds));
            loop {
                tokio::select! {
                    _ = cancellation.cancelled() => break,
                    _ = interval.tick() => {
                        if let Err(error) = run_analysis_cycle(&config, &source, &sink, &stats).await {
                            tracing::error!(%error, "correlation analysis cycle failed");
                        }
                    }
                }
            }
        }));
    }

    pub fn stop(&mut self) {
        self.cancellation.cancel();
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    pub async fn stats(&self) -> CorrelationStats {
        self.stats.read().snapshot()
    }

    /// Runs a single analysis cycle synchronously; exposed so callers (and
    /// tests) can drive the engine without waiting on the interval.
    pub async fn run_once(&self) -> Result<Vec<Correlation>> {
        run_analysis_cycle(&self.config, &self.source, &self.sink, &self.stats).await
    }
}

impl Drop for CorrelationEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_analysis_cycle(
    config: &CorrelationConfig,
    source: &Arc<dyn EventSource>,
    sink: &Arc<dyn CorrelationSink>,
    stats: &Arc<RwLock<StatsAccumulator>>,
) -> Result<Vec<Correlation>> {
    let started = Instant::now();
    let to = Utc::now();
    let from = to - chrono::Duration::minutes(config.lookback_minutes as i64);
    let events = source.get_in_range(from, to).await?;

    // attack_chain's correlations and chains are emitted in lock-step (one
    // chain per AttackChain-typed correlation); zip them so a correlation
    // already seen in a prior cycle also skips re-persisting its chain.
    let (chain_correlations, chains) = detectors::attack_chain(&events, config);

    let mut correlations = detectors::temporal_burst(&events, config);
    let chain_start = correlations.len();
    correlations.extend(chain_correlations);
    let chain_range = chain_start..correlations.len();
    correlations.extend(detectors::lateral_movement(&events, config));
    correlations.extend(detectors::privilege_escalation(&events, config));

    let mut fresh = Vec::new();
    for (index, correlation) in correlations.into_iter().enumerate() {
        let dedup_key = correlation.dedup_key();
        if sink.has_correlation(&dedup_key).await? {
            continue;
        }
        sink.save_correlation(&correlation).await?;
        if chain_range.contains(&index) {
            sink.save_attack_chain(&chains[index - chain_range.start]).await?;
        }
        fresh.push(correlation);
    }

    apply_score_updates(&events, &fresh, source).await?;

    stats.write().record_cycle(events.len(), &fresh, started.elapsed());
    Ok(fresh)
}

async fn apply_score_updates(events: &[SecurityEvent], correlations: &[Correlation], source: &Arc<dyn EventSource>) -> Result<()> {
    let mut best: HashMap<Uuid, (f32, f32, f32)> = HashMap::new();
    for correlation in correlations {
        let (burst, anomaly) = match correlation.correlation_type {
            CorrelationType::TemporalBurst => (correlation.confidence_score, 0.0),
            _ => (0.0, correlation.confidence_score),
        };
        for event_id in &correlation.event_ids {
            let entry = best.entry(*event_id).or_insert((0.0, 0.0, 0.0));
            entry.0 = entry.0.max(correlation.confidence_score);
            entry.1 = entry.1.max(burst);
            entry.2 = entry.2.max(anomaly);
        }
    }

    for event in events {
        if let Some((correlation_score, burst_score, anomaly_score)) = best.get(&event.id) {
            source.update_scores(event.id, *correlation_score, *burst_score, *anomaly_score).await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_common::types::{EventStatus, LogEvent, RiskLevel};
    use std::sync::Mutex as StdMutex;

    struct FakeSource {
        events: Vec<SecurityEvent>,
        updates: StdMutex<Vec<(Uuid, f32, f32, f32)>>,
    }

    #[async_trait]
    impl EventSource for FakeSource {
        async fn get_in_range(&self, _from: DateTime<Utc>, _to: DateTime<Utc>) -> Result<Vec<SecurityEvent>> {
            Ok(self.events.clone())
        }

        async fn update_scores(&self, event_id: Uuid, correlation_score: f32, burst_score: f32, anomaly_score: f32) -> Result<()> {
            self.updates.lock().unwrap().push((event_id, correlation_score, burst_score, anomaly_score));
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeSink {
        saved: StdMutex<Vec<Correlation>>,
        saved_chains: StdMutex<Vec<AttackChain>>,
    }

    #[async_trait]
    impl CorrelationSink for FakeSink {
        async fn save_correlation(&self, correlation: &Correlation) -> Result<()> {
            self.saved.lock().unwrap().push(correlation.clone());
            Ok(())
        }

        async fn has_correlation(&self, dedup_key: &(CorrelationType, Vec<Uuid>)) -> Result<bool> {
            Ok(self.saved.lock().unwrap().iter().any(|c| &c.dedup_key() == dedup_key))
        }

        async fn save_attack_chain(&self, chain: &AttackChain) -> Result<()> {
            self.saved_chains.lock().unwrap().push(chain.clone());
            Ok(())
        }
    }

    fn burst_events() -> Vec<SecurityEvent> {
        (0..5)
            .map(|i| {
                let created_at = Utc::now() - chrono::Duration::seconds(i);
                SecurityEvent {
                    id: Uuid::new_v4(),
                    original_event: LogEvent {
                        time: created_at,
                        host: "host1".to_string(),
                        channel: "Security".to_string(),
                        event_id: 4625,
                        level: "Information".to_string(),
                        user: "alice".to_string(),
                        message: String::new(),
                        unique_id: Uuid::new_v4().to_string(),
                    },
                    event_type: "failed_logon".to_string(),
                    risk_level: RiskLevel::Low,
                    confidence: 40,
                    summary: String::new(),
                    mitre_techniques: Default::default(),
                    recommended_actions: Vec::new(),
                    is_deterministic: true,
                    correlation_id: None,
                    correlation_score: 0.0,
                    burst_score: 0.0,
                    anomaly_score: 0.0,
                    status: EventStatus::Open,
                    created_at,
                }
            })
            .collect()
    }

    #[tokio::test]
    async fn run_once_persists_correlations_and_updates_scores() {
        let events = burst_events();
        let source = Arc::new(FakeSource { events: events.clone(), updates: StdMutex::new(Vec::new()) });
        let sink = Arc::new(FakeSink::default());
        let config = CorrelationConfig { burst_threshold: 3, burst_window_seconds: 300, ..CorrelationConfig::default() };

        let engine = CorrelationEngine::new(config, source.clone(), sink.clone());
        let correlations = engine.run_once().await.unwrap();

        assert!(!correlations.is_empty());
        assert!(!sink.saved.lock().unwrap().is_empty());
        assert!(!source.updates.lock().unwrap().is_empty());

        let stats = engine.stats().await;
        assert_eq!(stats.total_events_processed, events.len() as u64);
        assert!(stats.correlations_detected > 0);
    }

    #[tokio::test]
    async fn run_once_does_not_redetect_an_already_saved_correlation() {
        let events = burst_events();
        let source = Arc::new(FakeSource { events: events.clone(), updates: StdMutex::new(Vec::new()) });
        let sink = Arc::new(FakeSink::default());
        let config = CorrelationConfig { burst_threshold: 3, burst_window_seconds: 300, ..CorrelationConfig::default() };

        let engine = CorrelationEngine::new(config, source.clone(), sink.clone());
        let first = engine.run_once().await.unwrap();
        let second = engine.run_once().await.unwrap();

        assert!(!first.is_empty());
        assert!(second.is_empty());
    }
}
