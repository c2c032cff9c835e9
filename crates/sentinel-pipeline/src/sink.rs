//! Decorates a [`CorrelationSink`] so every newly persisted correlation is
//! also published on the `CorrelationAlerts` topic, keeping the broadcast
//! fabric and the durable store in step without teaching the correlation
//! engine anything about pub/sub.

use async_trait::async_trait;
use sentinel_broadcast::{Broadcaster, Topic};
use sentinel_common::types::{AttackChain, Correlation, CorrelationType};
use sentinel_common::Result;
use sentinel_correlate::CorrelationSink;
use std::sync::Arc;
use uuid::Uuid;

pub struct BroadcastingCorrelationSink {
    inner: Arc<dyn CorrelationSink>,
    broadcaster: Arc<Broadcaster>,
}

impl BroadcastingCorrelationSink {
    pub fn new(inner: Arc<dyn CorrelationSink>, broadcaster: Arc<Broadcaster>) -> Self {
        Self { inner, broadcaster }
    }
}

#[async_trait]
impl CorrelationSink for BroadcastingCorrelationSink {
    async fn save_correlation(&self, correlation: &Correlation) -> Result<()> {
        self.inner.save_correlation(correlation).await?;
        let payload = serde_json::to_value(correlation).unwrap_or_default();
        self.broadcaster.publish(Topic::CorrelationAlerts, payload);
        Ok(())
    }

    async fn has_correlation(&self, dedup_key: &(CorrelationType, Vec<Uuid>)) -> Result<bool> {
        self.inner.has_correlation(dedup_key).await
    }

    async fn save_attack_chain(&self, chain: &AttackChain) -> Result<()> {
        self.inner.save_attack_chain(chain).await?;
        let payload = serde_json::to_value(chain).unwrap_or_default();
        self.broadcaster.publish(Topic::CorrelationAlerts, payload);
        Ok(())
    }
}
