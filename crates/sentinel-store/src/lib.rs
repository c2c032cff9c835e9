//! Durable local storage for [`SecurityEvent`]s, backed by `sled`. One
//! primary tree keyed by event id plus four secondary index trees (time,
//! risk level, event type, host+time, user+time) that map a sortable key
//! to the primary id.

mod filter;
mod keys;

pub use filter::EventFilter;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use sentinel_common::types::{AttackChain, Correlation, CorrelationType, EventStatus, RiskLevel, SecurityEvent};
use sentinel_common::{Error, Result};
use sentinel_correlate::{CorrelationSink, EventSource};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

const TREE_EVENTS: &str = "events";
const TREE_IDX_TIME: &str = "idx_time";
const TREE_IDX_RISK: &str = "idx_risk";
const TREE_IDX_EVENT_TYPE: &str = "idx_event_type";
const TREE_IDX_HOST_TIME: &str = "idx_host_time";
const TREE_IDX_USER_TIME: &str = "idx_user_time";
const TREE_CORRELATIONS: &str = "correlations";
const TREE_CORRELATION_DEDUP: &str = "correlation_dedup";
const TREE_ATTACK_CHAINS: &str = "attack_chains";

fn sled_err(context: &str, error: sled::Error) -> Error {
    Error::Other(anyhow::anyhow!("{context}: {error}"))
}

fn bincode_err(context: &str, error: bincode::Error) -> Error {
    Error::Corruption(format!("{context}: {error}"))
}

pub struct SecurityEventStore {
    db: sled::Db,
    events: sled::Tree,
    idx_time: sled::Tree,
    idx_risk: sled::Tree,
    idx_event_type: sled::Tree,
    idx_host_time: sled::Tree,
    idx_user_time: sled::Tree,
    correlations: sled::Tree,
    correlation_dedup: sled::Tree,
    attack_chains: sled::Tree,
    write_locks: DashMap<Uuid, Arc<Mutex<()>>>,
}

impl SecurityEventStore {
    pub fn open(data_dir: impl AsRef<Path>) -> Result<Self> {
        let db = sled::open(data_dir.as_ref()).map_err(|e| sled_err("failed to open event store", e))?;
        let events = db.open_tree(TREE_EVENTS).map_err(|e| sled_err("failed to open events tree", e))?;
        let idx_time = db.open_tree(TREE_IDX_TIME).map_err(|e| sled_err("failed to open time index", e))?;
        let idx_risk = db.open_tree(TREE_IDX_RISK).map_err(|e| sled_err("failed to open risk index", e))?;
        let idx_event_type =
            db.open_tree(TREE_IDX_EVENT_TYPE).map_err(|e| sled_err("failed to open event-type index", e))?;
        let idx_host_time = db.open_tree(TREE_IDX_HOST_TIME).map_err(|e| sled_err("failed to open host index", e))?;
        let idx_user_time = db.open_tree(TREE_IDX_USER_TIME).map_err(|e| sled_err("failed to open user index", e))?;
        let correlations = db.open_tree(TREE_CORRELATIONS).map_err(|e| sled_err("failed to open correlations tree", e))?;
        let correlation_dedup =
            db.open_tree(TREE_CORRELATION_DEDUP).map_err(|e| sled_err("failed to open correlation dedup tree", e))?;
        let attack_chains = db.open_tree(TREE_ATTACK_CHAINS).map_err(|e| sled_err("failed to open attack chains tree", e))?;

        Ok(Self {
            db,
            events,
            idx_time,
            idx_risk,
            idx_event_type,
            idx_host_time,
            idx_user_time,
            correlations,
            correlation_dedup,
            attack_chains,
            write_locks: DashMap::new(),
        })
    }

    pub fn flush(&self) -> Result<()> {
        self.db.flush().map_err(|e| sled_err("failed to flush event store", e))?;
        Ok(())
    }

    fn lock_for(&self, id: Uuid) -> Arc<Mutex<()>> {
        self.write_locks.entry(id).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    fn remove_index_entries(&self, event: &SecurityEvent) -> Result<()> {
        let time_key = keys::time_key(event.created_at, event.id);
        self.idx_time.remove(&time_key).map_err(|e| sled_err("failed to remove time index entry", e))?;
        self.idx_risk
            .remove(keys::risk_key(event.risk_level, &time_key))
            .map_err(|e| sled_err("failed to remove risk index entry", e))?;
        self.idx_event_type
            .remove(keys::prefixed_key(&event.event_type, &time_key))
            .map_err(|e| sled_err("failed to remove event-type index entry", e))?;
        self.idx_host_time
            .remove(keys::prefixed_key(&event.original_event.host, &time_key))
            .map_err(|e| sled_err("failed to remove host index entry", e))?;
        self.idx_user_time
            .remove(keys::prefixed_key(&event.original_event.user, &time_key))
            .map_err(|e| sled_err("failed to remove user index entry", e))?;
        Ok(())
    }

    fn write_index_entries(&self, event: &SecurityEvent) -> Result<()> {
        let time_key = keys::time_key(event.created_at, event.id);
        let id_bytes = event.id.as_bytes().to_vec();
        self.idx_time.insert(&time_key, id_bytes.clone()).map_err(|e| sled_err("failed to write time index entry", e))?;
        self.idx_risk
            .insert(keys::risk_key(event.risk_level, &time_key), id_bytes.clone())
            .map_err(|e| sled_err("failed to write risk index entry", e))?;
        self.idx_event_type
            .insert(keys::prefixed_key(&event.event_type, &time_key), id_bytes.clone())
            .map_err(|e| sled_err("failed to write event-type index entry", e))?;
        self.idx_host_time
            .insert(keys::prefixed_key(&event.original_event.host, &time_key), id_bytes.clone())
            .map_err(|e| sled_err("failed to write host index entry", e))?;
        self.idx_user_time
            .insert(keys::prefixed_key(&event.original_event.user, &time_key), id_bytes)
            .map_err(|e| sled_err("failed to write user index entry", e))?;
        Ok(())
    }

    /// Idempotent by `event.id`: re-saving the same id replaces both the
    /// record and its index entries rather than leaving stale ones behind.
    pub async fn save(&self, event: SecurityEvent) -> Result<()> {
        let lock = self.lock_for(event.id);
        let _guard = lock.lock().await;

        if let Some(existing) = self.get_by_id_sync(event.id)? {
            self.remove_index_entries(&existing)?;
        }

        let bytes = bincode::serialize(&event).map_err(|e| bincode_err("failed to serialize security event", e))?;
        self.events.insert(event.id.as_bytes(), bytes).map_err(|e| sled_err("failed to write security event", e))?;
        self.write_index_entries(&event)?;
        Ok(())
    }

    fn get_by_id_sync(&self, id: Uuid) -> Result<Option<SecurityEvent>> {
        match self.events.get(id.as_bytes()).map_err(|e| sled_err("failed to read security event", e))? {
            Some(bytes) => {
                let event = bincode::deserialize(&bytes).map_err(|e| bincode_err("failed to deserialize security event", e))?;
                Ok(Some(event))
            }
            None => Ok(None),
        }
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<Option<SecurityEvent>> {
        self.get_by_id_sync(id)
    }

    fn all_events(&self) -> Result<Vec<SecurityEvent>> {
        let mut events = Vec::new();
        for entry in self.events.iter() {
            let (_, bytes) = entry.map_err(|e| sled_err("failed to iterate security events", e))?;
            let event: SecurityEvent =
                bincode::deserialize(&bytes).map_err(|e| bincode_err("failed to deserialize security event", e))?;
            events.push(event);
        }
        Ok(events)
    }

    /// Ordering by `timestamp desc` by default; applies `filter` in memory
    /// after a full scan, since no single index covers every filter key.
    pub async fn list(&self, page: usize, per_page: usize, filter: &EventFilter) -> Result<Vec<SecurityEvent>> {
        let mut events = self.all_events()?;
        events.retain(|event| filter.matches(event));
        events.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let start = page.saturating_mul(per_page);
        Ok(events.into_iter().skip(start).take(per_page).collect())
    }

    pub async fn count(&self) -> Result<u64> {
        Ok(self.events.len() as u64)
    }

    pub async fn count_by_risk_level(&self) -> Result<HashMap<RiskLevel, u64>> {
        let mut counts = HashMap::new();
        for event in self.all_events()? {
            *counts.entry(event.risk_level).or_insert(0) += 1;
        }
        Ok(counts)
    }

    pub async fn count_by_status(&self) -> Result<HashMap<EventStatus, u64>> {
        let mut counts = HashMap::new();
        for event in self.all_events()? {
            *counts.entry(event.status).or_insert(0) += 1;
        }
        Ok(counts)
    }

    pub async fn get_in_range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        event_types: Option<&[String]>,
    ) -> Result<Vec<SecurityEvent>> {
        let lower = keys::time_key(from, Uuid::nil());
        let upper = keys::time_key(to, Uuid::max());

        let mut events = Vec::new();
        for entry in self.idx_time.range(lower..=upper) {
            let (_, id_bytes) = entry.map_err(|e| sled_err("failed to scan time index", e))?;
            let id = Uuid::from_slice(&id_bytes).map_err(|e| Error::Corruption(format!("malformed id in time index: {e}")))?;
            if let Some(event) = self.get_by_id_sync(id)? {
                if event_types.map(|types| types.iter().any(|t| t == &event.event_type)).unwrap_or(true) {
                    events.push(event);
                }
            }
        }
        Ok(events)
    }

    pub async fn save_correlation(&self, correlation: &Correlation) -> Result<()> {
        let bytes = bincode::serialize(correlation).map_err(|e| bincode_err("failed to serialize correlation", e))?;
        self.correlations
            .insert(correlation.id.as_bytes(), bytes)
            .map_err(|e| sled_err("failed to write correlation", e))?;

        let dedup_bytes = bincode::serialize(&correlation.dedup_key()).map_err(|e| bincode_err("failed to serialize dedup key", e))?;
        self.correlation_dedup
            .insert(dedup_bytes, correlation.id.as_bytes())
            .map_err(|e| sled_err("failed to write correlation dedup marker", e))?;
        Ok(())
    }

    pub async fn has_correlation(&self, dedup_key: &(CorrelationType, Vec<Uuid>)) -> Result<bool> {
        let dedup_bytes = bincode::serialize(dedup_key).map_err(|e| bincode_err("failed to serialize dedup key", e))?;
        Ok(self
            .correlation_dedup
            .contains_key(dedup_bytes)
            .map_err(|e| sled_err("failed to check correlation dedup marker", e))?)
    }

    pub async fn save_attack_chain(&self, chain: &AttackChain) -> Result<()> {
        let bytes = bincode::serialize(chain).map_err(|e| bincode_err("failed to serialize attack chain", e))?;
        self.attack_chains
            .insert(chain.id.as_bytes(), bytes)
            .map_err(|e| sled_err("failed to write attack chain", e))?;
        Ok(())
    }

    pub async fn get_attack_chain(&self, id: Uuid) -> Result<Option<AttackChain>> {
        match self.attack_chains.get(id.as_bytes()).map_err(|e| sled_err("failed to read attack chain", e))? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes).map_err(|e| bincode_err("failed to deserialize attack chain", e))?)),
            None => Ok(None),
        }
    }

    pub async fn update_scores(&self, event_id: Uuid, correlation_score: f32, burst_score: f32, anomaly_score: f32) -> Result<()> {
        let lock = self.lock_for(event_id);
        let _guard = lock.lock().await;

        let mut event = match self.get_by_id_sync(event_id)? {
            Some(event) => event,
            None => return Err(Error::Other(anyhow::anyhow!("cannot update scores: no event with id {event_id}"))),
        };

        event.correlation_score = event.correlation_score.max(correlation_score);
        event.burst_score = event.burst_score.max(burst_score);
        event.anomaly_score = event.anomaly_score.max(anomaly_score);

        let bytes = bincode::serialize(&event).map_err(|e| bincode_err("failed to serialize security event", e))?;
        self.events.insert(event.id.as_bytes(), bytes).map_err(|e| sled_err("failed to update security event", e))?;
        Ok(())
    }
}

#[async_trait]
impl EventSource for SecurityEventStore {
    async fn get_in_range(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<SecurityEvent>> {
        SecurityEventStore::get_in_range(self, from, to, None).await
    }

    async fn update_scores(&self, event_id: Uuid, correlation_score: f32, burst_score: f32, anomaly_score: f32) -> Result<()> {
        SecurityEventStore::update_scores(self, event_id, correlation_score, burst_score, anomaly_score).await
    }
}

#[async_trait]
impl CorrelationSink for SecurityEventStore {
    async fn save_correlation(&self, correlation: &Correlation) -> Result<()> {
        SecurityEventStore::save_correlation(self, correlation).await
    }

    async fn has_correlation(&self, dedup_key: &(CorrelationType, Vec<Uuid>)) -> Result<bool> {
        SecurityEventStore::has_correlation(self, dedup_key).await
    }

    async fn save_attack_chain(&self, chain: &AttackChain) -> Result<()> {
        SecurityEventStore::save_attack_chain(self, chain).await
    }
}
