//! Base vector store: talks to a Qdrant-compatible REST API through a
//! pooled HTTP client. `ensure_collection` is idempotent; retention is
//! enforced by a payload filter-delete rather than a local scan.

use crate::{point_id_for, VectorStore};
use async_trait::async_trait;
use chrono::Utc;
use sentinel_common::config::QdrantConfig;
use sentinel_common::types::{ComponentHealth, Embedding, HealthLevel, LogEvent};
use sentinel_common::{Error, Result};
use sentinel_pool::ConnectionPool;
use std::sync::Arc;
use uuid::Uuid;

pub struct QdrantVectorStore {
    pool: Arc<ConnectionPool>,
    client: reqwest::Client,
    config: QdrantConfig,
}

impl QdrantVectorStore {
    pub fn new(pool: Arc<ConnectionPool>, config: QdrantConfig) -> Self {
        Self {
            pool,
            client: reqwest::Client::new(),
            config,
        }
    }

    async fn request<T: serde::de::DeserializeOwned>(&self, method: reqwest::Method, path: &str, body: Option<serde_json::Value>) -> Result<T> {
        let conn = self.pool.get(None).await?;
        let url = format!("{}{}", conn.base_url, path);
        let started = std::time::Instant::now();

        let mut request = self.client.request(method, &url);
        if let Some(body) = body {
            request = request.json(&body);
        }
        if let Some(api_key) = &self.config.api_key {
            request = request.header("api-key", api_key);
        }

        let response = request.send().await.map_err(|e| Error::TransientRemote(e.to_string()))?;
        let elapsed = started.elapsed().as_millis() as u64;

        if response.status().is_server_error() || response.status().as_u16() == 429 {
            self.pool.record_outcome(&conn.instance_id, false, elapsed).await;
            return Err(Error::TransientRemote(format!("qdrant returned {}", response.status())));
        }
        if !response.status().is_success() {
            self.pool.record_outcome(&conn.instance_id, false, elapsed).await;
            return Err(Error::FatalRemote(format!("qdrant returned {}", response.status())));
        }

        let parsed = response.json::<T>().await.map_err(|e| Error::TransientRemote(e.to_string()))?;
        self.pool.record_outcome(&conn.instance_id, true, elapsed).await;
        Ok(parsed)
    }

    fn point_payload(id: Uuid, event: &LogEvent, embedding: &Embedding) -> serde_json::Value {
        serde_json::json!({
            "id": id.to_string(),
            "vector": { "log_events": embedding },
            "payload": event,
        })
    }
}

#[derive(serde::Deserialize)]
struct Ack {}

#[derive(serde::Deserialize)]
struct SearchResponse {
    result: Vec<ScoredPoint>,
}

#[derive(serde::Deserialize)]
struct ScoredPoint {
    score: f32,
    payload: LogEvent,
}

#[derive(serde::Deserialize)]
struct CountResponse {
    result: CountResult,
}

#[derive(serde::Deserialize)]
struct CountResult {
    count: u64,
}

#[derive(serde::Deserialize)]
struct ScrollResponse {
    result: ScrollResult,
}

#[derive(serde::Deserialize)]
struct ScrollResult {
    points: Vec<ScrollPoint>,
}

#[derive(serde::Deserialize)]
struct ScrollPoint {
    payload: LogEvent,
}

#[async_trait]
impl VectorStore for QdrantVectorStore {
    async fn ensure_collection(&self) -> Result<()> {
        let path = format!("/collections/{}", self.config.collection);
        let body = serde_json::json!({
            "vectors": {
                "log_events": {
                    "size": self.config.vector_size,
                    "distance": self.config.distance,
                }
            }
        });
        // PUT is idempotent: Qdrant no-ops when the collection already
        // matches this configuration.
        let _: Ack = self.request(reqwest::Method::PUT, &path, Some(body)).await?;
        Ok(())
    }

    async fn upsert(&self, event: &LogEvent, embedding: &Embedding) -> Result<()> {
        self.batch_upsert(std::slice::from_ref(&(event.clone(), embedding.clone()))).await
    }

    async fn batch_upsert(&self, items: &[(LogEvent, Embedding)]) -> Result<()> {
        if items.is_empty() {
            return Ok(());
        }
        let points: Vec<serde_json::Value> = items
            .iter()
            .map(|(event, embedding)| Self::point_payload(point_id_for(&event.unique_id), event, embedding))
            .collect();
        let path = format!("/collections/{}/points?wait=true", self.config.collection);
        let body = serde_json::json!({ "points": points });
        let _: Ack = self.request(reqwest::Method::PUT, &path, Some(body)).await?;
        Ok(())
    }

    async fn search(&self, query: &Embedding, k: usize) -> Result<Vec<(LogEvent, f32)>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let path = format!("/collections/{}/points/search", self.config.collection);
        let body = serde_json::json!({
            "vector": { "name": "log_events", "vector": query },
            "limit": k,
            "with_payload": true,
        });
        let response: SearchResponse = self.request(reqwest::Method::POST, &path, Some(body)).await?;
        Ok(response.result.into_iter().map(|p| (p.payload, p.score)).collect())
    }

    async fn has_24_hours_of_data(&self) -> Result<bool> {
        let count_path = format!("/collections/{}/points/count", self.config.collection);
        let count: CountResponse = self
            .request(reqwest::Method::POST, &count_path, Some(serde_json::json!({ "exact": true })))
            .await?;
        if count.result.count < 10 {
            return Ok(false);
        }

        let cutoff = Utc::now() - chrono::Duration::hours(24);
        let scroll_path = format!("/collections/{}/points/scroll", self.config.collection);
        let body = serde_json::json!({
            "filter": { "must": [{ "key": "time", "range": { "gte": cutoff } }] },
            "limit": 1,
            "with_payload": true,
        });
        let scroll: ScrollResponse = self.request(reqwest::Method::POST, &scroll_path, Some(body)).await?;
        Ok(!scroll.result.points.is_empty())
    }

    async fn delete_older_than_24_hours(&self) -> Result<u64> {
        let cutoff = Utc::now() - chrono::Duration::hours(24);
        let before_path = format!("/collections/{}/points/count", self.config.collection);
        let before: CountResponse = self
            .request(reqwest::Method::POST, &before_path, Some(serde_json::json!({ "exact": true })))
            .await?;

        let delete_path = format!("/collections/{}/points/delete?wait=true", self.config.collection);
        let body = serde_json::json!({
            "filter": { "must": [{ "key": "time", "range": { "lt": cutoff } }] }
        });
        let _: Ack = self.request(reqwest::Method::POST, &delete_path, Some(body)).await?;

        let after: CountResponse = self
            .request(reqwest::Method::POST, &before_path, Some(serde_json::json!({ "exact": true })))
            .await?;
        Ok(before.result.count.saturating_sub(after.result.count))
    }

    async fn health_check(&self) -> ComponentHealth {
        match self.has_24_hours_of_data().await {
            Ok(has_data) => ComponentHealth {
                status: HealthLevel::Healthy,
                message: format!("reachable, has_24h_data={has_data}"),
                last_check: sentinel_common::utils::current_timestamp(),
                metrics: Default::default(),
            },
            Err(err) => ComponentHealth {
                status: HealthLevel::Critical,
                message: format!("vector store unreachable: {err}"),
                last_check: sentinel_common::utils::current_timestamp(),
                metrics: Default::default(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_common::config::{LoadBalancingConfig, PoolHealthCheckConfig};

    fn store_with_no_instances() -> QdrantVectorStore {
        let pool = Arc::new(ConnectionPool::new(
            "qdrant-test",
            Vec::new(),
            4,
            LoadBalancingConfig::default(),
            PoolHealthCheckConfig::default(),
        ));
        QdrantVectorStore::new(pool, QdrantConfig::default())
    }

    #[tokio::test]
    async fn search_with_zero_k_never_touches_the_pool() {
        let store = store_with_no_instances();
        let results = store.search(&vec![0.1, 0.2], 0).await.unwrap();
        assert!(results.is_empty());
    }
}
