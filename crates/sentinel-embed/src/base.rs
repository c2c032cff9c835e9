//! Base embedding backends: the remote HTTP provider, and a deterministic
//! mock used in tests and for the `Mock` configuration provider.

use crate::EmbeddingBackend;
use async_trait::async_trait;
use sentinel_common::types::Embedding;
use sentinel_common::{Error, Result};
use sentinel_pool::ConnectionPool;
use std::sync::Arc;

/// Calls a remote `text -> vector<float>[D]` embedding endpoint through a
/// [`ConnectionPool`].
pub struct HttpEmbeddingBackend {
    pool: Arc<ConnectionPool>,
    client: reqwest::Client,
    model: String,
    vector_size: usize,
}

impl HttpEmbeddingBackend {
    pub fn new(pool: Arc<ConnectionPool>, model: String, vector_size: usize) -> Self {
        Self {
            pool,
            client: reqwest::Client::new(),
            model,
            vector_size,
        }
    }
}

#[derive(serde::Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(serde::Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
}

#[async_trait]
impl EmbeddingBackend for HttpEmbeddingBackend {
    async fn call(&self, text: &str) -> Result<Embedding> {
        let conn = self.pool.get(None).await?;
        let url = format!("{}/api/embeddings", conn.base_url);
        let started = std::time::Instant::now();

        let response = self
            .client
            .post(&url)
            .json(&EmbedRequest {
                model: &self.model,
                input: text,
            })
            .send()
            .await
            .map_err(|e| Error::TransientRemote(e.to_string()))?;

        let elapsed = started.elapsed().as_millis() as u64;
        if response.status().is_server_error() || response.status().as_u16() == 429 {
            self.pool.record_outcome(&conn.instance_id, false, elapsed).await;
            return Err(Error::TransientRemote(format!(
                "embedding provider returned {}",
                response.status()
            )));
        }
        if !response.status().is_success() {
            self.pool.record_outcome(&conn.instance_id, false, elapsed).await;
            return Err(Error::FatalRemote(format!(
                "embedding provider returned {}",
                response.status()
            )));
        }

        let parsed: EmbedResponse = response
            .json()
            .await
            .map_err(|e| Error::TransientRemote(e.to_string()))?;
        self.pool.record_outcome(&conn.instance_id, true, elapsed).await;

        if parsed.embedding.len() != self.vector_size {
            return Err(Error::Validation(format!(
                "embedding provider returned {} dims, expected {}",
                parsed.embedding.len(),
                self.vector_size
            )));
        }

        Ok(parsed.embedding)
    }

    fn identity(&self) -> &str {
        &self.model
    }
}

/// Deterministic mock backend: hashes the input into a fixed-size vector.
/// Used by the `Mock` embeddings provider configuration and by tests.
pub struct MockEmbeddingBackend {
    vector_size: usize,
}

impl MockEmbeddingBackend {
    pub fn new(vector_size: usize) -> Self {
        Self { vector_size }
    }
}

#[async_trait]
impl EmbeddingBackend for MockEmbeddingBackend {
    async fn call(&self, text: &str) -> Result<Embedding> {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut hasher = DefaultHasher::new();
        text.hash(&mut hasher);
        let seed = hasher.finish();

        Ok((0..self.vector_size)
            .map(|i| {
                let x = seed.wrapping_add(i as u64).wrapping_mul(2654435761);
                ((x % 2000) as f32 - 1000.0) / 1000.0
            })
            .collect())
    }

    fn identity(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_backend_is_deterministic() {
        let backend = MockEmbeddingBackend::new(8);
        let a = backend.call("hello world").await.unwrap();
        let b = backend.call("hello world").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 8);
    }

    #[tokio::test]
    async fn mock_backend_embeds_empty_string() {
        let backend = MockEmbeddingBackend::new(8);
        let v = backend.call("").await.unwrap();
        assert_eq!(v.len(), 8);
    }
}
