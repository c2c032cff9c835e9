//! Vector store with a Hybrid -> Base decorator (outermost first; Hybrid
//! only present when enabled by configuration). The base contract talks to
//! a remote collection store over a [`sentinel_pool::ConnectionPool`];
//! `point_id_for` derives a stable id so re-ingesting the same event is a
//! no-op rather than a duplicate.

mod base;
mod hybrid;

pub use base::QdrantVectorStore;
pub use hybrid::HybridVectorStore;

use async_trait::async_trait;
use sentinel_common::types::{ComponentHealth, Embedding, LogEvent};
use sentinel_common::Result;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Durable collection of `(LogEvent, Embedding)` points with similarity
/// search and a 24-hour sliding retention window.
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn ensure_collection(&self) -> Result<()>;
    async fn upsert(&self, event: &LogEvent, embedding: &Embedding) -> Result<()>;
    async fn batch_upsert(&self, items: &[(LogEvent, Embedding)]) -> Result<()>;
    async fn search(&self, query: &Embedding, k: usize) -> Result<Vec<(LogEvent, f32)>>;
    async fn has_24_hours_of_data(&self) -> Result<bool>;
    async fn delete_older_than_24_hours(&self) -> Result<u64>;
    async fn health_check(&self) -> ComponentHealth;
}

/// Deterministic point id derived from `unique_id`: SHA-256 of the id,
/// first 16 bytes reinterpreted as a UUID with version 4 / variant bits
/// stamped in. An empty `unique_id` can't be deduplicated, so it gets a
/// fresh random UUID instead.
pub fn point_id_for(unique_id: &str) -> Uuid {
    if unique_id.is_empty() {
        return Uuid::new_v4();
    }
    let digest = Sha256::digest(unique_id.as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    bytes[6] = (bytes[6] & 0x0f) | 0x40;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;
    Uuid::from_bytes(bytes)
}

/// Build the full decorator chain over a pool-backed Qdrant base store.
pub fn build_vector_store(
    pool: std::sync::Arc<sentinel_pool::ConnectionPool>,
    qdrant: sentinel_common::config::QdrantConfig,
    hybrid: sentinel_common::config::HybridSearchConfig,
) -> std::sync::Arc<dyn VectorStore> {
    let base: std::sync::Arc<dyn VectorStore> = std::sync::Arc::new(QdrantVectorStore::new(pool, qdrant));
    std::sync::Arc::new(HybridVectorStore::new(base, hybrid))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_id_is_deterministic_for_the_same_unique_id() {
        assert_eq!(point_id_for("abc123"), point_id_for("abc123"));
        assert_ne!(point_id_for("abc123"), point_id_for("xyz789"));
    }

    #[test]
    fn point_id_is_version_4_variant_shaped() {
        let id = point_id_for("abc123");
        assert_eq!(id.get_version_num(), 4);
    }

    #[test]
    fn empty_unique_id_yields_a_fresh_random_id_each_time() {
        assert_ne!(point_id_for(""), point_id_for(""));
    }
}
