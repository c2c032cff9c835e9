//! Configuration tree for the event-analysis pipeline.
//!
//! Loaded via `serde` + the `config` crate, layering a TOML file,
//! environment variables (`SENTINEL__SECTION__KEY`), and the defaults
//! below. Unknown keys are warnings, never hard errors; validated once
//! at startup with [`Config::validate`].

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub connection_pools: ConnectionPoolsConfig,
    pub embeddings: EmbeddingsConfig,
    pub embedding_cache: EmbeddingCacheConfig,
    pub resilience: ResilienceConfig,
    pub llm: LlmConfig,
    pub strict_json: StrictJsonConfig,
    pub ensemble: EnsembleConfig,
    pub hybrid_search: HybridSearchConfig,
    pub qdrant: QdrantConfig,
    pub correlation: CorrelationConfig,
    pub ignore_patterns: Vec<IgnorePattern>,
    pub pipeline: PipelineConfig,
    pub logging: LoggingConfig,
    pub store: StoreConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            connection_pools: ConnectionPoolsConfig::default(),
            embeddings: EmbeddingsConfig::default(),
            embedding_cache: EmbeddingCacheConfig::default(),
            resilience: ResilienceConfig::default(),
            llm: LlmConfig::default(),
            strict_json: StrictJsonConfig::default(),
            ensemble: EnsembleConfig::default(),
            hybrid_search: HybridSearchConfig::default(),
            qdrant: QdrantConfig::default(),
            correlation: CorrelationConfig::default(),
            ignore_patterns: Vec::new(),
            pipeline: PipelineConfig::default(),
            logging: LoggingConfig::default(),
            store: StoreConfig::default(),
        }
    }
}

impl Config {
    /// Layers `config.{toml,yaml,json}` (if present in the working
    /// directory) over built-in defaults, then `SENTINEL__SECTION__KEY`
    /// environment variables over that, and validates the result.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Like [`Config::load`], but layers an explicit file path (if given)
    /// instead of the default `config.{toml,...}` in the working directory.
    pub fn load_from(path: Option<&str>) -> Result<Self> {
        let raw = ::config::Config::builder()
            .add_source(::config::File::with_name(path.unwrap_or("config")).required(path.is_some()))
            .add_source(::config::Environment::with_prefix("SENTINEL").separator("__"))
            .build()
            .map_err(|e| Error::Validation(format!("failed to load configuration: {e}")))?;

        let config: Config = raw
            .try_deserialize()
            .map_err(|e| Error::Validation(format!("failed to parse configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject nonsensical values before the pipeline starts. Any failure
    /// here is a [`Error::Validation`] and should abort startup with a
    /// non-zero exit code.
    pub fn validate(&self) -> Result<()> {
        if self.connection_pools.default_max_pool_size == 0 {
            return Err(Error::Validation(
                "connection_pools.default_max_pool_size must be > 0".into(),
            ));
        }
        let weight_sum = self.hybrid_search.vector_weight + self.hybrid_search.metadata_weight;
        if self.hybrid_search.enabled && (weight_sum - 1.0).abs() > 1e-3 {
            return Err(Error::Validation(format!(
                "hybrid_search.vector_weight + metadata_weight must equal 1, got {weight_sum}"
            )));
        }
        if !(0.1..=2.0).contains(&self.connection_pools.load_balancing.weight_adjustment_factor) {
            return Err(Error::Validation(
                "connection_pools.load_balancing.weight_adjustment_factor must be in [0.1, 2.0]"
                    .into(),
            ));
        }
        if self.ensemble.enabled && self.ensemble.models.is_empty() {
            return Err(Error::Validation(
                "ensemble.enabled requires at least one model".into(),
            ));
        }
        if self.ensemble.enabled && self.ensemble.min_quorum == 0 {
            return Err(Error::Validation("ensemble.min_quorum must be > 0".into()));
        }
        if self.pipeline.max_in_flight == 0 {
            return Err(Error::Validation("pipeline.max_in_flight must be > 0".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionPoolsConfig {
    pub default_max_pool_size: u32,
    pub request_timeout_ms: u64,
    pub max_retry_attempts: u32,
    pub retry_delay_ms: u64,
    pub circuit_breaker_failure_threshold: u32,
    pub circuit_breaker_timeout_ms: u64,
    pub circuit_breaker_retry_timeout_ms: u64,
    pub http_client_pools: std::collections::HashMap<String, HttpClientPoolConfig>,
    pub qdrant_pools: std::collections::HashMap<String, QdrantPoolConfig>,
    pub health_check: PoolHealthCheckConfig,
    pub load_balancing: LoadBalancingConfig,
    pub metrics: PoolMetricsConfig,
}

impl Default for ConnectionPoolsConfig {
    fn default() -> Self {
        Self {
            default_max_pool_size: 10,
            request_timeout_ms: 30_000,
            max_retry_attempts: 3,
            retry_delay_ms: 1_000,
            circuit_breaker_failure_threshold: 5,
            circuit_breaker_timeout_ms: 30_000,
            circuit_breaker_retry_timeout_ms: 60_000,
            http_client_pools: std::collections::HashMap::new(),
            qdrant_pools: std::collections::HashMap::new(),
            health_check: PoolHealthCheckConfig::default(),
            load_balancing: LoadBalancingConfig::default(),
            metrics: PoolMetricsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpClientPoolConfig {
    pub max_pool_size: u32,
    pub max_idle_connections: u32,
    pub connection_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QdrantPoolConfig {
    pub host: String,
    pub port: u16,
    pub api_key: Option<String>,
    pub max_pool_size: u32,
    pub max_idle_connections: u32,
    pub connection_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolHealthCheckConfig {
    pub enable_health_checks: bool,
    pub health_check_interval_ms: u64,
    pub health_check_timeout_ms: u64,
}

impl Default for PoolHealthCheckConfig {
    fn default() -> Self {
        Self {
            enable_health_checks: true,
            health_check_interval_ms: 30_000,
            health_check_timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadBalancingConfig {
    pub strategy: LoadBalancingStrategy,
    pub weight_adjustment_factor: f32,
    pub sticky_session_timeout_ms: u64,
}

impl Default for LoadBalancingConfig {
    fn default() -> Self {
        Self {
            strategy: LoadBalancingStrategy::HealthAware,
            weight_adjustment_factor: 1.0,
            sticky_session_timeout_ms: 300_000,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum LoadBalancingStrategy {
    RoundRobin,
    WeightedRoundRobin,
    LeastConnections,
    HealthAware,
    Random,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolMetricsConfig {
    pub metrics_retention_minutes: u32,
}

impl Default for PoolMetricsConfig {
    fn default() -> Self {
        Self {
            metrics_retention_minutes: 60,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum EmbeddingProvider {
    Ollama,
    OpenAI,
    Mock,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingsConfig {
    pub provider: EmbeddingProvider,
    pub model: String,
    pub vector_size: usize,
}

impl Default for EmbeddingsConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::Ollama,
            model: "nomic-embed-text".to_string(),
            vector_size: 768,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingCacheConfig {
    pub enabled: bool,
    pub ttl_minutes: u32,
    pub max_entries: u32,
}

impl Default for EmbeddingCacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_minutes: 60,
            max_entries: 10_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResilienceConfig {
    pub embedding: EmbeddingResilienceConfig,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            embedding: EmbeddingResilienceConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingResilienceConfig {
    pub enabled: bool,
    pub retry_count: u32,
    pub retry_base_delay_ms: u64,
    pub timeout_seconds: u64,
    pub circuit_breaker_threshold: u32,
    pub circuit_breaker_duration_minutes: u32,
}

impl Default for EmbeddingResilienceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            retry_count: 2,
            retry_base_delay_ms: 200,
            timeout_seconds: 5,
            circuit_breaker_threshold: 5,
            circuit_breaker_duration_minutes: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: String,
    pub model: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            model: "llama3".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StrictJsonConfig {
    pub enabled: bool,
    pub enable_retry_on_failure: bool,
}

impl Default for StrictJsonConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            enable_retry_on_failure: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnsembleConfig {
    pub enabled: bool,
    pub min_quorum: u32,
    pub deadline_ms: u64,
    pub models: Vec<EnsembleModelConfig>,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            min_quorum: 1,
            deadline_ms: 10_000,
            models: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnsembleModelConfig {
    pub name: String,
    pub provider: String,
    pub weight: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HybridSearchConfig {
    pub enabled: bool,
    pub vector_weight: f32,
    pub metadata_weight: f32,
    pub recency_weight: f32,
    pub recency_decay_hours: f32,
    pub over_fetch_multiplier: f32,
}

impl Default for HybridSearchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            vector_weight: 0.7,
            metadata_weight: 0.3,
            recency_weight: 0.2,
            recency_decay_hours: 24.0,
            over_fetch_multiplier: 3.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QdrantConfig {
    pub host: String,
    pub port: u16,
    pub https: bool,
    pub api_key: Option<String>,
    pub collection: String,
    pub vector_size: usize,
    pub distance: String,
}

impl Default for QdrantConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 6334,
            https: false,
            api_key: None,
            collection: "security_events".to_string(),
            vector_size: 768,
            distance: "Cosine".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrelationConfig {
    pub analysis_interval_seconds: u64,
    pub lookback_minutes: u32,
    pub burst_threshold: u32,
    pub burst_window_seconds: u64,
    pub chain_window_minutes: u32,
    pub lateral_threshold: u32,
    pub lateral_window_minutes: u32,
    pub privilege_window_minutes: u32,
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            analysis_interval_seconds: 30,
            lookback_minutes: 60,
            burst_threshold: 10,
            burst_window_seconds: 60,
            chain_window_minutes: 30,
            lateral_threshold: 3,
            lateral_window_minutes: 15,
            privilege_window_minutes: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IgnorePattern {
    pub channel: Option<String>,
    pub event_id: Option<i64>,
    pub message_pattern: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub max_in_flight: u32,
    pub neighbor_k: u32,
    pub min_risk_to_persist: String,
    pub per_event_deadline_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_in_flight: 64,
            neighbor_k: 5,
            min_risk_to_persist: "low".to_string(),
            per_event_deadline_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            ansi: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub data_dir: PathBuf,
    pub flush_interval_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            flush_interval_ms: 5_000,
        }
    }
}

impl Default for EmbeddingProvider {
    fn default() -> Self {
        EmbeddingProvider::Ollama
    }
}

impl Default for LoadBalancingStrategy {
    fn default() -> Self {
        LoadBalancingStrategy::HealthAware
    }
}

impl Default for LogFormat {
    fn default() -> Self {
        LogFormat::Pretty
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn mismatched_hybrid_weights_fail_validation() {
        let mut config = Config::default();
        config.hybrid_search.vector_weight = 0.9;
        config.hybrid_search.metadata_weight = 0.3;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_pool_size_fails_validation() {
        let mut config = Config::default();
        config.connection_pools.default_max_pool_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn ensemble_without_models_fails_validation() {
        let mut config = Config::default();
        config.ensemble.enabled = true;
        assert!(config.validate().is_err());
    }
}
