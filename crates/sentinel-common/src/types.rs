//! Shared data model: the types that flow between every component
//! (`LogEvent`, `Embedding`, `SecurityEvent`, `Correlation`, pool/health
//! snapshots) live here so no crate needs to depend on another component
//! crate just to read a payload shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// A raw event as produced by an (out-of-scope) OS log collector.
///
/// Immutable once constructed. `unique_id` is a content hash supplied by the
/// collector and is the sole deduplication key used throughout the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogEvent {
    pub time: DateTime<Utc>,
    pub host: String,
    pub channel: String,
    pub event_id: i64,
    pub level: String,
    pub user: String,
    pub message: String,
    pub unique_id: String,
}

/// A fixed-length numeric vector. Every vector actually stored must have
/// length `D` as configured; an empty embedding is the documented signal for
/// "provider degraded, skip similarity retrieval".
pub type Embedding = Vec<f32>;

/// A point as stored in the vector index: a deterministic id derived from
/// `LogEvent.unique_id`, the embedding, and the original event fields as a
/// payload so retrieval stays event-shaped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorPoint {
    pub id: Uuid,
    pub vector: Embedding,
    pub payload: LogEvent,
}

/// Coarse risk ladder shared by deterministic rules and LLM verdicts.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        }
    }

    pub fn step_up(self) -> Self {
        match self {
            RiskLevel::Low => RiskLevel::Medium,
            RiskLevel::Medium => RiskLevel::High,
            RiskLevel::High | RiskLevel::Critical => RiskLevel::Critical,
        }
    }
}

impl std::str::FromStr for RiskLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(RiskLevel::Low),
            "medium" => Ok(RiskLevel::Medium),
            "high" => Ok(RiskLevel::High),
            "critical" => Ok(RiskLevel::Critical),
            other => Err(format!("unrecognised risk level: {other}")),
        }
    }
}

/// Lifecycle status of a `SecurityEvent` as tracked by an (out-of-scope)
/// operator workflow; the core only persists and reports it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum EventStatus {
    Open,
    Investigating,
    Resolved,
    FalsePositive,
}

/// The merged output of the detection pipeline for one `LogEvent`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityEvent {
    pub id: Uuid,
    pub original_event: LogEvent,
    pub event_type: String,
    pub risk_level: RiskLevel,
    pub confidence: u8,
    pub summary: String,
    pub mitre_techniques: HashSet<String>,
    pub recommended_actions: Vec<String>,
    pub is_deterministic: bool,
    pub correlation_id: Option<Uuid>,
    pub correlation_score: f32,
    pub burst_score: f32,
    pub anomaly_score: f32,
    pub status: EventStatus,
    pub created_at: DateTime<Utc>,
}

/// Strict-JSON shaped verdict produced by the LLM access layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmVerdict {
    pub risk: String,
    pub confidence: u8,
    pub summary: String,
    #[serde(default)]
    pub mitre: Vec<String>,
    #[serde(default)]
    pub recommended_actions: Vec<String>,
}

impl LlmVerdict {
    /// The synthetic fallback verdict produced when the StrictJSON layer
    /// exhausts its retry and cannot coerce any response into valid JSON.
    pub fn fallback(summary: String) -> Self {
        LlmVerdict {
            risk: "low".to_string(),
            confidence: 25,
            summary,
            mitre: Vec::new(),
            recommended_actions: vec![
                "Review the event manually".to_string(),
                "Escalate if additional suspicious activity is observed".to_string(),
            ],
        }
    }
}

/// Kind of multi-event pattern a correlation detector found.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum CorrelationType {
    TemporalBurst,
    AttackChain,
    LateralMovement,
    PrivilegeEscalation,
}

/// A record asserting that a set of events jointly match a pattern.
/// Created once by the correlation engine and never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Correlation {
    pub id: Uuid,
    pub detected_at: DateTime<Utc>,
    pub correlation_type: CorrelationType,
    pub confidence_score: f32,
    pub pattern: String,
    pub event_ids: Vec<Uuid>,
    pub time_window_seconds: i64,
    pub mitre_techniques: HashSet<String>,
    pub risk_level: RiskLevel,
    pub summary: String,
    pub recommended_actions: Vec<String>,
}

impl Correlation {
    /// De-duplication key: `(type, sorted eventIds)`.
    pub fn dedup_key(&self) -> (CorrelationType, Vec<Uuid>) {
        let mut ids = self.event_ids.clone();
        ids.sort();
        (self.correlation_type, ids)
    }
}

/// A single stage in an ordered `AttackChain`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttackStage {
    pub sequence: u32,
    pub name: String,
    pub event_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub description: String,
    pub mitre_technique: Option<String>,
}

/// An ordered sequence of stages, typed by MITRE tactic, across related
/// events. References `SecurityEvent` ids; no back-pointers are persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttackChain {
    pub id: Uuid,
    pub stages: Vec<AttackStage>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub affected_assets: HashSet<String>,
    pub confidence_score: f32,
}

/// A point-in-time snapshot of one pooled instance's health. Owned by the
/// connection pool; readers only ever see a cloned snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionHealth {
    pub instance_id: String,
    pub is_healthy: bool,
    pub last_checked: DateTime<Utc>,
    pub response_time_ms: u64,
    pub status: String,
    pub error: Option<String>,
}

/// Per-instance usage counters exposed by a connection pool.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstanceMetrics {
    pub active_connections: u32,
    pub total_connections: u64,
    pub connections_from_pool: u64,
    pub new_connections: u64,
    pub max_pool_size: u32,
    pub available_connections: u32,
    pub avg_response_time_ms: f64,
    pub error_rate: f64,
    pub last_error: Option<String>,
}

/// Overall health level, shared by every component's `health_check()`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub enum HealthLevel {
    Healthy,
    Degraded,
    Critical,
}

impl HealthLevel {
    pub fn as_score(&self) -> f32 {
        match self {
            HealthLevel::Healthy => 1.0,
            HealthLevel::Degraded => 0.5,
            HealthLevel::Critical => 0.0,
        }
    }
}

/// A single component's contribution to the pipeline's aggregated health.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: HealthLevel,
    pub message: String,
    pub last_check: DateTime<Utc>,
    pub metrics: std::collections::HashMap<String, f64>,
}
