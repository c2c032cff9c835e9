//! Pipeline-wide health aggregation.
//!
//! Every component exposes a `health_check() -> ComponentHealth`
//! (defined in [`crate::types`]); this module rolls those up into one
//! snapshot the pipeline can log, serve, and alert on.

use crate::types::{ComponentHealth, HealthLevel};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Aggregated health of the whole pipeline, keyed by component name
/// (`"embedder"`, `"llm_client"`, `"vector_store"`, ...).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct HealthStatus {
    pub overall_health: HealthLevel,
    pub components: HashMap<String, ComponentHealth>,
    pub last_check: DateTime<Utc>,
    pub uptime_seconds: u64,
}

impl HealthStatus {
    pub fn new(uptime_seconds: u64) -> Self {
        Self {
            overall_health: HealthLevel::Healthy,
            components: HashMap::new(),
            last_check: Utc::now(),
            uptime_seconds,
        }
    }

    /// Recompute `overall_health` as the worst status among components.
    /// An empty component set is reported `Healthy`: a pipeline that has
    /// not yet registered any component is not thereby degraded.
    pub fn recalculate(&mut self) {
        self.last_check = Utc::now();
        self.overall_health = self
            .components
            .values()
            .map(|c| c.status)
            .max_by_key(|s| match s {
                HealthLevel::Healthy => 0,
                HealthLevel::Degraded => 1,
                HealthLevel::Critical => 2,
            })
            .unwrap_or(HealthLevel::Healthy);
    }

    pub fn record(&mut self, component: impl Into<String>, health: ComponentHealth) {
        self.components.insert(component.into(), health);
        self.recalculate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as Map;

    fn health(status: HealthLevel) -> ComponentHealth {
        ComponentHealth {
            status,
            message: String::new(),
            last_check: Utc::now(),
            metrics: Map::new(),
        }
    }

    #[test]
    fn empty_status_is_healthy() {
        let mut status = HealthStatus::new(0);
        status.recalculate();
        assert_eq!(status.overall_health, HealthLevel::Healthy);
    }

    #[test]
    fn worst_component_wins() {
        let mut status = HealthStatus::new(10);
        status.record("embedder", health(HealthLevel::Healthy));
        status.record("llm_client", health(HealthLevel::Degraded));
        assert_eq!(status.overall_health, HealthLevel::Degraded);
        status.record("vector_store", health(HealthLevel::Critical));
        assert_eq!(status.overall_health, HealthLevel::Critical);
    }
}
