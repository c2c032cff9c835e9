//! Aggregates every component's own `health_check()` into a single
//! [`PipelineHealth`] snapshot, the ambient analogue of the correlation
//! engine's own supervision loop: the pipeline watches its dependencies
//! the way the engine watches its own cycle timing.

use sentinel_common::types::{ComponentHealth, HealthLevel};
use std::collections::HashMap;

#[derive(Debug, Clone, serde::Serialize)]
pub struct PipelineHealth {
    pub overall: HealthLevel,
    pub components: HashMap<String, ComponentHealth>,
    pub checked_at: chrono::DateTime<chrono::Utc>,
}

impl PipelineHealth {
    pub fn from_components(components: Vec<(&'static str, ComponentHealth)>) -> Self {
        let overall = components
            .iter()
            .map(|(_, health)| health.status)
            .min_by(|a, b| a.as_score().partial_cmp(&b.as_score()).unwrap_or(std::cmp::Ordering::Equal))
            .unwrap_or(HealthLevel::Healthy);

        Self {
            overall,
            components: components.into_iter().map(|(name, health)| (name.to_string(), health)).collect(),
            checked_at: chrono::Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn health(status: HealthLevel) -> ComponentHealth {
        ComponentHealth { status, message: "test".to_string(), last_check: chrono::Utc::now(), metrics: HashMap::new() }
    }

    #[test]
    fn overall_health_is_the_worst_component() {
        let snapshot = PipelineHealth::from_components(vec![
            ("detect", health(HealthLevel::Healthy)),
            ("embed", health(HealthLevel::Degraded)),
            ("llm", health(HealthLevel::Healthy)),
        ]);
        assert_eq!(snapshot.overall, HealthLevel::Degraded);
    }

    #[test]
    fn empty_component_set_is_healthy() {
        let snapshot = PipelineHealth::from_components(vec![]);
        assert_eq!(snapshot.overall, HealthLevel::Healthy);
    }
}
