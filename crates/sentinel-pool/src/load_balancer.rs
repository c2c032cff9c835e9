//! Instance selection: applies the configured strategy over the currently
//! healthy set, then tie-breaks on lowest active connection count.

use crate::Instance;
use sentinel_common::config::LoadBalancingStrategy;
use sentinel_common::types::InstanceMetrics;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Pick an instance from `healthy` per `strategy`. `metrics` and
/// `weight_multipliers` are keyed by instance id; a missing entry is
/// treated as a neutral (unloaded, multiplier 1.0) instance.
///
/// `preferred`, if `Some` and present in `healthy`, always wins: callers
/// check preference and health before calling this.
pub fn select_instance<'a>(
    healthy: &'a [Instance],
    strategy: LoadBalancingStrategy,
    metrics: &HashMap<String, InstanceMetrics>,
    weight_multipliers: &HashMap<String, f32>,
    round_robin_counter: &AtomicUsize,
) -> Option<&'a Instance> {
    if healthy.is_empty() {
        return None;
    }

    let candidate = match strategy {
        LoadBalancingStrategy::RoundRobin => {
            let index = round_robin_counter.fetch_add(1, Ordering::Relaxed) % healthy.len();
            &healthy[index]
        }
        LoadBalancingStrategy::Random => {
            let index = (round_robin_counter.fetch_add(1, Ordering::Relaxed).wrapping_mul(2654435761))
                % healthy.len();
            &healthy[index]
        }
        LoadBalancingStrategy::WeightedRoundRobin => {
            let total_weight: f32 = healthy
                .iter()
                .map(|i| i.weight * weight_multipliers.get(&i.id).copied().unwrap_or(1.0))
                .sum();
            if total_weight <= 0.0 {
                &healthy[round_robin_counter.fetch_add(1, Ordering::Relaxed) % healthy.len()]
            } else {
                let mut target = (round_robin_counter.fetch_add(1, Ordering::Relaxed) as f32
                    % (total_weight * 1000.0))
                    / 1000.0;
                let mut chosen = &healthy[0];
                for instance in healthy {
                    let w = instance.weight * weight_multipliers.get(&instance.id).copied().unwrap_or(1.0);
                    if target < w {
                        chosen = instance;
                        break;
                    }
                    target -= w;
                }
                chosen
            }
        }
        LoadBalancingStrategy::LeastConnections => healthy
            .iter()
            .min_by_key(|i| {
                metrics
                    .get(&i.id)
                    .map(|m| m.active_connections)
                    .unwrap_or(0)
            })
            .unwrap(),
        LoadBalancingStrategy::HealthAware => healthy
            .iter()
            .max_by(|a, b| {
                let score_a = health_score(a, metrics);
                let score_b = health_score(b, metrics);
                score_a
                    .partial_cmp(&score_b)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .unwrap(),
    };

    // Tie-break: among instances within epsilon of the candidate's
    // connection count, prefer the lowest.
    let best_connections = metrics
        .get(&candidate.id)
        .map(|m| m.active_connections)
        .unwrap_or(0);
    healthy
        .iter()
        .filter(|i| {
            metrics.get(&i.id).map(|m| m.active_connections).unwrap_or(0) <= best_connections
        })
        .min_by_key(|i| metrics.get(&i.id).map(|m| m.active_connections).unwrap_or(0))
}

fn health_score(instance: &Instance, metrics: &HashMap<String, InstanceMetrics>) -> f32 {
    match metrics.get(&instance.id) {
        Some(m) => {
            1000.0 / (m.avg_response_time_ms as f32 + 1.0) - (m.active_connections as f32 * 10.0)
                - (m.error_rate as f32 * 100.0)
        }
        None => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instance(id: &str, weight: f32) -> Instance {
        Instance {
            id: id.to_string(),
            base_url: format!("http://{id}"),
            weight,
        }
    }

    #[test]
    fn empty_pool_selects_nothing() {
        let counter = AtomicUsize::new(0);
        assert!(select_instance(
            &[],
            LoadBalancingStrategy::RoundRobin,
            &HashMap::new(),
            &HashMap::new(),
            &counter
        )
        .is_none());
    }

    #[test]
    fn round_robin_cycles_through_instances() {
        let pool = vec![instance("a", 1.0), instance("b", 1.0)];
        let counter = AtomicUsize::new(0);
        let first = select_instance(
            &pool,
            LoadBalancingStrategy::RoundRobin,
            &HashMap::new(),
            &HashMap::new(),
            &counter,
        )
        .unwrap();
        let second = select_instance(
            &pool,
            LoadBalancingStrategy::RoundRobin,
            &HashMap::new(),
            &HashMap::new(),
            &counter,
        )
        .unwrap();
        assert_ne!(first.id, second.id);
    }

    #[test]
    fn least_connections_prefers_idle_instance() {
        let pool = vec![instance("a", 1.0), instance("b", 1.0)];
        let mut metrics = HashMap::new();
        metrics.insert(
            "a".to_string(),
            InstanceMetrics {
                active_connections: 5,
                ..Default::default()
            },
        );
        metrics.insert(
            "b".to_string(),
            InstanceMetrics {
                active_connections: 1,
                ..Default::default()
            },
        );
        let counter = AtomicUsize::new(0);
        let chosen =
            select_instance(&pool, LoadBalancingStrategy::LeastConnections, &metrics, &HashMap::new(), &counter)
                .unwrap();
        assert_eq!(chosen.id, "b");
    }
}
