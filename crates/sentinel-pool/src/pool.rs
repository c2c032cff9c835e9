//! The connection pool: health-checked, semaphore-bounded, weight-adjusted.

use crate::load_balancer::select_instance;
use crate::{HealthMap, Instance, MetricsMap};
use sentinel_common::config::{LoadBalancingConfig, PoolHealthCheckConfig};
use sentinel_common::types::{ConnectionHealth, InstanceMetrics};
use sentinel_common::{CircuitBreaker, CircuitBreakerConfig, Error, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, RwLock, Semaphore};
use tracing::{debug, instrument, warn};

const MIN_WEIGHT_MULTIPLIER: f32 = 0.1;
const MAX_WEIGHT_MULTIPLIER: f32 = 2.0;

struct InstanceState {
    instance: Instance,
    health: ConnectionHealth,
    metrics: InstanceMetrics,
    breaker: CircuitBreaker,
    weight_multiplier: f32,
}

/// A health-checked pool of named remote instances (an embedding provider's
/// HTTP endpoints, a set of vector-store replicas, ...).
pub struct ConnectionPool {
    name: String,
    states: RwLock<HashMap<String, InstanceState>>,
    semaphore: Arc<Semaphore>,
    lb_config: LoadBalancingConfig,
    health_config: PoolHealthCheckConfig,
    round_robin_counter: AtomicUsize,
    weight_adjustment_factor: f32,
}

/// A handle to an acquired connection. Releases its pool permit and
/// decrements the instance's active-connection count on drop.
pub struct PooledClient {
    pub instance_id: String,
    pub base_url: String,
    _permit: OwnedSemaphorePermit,
}

impl ConnectionPool {
    pub fn new(
        name: impl Into<String>,
        instances: Vec<Instance>,
        max_pool_size: u32,
        lb_config: LoadBalancingConfig,
        health_config: PoolHealthCheckConfig,
    ) -> Self {
        let weight_adjustment_factor = lb_config.weight_adjustment_factor;
        let mut states = HashMap::new();
        for instance in instances {
            let id = instance.id.clone();
            states.insert(
                id.clone(),
                InstanceState {
                    breaker: CircuitBreaker::new(
                        format!("pool-instance-{id}"),
                        CircuitBreakerConfig::default(),
                    ),
                    health: ConnectionHealth {
                        instance_id: id,
                        is_healthy: true,
                        last_checked: sentinel_common::utils::current_timestamp(),
                        response_time_ms: 0,
                        status: "unknown".to_string(),
                        error: None,
                    },
                    metrics: InstanceMetrics {
                        max_pool_size,
                        available_connections: max_pool_size,
                        ..Default::default()
                    },
                    instance,
                    weight_multiplier: 1.0,
                },
            );
        }

        Self {
            name: name.into(),
            states: RwLock::new(states),
            semaphore: Arc::new(Semaphore::new(max_pool_size as usize)),
            lb_config,
            health_config,
            round_robin_counter: AtomicUsize::new(0),
            weight_adjustment_factor,
        }
    }

    /// Select a healthy instance and acquire a pooled client. Fails fast
    /// with `NoHealthyInstances` or `CircuitOpen` without retrying — retry
    /// is the caller's concern (see [`sentinel_common::retry`]).
    #[instrument(skip(self), fields(pool = %self.name))]
    pub async fn get(&self, preferred_instance_id: Option<&str>) -> Result<PooledClient> {
        let states = self.states.read().await;
        if states.is_empty() {
            return Err(Error::NoHealthyInstances(self.name.clone()));
        }

        if let Some(preferred) = preferred_instance_id {
            if let Some(state) = states.get(preferred) {
                if state.health.is_healthy {
                    return self.acquire(state).await;
                }
            }
        }

        let healthy: Vec<Instance> = states
            .values()
            .filter(|s| s.health.is_healthy)
            .map(|s| s.instance.clone())
            .collect();
        if healthy.is_empty() {
            return Err(Error::NoHealthyInstances(self.name.clone()));
        }

        let metrics: HashMap<String, InstanceMetrics> = states
            .iter()
            .map(|(id, s)| (id.clone(), s.metrics.clone()))
            .collect();
        let weights: HashMap<String, f32> = states
            .iter()
            .map(|(id, s)| (id.clone(), s.weight_multiplier))
            .collect();

        let chosen = select_instance(
            &healthy,
            self.lb_config.strategy,
            &metrics,
            &weights,
            &self.round_robin_counter,
        )
        .ok_or_else(|| Error::NoHealthyInstances(self.name.clone()))?;

        let state = states
            .get(&chosen.id)
            .expect("selected instance must exist in states");

        if !state.breaker.should_allow_call().await {
            return Err(Error::CircuitOpen(chosen.id.clone()));
        }

        self.acquire(state).await
    }

    async fn acquire(&self, state: &InstanceState) -> Result<PooledClient> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| Error::Cancellation)?;
        Ok(PooledClient {
            instance_id: state.instance.id.clone(),
            base_url: state.instance.base_url.clone(),
            _permit: permit,
        })
    }

    /// Record the outcome of a call made through a [`PooledClient`] so the
    /// circuit breaker, metrics, and weight multiplier stay current.
    pub async fn record_outcome(&self, instance_id: &str, success: bool, latency_ms: u64) {
        let mut states = self.states.write().await;
        let Some(state) = states.get_mut(instance_id) else {
            return;
        };

        state.breaker.record_call_result(success).await;

        state.metrics.total_connections += 1;
        state.metrics.avg_response_time_ms =
            state.metrics.avg_response_time_ms * 0.7 + latency_ms as f64 * 0.3;
        if !success {
            state.metrics.error_rate = (state.metrics.error_rate * 0.9 + 0.1).min(1.0);
        } else {
            state.metrics.error_rate *= 0.9;
        }

        let adjustment = if success { self.weight_adjustment_factor } else { -self.weight_adjustment_factor };
        state.weight_multiplier = (state.weight_multiplier + adjustment * 0.05)
            .clamp(MIN_WEIGHT_MULTIPLIER, MAX_WEIGHT_MULTIPLIER);
    }

    /// Manual health override, for admin tooling.
    pub async fn set_instance_health(&self, instance_id: &str, healthy: bool) {
        let mut states = self.states.write().await;
        if let Some(state) = states.get_mut(instance_id) {
            state.health.is_healthy = healthy;
            state.health.last_checked = sentinel_common::utils::current_timestamp();
        }
    }

    pub async fn health_status(&self) -> HealthMap {
        self.states
            .read()
            .await
            .iter()
            .map(|(id, s)| (id.clone(), s.health.clone()))
            .collect()
    }

    pub async fn metrics(&self) -> MetricsMap {
        self.states
            .read()
            .await
            .iter()
            .map(|(id, s)| (id.clone(), s.metrics.clone()))
            .collect()
    }

    /// Run a single health-check pass, invoking `probe` per instance.
    /// `probe` returns `Ok(latency_ms)` on success.
    pub async fn check_health<F, Fut>(&self, probe: F)
    where
        F: Fn(Instance) -> Fut,
        Fut: std::future::Future<Output = std::result::Result<u64, String>>,
    {
        if !self.health_config.enable_health_checks {
            return;
        }
        let instances: Vec<Instance> = {
            let states = self.states.read().await;
            states.values().map(|s| s.instance.clone()).collect()
        };

        for instance in instances {
            let id = instance.id.clone();
            let result = probe(instance).await;
            let mut states = self.states.write().await;
            if let Some(state) = states.get_mut(&id) {
                state.health.last_checked = sentinel_common::utils::current_timestamp();
                match result {
                    Ok(latency_ms) => {
                        state.health.is_healthy = true;
                        state.health.response_time_ms = latency_ms;
                        state.health.status = "healthy".to_string();
                        state.health.error = None;
                    }
                    Err(err) => {
                        warn!(instance_id = %id, error = %err, "health probe failed");
                        state.health.is_healthy = false;
                        state.health.status = "unhealthy".to_string();
                        state.health.error = Some(err);
                    }
                }
            }
        }
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_millis(self.health_config.health_check_interval_ms)
    }
}

impl Drop for PooledClient {
    fn drop(&mut self) {
        debug!(instance_id = %self.instance_id, "pooled client released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_common::config::{LoadBalancingConfig, LoadBalancingStrategy, PoolHealthCheckConfig};

    fn pool() -> ConnectionPool {
        ConnectionPool::new(
            "test",
            vec![
                Instance {
                    id: "a".into(),
                    base_url: "http://a".into(),
                    weight: 1.0,
                },
                Instance {
                    id: "b".into(),
                    base_url: "http://b".into(),
                    weight: 1.0,
                },
            ],
            4,
            LoadBalancingConfig {
                strategy: LoadBalancingStrategy::RoundRobin,
                weight_adjustment_factor: 1.0,
                sticky_session_timeout_ms: 1000,
            },
            PoolHealthCheckConfig {
                enable_health_checks: true,
                health_check_interval_ms: 1000,
                health_check_timeout_ms: 500,
            },
        )
    }

    #[tokio::test]
    async fn get_returns_a_client_from_a_healthy_instance() {
        let pool = pool();
        let client = pool.get(None).await.unwrap();
        assert!(client.instance_id == "a" || client.instance_id == "b");
    }

    #[tokio::test]
    async fn no_healthy_instances_errors() {
        let pool = pool();
        pool.set_instance_health("a", false).await;
        pool.set_instance_health("b", false).await;
        assert!(matches!(pool.get(None).await, Err(Error::NoHealthyInstances(_))));
    }

    #[tokio::test]
    async fn preferred_instance_is_honoured_when_healthy() {
        let pool = pool();
        let client = pool.get(Some("b")).await.unwrap();
        assert_eq!(client.instance_id, "b");
    }
}
