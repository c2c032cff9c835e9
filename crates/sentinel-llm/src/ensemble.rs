//! Ensemble decorator: fans a verdict request out to several weighted
//! [`LlmClient`]s in parallel under a shared deadline and merges whatever
//! comes back in time.

use crate::LlmClient;
use async_trait::async_trait;
use sentinel_common::types::{ComponentHealth, LlmVerdict, LogEvent, VectorPoint};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

struct Member {
    client: Arc<dyn LlmClient>,
    weight: f32,
}

pub struct EnsembleClient {
    members: Vec<Member>,
    default_index: usize,
    min_quorum: u32,
    deadline: Duration,
}

impl EnsembleClient {
    /// `members` is `(client, weight)` pairs in configuration order;
    /// `default_index` names the client used when quorum isn't reached.
    pub fn new(members: Vec<(Arc<dyn LlmClient>, f32)>, default_index: usize, min_quorum: u32, deadline_ms: u64) -> Self {
        let members: Vec<Member> = members.into_iter().map(|(client, weight)| Member { client, weight }).collect();
        let default_index = default_index.min(members.len().saturating_sub(1));
        Self {
            members,
            default_index,
            min_quorum,
            deadline: Duration::from_millis(deadline_ms),
        }
    }
}

fn merge(results: &[(LlmVerdict, f32)]) -> LlmVerdict {
    let mut votes: HashMap<String, (u32, f32, f32)> = HashMap::new(); // risk -> (count, weight_sum, confidence_sum)
    for (verdict, weight) in results {
        let entry = votes.entry(verdict.risk.clone()).or_insert((0, 0.0, 0.0));
        entry.0 += 1;
        entry.1 += weight;
        entry.2 += verdict.confidence as f32;
    }

    let risk = votes
        .iter()
        .max_by(|a, b| {
            a.1 .0
                .cmp(&b.1 .0)
                .then_with(|| (a.1 .2 / a.1 .0 as f32).partial_cmp(&(b.1 .2 / b.1 .0 as f32)).unwrap_or(std::cmp::Ordering::Equal))
        })
        .map(|(risk, _)| risk.clone())
        .unwrap_or_else(|| "low".to_string());

    let total_weight: f32 = results.iter().map(|(_, w)| w).sum();
    let confidence = if total_weight > 0.0 {
        (results.iter().map(|(v, w)| v.confidence as f32 * w).sum::<f32>() / total_weight).round() as u8
    } else {
        0
    };

    let mut mitre: Vec<String> = Vec::new();
    for (verdict, _) in results {
        for technique in &verdict.mitre {
            if !mitre.contains(technique) {
                mitre.push(technique.clone());
            }
        }
    }

    let mut recommended_actions: Vec<String> = Vec::new();
    for (verdict, _) in results {
        for action in &verdict.recommended_actions {
            if !recommended_actions.contains(action) {
                recommended_actions.push(action.clone());
            }
        }
    }

    let summary = results
        .iter()
        .map(|(v, _)| v.summary.clone())
        .max_by_key(|s| s.len())
        .unwrap_or_default();

    LlmVerdict {
        risk,
        confidence,
        summary,
        mitre,
        recommended_actions,
    }
}

#[async_trait]
impl LlmClient for EnsembleClient {
    async fn analyze(&self, event: &LogEvent, neighbors: &[VectorPoint]) -> LlmVerdict {
        let calls = self.members.iter().map(|member| {
            let client = member.client.clone();
            let weight = member.weight;
            let deadline = self.deadline;
            async move {
                match tokio::time::timeout(deadline, client.analyze(event, neighbors)).await {
                    Ok(verdict) => Some((verdict, weight)),
                    Err(_) => {
                        warn!("ensemble member timed out");
                        None
                    }
                }
            }
        });

        let results: Vec<(LlmVerdict, f32)> = futures::future::join_all(calls).await.into_iter().flatten().collect();

        if (results.len() as u32) < self.min_quorum {
            warn!(
                received = results.len(),
                quorum = self.min_quorum,
                "ensemble quorum not reached, falling back to default member"
            );
            let default = &self.members[self.default_index.min(self.members.len() - 1)];
            return default.client.analyze(event, neighbors).await;
        }

        merge(&results)
    }

    async fn health_check(&self) -> ComponentHealth {
        self.members[self.default_index.min(self.members.len() - 1)]
            .client
            .health_check()
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::MockLlmProvider;
    use crate::strict_json::StrictJsonClient;
    use sentinel_common::config::StrictJsonConfig;

    fn sample_event() -> LogEvent {
        LogEvent {
            time: chrono::Utc::now(),
            host: "host1".into(),
            channel: "Security".into(),
            event_id: 4625,
            level: "Warning".into(),
            user: "alice".into(),
            message: "failed logon".into(),
            unique_id: "abc".into(),
        }
    }

    fn strict(response: &str) -> Arc<dyn LlmClient> {
        Arc::new(StrictJsonClient::new(
            Arc::new(MockLlmProvider::new("m", response)),
            StrictJsonConfig { enabled: true, enable_retry_on_failure: false },
        ))
    }

    #[tokio::test]
    async fn majority_risk_wins_and_mitre_unions() {
        let members = vec![
            (strict("{\"risk\":\"high\",\"confidence\":90,\"summary\":\"a\",\"mitre\":[\"T1059\"]}"), 1.0),
            (strict("{\"risk\":\"high\",\"confidence\":70,\"summary\":\"b\",\"mitre\":[\"T1078\"]}"), 1.0),
            (strict("{\"risk\":\"low\",\"confidence\":10,\"summary\":\"c\"}"), 1.0),
        ];
        let ensemble = EnsembleClient::new(members, 0, 2, 2_000);
        let verdict = ensemble.analyze(&sample_event(), &[]).await;
        assert_eq!(verdict.risk, "high");
        assert!(verdict.mitre.contains(&"T1059".to_string()));
        assert!(verdict.mitre.contains(&"T1078".to_string()));
    }

    #[tokio::test]
    async fn below_quorum_falls_back_to_default_member() {
        let members = vec![(strict("{\"risk\":\"high\",\"confidence\":90,\"summary\":\"a\"}"), 1.0)];
        let ensemble = EnsembleClient::new(members, 0, 2, 2_000);
        let verdict = ensemble.analyze(&sample_event(), &[]).await;
        assert_eq!(verdict.risk, "high");
    }
}
