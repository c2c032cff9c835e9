//! The four correlation detectors. Each is a pure function over a window
//! of already-fetched [`SecurityEvent`]s; the engine owns fetching and
//! persistence.

use chrono::{DateTime, Duration, Utc};
use sentinel_common::config::CorrelationConfig;
use sentinel_common::types::{AttackChain, AttackStage, Correlation, CorrelationType, RiskLevel, SecurityEvent};
use std::collections::HashMap;
use uuid::Uuid;

fn new_correlation(
    correlation_type: CorrelationType,
    confidence_score: f32,
    pattern: String,
    event_ids: Vec<Uuid>,
    time_window_seconds: i64,
    mitre_techniques: std::collections::HashSet<String>,
    risk_level: RiskLevel,
    summary: String,
    recommended_actions: Vec<String>,
) -> Correlation {
    Correlation {
        id: Uuid::new_v4(),
        detected_at: Utc::now(),
        correlation_type,
        confidence_score,
        pattern,
        event_ids,
        time_window_seconds,
        mitre_techniques,
        risk_level,
        summary,
        recommended_actions,
    }
}

/// N or more events sharing an `eventType`, `host`, or `user` within a
/// sliding window of `burst_window_seconds`. Confidence is `count/threshold`
/// clamped to 1.
pub fn temporal_burst(events: &[SecurityEvent], config: &CorrelationConfig) -> Vec<Correlation> {
    let window = Duration::seconds(config.burst_window_seconds as i64);
    let threshold = config.burst_threshold as usize;
    let mut correlations = Vec::new();

    for (dimension, key_fn) in [
        ("eventType", (|e: &SecurityEvent| e.event_type.clone()) as fn(&SecurityEvent) -> String),
        ("host", |e: &SecurityEvent| e.original_event.host.clone()),
        ("user", |e: &SecurityEvent| e.original_event.user.clone()),
    ] {
        let mut groups: HashMap<String, Vec<&SecurityEvent>> = HashMap::new();
        for event in events {
            groups.entry(key_fn(event)).or_default().push(event);
        }

        for (key, mut group) in groups {
            if group.len() < threshold {
                continue;
            }
            group.sort_by_key(|e| e.created_at);

            let mut start = 0usize;
            for end in 0..group.len() {
                while group[end].created_at - group[start].created_at > window {
                    start += 1;
                }
                let count = end - start + 1;
                if count >= threshold {
                    let window_events = &group[start..=end];
                    let event_ids: Vec<Uuid> = window_events.iter().map(|e| e.id).collect();
                    let mitre: std::collections::HashSet<String> =
                        window_events.iter().flat_map(|e| e.mitre_techniques.iter().cloned()).collect();
                    let risk = window_events.iter().map(|e| e.risk_level).max().unwrap_or(RiskLevel::Low);
                    correlations.push(new_correlation(
                        CorrelationType::TemporalBurst,
                        (count as f32 / threshold as f32).min(1.0),
                        format!("{dimension}={key}"),
                        event_ids,
                        config.burst_window_seconds as i64,
                        mitre,
                        risk,
                        format!("{count} events sharing {dimension} '{key}' within {}s", config.burst_window_seconds),
                        vec!["Investigate the shared dimension for a coordinated source".to_string()],
                    ));
                    break;
                }
            }
        }
    }

    correlations
}

const EXPECTED_TACTICS: [&str; 4] = ["InitialAccess", "Execution", "Persistence", "LateralMovement"];

fn tactic_for_technique(technique: &str) -> Option<&'static str> {
    let prefix = technique.split('.').next().unwrap_or(technique);
    match prefix {
        "T1190" | "T1566" | "T1133" => Some("InitialAccess"),
        "T1059" | "T1203" => Some("Execution"),
        "T1053" | "T1547" | "T1547.001" => Some("Persistence"),
        "T1021" | "T1570" | "T1078" => Some("LateralMovement"),
        _ => None,
    }
}

/// Turn the stage hits behind one `attack_chain` detection into the ordered
/// `AttackStage`s of a persistable `AttackChain` aggregate.
fn build_attack_chain(stage_hits: &[(usize, &SecurityEvent, &str)], confidence: f32) -> AttackChain {
    let stages: Vec<AttackStage> = stage_hits
        .iter()
        .enumerate()
        .map(|(sequence, (_, event, tactic))| AttackStage {
            sequence: sequence as u32,
            name: tactic.to_string(),
            event_id: event.id,
            timestamp: event.created_at,
            description: event.summary.clone(),
            mitre_technique: event.mitre_techniques.iter().next().cloned(),
        })
        .collect();

    let start_time = stages.first().map(|s| s.timestamp).unwrap_or_else(Utc::now);
    let end_time = stages.last().map(|s| s.timestamp).unwrap_or(start_time);
    let affected_assets: std::collections::HashSet<String> =
        stage_hits.iter().map(|(_, e, _)| e.original_event.host.clone()).collect();

    AttackChain {
        id: Uuid::new_v4(),
        stages,
        start_time,
        end_time,
        affected_assets,
        confidence_score: confidence,
    }
}

/// Distinct MITRE tactics observed in order, on the same host or user,
/// within `chain_window_minutes`. Confidence is the fraction of the
/// expected tactic stages present times an order-monotonicity factor.
/// Alongside the `Correlation` summary record, emits the full `AttackChain`
/// aggregate (ordered stages, affected assets, time span) the summary is
/// derived from.
pub fn attack_chain(events: &[SecurityEvent], config: &CorrelationConfig) -> (Vec<Correlation>, Vec<AttackChain>) {
    let window = Duration::minutes(config.chain_window_minutes as i64);
    let mut correlations = Vec::new();
    let mut chains = Vec::new();

    for key_fn in [
        (|e: &SecurityEvent| format!("host:{}", e.original_event.host)) as fn(&SecurityEvent) -> String,
        |e: &SecurityEvent| format!("user:{}", e.original_event.user),
    ] {
        let mut groups: HashMap<String, Vec<&SecurityEvent>> = HashMap::new();
        for event in events {
            groups.entry(key_fn(event)).or_default().push(event);
        }

        for (key, mut group) in groups {
            group.sort_by_key(|e| e.created_at);
            let earliest = match group.first() {
                Some(e) => e.created_at,
                None => continue,
            };
            group.retain(|e| e.created_at - earliest <= window);

            let mut stage_hits: Vec<(usize, &SecurityEvent, &str)> = Vec::new();
            for event in &group {
                for technique in &event.mitre_techniques {
                    if let Some(tactic) = tactic_for_technique(technique) {
                        if let Some(stage_index) = EXPECTED_TACTICS.iter().position(|t| *t == tactic) {
                            stage_hits.push((stage_index, event, tactic));
                        }
                    }
                }
            }
            if stage_hits.len() < 2 {
                continue;
            }
            stage_hits.sort_by_key(|(_, e, _)| e.created_at);

            let distinct_stages: std::collections::HashSet<usize> = stage_hits.iter().map(|(s, _, _)| *s).collect();
            let coverage = distinct_stages.len() as f32 / EXPECTED_TACTICS.len() as f32;

            let mut monotonic_steps = 0usize;
            for pair in stage_hits.windows(2) {
                if pair[1].0 >= pair[0].0 {
                    monotonic_steps += 1;
                }
            }
            let monotonicity = if stage_hits.len() > 1 {
                monotonic_steps as f32 / (stage_hits.len() - 1) as f32
            } else {
                1.0
            };

            let confidence = coverage * monotonicity;
            if confidence <= 0.0 {
                continue;
            }

            let event_ids: Vec<Uuid> = stage_hits.iter().map(|(_, e, _)| e.id).collect();
            let mitre: std::collections::HashSet<String> =
                stage_hits.iter().flat_map(|(_, e, _)| e.mitre_techniques.iter().cloned()).collect();

            correlations.push(new_correlation(
                CorrelationType::AttackChain,
                confidence,
                key.clone(),
                event_ids,
                window.num_seconds(),
                mitre,
                RiskLevel::High,
                format!("Attack-chain-shaped tactic sequence observed on {key}"),
                vec!["Reconstruct the full kill chain for this asset".to_string()],
            ));
            chains.push(build_attack_chain(&stage_hits, confidence));
        }
    }

    (correlations, chains)
}

/// Same user succeeding on >= `lateral_threshold` distinct hosts within
/// `lateral_window_minutes`, after at least one failed logon.
pub fn lateral_movement(events: &[SecurityEvent], config: &CorrelationConfig) -> Vec<Correlation> {
    let window = Duration::minutes(config.lateral_window_minutes as i64);
    let mut by_user: HashMap<String, Vec<&SecurityEvent>> = HashMap::new();
    for event in events {
        by_user.entry(event.original_event.user.clone()).or_default().push(event);
    }

    let mut correlations = Vec::new();
    for (user, mut group) in by_user {
        group.sort_by_key(|e| e.created_at);

        let had_failure_before = |at: DateTime<Utc>| group.iter().any(|e| e.event_type == "failed_logon" && e.created_at < at);

        let successes: Vec<&&SecurityEvent> = group
            .iter()
            .filter(|e| matches!(e.event_type.as_str(), "successful_logon" | "privileged_logon"))
            .collect();

        let mut start = 0usize;
        for end in 0..successes.len() {
            while successes[end].created_at - successes[start].created_at > window {
                start += 1;
            }
            let window_slice = &successes[start..=end];
            let distinct_hosts: std::collections::HashSet<&str> =
                window_slice.iter().map(|e| e.original_event.host.as_str()).collect();

            if distinct_hosts.len() as u32 >= config.lateral_threshold && had_failure_before(window_slice.last().unwrap().created_at) {
                let event_ids: Vec<Uuid> = window_slice.iter().map(|e| e.id).collect();
                correlations.push(new_correlation(
                    CorrelationType::LateralMovement,
                    (distinct_hosts.len() as f32 / config.lateral_threshold as f32).min(1.0),
                    format!("user={user}"),
                    event_ids,
                    config.lateral_window_minutes as i64 * 60,
                    std::collections::HashSet::from(["T1021".to_string()]),
                    RiskLevel::High,
                    format!("User '{user}' succeeded on {} distinct hosts after a failed logon", distinct_hosts.len()),
                    vec!["Force a credential reset for the affected account".to_string()],
                ));
                break;
            }
        }
    }

    correlations
}

/// A successful privileged logon following a non-privileged session by the
/// same user within `privilege_window_minutes`.
pub fn privilege_escalation(events: &[SecurityEvent], config: &CorrelationConfig) -> Vec<Correlation> {
    let window = Duration::minutes(config.privilege_window_minutes as i64);
    let mut by_user: HashMap<String, Vec<&SecurityEvent>> = HashMap::new();
    for event in events {
        by_user.entry(event.original_event.user.clone()).or_default().push(event);
    }

    let mut correlations = Vec::new();
    for (user, mut group) in by_user {
        group.sort_by_key(|e| e.created_at);

        for window_pair in group.windows(2) {
            let (first, second) = (window_pair[0], window_pair[1]);
            if first.event_type == "successful_logon"
                && second.event_type == "privileged_logon"
                && second.created_at - first.created_at <= window
            {
                correlations.push(new_correlation(
                    CorrelationType::PrivilegeEscalation,
                    0.8,
                    format!("user={user}"),
                    vec![first.id, second.id],
                    window.num_seconds(),
                    std::collections::HashSet::from(["T1078".to_string()]),
                    RiskLevel::High,
                    format!("User '{user}' escalated to a privileged session shortly after a standard logon"),
                    vec!["Verify the privilege grant was authorized".to_string()],
                ));
            }
        }
    }

    correlations
}
