//! `list`'s filter predicate. Applied in memory after a full scan, since no
//! single secondary index covers every filter key at once.

use chrono::{DateTime, Utc};
use sentinel_common::types::{EventStatus, RiskLevel, SecurityEvent};

#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub time_range: Option<(DateTime<Utc>, DateTime<Utc>)>,
    pub risk_levels: Vec<RiskLevel>,
    pub event_types: Vec<String>,
    pub hosts: Vec<String>,
    pub users: Vec<String>,
    pub sources: Vec<String>,
    pub status: Vec<EventStatus>,
    pub query: Option<String>,
    pub exact_match: bool,
    pub fuzzy: bool,
}

impl EventFilter {
    pub fn matches(&self, event: &SecurityEvent) -> bool {
        if let Some((from, to)) = self.time_range {
            if event.created_at < from || event.created_at > to {
                return false;
            }
        }
        if !self.risk_levels.is_empty() && !self.risk_levels.contains(&event.risk_level) {
            return false;
        }
        if !self.event_types.is_empty() && !self.event_types.iter().any(|t| t == &event.event_type) {
            return false;
        }
        if !self.hosts.is_empty() && !self.hosts.iter().any(|h| h == &event.original_event.host) {
            return false;
        }
        if !self.users.is_empty() && !self.users.iter().any(|u| u == &event.original_event.user) {
            return false;
        }
        if !self.sources.is_empty() && !self.sources.iter().any(|s| s == &event.original_event.channel) {
            return false;
        }
        if !self.status.is_empty() && !self.status.iter().any(|s| *s == event.status) {
            return false;
        }
        if let Some(query) = &self.query {
            if !self.matches_query(event, query) {
                return false;
            }
        }
        true
    }

    fn matches_query(&self, event: &SecurityEvent, query: &str) -> bool {
        let haystacks = [event.summary.as_str(), event.original_event.message.as_str()];
        if self.exact_match {
            haystacks.iter().any(|text| *text == query)
        } else if self.fuzzy {
            let query_lower = query.to_lowercase();
            haystacks.iter().any(|text| text.to_lowercase().contains(&query_lower))
        } else {
            haystacks.iter().any(|text| text.contains(query))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_common::types::LogEvent;
    use uuid::Uuid;

    fn event(summary: &str, message: &str) -> SecurityEvent {
        SecurityEvent {
            id: Uuid::new_v4(),
            original_event: LogEvent {
                time: Utc::now(),
                host: "host1".to_string(),
                channel: "Security".to_string(),
                event_id: 4625,
                level: "Information".to_string(),
                user: "alice".to_string(),
                message: message.to_string(),
                unique_id: Uuid::new_v4().to_string(),
            },
            event_type: "failed_logon".to_string(),
            risk_level: RiskLevel::Low,
            confidence: 40,
            summary: summary.to_string(),
            mitre_techniques: Default::default(),
            recommended_actions: Vec::new(),
            is_deterministic: true,
            correlation_id: None,
            correlation_score: 0.0,
            burst_score: 0.0,
            anomaly_score: 0.0,
            status: EventStatus::Open,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn fuzzy_query_is_case_insensitive_substring_match() {
        let filter = EventFilter { query: Some("FAILED".to_string()), fuzzy: true, ..EventFilter::default() };
        assert!(filter.matches(&event("Failed logon attempt", "An account failed to log on")));
    }

    #[test]
    fn exact_match_requires_full_field_equality() {
        let filter = EventFilter { query: Some("Failed logon attempt".to_string()), exact_match: true, ..EventFilter::default() };
        assert!(filter.matches(&event("Failed logon attempt", "something else")));
        assert!(!filter.matches(&event("Failed logon attempt extra", "something else")));
    }

    #[test]
    fn empty_filter_matches_everything() {
        assert!(EventFilter::default().matches(&event("x", "y")));
    }
}
