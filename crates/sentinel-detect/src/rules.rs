//! The base rule table: one rule per `(channel, event_id)`, matched before
//! any pattern elevator runs.

use sentinel_common::types::RiskLevel;
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct Rule {
    pub event_type: String,
    pub base_risk: RiskLevel,
    pub base_confidence: u8,
    pub base_summary: String,
    pub base_mitre: Vec<String>,
    pub base_recommended_actions: Vec<String>,
}

pub type RuleKey = (String, i64);
pub type RuleTable = HashMap<RuleKey, Rule>;

/// The built-in rule set. Channels and event ids follow Windows Event Log
/// conventions, the domain this detector was written against.
pub fn default_rules() -> RuleTable {
    let mut rules = RuleTable::new();

    for event_id in [4103_i64, 4104, 4105] {
        rules.insert(
            ("Microsoft-Windows-PowerShell/Operational".to_string(), event_id),
            Rule {
                event_type: "powershell_execution".to_string(),
                base_risk: RiskLevel::Medium,
                base_confidence: 60,
                base_summary: "PowerShell script block executed".to_string(),
                base_mitre: vec!["T1059.001".to_string()],
                base_recommended_actions: vec!["Review script block content".to_string()],
            },
        );
    }

    rules.insert(
        ("Security".to_string(), 4624),
        Rule {
            event_type: "successful_logon".to_string(),
            base_risk: RiskLevel::Low,
            base_confidence: 20,
            base_summary: "Successful logon".to_string(),
            base_mitre: Vec::new(),
            base_recommended_actions: Vec::new(),
        },
    );

    rules.insert(
        ("Security".to_string(), 4625),
        Rule {
            event_type: "failed_logon".to_string(),
            base_risk: RiskLevel::Low,
            base_confidence: 40,
            base_summary: "Failed logon attempt".to_string(),
            base_mitre: vec!["T1110".to_string()],
            base_recommended_actions: vec!["Monitor for repeated failures from the same account".to_string()],
        },
    );

    rules.insert(
        ("Security".to_string(), 4672),
        Rule {
            event_type: "privileged_logon".to_string(),
            base_risk: RiskLevel::Medium,
            base_confidence: 50,
            base_summary: "Special privileges assigned to new logon".to_string(),
            base_mitre: vec!["T1078".to_string()],
            base_recommended_actions: vec!["Confirm the account should hold elevated privileges".to_string()],
        },
    );

    rules.insert(
        ("Security".to_string(), 4688),
        Rule {
            event_type: "process_creation".to_string(),
            base_risk: RiskLevel::Low,
            base_confidence: 30,
            base_summary: "New process created".to_string(),
            base_mitre: Vec::new(),
            base_recommended_actions: Vec::new(),
        },
    );

    rules
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_rules_cover_all_three_powershell_event_ids() {
        let rules = default_rules();
        for event_id in [4103_i64, 4104, 4105] {
            assert!(rules.contains_key(&("Microsoft-Windows-PowerShell/Operational".to_string(), event_id)));
        }
    }
}
