//! Pattern elevators: data-driven checks that scan a matched event's
//! message and, on a hit, raise the risk ladder, add MITRE tags, and
//! append recommended actions. Elevators never create a match on their
//! own — they only refine one a base rule already produced.

use regex::Regex;
use sentinel_common::types::RiskLevel;

pub enum ElevatorPattern {
    Substring(&'static str),
    Regex(Regex),
}

pub struct Elevator {
    pub name: &'static str,
    pub pattern: ElevatorPattern,
    pub mitre: Vec<String>,
    pub recommended_actions: Vec<String>,
    pub max_confidence: u8,
}

impl Elevator {
    fn matches(&self, message: &str) -> bool {
        match &self.pattern {
            ElevatorPattern::Substring(needle) => message.to_lowercase().contains(&needle.to_lowercase()),
            ElevatorPattern::Regex(re) => re.is_match(message),
        }
    }
}

/// Apply every elevator that matches `message` to `(risk, confidence, mitre,
/// recommended_actions)`, mutating them in place. Risk only ever steps up
/// (`low -> medium -> high`); confidence is raised to each matched
/// elevator's cap, never lowered.
pub fn apply(
    elevators: &[Elevator],
    message: &str,
    risk: &mut RiskLevel,
    confidence: &mut u8,
    mitre: &mut Vec<String>,
    recommended_actions: &mut Vec<String>,
) {
    for elevator in elevators {
        if !elevator.matches(message) {
            continue;
        }
        *risk = risk.step_up();
        *confidence = (*confidence).max(elevator.max_confidence);
        for technique in &elevator.mitre {
            if !mitre.contains(technique) {
                mitre.push(technique.clone());
            }
        }
        for action in &elevator.recommended_actions {
            if !recommended_actions.contains(action) {
                recommended_actions.push(action.clone());
            }
        }
    }
}

/// Built-in elevator set: PowerShell suspicious-call patterns and known
/// offensive-tooling module names.
pub fn default_elevators() -> Vec<Elevator> {
    vec![
        Elevator {
            name: "powershell-download-cradle",
            pattern: ElevatorPattern::Regex(
                Regex::new(r"(?i)(downloadstring|downloadfile|invoke-webrequest|iwr|iex\s*\()").unwrap(),
            ),
            mitre: vec!["T1105".to_string()],
            recommended_actions: vec!["Inspect the downloaded payload and its destination".to_string()],
            max_confidence: 90,
        },
        Elevator {
            name: "powershell-encoded-command",
            pattern: ElevatorPattern::Regex(Regex::new(r"(?i)-enc(odedcommand)?\s+[a-z0-9+/=]{20,}").unwrap()),
            mitre: vec!["T1027".to_string(), "T1140".to_string()],
            recommended_actions: vec!["Decode the base64 command block to inspect intent".to_string()],
            max_confidence: 95,
        },
        Elevator {
            name: "offensive-tooling-mimikatz",
            pattern: ElevatorPattern::Substring("mimikatz"),
            mitre: vec!["T1003".to_string()],
            recommended_actions: vec!["Treat the host as compromised and isolate it".to_string()],
            max_confidence: 95,
        },
        Elevator {
            name: "offensive-tooling-cobaltstrike",
            pattern: ElevatorPattern::Substring("cobaltstrike"),
            mitre: vec!["T1071".to_string()],
            recommended_actions: vec!["Check for a beaconing C2 channel on this host".to_string()],
            max_confidence: 95,
        },
        Elevator {
            name: "amsi-bypass",
            pattern: ElevatorPattern::Regex(Regex::new(r"(?i)amsiutils|amsi\.?dll|bypass-amsi").unwrap()),
            mitre: vec!["T1562.001".to_string()],
            recommended_actions: vec!["Confirm whether AMSI was actually disabled on this host".to_string()],
            max_confidence: 95,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoded_command_elevates_to_high_with_capped_confidence() {
        let elevators = default_elevators();
        let mut risk = RiskLevel::Medium;
        let mut confidence = 60u8;
        let mut mitre = Vec::new();
        let mut actions = Vec::new();
        apply(
            &elevators,
            "powershell.exe -enc JABzAGUAYwByAGUAdAA=aGVsbG93b3JsZA==",
            &mut risk,
            &mut confidence,
            &mut mitre,
            &mut actions,
        );
        assert_eq!(risk, RiskLevel::High);
        assert_eq!(confidence, 95);
        assert!(mitre.contains(&"T1027".to_string()));
    }

    #[test]
    fn benign_message_triggers_no_elevator() {
        let elevators = default_elevators();
        let mut risk = RiskLevel::Low;
        let mut confidence = 30u8;
        let mut mitre = Vec::new();
        let mut actions = Vec::new();
        apply(&elevators, "Get-Process | Select-Object Name", &mut risk, &mut confidence, &mut mitre, &mut actions);
        assert_eq!(risk, RiskLevel::Low);
        assert_eq!(confidence, 30);
    }
}
