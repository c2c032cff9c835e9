//! Data-driven pre-filter: events matching any configured pattern are
//! dropped before detection runs, so noisy, known-benign channels never
//! reach the embedder or the LLM.

use regex::Regex;
use sentinel_common::config::IgnorePattern;
use sentinel_common::types::LogEvent;

struct CompiledPattern {
    channel: Option<String>,
    event_id: Option<i64>,
    message: Option<Regex>,
}

pub struct IgnoreFilter {
    patterns: Vec<CompiledPattern>,
}

impl IgnoreFilter {
    pub fn new(patterns: &[IgnorePattern]) -> Self {
        let compiled = patterns
            .iter()
            .filter_map(|pattern| {
                let message = match &pattern.message_pattern {
                    Some(raw) => match Regex::new(raw) {
                        Ok(regex) => Some(regex),
                        Err(error) => {
                            tracing::warn!(pattern = raw, %error, "invalid ignore pattern regex, skipping");
                            return None;
                        }
                    },
                    None => None,
                };
                Some(CompiledPattern { channel: pattern.channel.clone(), event_id: pattern.event_id, message })
            })
            .collect();

        Self { patterns: compiled }
    }

    /// An event is ignored when at least one pattern matches on every
    /// field it specifies; an unspecified field matches anything.
    pub fn should_ignore(&self, event: &LogEvent) -> bool {
        self.patterns.iter().any(|pattern| {
            let channel_matches = pattern.channel.as_deref().map_or(true, |channel| channel == event.channel);
            let event_id_matches = pattern.event_id.map_or(true, |event_id| event_id == event.event_id);
            let message_matches = pattern.message.as_ref().map_or(true, |regex| regex.is_match(&event.message));
            channel_matches && event_id_matches && message_matches
        })
    }
}
