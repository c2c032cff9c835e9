//! StrictJSON decorator: wraps one [`LlmProvider`], extracts and validates a
//! JSON verdict from its text, retries once on validation failure if
//! configured, and synthesises a fallback verdict rather than ever
//! propagating an error.

use crate::{LlmClient, LlmProvider};
use async_trait::async_trait;
use sentinel_common::config::StrictJsonConfig;
use sentinel_common::types::{ComponentHealth, HealthLevel, LlmVerdict, LogEvent, VectorPoint};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;

#[derive(Debug, Default, Clone, Copy)]
pub struct StrictJsonStats {
    pub total_calls: u64,
    pub successful_parses: u64,
    pub failed_parses: u64,
    pub retried_calls: u64,
    pub fallback_used: u64,
}

impl StrictJsonStats {
    pub fn parse_success_rate(&self) -> f64 {
        if self.total_calls == 0 {
            return 1.0;
        }
        self.successful_parses as f64 / self.total_calls as f64
    }
}

/// Extract a JSON object from free-form LLM output: a fenced ```json block,
/// else the first balanced `{...}` run, else the trimmed whole response.
pub fn extract_json(text: &str) -> String {
    if let Some(fenced) = extract_fenced_block(text) {
        return fenced;
    }
    if let Some(braced) = extract_first_balanced_braces(text) {
        return braced;
    }
    text.trim().to_string()
}

fn extract_fenced_block(text: &str) -> Option<String> {
    let start_marker = "```json";
    let start = text.find(start_marker)? + start_marker.len();
    let rest = &text[start..];
    let end = rest.find("```")?;
    Some(rest[..end].trim().to_string())
}

fn extract_first_balanced_braces(text: &str) -> Option<String> {
    let bytes = text.as_bytes();
    let open = text.find('{')?;
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, &b) in bytes[open..].iter().enumerate() {
        let ch = b as char;
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(text[open..open + offset + 1].to_string());
                }
            }
            _ => {}
        }
    }
    None
}

fn validate(value: &serde_json::Value) -> bool {
    let obj = match value.as_object() {
        Some(o) => o,
        None => return false,
    };
    if !obj.contains_key("risk") || !obj.contains_key("summary") {
        return false;
    }
    if let Some(confidence) = obj.get("confidence") {
        if !confidence.is_number() {
            return false;
        }
    }
    true
}

fn parse_verdict(raw: &str) -> Option<LlmVerdict> {
    let candidate = extract_json(raw);
    let value: serde_json::Value = serde_json::from_str(&candidate).ok()?;
    if !validate(&value) {
        return None;
    }
    let risk = value.get("risk")?.as_str()?.to_string();
    let summary = value.get("summary")?.as_str()?.to_string();
    let confidence = value
        .get("confidence")
        .and_then(|v| v.as_f64())
        .map(|v| v.clamp(0.0, 100.0) as u8)
        .unwrap_or(50);
    let mitre = value
        .get("mitre")
        .and_then(|v| v.as_array())
        .map(|a| a.iter().filter_map(|x| x.as_str().map(String::from)).collect())
        .unwrap_or_default();
    let recommended_actions = value
        .get("recommended_actions")
        .and_then(|v| v.as_array())
        .map(|a| a.iter().filter_map(|x| x.as_str().map(String::from)).collect())
        .unwrap_or_default();
    Some(LlmVerdict {
        risk,
        confidence,
        summary,
        mitre,
        recommended_actions,
    })
}

/// Best-effort summary extraction for the fallback verdict: a `summary`
/// field match in whatever text came back, else its first sentence (up to
/// 200 chars), else the caller-supplied default.
fn salvage_summary(raw: &str, default: impl FnOnce() -> String) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(&extract_json(raw)) {
        if let Some(summary) = value.get("summary").and_then(|v| v.as_str()) {
            if !summary.is_empty() {
                return summary.to_string();
            }
        }
    }
    let trimmed = raw.trim();
    if !trimmed.is_empty() {
        let sentence_end = trimmed.find(['.', '\n']).unwrap_or(trimmed.len());
        let sentence = &trimmed[..sentence_end.min(200)];
        if !sentence.trim().is_empty() {
            return sentence.trim().to_string();
        }
    }
    default()
}

pub struct StrictJsonClient {
    provider: Arc<dyn LlmProvider>,
    config: StrictJsonConfig,
    total_calls: AtomicU64,
    successful_parses: AtomicU64,
    failed_parses: AtomicU64,
    retried_calls: AtomicU64,
    fallback_used: AtomicU64,
}

impl StrictJsonClient {
    pub fn new(provider: Arc<dyn LlmProvider>, config: StrictJsonConfig) -> Self {
        Self {
            provider,
            config,
            total_calls: AtomicU64::new(0),
            successful_parses: AtomicU64::new(0),
            failed_parses: AtomicU64::new(0),
            retried_calls: AtomicU64::new(0),
            fallback_used: AtomicU64::new(0),
        }
    }

    pub fn stats(&self) -> StrictJsonStats {
        StrictJsonStats {
            total_calls: self.total_calls.load(Ordering::Relaxed),
            successful_parses: self.successful_parses.load(Ordering::Relaxed),
            failed_parses: self.failed_parses.load(Ordering::Relaxed),
            retried_calls: self.retried_calls.load(Ordering::Relaxed),
            fallback_used: self.fallback_used.load(Ordering::Relaxed),
        }
    }

    /// Run one provider call and attempt to parse its verdict. Returns the
    /// raw response text alongside the parse outcome (`None` raw text only
    /// when the provider call itself failed) so a failed final attempt can
    /// still feed [`salvage_summary`] without a fresh remote call.
    async fn one_attempt(&self, event: &LogEvent, neighbors: &[VectorPoint]) -> (Option<LlmVerdict>, Option<String>) {
        match self.provider.analyze(event, neighbors).await {
            Ok(raw) => {
                let verdict = parse_verdict(&raw).or_else(|| {
                    warn!(provider = self.provider.identity(), "llm response failed json validation");
                    None
                });
                (verdict, Some(raw))
            }
            Err(err) => {
                warn!(provider = self.provider.identity(), error = %err, "llm call failed");
                (None, None)
            }
        }
    }
}

#[async_trait]
impl LlmClient for StrictJsonClient {
    async fn analyze(&self, event: &LogEvent, neighbors: &[VectorPoint]) -> LlmVerdict {
        if !self.config.enabled {
            return match self.one_attempt(event, neighbors).await {
                (Some(verdict), _) => verdict,
                (None, _) => LlmVerdict::fallback(default_summary(event)),
            };
        }

        self.total_calls.fetch_add(1, Ordering::Relaxed);

        let (verdict, mut last_raw) = self.one_attempt(event, neighbors).await;
        if let Some(verdict) = verdict {
            self.successful_parses.fetch_add(1, Ordering::Relaxed);
            return verdict;
        }

        if self.config.enable_retry_on_failure {
            self.retried_calls.fetch_add(1, Ordering::Relaxed);
            let (verdict, raw) = self.one_attempt(event, neighbors).await;
            if let Some(verdict) = verdict {
                self.successful_parses.fetch_add(1, Ordering::Relaxed);
                return verdict;
            }
            last_raw = raw;
        }

        self.failed_parses.fetch_add(1, Ordering::Relaxed);
        self.fallback_used.fetch_add(1, Ordering::Relaxed);

        let raw = last_raw.unwrap_or_default();
        LlmVerdict::fallback(salvage_summary(&raw, || default_summary(event)))
    }

    async fn health_check(&self) -> ComponentHealth {
        let stats = self.stats();
        let status = if stats.total_calls == 0 || stats.parse_success_rate() > 0.9 {
            HealthLevel::Healthy
        } else if stats.parse_success_rate() > 0.5 {
            HealthLevel::Degraded
        } else {
            HealthLevel::Critical
        };
        ComponentHealth {
            status,
            message: format!("parse_success_rate={:.2}", stats.parse_success_rate()),
            last_check: sentinel_common::utils::current_timestamp(),
            metrics: Default::default(),
        }
    }
}

fn default_summary(event: &LogEvent) -> String {
    format!("Security event detected in {} (EventId: {})", event.channel, event.event_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::MockLlmProvider;

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

    #[test]
    fn extracts_fenced_json_block() {
        let text = "here you go:\n```json\n{\"risk\":\"high\",\"summary\":\"s\"}\n```\nthanks";
        assert_eq!(extract_json(text), "{\"risk\":\"high\",\"summary\":\"s\"}");
    }

    #[test]
    fn extracts_first_balanced_braces_without_fence() {
        let text = "sure, {\"risk\":\"low\",\"summary\":\"ok\",\"nested\":{\"a\":1}} done";
        assert_eq!(
            extract_json(text),
            "{\"risk\":\"low\",\"summary\":\"ok\",\"nested\":{\"a\":1}}"
        );
    }

    #[tokio::test]
    async fn valid_json_parses_on_first_attempt() {
        let provider = Arc::new(MockLlmProvider::new(
            "m",
            "{\"risk\":\"high\",\"confidence\":80,\"summary\":\"suspicious\"}",
        ));
        let client = StrictJsonClient::new(provider, StrictJsonConfig { enabled: true, enable_retry_on_failure: true });
        let verdict = client.analyze(&sample_event(), &[]).await;
        assert_eq!(verdict.risk, "high");
        assert_eq!(verdict.confidence, 80);
        assert_eq!(client.stats().successful_parses, 1);
    }

    #[tokio::test]
    async fn malformed_response_falls_back_after_retry() {
        let provider = Arc::new(MockLlmProvider::new("m", "not json at all"));
        let client = StrictJsonClient::new(provider, StrictJsonConfig { enabled: true, enable_retry_on_failure: true });
        let verdict = client.analyze(&sample_event(), &[]).await;
        assert_eq!(verdict.risk, "low");
        assert_eq!(verdict.confidence, 25);
        assert_eq!(client.stats().fallback_used, 1);
        assert_eq!(client.stats().retried_calls, 1);
    }

    #[tokio::test]
    async fn provider_error_falls_back_to_default_summary() {
        let provider = Arc::new(MockLlmProvider::failing("m"));
        let client = StrictJsonClient::new(provider, StrictJsonConfig { enabled: true, enable_retry_on_failure: false });
        let verdict = client.analyze(&sample_event(), &[]).await;
        assert!(verdict.summary.contains("Security"));
        assert!(verdict.summary.contains("4625"));
    }
}
