//! Raw LLM providers: a pooled HTTP backend and a deterministic mock.

use crate::LlmProvider;
use async_trait::async_trait;
use sentinel_common::types::{LogEvent, VectorPoint};
use sentinel_common::{Error, Result};
use sentinel_pool::ConnectionPool;
use std::sync::Arc;

fn build_prompt(event: &LogEvent, neighbors: &[VectorPoint]) -> String {
    let mut prompt = format!(
        "Analyze this security event and respond with JSON containing risk, confidence, summary, mitre, recommended_actions.\n\nEvent:\nhost={}\nchannel={}\nevent_id={}\nuser={}\nmessage={}\n",
        event.host, event.channel, event.event_id, event.user, event.message
    );
    if !neighbors.is_empty() {
        prompt.push_str("\nSimilar recent events:\n");
        for n in neighbors.iter().take(5) {
            prompt.push_str(&format!("- {} ({}): {}\n", n.payload.channel, n.payload.host, n.payload.message));
        }
    }
    prompt
}

/// Calls a remote chat/completion endpoint through a [`ConnectionPool`].
pub struct HttpLlmProvider {
    pool: Arc<ConnectionPool>,
    client: reqwest::Client,
    model: String,
}

impl HttpLlmProvider {
    pub fn new(pool: Arc<ConnectionPool>, model: String) -> Self {
        Self {
            pool,
            client: reqwest::Client::new(),
            model,
        }
    }

    async fn call(&self, prompt: &str) -> Result<String> {
        let conn = self.pool.get(None).await?;
        let url = format!("{}/api/generate", conn.base_url);
        let started = std::time::Instant::now();

        let response = self
            .client
            .post(&url)
            .json(&GenerateRequest {
                model: &self.model,
                prompt,
                stream: false,
            })
            .send()
            .await
            .map_err(|e| Error::TransientRemote(e.to_string()))?;

        let elapsed = started.elapsed().as_millis() as u64;
        if response.status().is_server_error() || response.status().as_u16() == 429 {
            self.pool.record_outcome(&conn.instance_id, false, elapsed).await;
            return Err(Error::TransientRemote(format!("llm provider returned {}", response.status())));
        }
        if !response.status().is_success() {
            self.pool.record_outcome(&conn.instance_id, false, elapsed).await;
            return Err(Error::FatalRemote(format!("llm provider returned {}", response.status())));
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| Error::TransientRemote(e.to_string()))?;
        self.pool.record_outcome(&conn.instance_id, true, elapsed).await;
        Ok(parsed.response)
    }
}

#[derive(serde::Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(serde::Deserialize)]
struct GenerateResponse {
    response: String,
}

#[async_trait]
impl LlmProvider for HttpLlmProvider {
    async fn analyze(&self, event: &LogEvent, neighbors: &[VectorPoint]) -> Result<String> {
        self.call(&build_prompt(event, neighbors)).await
    }

    async fn generate(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        self.call(&format!("{system_prompt}\n\n{user_prompt}")).await
    }

    fn identity(&self) -> &str {
        &self.model
    }
}

/// Deterministic mock provider driven by a canned response or risk tier,
/// for tests and for an `ollama`-less dev environment.
pub struct MockLlmProvider {
    name: String,
    response: String,
    fail: bool,
}

impl MockLlmProvider {
    pub fn new(name: impl Into<String>, response: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            response: response.into(),
            fail: false,
        }
    }

    pub fn failing(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            response: String::new(),
            fail: true,
        }
    }
}

#[async_trait]
impl LlmProvider for MockLlmProvider {
    async fn analyze(&self, _event: &LogEvent, _neighbors: &[VectorPoint]) -> Result<String> {
        if self.fail {
            return Err(Error::TransientRemote("mock provider failure".into()));
        }
        Ok(self.response.clone())
    }

    async fn generate(&self, _system_prompt: &str, _user_prompt: &str) -> Result<String> {
        if self.fail {
            return Err(Error::TransientRemote("mock provider failure".into()));
        }
        Ok(self.response.clone())
    }

    fn identity(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_provider_echoes_canned_response() {
        let provider = MockLlmProvider::new("m1", "{\"risk\":\"high\",\"summary\":\"x\"}");
        let event = sample_event();
        let out = provider.analyze(&event, &[]).await.unwrap();
        assert!(out.contains("high"));
    }

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
}
