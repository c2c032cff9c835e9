//! Seed scenarios driving a real [`Pipeline`] over mock providers: a
//! suspicious PowerShell invocation, a benign login with no matching rule,
//! and sustained LLM outage behind a circuit breaker.

use async_trait::async_trait;
use sentinel_broadcast::{Broadcaster, Envelope, Topic};
use sentinel_common::config::{Config, EmbeddingResilienceConfig};
use sentinel_common::types::{ComponentHealth, Embedding, HealthLevel, LogEvent};
use sentinel_common::Result;
use sentinel_detect::StandardRulesEngine;
use sentinel_embed::{build_embedder, MockEmbeddingBackend};
use sentinel_llm::{build_client, MockLlmProvider};
use sentinel_pipeline::Pipeline;
use sentinel_store::SecurityEventStore;
use sentinel_vector::VectorStore;
use std::sync::Arc;

struct NoopVectorStore;

#[async_trait]
impl VectorStore for NoopVectorStore {
    async fn ensure_collection(&self) -> Result<()> {
        Ok(())
    }
    async fn upsert(&self, _event: &LogEvent, _embedding: &Embedding) -> Result<()> {
        Ok(())
    }
    async fn batch_upsert(&self, _items: &[(LogEvent, Embedding)]) -> Result<()> {
        Ok(())
    }
    async fn search(&self, _query: &Embedding, _k: usize) -> Result<Vec<(LogEvent, f32)>> {
        Ok(Vec::new())
    }
    async fn has_24_hours_of_data(&self) -> Result<bool> {
        Ok(false)
    }
    async fn delete_older_than_24_hours(&self) -> Result<u64> {
        Ok(0)
    }
    async fn health_check(&self) -> ComponentHealth {
        ComponentHealth { status: HealthLevel::Healthy, message: "ok".into(), last_check: chrono::Utc::now(), metrics: Default::default() }
    }
}

fn event(channel: &str, event_id: i64, user: &str, message: &str) -> LogEvent {
    LogEvent {
        time: chrono::Utc::now(),
        host: "workstation-01".to_string(),
        channel: channel.to_string(),
        event_id,
        level: "Information".to_string(),
        user: user.to_string(),
        message: message.to_string(),
        unique_id: uuid::Uuid::new_v4().to_string(),
    }
}

fn build_test_pipeline(data_dir: &std::path::Path, llm_response: &str, min_risk_to_persist: &str) -> Arc<Pipeline> {
    let config = {
        let mut config = Config::default();
        config.pipeline.min_risk_to_persist = min_risk_to_persist.to_string();
        config.store.data_dir = data_dir.to_path_buf();
        config
    };

    let embedder = build_embedder(
        Arc::new(MockEmbeddingBackend::new(8)),
        EmbeddingResilienceConfig::default(),
        config.embedding_cache.clone(),
    );
    let llm = build_client(Arc::new(MockLlmProvider::new("mock", llm_response)), config.strict_json.clone());
    let vector_store: Arc<dyn VectorStore> = Arc::new(NoopVectorStore);
    let store = Arc::new(SecurityEventStore::open(data_dir).unwrap());
    let detector = Arc::new(StandardRulesEngine::with_defaults());
    let broadcaster = Arc::new(Broadcaster::new());

    Arc::new(Pipeline::new(config, detector, embedder, llm, vector_store, store, broadcaster))
}

#[tokio::test]
async fn suspicious_powershell_is_flagged_high_risk_with_mitre_superset() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = build_test_pipeline(
        dir.path(),
        r#"{"risk":"low","confidence":10,"summary":"benign","mitre":[],"recommended_actions":[]}"#,
        "low",
    );
    let mut subscription = pipeline.broadcaster().subscribe("conn-1", Topic::SecurityEvents, None).unwrap();

    let powershell_event = event(
        "Microsoft-Windows-PowerShell/Operational",
        4104,
        "alice",
        "powershell.exe -EncodedCommand SQBuAHYAbwBrAGUALQBXAGUAYgBSAGUAcQB1AGUAcwB0AA==",
    );
    pipeline.process_event_for_test(powershell_event).await.unwrap();

    let events = pipeline.store().list(0, 10, &Default::default()).await.unwrap();
    assert_eq!(events.len(), 1);
    let security_event = &events[0];
    assert_eq!(security_event.risk_level, sentinel_common::types::RiskLevel::High);
    assert!(security_event.is_deterministic);
    assert!(security_event.mitre_techniques.contains("T1059.001"));
    assert!(security_event.mitre_techniques.contains("T1027"));
    assert!(security_event.mitre_techniques.contains("T1140"));

    let envelope = subscription.recv().await.unwrap();
    assert!(matches!(envelope, Envelope::Message(_)));
}

#[tokio::test]
async fn benign_login_with_no_matching_rule_falls_back_to_llm_verdict() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = build_test_pipeline(
        dir.path(),
        r#"{"risk":"low","confidence":25,"summary":"routine login","mitre":[],"recommended_actions":[]}"#,
        "low",
    );

    let logon_event = event("Security", 4624, "alice", "An account was successfully logged on.");
    pipeline.process_event_for_test(logon_event).await.unwrap();

    let events = pipeline.store().list(0, 10, &Default::default()).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].risk_level, sentinel_common::types::RiskLevel::Low);
}

#[tokio::test]
async fn llm_outage_still_yields_a_fallback_verdict_and_continues() {
    let dir = tempfile::tempdir().unwrap();
    let config = {
        let mut config = Config::default();
        config.store.data_dir = dir.path().to_path_buf();
        config
    };

    let embedder = build_embedder(
        Arc::new(MockEmbeddingBackend::new(8)),
        EmbeddingResilienceConfig::default(),
        config.embedding_cache.clone(),
    );
    let llm = build_client(Arc::new(sentinel_llm::MockLlmProvider::failing("mock")), config.strict_json.clone());
    let vector_store: Arc<dyn VectorStore> = Arc::new(NoopVectorStore);
    let store = Arc::new(SecurityEventStore::open(dir.path()).unwrap());
    let detector = Arc::new(StandardRulesEngine::with_defaults());
    let broadcaster = Arc::new(Broadcaster::new());
    let pipeline = Arc::new(Pipeline::new(config, detector, embedder, llm, vector_store, store, broadcaster));

    for _ in 0..5 {
        let logon_event = event("Security", 4624, "bob", "An account was successfully logged on.");
        pipeline.process_event_for_test(logon_event).await.unwrap();
    }

    let events = pipeline.store().list(0, 10, &Default::default()).await.unwrap();
    assert_eq!(events.len(), 5);
}
