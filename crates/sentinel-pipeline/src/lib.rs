//! Orchestrates the security event pipeline: ingest, deterministic
//! detection, embedding, similarity retrieval, LLM analysis, merge,
//! persistence, and broadcast. The correlation engine runs alongside on
//! its own cadence, scanning the durable store for multi-event patterns.

mod health;
mod ignore;
mod pipeline;
mod sink;
mod source;
mod wiring;

pub use health::PipelineHealth;
pub use pipeline::Pipeline;
pub use source::{ChannelEventSource, LogEventSource};
pub use wiring::build_pipeline;
