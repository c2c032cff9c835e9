//! Shared types and utilities for the event-analysis pipeline.
//!
//! Every other crate in this workspace depends on this one for the data
//! model, the error taxonomy, the circuit breaker and retry primitives,
//! and configuration loading, rather than inventing its own.

pub mod circuit_breaker;
pub mod config;
pub mod error;
pub mod metrics;
pub mod retry;
pub mod types;
pub mod utils;

pub use circuit_breaker::{
    with_circuit_breaker, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerSnapshot,
    CircuitState,
};
pub use config::Config;
pub use error::{Error, Result};
pub use metrics::HealthStatus;
pub use retry::{retry_for_error, retry_operation, RetryExecutor, RetryStrategy};
pub use types::*;
