//! Shared error taxonomy.
//!
//! Every crate in this workspace maps its failures onto the kinds described
//! here rather than inventing its own ad-hoc error shape: `Validation`,
//! `TransientRemote`, `CircuitOpen`, `FatalRemote`, `Cancellation` and
//! `Corruption`. Component crates may add their own `thiserror` variants for
//! domain detail, but should carry one of these kinds so the pipeline can
//! make uniform retry/degrade decisions without downcasting.

use thiserror::Error;

/// Result alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, Error>;

/// Shared error type.
#[derive(Error, Debug)]
pub enum Error {
    /// Bad configuration or a malformed inbound event. Configuration errors
    /// abort startup; event errors drop the single event with a warning.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Transport/timeout/5xx failure. Retried by the resilience layer and
    /// eventually degraded (empty embedding, fallback verdict, vector-only
    /// search) rather than propagated to the operator.
    #[error("transient remote failure: {0}")]
    TransientRemote(String),

    /// A circuit breaker rejected the call without contacting the remote.
    /// Treated as `TransientRemote` for backoff purposes but does not count
    /// as a retry attempt.
    #[error("circuit open for {0}")]
    CircuitOpen(String),

    /// A non-retriable 4xx-class failure from a remote dependency. Surfaced
    /// to the caller; processing continues with a degraded verdict.
    #[error("fatal remote failure: {0}")]
    FatalRemote(String),

    /// Operation was cancelled. Never retried; only a "cancelled" counter is
    /// incremented.
    #[error("operation cancelled")]
    Cancellation,

    /// A persisted record failed schema validation on read. The record is
    /// quarantined and processing continues.
    #[error("corrupt record: {0}")]
    Corruption(String),

    /// No instance in a connection pool passed its health check.
    #[error("no healthy instances available for {0}")]
    NoHealthyInstances(String),

    /// JSON (de)serialization failure, usually at a storage or wire boundary.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Catch-all for unexpected failures at a boundary.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Whether the resilience layer should attempt this call again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::TransientRemote(_) | Error::CircuitOpen(_))
    }

    /// Coarse category, useful for metrics labels and log fields.
    pub fn category(&self) -> &'static str {
        match self {
            Error::Validation(_) => "validation",
            Error::TransientRemote(_) => "transient_remote",
            Error::CircuitOpen(_) => "circuit_open",
            Error::FatalRemote(_) => "fatal_remote",
            Error::Cancellation => "cancellation",
            Error::Corruption(_) => "corruption",
            Error::NoHealthyInstances(_) => "no_healthy_instances",
            Error::Serialization(_) => "serialization",
            Error::Other(_) => "other",
        }
    }

    /// Whether a textual error message matches one of the retriable
    /// conditions called out in the connection pool contract: timeouts,
    /// transport errors, or a textual match on "timeout"/"connection"/
    /// "network".
    pub fn message_is_retryable_text(message: &str) -> bool {
        let lower = message.to_lowercase();
        lower.contains("timeout") || lower.contains("connection") || lower.contains("network")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_and_circuit_open_are_retryable() {
        assert!(Error::TransientRemote("boom".into()).is_retryable());
        assert!(Error::CircuitOpen("inst-1".into()).is_retryable());
        assert!(!Error::Validation("bad".into()).is_retryable());
        assert!(!Error::Cancellation.is_retryable());
    }

    #[test]
    fn category_labels_are_stable() {
        assert_eq!(Error::Cancellation.category(), "cancellation");
        assert_eq!(Error::Corruption("x".into()).category(), "corruption");
    }

    #[test]
    fn textual_retry_match() {
        assert!(Error::message_is_retryable_text("Connection reset by peer"));
        assert!(Error::message_is_retryable_text("request timeout"));
        assert!(!Error::message_is_retryable_text("invalid api key"));
    }
}
