//! Small stateless helpers shared across components.

use chrono::{DateTime, Utc};
use std::time::{SystemTime, UNIX_EPOCH};

/// Get current timestamp.
pub fn current_timestamp() -> DateTime<Utc> {
    Utc::now()
}

/// Get current timestamp as milliseconds since epoch.
pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Calculate exponential backoff delay, capped at `max_delay_ms`.
pub fn exponential_backoff(
    attempt: u32,
    initial_delay_ms: u64,
    max_delay_ms: u64,
    multiplier: f32,
) -> u64 {
    let delay = initial_delay_ms as f64 * (multiplier as f64).powi(attempt as i32);
    (delay as u64).min(max_delay_ms)
}

/// Calculate a latency percentile from a set of samples.
pub fn calculate_percentile(mut latencies: Vec<u64>, percentile: f32) -> u64 {
    if latencies.is_empty() {
        return 0;
    }

    latencies.sort_unstable();
    let index = ((latencies.len() as f32 * percentile / 100.0) - 1.0).max(0.0) as usize;
    latencies[index.min(latencies.len() - 1)]
}

/// Normalise free text for use as an embedding cache key: trim, collapse
/// internal whitespace runs to a single space, and lowercase. Two messages
/// differing only in whitespace or case must hash to the same cache key.
pub fn normalise_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
