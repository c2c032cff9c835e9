//! Sortable key encodings for the secondary index trees. Sled orders keys
//! lexicographically by byte value, so every key here is built to make that
//! byte ordering match the ordering we actually want (chronological,
//! risk-then-time, name-then-time).

use chrono::{DateTime, Utc};
use sentinel_common::types::RiskLevel;
use uuid::Uuid;

/// 8 bytes of millisecond timestamp (bias-shifted so negative values still
/// sort correctly as unsigned bytes) followed by the 16-byte event id, so
/// two events at the same millisecond still produce distinct, stably
/// ordered keys.
pub fn time_key(at: DateTime<Utc>, id: Uuid) -> [u8; 24] {
    let millis = at.timestamp_millis();
    let biased = (millis as i128 - i64::MIN as i128) as u64;
    let mut key = [0u8; 24];
    key[..8].copy_from_slice(&biased.to_be_bytes());
    key[8..].copy_from_slice(id.as_bytes());
    key
}

pub fn risk_key(risk: RiskLevel, time_key: &[u8; 24]) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + time_key.len());
    key.push(risk as u8);
    key.extend_from_slice(time_key);
    key
}

/// `name` followed by a NUL separator and the time key, used for the
/// event-type, host, and user indices.
pub fn prefixed_key(name: &str, time_key: &[u8; 24]) -> Vec<u8> {
    let mut key = Vec::with_capacity(name.len() + 1 + time_key.len());
    key.extend_from_slice(name.as_bytes());
    key.push(0);
    key.extend_from_slice(time_key);
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_key_orders_chronologically() {
        let earlier = Utc::now() - chrono::Duration::minutes(5);
        let later = Utc::now();
        let id = Uuid::new_v4();
        assert!(time_key(earlier, id) < time_key(later, id));
    }

    #[test]
    fn time_key_breaks_ties_by_id() {
        let at = Utc::now();
        let lower_id = Uuid::nil();
        let higher_id = Uuid::max();
        assert!(time_key(at, lower_id) < time_key(at, higher_id));
    }
}
