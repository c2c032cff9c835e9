//! The fixed set of topics plus the one parameterised topic
//! (`Scan_{scanId}`) a client can target directly.

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    ScanProgressUpdates,
    Scan(String),
    SystemMetrics,
    DashboardUpdates,
    SecurityEvents,
    CorrelationAlerts,
}

impl Topic {
    pub fn scan(scan_id: impl Into<String>) -> Self {
        Topic::Scan(scan_id.into())
    }

    /// The wire name used as both the channel's lookup key and the
    /// `topic` field on every [`crate::Message`].
    pub fn wire_name(&self) -> String {
        match self {
            Topic::ScanProgressUpdates => "ScanProgressUpdates".to_string(),
            Topic::Scan(scan_id) => format!("Scan_{scan_id}"),
            Topic::SystemMetrics => "SystemMetrics".to_string(),
            Topic::DashboardUpdates => "DashboardUpdates".to_string(),
            Topic::SecurityEvents => "SecurityEvents".to_string(),
            Topic::CorrelationAlerts => "CorrelationAlerts".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_topic_embeds_the_scan_id_in_its_wire_name() {
        assert_eq!(Topic::scan("abc123").wire_name(), "Scan_abc123");
    }

    #[test]
    fn fixed_topics_use_their_documented_names() {
        assert_eq!(Topic::SystemMetrics.wire_name(), "SystemMetrics");
        assert_eq!(Topic::CorrelationAlerts.wire_name(), "CorrelationAlerts");
    }
}
