use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{SpanId, TraceId};

/// Which condition released a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerReason {
    CountThreshold,
    TimeInterval,
}

impl TriggerReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CountThreshold => "count_threshold",
            Self::TimeInterval => "time_interval",
        }
    }

    pub fn parse(input: &str) -> crate::Result<Self> {
        match input {
            "count_threshold" => Ok(Self::CountThreshold),
            "time_interval" => Ok(Self::TimeInterval),
            other => Err(crate::TracelinkError::Parse(format!(
                "unknown trigger reason: {other}"
            ))),
        }
    }
}

impl std::fmt::Display for TriggerReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trace identity of one inbound request at the moment it was recorded.
///
/// Immutable once built; the batch buffer owns it until release, at which
/// point the release path takes over a copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceLinkDescriptor {
    pub trace_id: TraceId,
    pub span_id: SpanId,
    pub trace_flags: u8,
    pub trace_state: Option<String>,
}

impl TraceLinkDescriptor {
    /// W3C `traceparent` header value locating this request's span.
    pub fn traceparent(&self) -> String {
        format!(
            "00-{}-{}-{:02x}",
            self.trace_id, self.span_id, self.trace_flags
        )
    }
}

/// Persisted form of one linked request context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceLinkData {
    pub trace_id: String,
    pub span_id: String,
    pub trace_flags: String,
    pub trace_state: Option<String>,
    pub traceparent: String,
}

impl From<&TraceLinkDescriptor> for TraceLinkData {
    fn from(d: &TraceLinkDescriptor) -> Self {
        Self {
            trace_id: d.trace_id.as_str().to_string(),
            span_id: d.span_id.as_str().to_string(),
            trace_flags: d.trace_flags.to_string(),
            trace_state: d.trace_state.clone(),
            traceparent: d.traceparent(),
        }
    }
}

/// Durable record of one released batch, handed to the persistence sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRecord {
    pub trigger_reason: TriggerReason,
    pub master_trace_id: String,
    pub correlation_ids: Vec<String>,
    pub links: Vec<TraceLinkData>,
    pub first_event_ts: DateTime<Utc>,
    pub released_ts: DateTime<Utc>,
}

/// A batch record read back from the store, with its durable identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedBatch {
    pub id: i64,
    #[serde(flatten)]
    pub record: BatchRecord,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub db_path: String,
    pub db_size_bytes: u64,
    pub batches_count: usize,
    pub links_count: usize,
    pub oldest_released_ts: Option<DateTime<Utc>>,
    pub newest_released_ts: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor() -> TraceLinkDescriptor {
        TraceLinkDescriptor {
            trace_id: TraceId::parse("4bf92f3577b34da6a3ce929d0e0e4736").unwrap(),
            span_id: SpanId::parse("00f067aa0ba902b7").unwrap(),
            trace_flags: 1,
            trace_state: Some("vendor=abc".to_string()),
        }
    }

    #[test]
    fn traceparent_renders_w3c_form() {
        assert_eq!(
            descriptor().traceparent(),
            "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01"
        );
    }

    #[test]
    fn link_data_keeps_flags_and_state() {
        let data = TraceLinkData::from(&descriptor());
        assert_eq!(data.trace_flags, "1");
        assert_eq!(data.trace_state.as_deref(), Some("vendor=abc"));
        assert_eq!(
            data.traceparent,
            "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01"
        );
    }

    #[test]
    fn trigger_reason_round_trips() {
        assert_eq!(TriggerReason::CountThreshold.as_str(), "count_threshold");
        assert_eq!(
            TriggerReason::parse("time_interval").unwrap(),
            TriggerReason::TimeInterval
        );
        assert!(TriggerReason::parse("manual").is_err());
    }

    #[test]
    fn trigger_reason_serializes_snake_case() {
        let json = serde_json::to_string(&TriggerReason::TimeInterval).unwrap();
        assert_eq!(json, "\"time_interval\"");
    }
}
