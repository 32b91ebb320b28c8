/// Append-only audit stream for every outbox row
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    Created,
    Enqueued,
    Processing,
    Sent,
    Failed,
    Retry,
    Dlq,
    Bounce,
    Complaint,
    Delivery,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::Enqueued => "ENQUEUED",
            Self::Processing => "PROCESSING",
            Self::Sent => "SENT",
            Self::Failed => "FAILED",
            Self::Retry => "RETRY",
            Self::Dlq => "DLQ",
            Self::Bounce => "BOUNCE",
            Self::Complaint => "COMPLAINT",
            Self::Delivery => "DELIVERY",
        }
    }
}

/// Typed event metadata. A tagged enum instead of a free-form JSON blob so
/// consumers can match on the shape; unknown future variants deserialize
/// into `Other`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventMetadata {
    Created {
        request_id: String,
    },
    Enqueued {
        priority: u8,
    },
    Processing {
        attempt: u32,
        worker_id: String,
    },
    Sent {
        provider: String,
        provider_message_id: String,
        duration_ms: u64,
    },
    Failed {
        code: String,
        category: crate::error::ErrorCategory,
        reason: String,
    },
    Retry {
        attempt: u32,
        delay_ms: u64,
        next_attempt_at: DateTime<Utc>,
        code: String,
    },
    Dlq {
        reason: String,
        failed_attempts: u32,
    },
    Provider {
        provider: String,
        detail: String,
    },
    None,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailEvent {
    pub id: Uuid,
    pub outbox_id: Uuid,
    pub event_type: EventType,
    /// Server clock plus a monotonic sequence for a total order
    pub occurred_at: DateTime<Utc>,
    pub sequence: u64,
    pub metadata: EventMetadata,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_round_trip() {
        let meta = EventMetadata::Retry {
            attempt: 2,
            delay_ms: 2000,
            next_attempt_at: Utc::now(),
            code: "PROVIDER_TIMEOUT".into(),
        };
        let json = serde_json::to_string(&meta).unwrap();
        assert!(json.contains("\"kind\":\"retry\""));
        let back: EventMetadata = serde_json::from_str(&json).unwrap();
        match back {
            EventMetadata::Retry {
                attempt, delay_ms, ..
            } => {
                assert_eq!(attempt, 2);
                assert_eq!(delay_ms, 2000);
            }
            other => panic!("unexpected variant: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_metadata_tolerated() {
        let back: EventMetadata =
            serde_json::from_str(r#"{"kind":"from_the_future","x":1}"#).unwrap();
        assert!(matches!(back, EventMetadata::Other));
    }

    #[test]
    fn test_event_type_names() {
        assert_eq!(EventType::Dlq.as_str(), "DLQ");
        assert_eq!(
            serde_json::to_string(&EventType::Created).unwrap(),
            "\"CREATED\""
        );
    }
}
