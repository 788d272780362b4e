use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::actor::UserId;
use crate::domain::request::{RequestId, RequestStatus};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NotificationId(pub String);

/// The logical event a notification record describes. Its storage encoding
/// doubles as the dedup discriminator: the store's uniqueness constraint on
/// (recipient, request, key) is what keeps concurrent writers from creating
/// duplicate alerts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationEvent {
    StatusChanged { status: RequestStatus },
    /// A pending estimate's content was edited. `bucket_secs` is the edit
    /// time truncated to whole seconds: edits within the same second
    /// collapse into one record, later edits alert again.
    EstimateUpdated { bucket_secs: i64 },
}

impl NotificationEvent {
    pub fn dedup_key(&self) -> String {
        match self {
            Self::StatusChanged { status } => format!("status-changed:{}", status.as_str()),
            Self::EstimateUpdated { bucket_secs } => format!("estimate-updated:{bucket_secs}"),
        }
    }

    pub fn parse(key: &str) -> Option<Self> {
        if let Some(raw) = key.strip_prefix("status-changed:") {
            return RequestStatus::parse(raw).map(|status| Self::StatusChanged { status });
        }
        if let Some(raw) = key.strip_prefix("estimate-updated:") {
            return raw.parse::<i64>().ok().map(|bucket_secs| Self::EstimateUpdated { bucket_secs });
        }
        None
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub id: NotificationId,
    pub recipient_id: UserId,
    pub request_id: RequestId,
    pub event: NotificationEvent,
    pub message: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
    /// Set by the push relay once the record has been handed to a transport.
    /// `None` means not-yet-pushed, never failed.
    pub delivered_at: Option<DateTime<Utc>>,
}

impl NotificationRecord {
    pub fn new(
        recipient_id: UserId,
        request_id: RequestId,
        event: NotificationEvent,
        message: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: NotificationId(Uuid::new_v4().to_string()),
            recipient_id,
            request_id,
            event,
            message: message.into(),
            is_read: false,
            created_at,
            delivered_at: None,
        }
    }

    pub fn dedup_key(&self) -> String {
        self.event.dedup_key()
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::request::RequestStatus;

    use super::NotificationEvent;

    #[test]
    fn dedup_key_round_trips_for_status_events() {
        for status in RequestStatus::ALL {
            let event = NotificationEvent::StatusChanged { status };
            assert_eq!(NotificationEvent::parse(&event.dedup_key()), Some(event));
        }
    }

    #[test]
    fn dedup_key_round_trips_for_estimate_updates() {
        let event = NotificationEvent::EstimateUpdated { bucket_secs: 1_730_000_000 };
        assert_eq!(event.dedup_key(), "estimate-updated:1730000000");
        assert_eq!(NotificationEvent::parse(&event.dedup_key()), Some(event));
    }

    #[test]
    fn parse_rejects_unknown_keys() {
        assert_eq!(NotificationEvent::parse("status-changed:archived"), None);
        assert_eq!(NotificationEvent::parse("estimate-updated:soon"), None);
        assert_eq!(NotificationEvent::parse("mention:abc"), None);
    }
}
