use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::request::RequestId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttachmentId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentKind {
    Request,
    Estimate,
    Result,
}

impl AttachmentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Request => "request",
            Self::Estimate => "estimate",
            Self::Result => "result",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "request" => Some(Self::Request),
            "estimate" => Some(Self::Estimate),
            "result" => Some(Self::Result),
            _ => None,
        }
    }
}

/// A stored photo reference. `attempt_no` is present exactly when the kind
/// is `Estimate`; `photos::validate_shape` guards that at the door and the
/// schema re-checks it. Only the storage key is persisted; display URLs are
/// resolved when a view is built, so they never go stale in the store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: AttachmentId,
    pub request_id: RequestId,
    pub kind: AttachmentKind,
    pub attempt_no: Option<u32>,
    pub storage_key: String,
    pub created_at: DateTime<Utc>,
}

/// Resolves a storage key into a URL suitable for display DTOs. Signing and
/// upload mechanics live with the storage collaborator, not here.
pub trait AttachmentUrlResolver: Send + Sync {
    fn resolve(&self, storage_key: &str) -> String;
}

/// Joins a configured public base URL with the storage key.
pub struct PrefixUrlResolver {
    base_url: String,
}

impl PrefixUrlResolver {
    pub fn new(base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self { base_url }
    }
}

impl AttachmentUrlResolver for PrefixUrlResolver {
    fn resolve(&self, storage_key: &str) -> String {
        let key = storage_key.trim_start_matches('/');
        format!("{}/{}", self.base_url, key)
    }
}
