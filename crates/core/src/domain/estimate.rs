use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::actor::UserId;
use crate::domain::request::RequestId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptDecision {
    Pending,
    Approved,
    Rejected,
}

impl AttemptDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

/// Field-worker contact details copied onto an attempt at submission time.
/// This is a point-in-time snapshot, never a reference into the vendor's
/// roster: later roster edits must not rewrite historical attempts.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerSnapshot {
    pub team: String,
    pub name: String,
    pub phone: String,
}

/// One versioned estimate submission. `(request_id, attempt_no)` is the
/// identity; attempt numbers start at 1 and increase by one per submission.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EstimateAttempt {
    pub request_id: RequestId,
    pub attempt_no: u32,
    pub amount: Decimal,
    pub comment: String,
    pub work_start: NaiveDate,
    pub work_end: NaiveDate,
    pub worker: Option<WorkerSnapshot>,
    pub decision: AttemptDecision,
    pub decided_by: Option<UserId>,
    pub decided_at: Option<DateTime<Utc>>,
    pub decision_reason: Option<String>,
    pub submitted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EstimateAttempt {
    pub fn is_pending(&self) -> bool {
        self.decision == AttemptDecision::Pending
    }
}
