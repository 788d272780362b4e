use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::actor::{BranchId, UserId};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub String);

/// The eight lifecycle states of a maintenance request. `RequestRejected`
/// and `EstimateRejected` are recoverable terminals: the first re-enters via
/// a fresh submission, the second via an estimate resubmission. `Completed`
/// has no outgoing edges.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Draft,
    Requested,
    RequestRejected,
    Estimating,
    ApprovalPending,
    InProgress,
    Completed,
    EstimateRejected,
}

impl RequestStatus {
    pub const ALL: [RequestStatus; 8] = [
        RequestStatus::Draft,
        RequestStatus::Requested,
        RequestStatus::RequestRejected,
        RequestStatus::Estimating,
        RequestStatus::ApprovalPending,
        RequestStatus::InProgress,
        RequestStatus::Completed,
        RequestStatus::EstimateRejected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Requested => "requested",
            Self::RequestRejected => "request_rejected",
            Self::Estimating => "estimating",
            Self::ApprovalPending => "approval_pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::EstimateRejected => "estimate_rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "draft" => Some(Self::Draft),
            "requested" => Some(Self::Requested),
            "request_rejected" => Some(Self::RequestRejected),
            "estimating" => Some(Self::Estimating),
            "approval_pending" => Some(Self::ApprovalPending),
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            "estimate_rejected" => Some(Self::EstimateRejected),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Draft => "Draft",
            Self::Requested => "Awaiting HQ review",
            Self::RequestRejected => "Returned by HQ",
            Self::Estimating => "Awaiting estimate",
            Self::ApprovalPending => "Estimate under review",
            Self::InProgress => "Work in progress",
            Self::Completed => "Completed",
            Self::EstimateRejected => "Estimate declined",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestCategory {
    Electrical,
    Plumbing,
    Hvac,
    Carpentry,
    Appliance,
    Other,
}

impl RequestCategory {
    pub const ALL: [RequestCategory; 6] = [
        RequestCategory::Electrical,
        RequestCategory::Plumbing,
        RequestCategory::Hvac,
        RequestCategory::Carpentry,
        RequestCategory::Appliance,
        RequestCategory::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Electrical => "electrical",
            Self::Plumbing => "plumbing",
            Self::Hvac => "hvac",
            Self::Carpentry => "carpentry",
            Self::Appliance => "appliance",
            Self::Other => "other",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "electrical" => Some(Self::Electrical),
            "plumbing" => Some(Self::Plumbing),
            "hvac" => Some(Self::Hvac),
            "carpentry" => Some(Self::Carpentry),
            "appliance" => Some(Self::Appliance),
            "other" => Some(Self::Other),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Electrical => "Electrical",
            Self::Plumbing => "Plumbing",
            Self::Hvac => "Heating & cooling",
            Self::Carpentry => "Carpentry",
            Self::Appliance => "Appliance",
            Self::Other => "Other",
        }
    }
}

/// A request row as the store hands it to the engine. Estimate figures are
/// deliberately absent: the latest attempt is projected onto read models at
/// query time (`views`), never written back onto the request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaintenanceRequest {
    pub id: RequestId,
    pub branch_id: BranchId,
    pub requester_id: UserId,
    pub vendor_id: Option<UserId>,
    pub approver_id: Option<UserId>,
    pub title: String,
    pub description: String,
    pub category: RequestCategory,
    pub status: RequestStatus,
    pub resubmit_count: u32,
    /// Reason HQ sent the request itself back. Mutually exclusive with
    /// `estimate_reject_reason`.
    pub request_reject_reason: Option<String>,
    /// Reason HQ declined the pending estimate. Mutually exclusive with
    /// `request_reject_reason`.
    pub estimate_reject_reason: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub result_comment: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Optimistic-concurrency token; bumped by every committed mutation.
    pub revision: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MaintenanceRequest {
    pub fn has_vendor(&self) -> bool {
        self.vendor_id.is_some()
    }

    pub fn is_assigned_to(&self, vendor: &UserId) -> bool {
        self.vendor_id.as_ref() == Some(vendor)
    }
}
