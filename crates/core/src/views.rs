//! Role-scoped read models. Estimate figures live only on attempts; the
//! "official" amount and the latest-attempt block are computed here at read
//! time, never written back onto the request row.
//!
//! Branch viewers see no estimate content at all, with one deliberate
//! exception: the latest attempt's worker contact block stays visible so the
//! branch can reach whoever shows up on site.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use crate::domain::actor::{BranchId, Principal, Role, UserId};
use crate::domain::attachment::{Attachment, AttachmentId, AttachmentKind, AttachmentUrlResolver};
use crate::domain::estimate::{AttemptDecision, EstimateAttempt, WorkerSnapshot};
use crate::domain::request::{MaintenanceRequest, RequestCategory, RequestId, RequestStatus};
use crate::errors::WorkflowError;
use crate::{ledger, money};

/// Hq sees everything; Branch sees its own branch's requests; a vendor sees
/// only requests assigned to them.
pub fn authorize_view(
    request: &MaintenanceRequest,
    viewer: &Principal,
) -> Result<(), WorkflowError> {
    let allowed = match viewer.role {
        Role::Hq => true,
        Role::Branch => viewer.branch_id.as_ref() == Some(&request.branch_id),
        Role::Vendor => request.is_assigned_to(&viewer.user_id),
    };
    if allowed {
        Ok(())
    } else {
        Err(WorkflowError::permission("you do not have access to this request"))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AttemptView {
    pub attempt_no: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub work_start: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub work_end: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker: Option<WorkerSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision: Option<AttemptDecision>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decided_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submitted_at: Option<DateTime<Utc>>,
}

impl AttemptView {
    fn full(attempt: &EstimateAttempt) -> Self {
        Self {
            attempt_no: attempt.attempt_no,
            amount: Some(money::format_amount(&attempt.amount)),
            comment: Some(attempt.comment.clone()),
            work_start: Some(attempt.work_start),
            work_end: Some(attempt.work_end),
            worker: attempt.worker.clone(),
            decision: Some(attempt.decision),
            decided_at: attempt.decided_at,
            decision_reason: attempt.decision_reason.clone(),
            submitted_at: Some(attempt.submitted_at),
        }
    }

    /// The Branch rendition: attempt number and worker contact only.
    fn worker_only(attempt: &EstimateAttempt) -> Self {
        Self {
            attempt_no: attempt.attempt_no,
            amount: None,
            comment: None,
            work_start: None,
            work_end: None,
            worker: attempt.worker.clone(),
            decision: None,
            decided_at: None,
            decision_reason: None,
            submitted_at: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AttachmentView {
    pub id: AttachmentId,
    pub kind: AttachmentKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempt_no: Option<u32>,
    pub url: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RequestDetailView {
    pub id: RequestId,
    pub branch_id: BranchId,
    pub requester_id: UserId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vendor_id: Option<UserId>,
    pub title: String,
    pub description: String,
    pub category: RequestCategory,
    pub status: RequestStatus,
    pub resubmit_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_reject_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimate_reject_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approved_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_comment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub revision: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_attempt: Option<AttemptView>,
    pub attempts: Vec<AttemptView>,
    pub attachments: Vec<AttachmentView>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RequestSummary {
    pub id: RequestId,
    pub branch_id: BranchId,
    pub title: String,
    pub category: RequestCategory,
    pub status: RequestStatus,
    pub resubmit_count: u32,
    /// Latest approved attempt's amount, masked for Branch viewers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub official_amount: Option<String>,
    pub updated_at: DateTime<Utc>,
}

pub fn detail(
    request: &MaintenanceRequest,
    attempts: &[EstimateAttempt],
    attachments: &[Attachment],
    viewer: Role,
    urls: &dyn AttachmentUrlResolver,
) -> RequestDetailView {
    let latest = ledger::latest(attempts);

    let (latest_attempt, attempt_views) = match viewer {
        Role::Branch => (latest.map(AttemptView::worker_only), Vec::new()),
        Role::Hq | Role::Vendor => {
            (latest.map(AttemptView::full), attempts.iter().map(AttemptView::full).collect())
        }
    };

    let attachment_views = attachments
        .iter()
        .map(|attachment| AttachmentView {
            id: attachment.id.clone(),
            kind: attachment.kind,
            attempt_no: attachment.attempt_no,
            url: urls.resolve(&attachment.storage_key),
        })
        .collect();

    RequestDetailView {
        id: request.id.clone(),
        branch_id: request.branch_id.clone(),
        requester_id: request.requester_id.clone(),
        vendor_id: request.vendor_id.clone(),
        title: request.title.clone(),
        description: request.description.clone(),
        category: request.category,
        status: request.status,
        resubmit_count: request.resubmit_count,
        request_reject_reason: request.request_reject_reason.clone(),
        estimate_reject_reason: request.estimate_reject_reason.clone(),
        approved_at: request.approved_at,
        result_comment: request.result_comment.clone(),
        completed_at: request.completed_at,
        revision: request.revision,
        created_at: request.created_at,
        updated_at: request.updated_at,
        latest_attempt,
        attempts: attempt_views,
        attachments: attachment_views,
    }
}

pub fn summary(
    request: &MaintenanceRequest,
    latest_approved: Option<&EstimateAttempt>,
    viewer: Role,
) -> RequestSummary {
    let official_amount = match viewer {
        Role::Branch => None,
        Role::Hq | Role::Vendor => {
            latest_approved.map(|attempt| money::format_amount(&attempt.amount))
        }
    };

    RequestSummary {
        id: request.id.clone(),
        branch_id: request.branch_id.clone(),
        title: request.title.clone(),
        category: request.category,
        status: request.status,
        resubmit_count: request.resubmit_count,
        official_amount,
        updated_at: request.updated_at,
    }
}
