//! The workflow service: every operation follows the same shape. Resolve
//! the actor, fetch the request at its current revision, run the pure core
//! checks, build the after-image plus its side writes, commit once, map the
//! store's outcome into the caller-facing error taxonomy.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use mendflow_core::domain::actor::{Principal, Role, UserId};
use mendflow_core::domain::attachment::{
    Attachment, AttachmentId, AttachmentKind, AttachmentUrlResolver,
};
use mendflow_core::domain::estimate::{AttemptDecision, EstimateAttempt, WorkerSnapshot};
use mendflow_core::domain::notification::{NotificationId, NotificationRecord};
use mendflow_core::domain::request::{
    MaintenanceRequest, RequestCategory, RequestId, RequestStatus,
};
use mendflow_core::errors::WorkflowError;
use mendflow_core::lifecycle::{self, RequestAction};
use mendflow_core::views::{self, RequestDetailView, RequestSummary};
use mendflow_core::{fanout, ledger, money, photos};

use mendflow_db::repositories::{
    AttachmentStore, AttemptContentPatch, AttemptDecisionWrite, EstimateStore, NotificationStore,
    RepositoryError, RequestStore, TransitionWrite, UserStore,
};

/// Input for `create_request`. The requester is also the acting user; the
/// request lands in DRAFT unless `submit_now` walks the submit edge in the
/// same call.
#[derive(Clone, Debug)]
pub struct NewRequest {
    pub requester_id: UserId,
    pub title: String,
    pub description: String,
    pub category: RequestCategory,
    pub submit_now: bool,
}

/// A complete estimate submission. The amount arrives as the human-entered
/// string; parsing it is part of the operation's validation.
#[derive(Clone, Debug)]
pub struct EstimateSubmission {
    pub amount: String,
    pub comment: String,
    pub work_start: NaiveDate,
    pub work_end: NaiveDate,
    pub worker: Option<WorkerSnapshot>,
}

/// Partial edit of a still-pending attempt. `None` keeps the stored value.
#[derive(Clone, Debug, Default)]
pub struct EstimateEdit {
    pub amount: Option<String>,
    pub comment: Option<String>,
    pub work_start: Option<NaiveDate>,
    pub work_end: Option<NaiveDate>,
    pub worker: Option<WorkerSnapshot>,
}

impl EstimateEdit {
    pub fn is_empty(&self) -> bool {
        self.amount.is_none()
            && self.comment.is_none()
            && self.work_start.is_none()
            && self.work_end.is_none()
            && self.worker.is_none()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EstimateVerdict {
    Approve,
    Reject,
}

pub struct WorkflowService {
    requests: Arc<dyn RequestStore>,
    estimates: Arc<dyn EstimateStore>,
    attachments: Arc<dyn AttachmentStore>,
    notifications: Arc<dyn NotificationStore>,
    users: Arc<dyn UserStore>,
    urls: Arc<dyn AttachmentUrlResolver>,
}

impl WorkflowService {
    pub fn new(
        requests: Arc<dyn RequestStore>,
        estimates: Arc<dyn EstimateStore>,
        attachments: Arc<dyn AttachmentStore>,
        notifications: Arc<dyn NotificationStore>,
        users: Arc<dyn UserStore>,
        urls: Arc<dyn AttachmentUrlResolver>,
    ) -> Self {
        Self { requests, estimates, attachments, notifications, users, urls }
    }

    /// Creates a request owned by `requester_id`'s branch. With
    /// `submit_now` the request is born REQUESTED and HQ is alerted inside
    /// the insert transaction; otherwise it stays DRAFT and silent.
    pub async fn create_request(&self, input: NewRequest) -> Result<RequestId, WorkflowError> {
        let actor = self.principal(&input.requester_id).await?;
        if actor.role != Role::Branch {
            return Err(WorkflowError::permission("only Branch users create requests"));
        }
        let branch_id = actor.branch_id.clone().ok_or_else(|| {
            WorkflowError::Internal(format!(
                "branch user `{}` has no branch id on record",
                actor.user_id.0
            ))
        })?;

        let title = input.title.trim();
        if title.is_empty() {
            return Err(WorkflowError::validation("a request title is required"));
        }
        let description = input.description.trim();
        if description.is_empty() {
            return Err(WorkflowError::validation("a request description is required"));
        }

        let now = Utc::now();
        let status =
            if input.submit_now { RequestStatus::Requested } else { RequestStatus::Draft };
        let request = MaintenanceRequest {
            id: RequestId(Uuid::new_v4().to_string()),
            branch_id,
            requester_id: actor.user_id.clone(),
            vendor_id: None,
            approver_id: None,
            title: title.to_string(),
            description: description.to_string(),
            category: input.category,
            status,
            resubmit_count: 0,
            request_reject_reason: None,
            estimate_reject_reason: None,
            approved_at: None,
            result_comment: None,
            completed_at: None,
            revision: 1,
            created_at: now,
            updated_at: now,
        };

        let notifications = if input.submit_now {
            self.status_fanout(&request, RequestStatus::Draft, RequestStatus::Requested, now)
                .await?
        } else {
            Vec::new()
        };

        self.requests.insert(&request, &notifications).await.map_err(map_store_error)?;

        tracing::info!(
            event_name = "workflow.create_request",
            request_id = %request.id.0,
            actor = %actor.user_id.0,
            status = request.status.as_str(),
            "request created"
        );
        Ok(request.id)
    }

    /// DRAFT -> REQUESTED, and the resubmission edge HQ1_REJECTED ->
    /// REQUESTED. Moving forward clears the earlier rejection reason.
    pub async fn submit(
        &self,
        request_id: &RequestId,
        actor_id: &UserId,
    ) -> Result<MaintenanceRequest, WorkflowError> {
        let actor = self.principal(actor_id).await?;
        let before = self.fetch_request(request_id).await?;
        let after_status = lifecycle::advance(&before, &actor, RequestAction::Submit)?;

        let now = Utc::now();
        let mut after = before.clone();
        after.status = after_status;
        after.request_reject_reason = None;
        after.revision += 1;
        after.updated_at = now;

        let notifications = self.status_fanout(&after, before.status, after_status, now).await?;
        self.commit(TransitionWrite {
            request: after.clone(),
            expected_revision: before.revision,
            new_attempt: None,
            decide_attempt: None,
            attachments: Vec::new(),
            notifications,
        })
        .await?;

        self.log_transition("workflow.submit", &after, before.status, &actor);
        Ok(after)
    }

    /// REQUESTED -> HQ1_REJECTED. HQ only; the reason is mandatory and
    /// lands on the request for the branch to read. This edge is silent.
    pub async fn reject_request(
        &self,
        request_id: &RequestId,
        actor_id: &UserId,
        reason: &str,
    ) -> Result<MaintenanceRequest, WorkflowError> {
        let actor = self.principal(actor_id).await?;
        let before = self.fetch_request(request_id).await?;
        let after_status = lifecycle::advance(&before, &actor, RequestAction::RejectRequest)?;

        let reason = reason.trim();
        if reason.is_empty() {
            return Err(WorkflowError::validation("a rejection reason is required"));
        }

        let now = Utc::now();
        let mut after = before.clone();
        after.status = after_status;
        after.request_reject_reason = Some(reason.to_string());
        after.revision += 1;
        after.updated_at = now;

        let notifications = self.status_fanout(&after, before.status, after_status, now).await?;
        self.commit(TransitionWrite {
            request: after.clone(),
            expected_revision: before.revision,
            new_attempt: None,
            decide_attempt: None,
            attachments: Vec::new(),
            notifications,
        })
        .await?;

        self.log_transition("workflow.reject_request", &after, before.status, &actor);
        Ok(after)
    }

    /// REQUESTED -> ESTIMATING. The named vendor must exist and hold the
    /// Vendor role; the assignment alerts that vendor alone.
    pub async fn assign_vendor(
        &self,
        request_id: &RequestId,
        actor_id: &UserId,
        vendor_id: &UserId,
    ) -> Result<MaintenanceRequest, WorkflowError> {
        let actor = self.principal(actor_id).await?;
        let before = self.fetch_request(request_id).await?;
        let after_status = lifecycle::advance(&before, &actor, RequestAction::AssignVendor)?;

        let vendor = self
            .users
            .find_by_id(vendor_id)
            .await
            .map_err(map_store_error)?
            .ok_or_else(|| WorkflowError::not_found("user", vendor_id.0.clone()))?;
        if vendor.role != Role::Vendor {
            return Err(WorkflowError::validation(format!(
                "user `{}` is not a vendor",
                vendor_id.0
            )));
        }

        let now = Utc::now();
        let mut after = before.clone();
        after.status = after_status;
        after.vendor_id = Some(vendor.id.clone());
        after.revision += 1;
        after.updated_at = now;

        let notifications = self.status_fanout(&after, before.status, after_status, now).await?;
        self.commit(TransitionWrite {
            request: after.clone(),
            expected_revision: before.revision,
            new_attempt: None,
            decide_attempt: None,
            attachments: Vec::new(),
            notifications,
        })
        .await?;

        self.log_transition("workflow.assign_vendor", &after, before.status, &actor);
        Ok(after)
    }

    /// ESTIMATING -> APPROVAL_PENDING with a fresh ledger attempt. Called
    /// on HQ2_REJECTED the operation walks the reopen edge first, so one
    /// commit carries the whole resubmission.
    pub async fn submit_estimate(
        &self,
        request_id: &RequestId,
        actor_id: &UserId,
        input: EstimateSubmission,
    ) -> Result<EstimateAttempt, WorkflowError> {
        let actor = self.principal(actor_id).await?;
        let before = self.fetch_request(request_id).await?;

        let mut working = before.clone();
        if working.status == RequestStatus::EstimateRejected {
            working.status = lifecycle::advance(&working, &actor, RequestAction::ReopenEstimate)?;
        }
        let after_status = lifecycle::advance(&working, &actor, RequestAction::SubmitEstimate)?;

        let amount = money::parse_amount(&input.amount)?;
        ledger::validate_work_dates(input.work_start, input.work_end)?;
        let comment = input.comment.trim();
        if comment.is_empty() {
            return Err(WorkflowError::validation("an estimate comment is required"));
        }

        let attempts =
            self.estimates.list_for_request(request_id).await.map_err(map_store_error)?;
        let now = Utc::now();
        let attempt = EstimateAttempt {
            request_id: request_id.clone(),
            attempt_no: ledger::next_attempt_no(&attempts),
            amount,
            comment: comment.to_string(),
            work_start: input.work_start,
            work_end: input.work_end,
            worker: input.worker,
            decision: AttemptDecision::Pending,
            decided_by: None,
            decided_at: None,
            decision_reason: None,
            submitted_at: now,
            updated_at: now,
        };

        let mut after = before.clone();
        after.status = after_status;
        after.estimate_reject_reason = None;
        after.revision += 1;
        after.updated_at = now;

        // Fan-out keys off the estimating -> approval-pending edge even on
        // the resubmission path; the reopen hop itself is silent.
        let notifications = self
            .status_fanout(&after, RequestStatus::Estimating, after_status, now)
            .await?;
        self.commit(TransitionWrite {
            request: after.clone(),
            expected_revision: before.revision,
            new_attempt: Some(attempt.clone()),
            decide_attempt: None,
            attachments: Vec::new(),
            notifications,
        })
        .await?;

        tracing::info!(
            event_name = "workflow.submit_estimate",
            request_id = %after.id.0,
            actor = %actor.user_id.0,
            attempt_no = attempt.attempt_no,
            from = before.status.as_str(),
            to = after.status.as_str(),
            "estimate submitted"
        );
        Ok(attempt)
    }

    /// Replaces the content of the still-pending attempt and re-alerts the
    /// requester and HQ. Decided attempts are immutable history.
    pub async fn update_estimate(
        &self,
        request_id: &RequestId,
        actor_id: &UserId,
        edit: EstimateEdit,
    ) -> Result<EstimateAttempt, WorkflowError> {
        let actor = self.principal(actor_id).await?;
        let before = self.fetch_request(request_id).await?;

        if actor.role != Role::Vendor || !before.is_assigned_to(&actor.user_id) {
            return Err(WorkflowError::permission(
                "estimate edits require the assigned vendor",
            ));
        }
        if edit.is_empty() {
            return Err(WorkflowError::validation("nothing to update"));
        }

        let attempts =
            self.estimates.list_for_request(request_id).await.map_err(map_store_error)?;
        let target = match ledger::pending(&attempts) {
            Some(pending) => pending.clone(),
            None => match ledger::latest(&attempts) {
                Some(latest) => {
                    return Err(WorkflowError::AttemptNotPending {
                        request_id: request_id.0.clone(),
                        attempt_no: latest.attempt_no,
                    })
                }
                None => {
                    return Err(WorkflowError::not_found("attempt", request_id.0.clone()))
                }
            },
        };

        let amount = match &edit.amount {
            Some(raw) => money::parse_amount(raw)?,
            None => target.amount,
        };
        let comment = match edit.comment {
            Some(comment) => {
                let comment = comment.trim().to_string();
                if comment.is_empty() {
                    return Err(WorkflowError::validation("an estimate comment is required"));
                }
                comment
            }
            None => target.comment.clone(),
        };
        let work_start = edit.work_start.unwrap_or(target.work_start);
        let work_end = edit.work_end.unwrap_or(target.work_end);
        ledger::validate_work_dates(work_start, work_end)?;
        let worker = edit.worker.or_else(|| target.worker.clone());

        let now = Utc::now();
        let patch = AttemptContentPatch {
            amount,
            comment: comment.clone(),
            work_start,
            work_end,
            worker: worker.clone(),
            updated_at: now,
        };
        let hq_users = self.users.list_hq_ids().await.map_err(map_store_error)?;
        let records = fanout::estimate_updated(&before, &hq_users, now).records(now);

        self.estimates
            .update_pending_content(request_id, target.attempt_no, patch, &records)
            .await
            .map_err(map_store_error)?;

        tracing::info!(
            event_name = "workflow.update_estimate",
            request_id = %request_id.0,
            actor = %actor.user_id.0,
            attempt_no = target.attempt_no,
            "pending estimate revised"
        );
        Ok(EstimateAttempt {
            amount,
            comment,
            work_start,
            work_end,
            worker,
            updated_at: now,
            ..target
        })
    }

    /// APPROVAL_PENDING -> IN_PROGRESS on approve, -> HQ2_REJECTED on
    /// reject. Rejection requires a reason and counts one resubmission;
    /// nothing else ever touches `resubmit_count`.
    pub async fn decide_estimate(
        &self,
        request_id: &RequestId,
        attempt_no: u32,
        actor_id: &UserId,
        verdict: EstimateVerdict,
        reason: Option<&str>,
    ) -> Result<MaintenanceRequest, WorkflowError> {
        let actor = self.principal(actor_id).await?;
        let before = self.fetch_request(request_id).await?;
        let action = match verdict {
            EstimateVerdict::Approve => RequestAction::ApproveEstimate,
            EstimateVerdict::Reject => RequestAction::RejectEstimate,
        };
        let after_status = lifecycle::advance(&before, &actor, action)?;

        let attempts =
            self.estimates.list_for_request(request_id).await.map_err(map_store_error)?;
        ledger::ensure_decidable(&attempts, attempt_no)?;

        let reason = match verdict {
            EstimateVerdict::Approve => None,
            EstimateVerdict::Reject => {
                let reason = reason.map(str::trim).filter(|reason| !reason.is_empty());
                Some(
                    reason
                        .ok_or_else(|| {
                            WorkflowError::validation("a rejection reason is required")
                        })?
                        .to_string(),
                )
            }
        };

        let now = Utc::now();
        let mut after = before.clone();
        after.status = after_status;
        after.revision += 1;
        after.updated_at = now;
        let decision = match verdict {
            EstimateVerdict::Approve => {
                after.approver_id = Some(actor.user_id.clone());
                after.approved_at = Some(now);
                after.estimate_reject_reason = None;
                AttemptDecision::Approved
            }
            EstimateVerdict::Reject => {
                after.resubmit_count += 1;
                after.estimate_reject_reason = reason.clone();
                AttemptDecision::Rejected
            }
        };

        let notifications = self.status_fanout(&after, before.status, after_status, now).await?;
        self.commit(TransitionWrite {
            request: after.clone(),
            expected_revision: before.revision,
            new_attempt: None,
            decide_attempt: Some(AttemptDecisionWrite {
                attempt_no,
                decision,
                decided_by: actor.user_id.clone(),
                decided_at: now,
                decision_reason: reason,
            }),
            attachments: Vec::new(),
            notifications,
        })
        .await?;

        tracing::info!(
            event_name = "workflow.decide_estimate",
            request_id = %after.id.0,
            actor = %actor.user_id.0,
            attempt_no,
            decision = decision.as_str(),
            from = before.status.as_str(),
            to = after.status.as_str(),
            "estimate decided"
        );
        Ok(after)
    }

    /// IN_PROGRESS -> COMPLETED with the work report: a closing comment
    /// plus at least one result photo, all in the same commit. The edge is
    /// silent.
    pub async fn complete_work(
        &self,
        request_id: &RequestId,
        actor_id: &UserId,
        result_comment: &str,
        result_photo_keys: &[String],
    ) -> Result<MaintenanceRequest, WorkflowError> {
        let actor = self.principal(actor_id).await?;
        let before = self.fetch_request(request_id).await?;
        let after_status = lifecycle::advance(&before, &actor, RequestAction::Complete)?;

        let result_comment = result_comment.trim();
        if result_comment.is_empty() {
            return Err(WorkflowError::validation("a completion comment is required"));
        }
        if result_photo_keys.is_empty() {
            return Err(WorkflowError::validation(
                "completion requires at least one result photo",
            ));
        }

        let now = Utc::now();
        let mut result_attachments = Vec::with_capacity(result_photo_keys.len());
        for key in result_photo_keys {
            photos::validate_shape(key, AttachmentKind::Result, None)?;
            result_attachments.push(Attachment {
                id: AttachmentId(Uuid::new_v4().to_string()),
                request_id: request_id.clone(),
                kind: AttachmentKind::Result,
                attempt_no: None,
                storage_key: key.trim().to_string(),
                created_at: now,
            });
        }

        let mut after = before.clone();
        after.status = after_status;
        after.result_comment = Some(result_comment.to_string());
        after.completed_at = Some(now);
        after.revision += 1;
        after.updated_at = now;

        let notifications = self.status_fanout(&after, before.status, after_status, now).await?;
        self.commit(TransitionWrite {
            request: after.clone(),
            expected_revision: before.revision,
            new_attempt: None,
            decide_attempt: None,
            attachments: result_attachments,
            notifications,
        })
        .await?;

        self.log_transition("workflow.complete_work", &after, before.status, &actor);
        Ok(after)
    }

    /// Stores one photo reference outside any transition. Shape errors are
    /// validation, ownership mismatches permission, and estimate photos must
    /// name an attempt that is already on record.
    pub async fn attach_photo(
        &self,
        request_id: &RequestId,
        actor_id: &UserId,
        file_key: &str,
        kind: &str,
        attempt_no: Option<u32>,
    ) -> Result<AttachmentId, WorkflowError> {
        let actor = self.principal(actor_id).await?;
        let request = self.fetch_request(request_id).await?;

        let kind = photos::parse_kind(kind)?;
        photos::validate_shape(file_key, kind, attempt_no)?;
        photos::authorize(&request, &actor, kind)?;

        if kind == AttachmentKind::Estimate {
            let attempts =
                self.estimates.list_for_request(request_id).await.map_err(map_store_error)?;
            if let Some(attempt_no) = attempt_no {
                photos::ensure_attempt_exists(&attempts, attempt_no)?;
            }
        }

        let attachment = Attachment {
            id: AttachmentId(Uuid::new_v4().to_string()),
            request_id: request_id.clone(),
            kind,
            attempt_no,
            storage_key: file_key.trim().to_string(),
            created_at: Utc::now(),
        };
        self.attachments.insert(&attachment).await.map_err(map_store_error)?;

        tracing::info!(
            event_name = "workflow.attach_photo",
            request_id = %request_id.0,
            actor = %actor.user_id.0,
            kind = kind.as_str(),
            "photo attached"
        );
        Ok(attachment.id)
    }

    /// Role-scoped detail projection. Branch viewers get the masked
    /// rendition; the worker contact block on the latest attempt survives
    /// the masking.
    pub async fn request_detail(
        &self,
        request_id: &RequestId,
        viewer_id: &UserId,
    ) -> Result<RequestDetailView, WorkflowError> {
        let viewer = self.principal(viewer_id).await?;
        let request = self.fetch_request(request_id).await?;
        views::authorize_view(&request, &viewer)?;

        let attempts =
            self.estimates.list_for_request(request_id).await.map_err(map_store_error)?;
        let attachments =
            self.attachments.list_for_request(request_id).await.map_err(map_store_error)?;

        tracing::debug!(
            event_name = "workflow.request_detail",
            request_id = %request_id.0,
            actor = %viewer.user_id.0,
            "detail view built"
        );
        Ok(views::detail(&request, &attempts, &attachments, viewer.role, self.urls.as_ref()))
    }

    /// Role-scoped listing: Branch sees its branch, a vendor its
    /// assignments, HQ everything. Summaries carry the latest approved
    /// amount, masked for Branch viewers.
    pub async fn list_requests(
        &self,
        viewer_id: &UserId,
    ) -> Result<Vec<RequestSummary>, WorkflowError> {
        let viewer = self.principal(viewer_id).await?;
        let requests = match viewer.role {
            Role::Hq => self.requests.list_all().await.map_err(map_store_error)?,
            Role::Vendor => {
                self.requests.list_for_vendor(&viewer.user_id).await.map_err(map_store_error)?
            }
            Role::Branch => {
                let branch_id = viewer.branch_id.clone().ok_or_else(|| {
                    WorkflowError::Internal(format!(
                        "branch user `{}` has no branch id on record",
                        viewer.user_id.0
                    ))
                })?;
                self.requests.list_for_branch(&branch_id).await.map_err(map_store_error)?
            }
        };

        let ids: Vec<RequestId> = requests.iter().map(|request| request.id.clone()).collect();
        let approved = self.estimates.latest_approved(&ids).await.map_err(map_store_error)?;

        tracing::debug!(
            event_name = "workflow.list_requests",
            actor = %viewer.user_id.0,
            count = requests.len(),
            "request listing built"
        );
        Ok(requests
            .iter()
            .map(|request| views::summary(request, approved.get(&request.id.0), viewer.role))
            .collect())
    }

    /// The recipient's notification feed, newest first.
    pub async fn inbox(
        &self,
        user_id: &UserId,
        unread_only: bool,
    ) -> Result<Vec<NotificationRecord>, WorkflowError> {
        let viewer = self.principal(user_id).await?;
        let records = self
            .notifications
            .list_for_recipient(&viewer.user_id, unread_only)
            .await
            .map_err(map_store_error)?;

        tracing::debug!(
            event_name = "workflow.inbox",
            actor = %viewer.user_id.0,
            count = records.len(),
            "inbox read"
        );
        Ok(records)
    }

    /// Marks one of the caller's own notifications read. A foreign or
    /// unknown id is NotFound; re-marking a read record succeeds.
    pub async fn mark_notification_read(
        &self,
        notification_id: &NotificationId,
        user_id: &UserId,
    ) -> Result<(), WorkflowError> {
        let viewer = self.principal(user_id).await?;
        let marked = self
            .notifications
            .mark_read(notification_id, &viewer.user_id)
            .await
            .map_err(map_store_error)?;
        if !marked {
            return Err(WorkflowError::not_found("notification", notification_id.0.clone()));
        }

        tracing::debug!(
            event_name = "workflow.mark_notification_read",
            actor = %viewer.user_id.0,
            notification_id = %notification_id.0,
            "notification marked read"
        );
        Ok(())
    }

    async fn principal(&self, actor_id: &UserId) -> Result<Principal, WorkflowError> {
        let user = self
            .users
            .find_by_id(actor_id)
            .await
            .map_err(map_store_error)?
            .ok_or_else(|| WorkflowError::not_found("user", actor_id.0.clone()))?;
        Ok(user.principal())
    }

    async fn fetch_request(
        &self,
        request_id: &RequestId,
    ) -> Result<MaintenanceRequest, WorkflowError> {
        self.requests
            .find_by_id(request_id)
            .await
            .map_err(map_store_error)?
            .ok_or_else(|| WorkflowError::not_found("request", request_id.0.clone()))
    }

    async fn status_fanout(
        &self,
        request: &MaintenanceRequest,
        before: RequestStatus,
        after: RequestStatus,
        now: DateTime<Utc>,
    ) -> Result<Vec<NotificationRecord>, WorkflowError> {
        let hq_users = self.users.list_hq_ids().await.map_err(map_store_error)?;
        Ok(fanout::status_change(request, before, after, &hq_users)
            .map(|plan| plan.records(now))
            .unwrap_or_default())
    }

    async fn commit(&self, write: TransitionWrite) -> Result<(), WorkflowError> {
        self.requests.commit_transition(write).await.map_err(map_store_error)
    }

    fn log_transition(
        &self,
        event_name: &'static str,
        after: &MaintenanceRequest,
        from: RequestStatus,
        actor: &Principal,
    ) {
        tracing::info!(
            event_name,
            request_id = %after.id.0,
            actor = %actor.user_id.0,
            from = from.as_str(),
            to = after.status.as_str(),
            "request transitioned"
        );
    }
}

/// Store outcomes become taxonomy errors here and nowhere else. Unexpected
/// store failures keep their detail in the log; callers get the generic
/// internal message through `client_message`.
fn map_store_error(error: RepositoryError) -> WorkflowError {
    match error {
        RepositoryError::StaleRevision { request_id } => WorkflowError::Conflict { request_id },
        RepositoryError::AttemptNotPending { request_id, attempt_no } => {
            WorkflowError::AttemptNotPending { request_id, attempt_no }
        }
        RepositoryError::Database(source) => {
            tracing::error!(
                event_name = "workflow.store_failure",
                error = %source,
                "storage operation failed"
            );
            WorkflowError::Internal(source.to_string())
        }
        RepositoryError::Decode(detail) => {
            tracing::error!(
                event_name = "workflow.store_failure",
                error = %detail,
                "stored row failed to decode"
            );
            WorkflowError::Internal(detail)
        }
    }
}
