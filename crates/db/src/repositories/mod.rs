use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

use mendflow_core::domain::actor::{AppUser, BranchId, UserId};
use mendflow_core::domain::attachment::Attachment;
use mendflow_core::domain::estimate::{AttemptDecision, EstimateAttempt, WorkerSnapshot};
use mendflow_core::domain::notification::{NotificationId, NotificationRecord};
use mendflow_core::domain::request::{MaintenanceRequest, RequestId};

pub mod attachment;
pub mod estimate;
pub mod memory;
pub mod notification;
pub mod request;
pub mod users;

pub use attachment::SqlAttachmentStore;
pub use estimate::SqlEstimateStore;
pub use memory::InMemoryWorkflowStore;
pub use notification::SqlNotificationStore;
pub use request::SqlRequestStore;
pub use users::SqlUserStore;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("request `{request_id}` was modified by a concurrent writer")]
    StaleRevision { request_id: String },
    #[error("attempt {attempt_no} of request `{request_id}` is no longer pending")]
    AttemptNotPending { request_id: String, attempt_no: u32 },
}

/// Everything one committed transition writes. The request row update is
/// guarded by `expected_revision`; attempt, attachment, and notification
/// writes ride in the same transaction so a request can never land in a
/// status whose bookkeeping is missing.
#[derive(Clone, Debug)]
pub struct TransitionWrite {
    /// The post-transition row, revision already bumped by the caller.
    pub request: MaintenanceRequest,
    /// The revision the caller read before deciding the transition.
    pub expected_revision: u32,
    /// A fresh estimate submission, when the transition carries one.
    pub new_attempt: Option<EstimateAttempt>,
    /// A decision on a still-pending attempt, when the transition is one.
    pub decide_attempt: Option<AttemptDecisionWrite>,
    /// Photos uploaded as part of the transition (completion results).
    pub attachments: Vec<Attachment>,
    /// Fan-out records for the status change. Inserted idempotently; a
    /// record whose dedup key already exists is skipped, never an error.
    pub notifications: Vec<NotificationRecord>,
}

#[derive(Clone, Debug)]
pub struct AttemptDecisionWrite {
    pub attempt_no: u32,
    pub decision: AttemptDecision,
    pub decided_by: UserId,
    pub decided_at: DateTime<Utc>,
    pub decision_reason: Option<String>,
}

/// Replacement content for a still-pending attempt. Decision columns and the
/// attempt identity are untouchable through this path.
#[derive(Clone, Debug)]
pub struct AttemptContentPatch {
    pub amount: Decimal,
    pub comment: String,
    pub work_start: NaiveDate,
    pub work_end: NaiveDate,
    pub worker: Option<WorkerSnapshot>,
    pub updated_at: DateTime<Utc>,
}

#[async_trait]
pub trait RequestStore: Send + Sync {
    /// Persists a brand-new request together with its initial fan-out
    /// records (submit-on-create notifies HQ in the same transaction).
    async fn insert(
        &self,
        request: &MaintenanceRequest,
        notifications: &[NotificationRecord],
    ) -> Result<(), RepositoryError>;

    async fn find_by_id(
        &self,
        id: &RequestId,
    ) -> Result<Option<MaintenanceRequest>, RepositoryError>;

    /// Applies one transition atomically. Fails with `StaleRevision` when the
    /// stored revision no longer matches `expected_revision` and with
    /// `AttemptNotPending` when a decision write finds the attempt already
    /// decided. Nothing is persisted on failure.
    async fn commit_transition(&self, write: TransitionWrite) -> Result<(), RepositoryError>;

    async fn list_for_branch(
        &self,
        branch_id: &BranchId,
    ) -> Result<Vec<MaintenanceRequest>, RepositoryError>;

    async fn list_for_vendor(
        &self,
        vendor_id: &UserId,
    ) -> Result<Vec<MaintenanceRequest>, RepositoryError>;

    async fn list_all(&self) -> Result<Vec<MaintenanceRequest>, RepositoryError>;
}

#[async_trait]
pub trait EstimateStore: Send + Sync {
    /// All attempts for a request, oldest first.
    async fn list_for_request(
        &self,
        request_id: &RequestId,
    ) -> Result<Vec<EstimateAttempt>, RepositoryError>;

    async fn find_attempt(
        &self,
        request_id: &RequestId,
        attempt_no: u32,
    ) -> Result<Option<EstimateAttempt>, RepositoryError>;

    /// Replaces the content of a still-pending attempt. The revised-estimate
    /// fan-out records land in the same transaction as the content write.
    async fn update_pending_content(
        &self,
        request_id: &RequestId,
        attempt_no: u32,
        patch: AttemptContentPatch,
        notifications: &[NotificationRecord],
    ) -> Result<(), RepositoryError>;

    /// Latest approved attempt per request, keyed by request id. Used by
    /// list projections to surface the official amount.
    async fn latest_approved(
        &self,
        request_ids: &[RequestId],
    ) -> Result<HashMap<String, EstimateAttempt>, RepositoryError>;
}

#[async_trait]
pub trait AttachmentStore: Send + Sync {
    async fn insert(&self, attachment: &Attachment) -> Result<(), RepositoryError>;

    async fn list_for_request(
        &self,
        request_id: &RequestId,
    ) -> Result<Vec<Attachment>, RepositoryError>;
}

#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Inserts one fan-out record. Returns `false` when a record for the same
    /// (recipient, request, dedup key) already exists; that is success, not
    /// an error.
    async fn insert_if_new(&self, record: &NotificationRecord) -> Result<bool, RepositoryError>;

    async fn list_for_recipient(
        &self,
        recipient_id: &UserId,
        unread_only: bool,
    ) -> Result<Vec<NotificationRecord>, RepositoryError>;

    /// Marks one record read iff it belongs to `recipient_id`. Returns
    /// whether a matching record exists; re-marking a read record succeeds.
    async fn mark_read(
        &self,
        id: &NotificationId,
        recipient_id: &UserId,
    ) -> Result<bool, RepositoryError>;

    /// Records the push relay has not handed to a transport yet, oldest
    /// first.
    async fn list_undelivered(
        &self,
        limit: u32,
    ) -> Result<Vec<NotificationRecord>, RepositoryError>;

    async fn mark_delivered(
        &self,
        ids: &[NotificationId],
        delivered_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_id(&self, id: &UserId) -> Result<Option<AppUser>, RepositoryError>;

    async fn save(&self, user: &AppUser) -> Result<(), RepositoryError>;

    /// Ids of every headquarters reviewer, the audience for review fan-out.
    async fn list_hq_ids(&self) -> Result<Vec<UserId>, RepositoryError>;
}
