//! End-to-end workflow runs against the real SQLite stores: one request
//! walked through the whole lifecycle including the estimate rejection
//! loop, and a racing-writer run that must end in a conflict, not a
//! double-applied decision.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;

use mendflow_core::domain::actor::{AppUser, BranchId, Role, UserId};
use mendflow_core::domain::attachment::PrefixUrlResolver;
use mendflow_core::domain::estimate::{AttemptDecision, EstimateAttempt, WorkerSnapshot};
use mendflow_core::domain::notification::{NotificationEvent, NotificationRecord};
use mendflow_core::domain::request::{MaintenanceRequest, RequestCategory, RequestId, RequestStatus};
use mendflow_core::errors::ErrorKind;
use mendflow_db::repositories::{
    AttemptContentPatch, EstimateStore, RepositoryError, RequestStore, SqlAttachmentStore,
    SqlEstimateStore, SqlNotificationStore, SqlRequestStore, SqlUserStore, TransitionWrite,
    UserStore,
};
use mendflow_db::{connect_with_settings, migrations, DbPool};
use mendflow_engine::{EstimateSubmission, EstimateVerdict, NewRequest, WorkflowService};

async fn setup_pool() -> DbPool {
    // A private in-memory database; the single pooled connection keeps it
    // alive for the test's lifetime.
    let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect test pool");
    migrations::run_pending(&pool).await.expect("run migrations");
    pool
}

async fn seed_users(pool: &DbPool) {
    let users = SqlUserStore::new(pool.clone());
    for (id, role, branch) in [
        ("usr-branch-north", Role::Branch, Some("br-north")),
        ("usr-hq-mira", Role::Hq, None),
        ("usr-hq-theo", Role::Hq, None),
        ("usr-vendor-rapidfix", Role::Vendor, None),
    ] {
        let user = AppUser {
            id: UserId(id.to_string()),
            display_name: id.to_string(),
            role,
            branch_id: branch.map(|value| BranchId(value.to_string())),
            phone: Some("555-0100".to_string()),
            created_at: chrono::Utc::now(),
        };
        users.save(&user).await.expect("seed user");
    }
}

fn service_over(pool: &DbPool) -> WorkflowService {
    WorkflowService::new(
        Arc::new(SqlRequestStore::new(pool.clone())),
        Arc::new(SqlEstimateStore::new(pool.clone())),
        Arc::new(SqlAttachmentStore::new(pool.clone())),
        Arc::new(SqlNotificationStore::new(pool.clone())),
        Arc::new(SqlUserStore::new(pool.clone())),
        Arc::new(PrefixUrlResolver::new("https://files.mendflow.test")),
    )
}

fn uid(id: &str) -> UserId {
    UserId(id.to_string())
}

fn estimate(amount: &str) -> EstimateSubmission {
    EstimateSubmission {
        amount: amount.to_string(),
        comment: "Replace both hinge assemblies and realign the track.".to_string(),
        work_start: NaiveDate::from_ymd_opt(2026, 4, 10).expect("valid date"),
        work_end: NaiveDate::from_ymd_opt(2026, 4, 12).expect("valid date"),
        worker: Some(WorkerSnapshot {
            team: "Crew A".to_string(),
            name: "Sana Idris".to_string(),
            phone: "555-0321".to_string(),
        }),
    }
}

async fn alert_count(pool: &DbPool, request_id: &RequestId, dedup_key: &str) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM notification WHERE request_id = ? AND dedup_key = ?")
        .bind(&request_id.0)
        .bind(dedup_key)
        .fetch_one(pool)
        .await
        .expect("count alerts")
}

#[tokio::test]
async fn full_journey_walks_every_edge_and_dedups_alerts() {
    let pool = setup_pool().await;
    seed_users(&pool).await;
    let service = service_over(&pool);

    let branch = uid("usr-branch-north");
    let hq = uid("usr-hq-mira");
    let vendor = uid("usr-vendor-rapidfix");

    // Submit on create: the request is born under HQ review and both
    // reviewers are alerted once.
    let request_id = service
        .create_request(NewRequest {
            requester_id: branch.clone(),
            title: "Loading dock door jams halfway".to_string(),
            description: "The east dock door stops at chest height and has to be forced."
                .to_string(),
            category: RequestCategory::Carpentry,
            submit_now: true,
        })
        .await
        .expect("create request");
    assert_eq!(alert_count(&pool, &request_id, "status-changed:requested").await, 2);

    let assigned = service
        .assign_vendor(&request_id, &hq, &vendor)
        .await
        .expect("assign vendor");
    assert_eq!(assigned.status, RequestStatus::Estimating);
    let vendor_inbox = service.inbox(&vendor, true).await.expect("vendor inbox");
    assert!(vendor_inbox.iter().any(|record| {
        record.request_id == request_id
            && record.event
                == NotificationEvent::StatusChanged { status: RequestStatus::Estimating }
    }));

    // First estimate: grouped amount text, attempt 1, HQ plus the
    // requester alerted.
    let first = service
        .submit_estimate(&request_id, &vendor, estimate("12,000.00"))
        .await
        .expect("submit first estimate");
    assert_eq!(first.attempt_no, 1);
    assert_eq!(alert_count(&pool, &request_id, "status-changed:approval_pending").await, 3);

    // Nothing is approved yet, so no official amount anywhere.
    let listing = service.list_requests(&hq).await.expect("hq listing");
    let row = listing.iter().find(|summary| summary.id == request_id).expect("listed");
    assert_eq!(row.official_amount, None);

    // Rejection: silent edge, one counted resubmission, reason on record.
    let rejected = service
        .decide_estimate(
            &request_id,
            1,
            &hq,
            EstimateVerdict::Reject,
            Some("Quoted amount exceeds the category budget."),
        )
        .await
        .expect("reject first estimate");
    assert_eq!(rejected.status, RequestStatus::EstimateRejected);
    assert_eq!(rejected.resubmit_count, 1);
    assert_eq!(
        rejected.estimate_reject_reason.as_deref(),
        Some("Quoted amount exceeds the category budget.")
    );
    assert_eq!(alert_count(&pool, &request_id, "status-changed:estimate_rejected").await, 0);

    // Resubmission walks reopen + submit in one call. Every recipient
    // already holds an approval-pending record, so the second pass adds
    // no rows.
    let second = service
        .submit_estimate(&request_id, &vendor, estimate("9,500.00"))
        .await
        .expect("submit second estimate");
    assert_eq!(second.attempt_no, 2);
    let detail = service.request_detail(&request_id, &hq).await.expect("hq detail");
    assert_eq!(detail.status, RequestStatus::ApprovalPending);
    assert_eq!(detail.resubmit_count, 1);
    assert_eq!(detail.estimate_reject_reason, None);
    assert_eq!(alert_count(&pool, &request_id, "status-changed:approval_pending").await, 3);

    // Approval stamps the request and alerts the vendor and requester.
    let approved = service
        .decide_estimate(&request_id, 2, &hq, EstimateVerdict::Approve, None)
        .await
        .expect("approve second estimate");
    assert_eq!(approved.status, RequestStatus::InProgress);
    assert_eq!(approved.approver_id, Some(hq.clone()));
    assert!(approved.approved_at.is_some());
    assert_eq!(alert_count(&pool, &request_id, "status-changed:in_progress").await, 2);

    let listing = service.list_requests(&vendor).await.expect("vendor listing");
    let row = listing.iter().find(|summary| summary.id == request_id).expect("listed");
    assert_eq!(row.official_amount.as_deref(), Some("9500.00"));
    let branch_listing = service.list_requests(&branch).await.expect("branch listing");
    let masked = branch_listing.iter().find(|summary| summary.id == request_id).expect("listed");
    assert_eq!(masked.official_amount, None);

    // Completion: work report plus result photos in one commit, silent.
    let photos =
        vec!["req-dock/after-door.jpg".to_string(), "req-dock/after-track.jpg".to_string()];
    let completed = service
        .complete_work(
            &request_id,
            &vendor,
            "Hinges replaced and the track realigned; door runs full height.",
            &photos,
        )
        .await
        .expect("complete work");
    assert_eq!(completed.status, RequestStatus::Completed);
    assert!(completed.completed_at.is_some());
    assert_eq!(alert_count(&pool, &request_id, "status-changed:completed").await, 0);

    // The ledger kept the whole history, decisions intact.
    let final_detail = service.request_detail(&request_id, &hq).await.expect("final detail");
    assert_eq!(final_detail.attempts.len(), 2);
    assert_eq!(final_detail.attempts[0].decision, Some(AttemptDecision::Rejected));
    assert_eq!(
        final_detail.attempts[0].decision_reason.as_deref(),
        Some("Quoted amount exceeds the category budget.")
    );
    assert_eq!(final_detail.attempts[1].decision, Some(AttemptDecision::Approved));
    assert_eq!(final_detail.attempts[1].amount.as_deref(), Some("9500.00"));
    assert!(final_detail
        .attachments
        .iter()
        .any(|attachment| attachment.url
            == "https://files.mendflow.test/req-dock/after-door.jpg"));

    let stored_amount: String = sqlx::query_scalar(
        "SELECT amount FROM estimate_attempt WHERE request_id = ? AND decision = 'approved'",
    )
    .bind(&request_id.0)
    .fetch_one(&pool)
    .await
    .expect("query approved amount");
    assert_eq!(stored_amount, "9500.00");

    // Two reviewers on submission, the vendor on assignment, three on the
    // pending estimate, vendor plus requester on approval. Everything else
    // stayed silent.
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM notification WHERE request_id = ?")
        .bind(&request_id.0)
        .fetch_one(&pool)
        .await
        .expect("count all alerts");
    assert_eq!(total, 8);

    pool.close().await;
}

/// Serves the fixed pre-decision view of the request under test, the way a
/// second operator holds a page loaded before the first decision landed:
/// the request row and its attempt ledger are both stale. Writes still go
/// to the real store, so the commit's revision check decides the race.
struct StalePageStore {
    requests: Arc<SqlRequestStore>,
    estimates: Arc<SqlEstimateStore>,
    request_snapshot: MaintenanceRequest,
    attempts_snapshot: Vec<EstimateAttempt>,
}

#[async_trait]
impl RequestStore for StalePageStore {
    async fn insert(
        &self,
        request: &MaintenanceRequest,
        notifications: &[NotificationRecord],
    ) -> Result<(), RepositoryError> {
        self.requests.insert(request, notifications).await
    }

    async fn find_by_id(
        &self,
        id: &RequestId,
    ) -> Result<Option<MaintenanceRequest>, RepositoryError> {
        if *id == self.request_snapshot.id {
            return Ok(Some(self.request_snapshot.clone()));
        }
        self.requests.find_by_id(id).await
    }

    async fn commit_transition(&self, write: TransitionWrite) -> Result<(), RepositoryError> {
        self.requests.commit_transition(write).await
    }

    async fn list_for_branch(
        &self,
        branch_id: &BranchId,
    ) -> Result<Vec<MaintenanceRequest>, RepositoryError> {
        self.requests.list_for_branch(branch_id).await
    }

    async fn list_for_vendor(
        &self,
        vendor_id: &UserId,
    ) -> Result<Vec<MaintenanceRequest>, RepositoryError> {
        self.requests.list_for_vendor(vendor_id).await
    }

    async fn list_all(&self) -> Result<Vec<MaintenanceRequest>, RepositoryError> {
        self.requests.list_all().await
    }
}

#[async_trait]
impl EstimateStore for StalePageStore {
    async fn list_for_request(
        &self,
        request_id: &RequestId,
    ) -> Result<Vec<EstimateAttempt>, RepositoryError> {
        if *request_id == self.request_snapshot.id {
            return Ok(self.attempts_snapshot.clone());
        }
        self.estimates.list_for_request(request_id).await
    }

    async fn find_attempt(
        &self,
        request_id: &RequestId,
        attempt_no: u32,
    ) -> Result<Option<EstimateAttempt>, RepositoryError> {
        self.estimates.find_attempt(request_id, attempt_no).await
    }

    async fn update_pending_content(
        &self,
        request_id: &RequestId,
        attempt_no: u32,
        patch: AttemptContentPatch,
        notifications: &[NotificationRecord],
    ) -> Result<(), RepositoryError> {
        self.estimates.update_pending_content(request_id, attempt_no, patch, notifications).await
    }

    async fn latest_approved(
        &self,
        request_ids: &[RequestId],
    ) -> Result<HashMap<String, EstimateAttempt>, RepositoryError> {
        self.estimates.latest_approved(request_ids).await
    }
}

#[tokio::test]
async fn racing_decisions_conflict_instead_of_double_applying() {
    let pool = setup_pool().await;
    seed_users(&pool).await;
    let service = service_over(&pool);

    let branch = uid("usr-branch-north");
    let hq_first = uid("usr-hq-mira");
    let hq_second = uid("usr-hq-theo");
    let vendor = uid("usr-vendor-rapidfix");

    let request_id = service
        .create_request(NewRequest {
            requester_id: branch.clone(),
            title: "Back office outlet sparks".to_string(),
            description: "The wall outlet behind the printer sparked twice this week."
                .to_string(),
            category: RequestCategory::Electrical,
            submit_now: true,
        })
        .await
        .expect("create request");
    service.assign_vendor(&request_id, &hq_first, &vendor).await.expect("assign vendor");
    service
        .submit_estimate(&request_id, &vendor, estimate("4,400.00"))
        .await
        .expect("submit estimate");

    let requests = SqlRequestStore::new(pool.clone());
    let estimates = SqlEstimateStore::new(pool.clone());
    let request_snapshot = requests
        .find_by_id(&request_id)
        .await
        .expect("read request snapshot")
        .expect("request exists");
    let attempts_snapshot =
        estimates.list_for_request(&request_id).await.expect("read ledger snapshot");

    // The first reviewer decides against the live row and wins.
    let approved = service
        .decide_estimate(&request_id, 1, &hq_first, EstimateVerdict::Approve, None)
        .await
        .expect("first decision applies");
    assert_eq!(approved.revision, request_snapshot.revision + 1);

    // The second reviewer still sees the pre-decision page; their commit
    // must lose on the revision check.
    let stale_page = Arc::new(StalePageStore {
        requests: Arc::new(requests),
        estimates: Arc::new(estimates),
        request_snapshot: request_snapshot.clone(),
        attempts_snapshot,
    });
    let racing = WorkflowService::new(
        stale_page.clone(),
        stale_page,
        Arc::new(SqlAttachmentStore::new(pool.clone())),
        Arc::new(SqlNotificationStore::new(pool.clone())),
        Arc::new(SqlUserStore::new(pool.clone())),
        Arc::new(PrefixUrlResolver::new("https://files.mendflow.test")),
    );
    let error = racing
        .decide_estimate(
            &request_id,
            1,
            &hq_second,
            EstimateVerdict::Reject,
            Some("Hold for the quarterly budget review."),
        )
        .await
        .expect_err("stale decision must not apply");
    assert_eq!(error.kind(), ErrorKind::Conflict);

    // The winning decision is untouched by the losing attempt.
    let detail = service.request_detail(&request_id, &hq_first).await.expect("detail");
    assert_eq!(detail.status, RequestStatus::InProgress);
    assert_eq!(detail.resubmit_count, 0);
    assert_eq!(detail.revision, request_snapshot.revision + 1);
    assert_eq!(detail.attempts[0].decision, Some(AttemptDecision::Approved));
    assert_eq!(detail.attempts[0].decision_reason, None);

    pool.close().await;
}
