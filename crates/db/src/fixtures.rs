use crate::connection::DbPool;
use crate::repositories::RepositoryError;
use sqlx::Executor;

/// Canonical demo seeds and verification contract for the four workflow journeys.
const SEED_REQUESTS: &[RequestSeedContract] = &[
    RequestSeedContract {
        tag: "fresh",
        request_id: "req-demo-001",
        branch_id: "br-north",
        requester_id: "usr-branch-north",
        vendor_id: None,
        status: "requested",
        resubmit_count: 0,
        revision: 1,
        expected_attempt_count: 0,
        approved_attempt_no: None,
        rejected_attempt_no: None,
        completed: false,
        description: "Fresh submission awaiting HQ review",
    },
    RequestSeedContract {
        tag: "pending_decision",
        request_id: "req-demo-002",
        branch_id: "br-north",
        requester_id: "usr-branch-north",
        vendor_id: Some("usr-vendor-rapidfix"),
        status: "approval_pending",
        resubmit_count: 0,
        revision: 3,
        expected_attempt_count: 1,
        approved_attempt_no: None,
        rejected_attempt_no: None,
        completed: false,
        description: "First estimate submitted, pending the HQ decision",
    },
    RequestSeedContract {
        tag: "resubmitted",
        request_id: "req-demo-003",
        branch_id: "br-harbor",
        requester_id: "usr-branch-harbor",
        vendor_id: Some("usr-vendor-coolflow"),
        status: "in_progress",
        resubmit_count: 1,
        revision: 6,
        expected_attempt_count: 2,
        approved_attempt_no: Some(2),
        rejected_attempt_no: Some(1),
        completed: false,
        description: "First estimate rejected, second approved, work under way",
    },
    RequestSeedContract {
        tag: "closed",
        request_id: "req-demo-004",
        branch_id: "br-harbor",
        requester_id: "usr-branch-harbor",
        vendor_id: Some("usr-vendor-rapidfix"),
        status: "completed",
        resubmit_count: 0,
        revision: 5,
        expected_attempt_count: 1,
        approved_attempt_no: Some(1),
        rejected_attempt_no: None,
        completed: true,
        description: "Full journey closed out with a result comment",
    },
];

const SEED_USER_IDS: &[&str] = &[
    "usr-branch-north",
    "usr-branch-harbor",
    "usr-hq-mira",
    "usr-hq-theo",
    "usr-vendor-rapidfix",
    "usr-vendor-coolflow",
];

const SEED_REQUEST_IDS: &[&str] =
    &["req-demo-001", "req-demo-002", "req-demo-003", "req-demo-004"];

const SEED_ATTACHMENT_IDS: &[&str] = &["att-demo-001", "att-demo-002", "att-demo-003"];

const SEED_NOTIFICATION_IDS: &[&str] = &[
    "ntf-demo-001",
    "ntf-demo-002",
    "ntf-demo-003",
    "ntf-demo-004",
    "ntf-demo-005",
    "ntf-demo-006",
    "ntf-demo-007",
    "ntf-demo-008",
    "ntf-demo-009",
    "ntf-demo-010",
    "ntf-demo-011",
    "ntf-demo-012",
];

/// Demo seed dataset covering the four canonical request journeys.
///
/// Provides deterministic fixtures for:
/// 1. A fresh submission waiting on HQ
/// 2. An estimate pending the HQ decision
/// 3. A reject-and-resubmit journey now in progress
/// 4. A fully completed request
pub struct DemoSeedDataset;

impl DemoSeedDataset {
    /// SQL fixture content for the demo dataset.
    pub const SQL: &str = include_str!("../../../config/fixtures/demo_seed_data.sql");

    /// Load the demo dataset into the database.
    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let mut tx = pool.begin().await?;

        tx.execute(sqlx::query(Self::SQL)).await?;
        tx.commit().await?;

        let requests_seeded = SEED_REQUESTS
            .iter()
            .map(|request| RequestSeedInfo {
                tag: request.tag,
                request_id: request.request_id,
                description: request.description,
            })
            .collect::<Vec<_>>();

        Ok(SeedResult { requests_seeded })
    }

    /// Verify that seed data exists and matches the contract.
    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        let quoted_users = sql_array_from_ids(SEED_USER_IDS);
        let existing_user_count: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(1) FROM app_user WHERE id IN {quoted_users}"
        ))
        .fetch_one(pool)
        .await?;
        checks.push(("seed-users", existing_user_count == SEED_USER_IDS.len() as i64));

        for request in SEED_REQUESTS {
            let request_ok: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM maintenance_request \
                 WHERE id = ?1 AND branch_id = ?2 AND requester_id = ?3 \
                   AND status = ?4 AND resubmit_count = ?5 AND revision = ?6)",
            )
            .bind(request.request_id)
            .bind(request.branch_id)
            .bind(request.requester_id)
            .bind(request.status)
            .bind(request.resubmit_count)
            .bind(request.revision)
            .fetch_one(pool)
            .await?;
            checks.push((request.request_id, request_ok == 1));

            checks.push((request.vendor_label(), Self::verify_vendor(pool, request).await?));

            let attempt_count: i64 = sqlx::query_scalar(
                "SELECT COUNT(1) FROM estimate_attempt WHERE request_id = ?1",
            )
            .bind(request.request_id)
            .fetch_one(pool)
            .await?;
            checks.push((request.ledger_label(), attempt_count == request.expected_attempt_count));

            checks.push((request.decision_label(), Self::verify_decisions(pool, request).await?));
            checks
                .push((request.completion_label(), Self::verify_completion(pool, request).await?));
        }

        let quoted_attachments = sql_array_from_ids(SEED_ATTACHMENT_IDS);
        let attachment_count: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(1) FROM attachment WHERE id IN {quoted_attachments}"
        ))
        .fetch_one(pool)
        .await?;
        checks.push(("seed-attachments", attachment_count == SEED_ATTACHMENT_IDS.len() as i64));

        let quoted_notifications = sql_array_from_ids(SEED_NOTIFICATION_IDS);
        let notification_count: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(1) FROM notification WHERE id IN {quoted_notifications}"
        ))
        .fetch_one(pool)
        .await?;
        checks.push((
            "seed-notifications",
            notification_count == SEED_NOTIFICATION_IDS.len() as i64,
        ));

        // The fresh request must have fanned out to every HQ reviewer.
        let hq_fanout: i64 = sqlx::query_scalar(
            "SELECT COUNT(DISTINCT recipient_id) FROM notification \
             WHERE request_id = 'req-demo-001' AND dedup_key = 'status-changed:requested'",
        )
        .fetch_one(pool)
        .await?;
        checks.push(("hq-fanout-complete", hq_fanout == 2));

        let all_present = checks.iter().all(|(_, exists)| *exists);
        Ok(VerificationResult { all_present, checks })
    }

    async fn verify_vendor(
        pool: &DbPool,
        request: &RequestSeedContract,
    ) -> Result<bool, RepositoryError> {
        let vendor_id: Option<String> =
            sqlx::query_scalar("SELECT vendor_id FROM maintenance_request WHERE id = ?1")
                .bind(request.request_id)
                .fetch_one(pool)
                .await?;
        Ok(vendor_id.as_deref() == request.vendor_id)
    }

    async fn verify_decisions(
        pool: &DbPool,
        request: &RequestSeedContract,
    ) -> Result<bool, RepositoryError> {
        if let Some(attempt_no) = request.approved_attempt_no {
            let approved: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM estimate_attempt \
                 WHERE request_id = ?1 AND attempt_no = ?2 AND decision = 'approved' \
                   AND decided_by IS NOT NULL AND decided_at IS NOT NULL)",
            )
            .bind(request.request_id)
            .bind(attempt_no)
            .fetch_one(pool)
            .await?;
            if approved != 1 {
                return Ok(false);
            }
        }

        if let Some(attempt_no) = request.rejected_attempt_no {
            // A rejected attempt always records the reviewer's reason.
            let rejected: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM estimate_attempt \
                 WHERE request_id = ?1 AND attempt_no = ?2 AND decision = 'rejected' \
                   AND decision_reason IS NOT NULL)",
            )
            .bind(request.request_id)
            .bind(attempt_no)
            .fetch_one(pool)
            .await?;
            if rejected != 1 {
                return Ok(false);
            }
        }

        Ok(true)
    }

    async fn verify_completion(
        pool: &DbPool,
        request: &RequestSeedContract,
    ) -> Result<bool, RepositoryError> {
        let row = sqlx::query_as::<_, (Option<String>, Option<String>)>(
            "SELECT result_comment, completed_at FROM maintenance_request WHERE id = ?1",
        )
        .bind(request.request_id)
        .fetch_one(pool)
        .await?;
        let (result_comment, completed_at) = row;

        if request.completed {
            Ok(result_comment.is_some() && completed_at.is_some())
        } else {
            Ok(result_comment.is_none() && completed_at.is_none())
        }
    }

    /// Clean up seeded fixtures from a test database.
    pub async fn clean(pool: &DbPool) -> Result<(), RepositoryError> {
        let mut tx = pool.begin().await?;

        let quoted_notifications = sql_array_from_ids(SEED_NOTIFICATION_IDS);
        let quoted_attachments = sql_array_from_ids(SEED_ATTACHMENT_IDS);
        let quoted_requests = sql_array_from_ids(SEED_REQUEST_IDS);
        let quoted_users = sql_array_from_ids(SEED_USER_IDS);

        sqlx::query(&format!("DELETE FROM notification WHERE id IN {quoted_notifications}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("DELETE FROM attachment WHERE id IN {quoted_attachments}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!(
            "DELETE FROM estimate_attempt WHERE request_id IN {quoted_requests}"
        ))
        .execute(&mut *tx)
        .await?;
        sqlx::query(&format!("DELETE FROM maintenance_request WHERE id IN {quoted_requests}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("DELETE FROM app_user WHERE id IN {quoted_users}"))
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct RequestSeedContract {
    tag: &'static str,
    request_id: &'static str,
    branch_id: &'static str,
    requester_id: &'static str,
    vendor_id: Option<&'static str>,
    status: &'static str,
    resubmit_count: i64,
    revision: i64,
    expected_attempt_count: i64,
    approved_attempt_no: Option<i64>,
    rejected_attempt_no: Option<i64>,
    completed: bool,
    description: &'static str,
}

impl RequestSeedContract {
    fn vendor_label(&self) -> &'static str {
        match self.tag {
            "fresh" => "request-fresh-vendor",
            "pending_decision" => "request-pending-vendor",
            "resubmitted" => "request-resubmitted-vendor",
            _ => "request-closed-vendor",
        }
    }

    fn ledger_label(&self) -> &'static str {
        match self.tag {
            "fresh" => "request-fresh-ledger",
            "pending_decision" => "request-pending-ledger",
            "resubmitted" => "request-resubmitted-ledger",
            _ => "request-closed-ledger",
        }
    }

    fn decision_label(&self) -> &'static str {
        match self.tag {
            "fresh" => "request-fresh-decisions",
            "pending_decision" => "request-pending-decisions",
            "resubmitted" => "request-resubmitted-decisions",
            _ => "request-closed-decisions",
        }
    }

    fn completion_label(&self) -> &'static str {
        match self.tag {
            "fresh" => "request-fresh-completion",
            "pending_decision" => "request-pending-completion",
            "resubmitted" => "request-resubmitted-completion",
            _ => "request-closed-completion",
        }
    }
}

fn sql_array_from_ids(ids: &[&str]) -> String {
    let quoted = ids.iter().map(|id| format!("'{}'", id)).collect::<Vec<_>>().join(",");
    format!("({quoted})")
}

#[derive(Debug)]
pub struct SeedResult {
    pub requests_seeded: Vec<RequestSeedInfo>,
}

#[derive(Debug)]
pub struct RequestSeedInfo {
    pub tag: &'static str,
    pub request_id: &'static str,
    pub description: &'static str,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{connect_with_settings, migrations};

    #[test]
    fn sql_fixture_is_valid() {
        assert!(!DemoSeedDataset::SQL.is_empty());
    }

    #[tokio::test]
    async fn verify_seed_contract_and_idempotency() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30)
            .await
            .expect("connect to test database");

        migrations::run_pending(&pool).await.expect("run migrations");

        let first = DemoSeedDataset::load(&pool).await.expect("load seed fixtures");
        let first_verification =
            DemoSeedDataset::verify(&pool).await.expect("verify seed fixtures");
        assert!(first_verification.all_present);
        assert_eq!(first.requests_seeded.len(), 4);

        let second = DemoSeedDataset::load(&pool).await.expect("reload seed fixtures");
        let second_verification =
            DemoSeedDataset::verify(&pool).await.expect("re-verify seed fixtures");
        assert!(second_verification.all_present);
        assert_eq!(second.requests_seeded.len(), 4);
        assert_eq!(first_verification.checks, second_verification.checks);

        pool.close().await;
    }

    #[tokio::test]
    async fn clean_removes_every_seeded_row() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30)
            .await
            .expect("connect to test database");

        migrations::run_pending(&pool).await.expect("run migrations");

        DemoSeedDataset::load(&pool).await.expect("load seed fixtures");
        DemoSeedDataset::clean(&pool).await.expect("clean seed fixtures");

        for table in
            ["maintenance_request", "estimate_attempt", "attachment", "notification", "app_user"]
        {
            let remaining: i64 = sqlx::query_scalar(&format!("SELECT COUNT(1) FROM {table}"))
                .fetch_one(&pool)
                .await
                .expect("count rows after clean");
            assert_eq!(remaining, 0, "{table} still holds seed rows after clean");
        }

        let reloaded = DemoSeedDataset::load(&pool).await.expect("reload after clean");
        let verification = DemoSeedDataset::verify(&pool).await.expect("verify after reload");
        assert_eq!(reloaded.requests_seeded.len(), 4);
        assert!(verification.all_present);

        pool.close().await;
    }

    #[tokio::test]
    async fn verify_seed_request_specific_properties() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30)
            .await
            .expect("connect to test database");

        migrations::run_pending(&pool).await.expect("run migrations");

        DemoSeedDataset::load(&pool).await.expect("load seed fixtures");

        let fresh_status: String =
            sqlx::query_scalar("SELECT status FROM maintenance_request WHERE id = ?1")
                .bind("req-demo-001")
                .fetch_one(&pool)
                .await
                .expect("query fresh request status");
        assert_eq!(fresh_status, "requested");

        let resubmit_count: i64 =
            sqlx::query_scalar("SELECT resubmit_count FROM maintenance_request WHERE id = ?1")
                .bind("req-demo-003")
                .fetch_one(&pool)
                .await
                .expect("query resubmit count");
        assert_eq!(resubmit_count, 1);

        let rejection_reason: String = sqlx::query_scalar(
            "SELECT decision_reason FROM estimate_attempt \
             WHERE request_id = ?1 AND attempt_no = 1",
        )
        .bind("req-demo-003")
        .fetch_one(&pool)
        .await
        .expect("query first attempt rejection reason");
        assert_eq!(rejection_reason, "Quoted amount exceeds the category budget.");

        let approved_amount: String = sqlx::query_scalar(
            "SELECT amount FROM estimate_attempt \
             WHERE request_id = ?1 AND decision = 'approved'",
        )
        .bind("req-demo-003")
        .fetch_one(&pool)
        .await
        .expect("query approved attempt amount");
        assert_eq!(approved_amount, "9500.00");

        let result_comment: String =
            sqlx::query_scalar("SELECT result_comment FROM maintenance_request WHERE id = ?1")
                .bind("req-demo-004")
                .fetch_one(&pool)
                .await
                .expect("query completion comment");
        assert_eq!(result_comment, "Door re-hung and frame replaced; closes flush now.");

        pool.close().await;
    }
}
