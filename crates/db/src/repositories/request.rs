use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use mendflow_core::domain::actor::{BranchId, UserId};
use mendflow_core::domain::notification::NotificationRecord;
use mendflow_core::domain::request::{
    MaintenanceRequest, RequestCategory, RequestId, RequestStatus,
};

use super::{attachment, estimate, notification, RepositoryError, RequestStore, TransitionWrite};
use crate::DbPool;

pub struct SqlRequestStore {
    pool: DbPool,
}

impl SqlRequestStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl RequestStore for SqlRequestStore {
    async fn insert(
        &self,
        request: &MaintenanceRequest,
        notifications: &[NotificationRecord],
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO maintenance_request (
                id,
                branch_id,
                requester_id,
                vendor_id,
                approver_id,
                title,
                description,
                category,
                status,
                resubmit_count,
                request_reject_reason,
                estimate_reject_reason,
                approved_at,
                result_comment,
                completed_at,
                revision,
                created_at,
                updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&request.id.0)
        .bind(&request.branch_id.0)
        .bind(&request.requester_id.0)
        .bind(request.vendor_id.as_ref().map(|id| id.0.as_str()))
        .bind(request.approver_id.as_ref().map(|id| id.0.as_str()))
        .bind(&request.title)
        .bind(&request.description)
        .bind(request.category.as_str())
        .bind(request.status.as_str())
        .bind(i64::from(request.resubmit_count))
        .bind(request.request_reject_reason.as_deref())
        .bind(request.estimate_reject_reason.as_deref())
        .bind(request.approved_at.map(|value| value.to_rfc3339()))
        .bind(request.result_comment.as_deref())
        .bind(request.completed_at.map(|value| value.to_rfc3339()))
        .bind(i64::from(request.revision))
        .bind(request.created_at.to_rfc3339())
        .bind(request.updated_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        for record in notifications {
            notification::insert_if_new_tx(&mut tx, record).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn find_by_id(
        &self,
        id: &RequestId,
    ) -> Result<Option<MaintenanceRequest>, RepositoryError> {
        let row = sqlx::query(&select_request_sql("WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.map(request_from_row).transpose()
    }

    /// Identity and authorship columns are insert-only; only the
    /// transition-mutable columns are written here.
    async fn commit_transition(&self, write: TransitionWrite) -> Result<(), RepositoryError> {
        let request = &write.request;
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE maintenance_request SET
                vendor_id = ?,
                approver_id = ?,
                status = ?,
                resubmit_count = ?,
                request_reject_reason = ?,
                estimate_reject_reason = ?,
                approved_at = ?,
                result_comment = ?,
                completed_at = ?,
                revision = ?,
                updated_at = ?
             WHERE id = ? AND revision = ?",
        )
        .bind(request.vendor_id.as_ref().map(|id| id.0.as_str()))
        .bind(request.approver_id.as_ref().map(|id| id.0.as_str()))
        .bind(request.status.as_str())
        .bind(i64::from(request.resubmit_count))
        .bind(request.request_reject_reason.as_deref())
        .bind(request.estimate_reject_reason.as_deref())
        .bind(request.approved_at.map(|value| value.to_rfc3339()))
        .bind(request.result_comment.as_deref())
        .bind(request.completed_at.map(|value| value.to_rfc3339()))
        .bind(i64::from(request.revision))
        .bind(request.updated_at.to_rfc3339())
        .bind(&request.id.0)
        .bind(i64::from(write.expected_revision))
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(RepositoryError::StaleRevision { request_id: request.id.0.clone() });
        }

        if let Some(attempt) = &write.new_attempt {
            estimate::insert_attempt_tx(&mut tx, attempt).await?;
        }

        if let Some(decision) = &write.decide_attempt {
            let decided = estimate::apply_decision_tx(&mut tx, &request.id, decision).await?;
            if decided == 0 {
                return Err(RepositoryError::AttemptNotPending {
                    request_id: request.id.0.clone(),
                    attempt_no: decision.attempt_no,
                });
            }
        }

        for photo in &write.attachments {
            attachment::insert_tx(&mut tx, photo).await?;
        }

        for record in &write.notifications {
            notification::insert_if_new_tx(&mut tx, record).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn list_for_branch(
        &self,
        branch_id: &BranchId,
    ) -> Result<Vec<MaintenanceRequest>, RepositoryError> {
        let rows =
            sqlx::query(&select_request_sql("WHERE branch_id = ? ORDER BY updated_at DESC, id ASC"))
                .bind(&branch_id.0)
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter().map(request_from_row).collect()
    }

    async fn list_for_vendor(
        &self,
        vendor_id: &UserId,
    ) -> Result<Vec<MaintenanceRequest>, RepositoryError> {
        let rows =
            sqlx::query(&select_request_sql("WHERE vendor_id = ? ORDER BY updated_at DESC, id ASC"))
                .bind(&vendor_id.0)
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter().map(request_from_row).collect()
    }

    async fn list_all(&self) -> Result<Vec<MaintenanceRequest>, RepositoryError> {
        let rows = sqlx::query(&select_request_sql("ORDER BY updated_at DESC, id ASC"))
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(request_from_row).collect()
    }
}

fn select_request_sql(tail: &str) -> String {
    format!(
        "SELECT
            id,
            branch_id,
            requester_id,
            vendor_id,
            approver_id,
            title,
            description,
            category,
            status,
            resubmit_count,
            request_reject_reason,
            estimate_reject_reason,
            approved_at,
            result_comment,
            completed_at,
            revision,
            created_at,
            updated_at
         FROM maintenance_request
         {tail}"
    )
}

fn request_from_row(row: SqliteRow) -> Result<MaintenanceRequest, RepositoryError> {
    let status_raw = row.try_get::<String, _>("status")?;
    let status = RequestStatus::parse(&status_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown request status `{status_raw}`")))?;

    let category_raw = row.try_get::<String, _>("category")?;
    let category = RequestCategory::parse(&category_raw).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown request category `{category_raw}`"))
    })?;

    Ok(MaintenanceRequest {
        id: RequestId(row.try_get("id")?),
        branch_id: BranchId(row.try_get("branch_id")?),
        requester_id: UserId(row.try_get("requester_id")?),
        vendor_id: row.try_get::<Option<String>, _>("vendor_id")?.map(UserId),
        approver_id: row.try_get::<Option<String>, _>("approver_id")?.map(UserId),
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        category,
        status,
        resubmit_count: parse_u32("resubmit_count", row.try_get("resubmit_count")?)?,
        request_reject_reason: row.try_get("request_reject_reason")?,
        estimate_reject_reason: row.try_get("estimate_reject_reason")?,
        approved_at: parse_optional_timestamp("approved_at", row.try_get("approved_at")?)?,
        result_comment: row.try_get("result_comment")?,
        completed_at: parse_optional_timestamp("completed_at", row.try_get("completed_at")?)?,
        revision: parse_u32("revision", row.try_get("revision")?)?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}

fn parse_u32(column: &str, value: i64) -> Result<u32, RepositoryError> {
    u32::try_from(value).map_err(|_| {
        RepositoryError::Decode(format!(
            "invalid value for `{column}` (expected non-negative u32): {value}"
        ))
    })
}

fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}

fn parse_optional_timestamp(
    column: &str,
    value: Option<String>,
) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    value.map(|timestamp| parse_timestamp(column, timestamp)).transpose()
}
