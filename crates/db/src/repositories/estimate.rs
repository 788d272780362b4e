use std::collections::{HashMap, HashSet};

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{sqlite::SqliteRow, Row};

use mendflow_core::domain::actor::UserId;
use mendflow_core::domain::estimate::{AttemptDecision, EstimateAttempt, WorkerSnapshot};
use mendflow_core::domain::notification::NotificationRecord;
use mendflow_core::domain::request::RequestId;
use mendflow_core::money::format_amount;

use super::{
    notification, AttemptContentPatch, AttemptDecisionWrite, EstimateStore, RepositoryError,
};
use crate::DbPool;

pub struct SqlEstimateStore {
    pool: DbPool,
}

impl SqlEstimateStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl EstimateStore for SqlEstimateStore {
    async fn list_for_request(
        &self,
        request_id: &RequestId,
    ) -> Result<Vec<EstimateAttempt>, RepositoryError> {
        let rows = sqlx::query(&select_attempt_sql("WHERE request_id = ? ORDER BY attempt_no ASC"))
            .bind(&request_id.0)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(attempt_from_row).collect()
    }

    async fn find_attempt(
        &self,
        request_id: &RequestId,
        attempt_no: u32,
    ) -> Result<Option<EstimateAttempt>, RepositoryError> {
        let row = sqlx::query(&select_attempt_sql("WHERE request_id = ? AND attempt_no = ?"))
            .bind(&request_id.0)
            .bind(i64::from(attempt_no))
            .fetch_optional(&self.pool)
            .await?;

        row.map(attempt_from_row).transpose()
    }

    async fn update_pending_content(
        &self,
        request_id: &RequestId,
        attempt_no: u32,
        patch: AttemptContentPatch,
        notifications: &[NotificationRecord],
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE estimate_attempt SET
                amount = ?,
                comment = ?,
                work_start = ?,
                work_end = ?,
                worker_team = ?,
                worker_name = ?,
                worker_phone = ?,
                updated_at = ?
             WHERE request_id = ? AND attempt_no = ? AND decision = 'pending'",
        )
        .bind(format_amount(&patch.amount))
        .bind(&patch.comment)
        .bind(patch.work_start.to_string())
        .bind(patch.work_end.to_string())
        .bind(patch.worker.as_ref().map(|worker| worker.team.as_str()))
        .bind(patch.worker.as_ref().map(|worker| worker.name.as_str()))
        .bind(patch.worker.as_ref().map(|worker| worker.phone.as_str()))
        .bind(patch.updated_at.to_rfc3339())
        .bind(&request_id.0)
        .bind(i64::from(attempt_no))
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(RepositoryError::AttemptNotPending {
                request_id: request_id.0.clone(),
                attempt_no,
            });
        }

        for record in notifications {
            notification::insert_if_new_tx(&mut tx, record).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn latest_approved(
        &self,
        request_ids: &[RequestId],
    ) -> Result<HashMap<String, EstimateAttempt>, RepositoryError> {
        let wanted: HashSet<&str> = request_ids.iter().map(|id| id.0.as_str()).collect();
        if wanted.is_empty() {
            return Ok(HashMap::new());
        }

        let rows = sqlx::query(
            "SELECT
                ea.request_id,
                ea.attempt_no,
                ea.amount,
                ea.comment,
                ea.work_start,
                ea.work_end,
                ea.worker_team,
                ea.worker_name,
                ea.worker_phone,
                ea.decision,
                ea.decided_by,
                ea.decided_at,
                ea.decision_reason,
                ea.submitted_at,
                ea.updated_at
             FROM estimate_attempt ea
             JOIN (
                SELECT request_id, MAX(attempt_no) AS attempt_no
                FROM estimate_attempt
                WHERE decision = 'approved'
                GROUP BY request_id
             ) latest
               ON latest.request_id = ea.request_id AND latest.attempt_no = ea.attempt_no",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut approved = HashMap::new();
        for row in rows {
            let attempt = attempt_from_row(row)?;
            if wanted.contains(attempt.request_id.0.as_str()) {
                approved.insert(attempt.request_id.0.clone(), attempt);
            }
        }

        Ok(approved)
    }
}

/// Appends one attempt row inside the caller's transaction. Submissions only
/// ever land together with the request-status move that carries them.
pub(crate) async fn insert_attempt_tx(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    attempt: &EstimateAttempt,
) -> Result<(), RepositoryError> {
    sqlx::query(
        "INSERT INTO estimate_attempt (
            request_id,
            attempt_no,
            amount,
            comment,
            work_start,
            work_end,
            worker_team,
            worker_name,
            worker_phone,
            decision,
            decided_by,
            decided_at,
            decision_reason,
            submitted_at,
            updated_at
         ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&attempt.request_id.0)
    .bind(i64::from(attempt.attempt_no))
    .bind(format_amount(&attempt.amount))
    .bind(&attempt.comment)
    .bind(attempt.work_start.to_string())
    .bind(attempt.work_end.to_string())
    .bind(attempt.worker.as_ref().map(|worker| worker.team.as_str()))
    .bind(attempt.worker.as_ref().map(|worker| worker.name.as_str()))
    .bind(attempt.worker.as_ref().map(|worker| worker.phone.as_str()))
    .bind(attempt.decision.as_str())
    .bind(attempt.decided_by.as_ref().map(|id| id.0.as_str()))
    .bind(attempt.decided_at.map(|value| value.to_rfc3339()))
    .bind(attempt.decision_reason.as_deref())
    .bind(attempt.submitted_at.to_rfc3339())
    .bind(attempt.updated_at.to_rfc3339())
    .execute(&mut **tx)
    .await?;

    Ok(())
}

/// Writes a decision onto a still-pending attempt inside the caller's
/// transaction. Returns the number of rows hit: zero means the attempt is
/// missing or already decided, and the caller must roll back.
pub(crate) async fn apply_decision_tx(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    request_id: &RequestId,
    write: &AttemptDecisionWrite,
) -> Result<u64, RepositoryError> {
    let updated = sqlx::query(
        "UPDATE estimate_attempt SET
            decision = ?,
            decided_by = ?,
            decided_at = ?,
            decision_reason = ?,
            updated_at = ?
         WHERE request_id = ? AND attempt_no = ? AND decision = 'pending'",
    )
    .bind(write.decision.as_str())
    .bind(&write.decided_by.0)
    .bind(write.decided_at.to_rfc3339())
    .bind(write.decision_reason.as_deref())
    .bind(write.decided_at.to_rfc3339())
    .bind(&request_id.0)
    .bind(i64::from(write.attempt_no))
    .execute(&mut **tx)
    .await?;

    Ok(updated.rows_affected())
}

fn select_attempt_sql(tail: &str) -> String {
    format!(
        "SELECT
            request_id,
            attempt_no,
            amount,
            comment,
            work_start,
            work_end,
            worker_team,
            worker_name,
            worker_phone,
            decision,
            decided_by,
            decided_at,
            decision_reason,
            submitted_at,
            updated_at
         FROM estimate_attempt
         {tail}"
    )
}

fn attempt_from_row(row: SqliteRow) -> Result<EstimateAttempt, RepositoryError> {
    let request_id = RequestId(row.try_get("request_id")?);
    let attempt_no = parse_u32("attempt_no", row.try_get("attempt_no")?)?;

    let decision_raw = row.try_get::<String, _>("decision")?;
    let decision = AttemptDecision::parse(&decision_raw).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown attempt decision `{decision_raw}`"))
    })?;

    let amount_raw = row.try_get::<String, _>("amount")?;
    let amount = amount_raw.parse::<Decimal>().map_err(|error| {
        RepositoryError::Decode(format!("invalid amount `{amount_raw}`: {error}"))
    })?;

    let worker = match (
        row.try_get::<Option<String>, _>("worker_team")?,
        row.try_get::<Option<String>, _>("worker_name")?,
        row.try_get::<Option<String>, _>("worker_phone")?,
    ) {
        (Some(team), Some(name), Some(phone)) => Some(WorkerSnapshot { team, name, phone }),
        (None, None, None) => None,
        _ => {
            return Err(RepositoryError::Decode(format!(
                "partial worker snapshot on attempt {attempt_no} of `{}`",
                request_id.0
            )))
        }
    };

    Ok(EstimateAttempt {
        request_id,
        attempt_no,
        amount,
        comment: row.try_get("comment")?,
        work_start: parse_date("work_start", row.try_get("work_start")?)?,
        work_end: parse_date("work_end", row.try_get("work_end")?)?,
        worker,
        decision,
        decided_by: row.try_get::<Option<String>, _>("decided_by")?.map(UserId),
        decided_at: parse_optional_timestamp("decided_at", row.try_get("decided_at")?)?,
        decision_reason: row.try_get("decision_reason")?,
        submitted_at: parse_timestamp("submitted_at", row.try_get("submitted_at")?)?,
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

fn parse_date(column: &str, value: String) -> Result<NaiveDate, RepositoryError> {
    NaiveDate::parse_from_str(&value, "%Y-%m-%d").map_err(|error| {
        RepositoryError::Decode(format!("invalid date in `{column}`: `{value}` ({error})"))
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
