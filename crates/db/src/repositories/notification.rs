use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use mendflow_core::domain::actor::UserId;
use mendflow_core::domain::notification::{
    NotificationEvent, NotificationId, NotificationRecord,
};
use mendflow_core::domain::request::RequestId;

use super::{NotificationStore, RepositoryError};
use crate::DbPool;

pub struct SqlNotificationStore {
    pool: DbPool,
}

impl SqlNotificationStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl NotificationStore for SqlNotificationStore {
    async fn insert_if_new(&self, record: &NotificationRecord) -> Result<bool, RepositoryError> {
        let inserted =
            insert_if_new_query(record).execute(&self.pool).await?;

        Ok(inserted.rows_affected() == 1)
    }

    async fn list_for_recipient(
        &self,
        recipient_id: &UserId,
        unread_only: bool,
    ) -> Result<Vec<NotificationRecord>, RepositoryError> {
        let rows = if unread_only {
            sqlx::query(&select_notification_sql(
                "WHERE recipient_id = ? AND is_read = 0 ORDER BY created_at DESC, id ASC",
            ))
            .bind(&recipient_id.0)
            .fetch_all(&self.pool)
            .await?
        } else {
            sqlx::query(&select_notification_sql(
                "WHERE recipient_id = ? ORDER BY created_at DESC, id ASC",
            ))
            .bind(&recipient_id.0)
            .fetch_all(&self.pool)
            .await?
        };

        rows.into_iter().map(notification_from_row).collect()
    }

    async fn mark_read(
        &self,
        id: &NotificationId,
        recipient_id: &UserId,
    ) -> Result<bool, RepositoryError> {
        let updated =
            sqlx::query("UPDATE notification SET is_read = 1 WHERE id = ? AND recipient_id = ?")
                .bind(&id.0)
                .bind(&recipient_id.0)
                .execute(&self.pool)
                .await?;

        Ok(updated.rows_affected() == 1)
    }

    async fn list_undelivered(
        &self,
        limit: u32,
    ) -> Result<Vec<NotificationRecord>, RepositoryError> {
        let rows = sqlx::query(&select_notification_sql(
            "WHERE delivered_at IS NULL ORDER BY created_at ASC, id ASC LIMIT ?",
        ))
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(notification_from_row).collect()
    }

    async fn mark_delivered(
        &self,
        ids: &[NotificationId],
        delivered_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        for id in ids {
            sqlx::query(
                "UPDATE notification SET delivered_at = ? WHERE id = ? AND delivered_at IS NULL",
            )
            .bind(delivered_at.to_rfc3339())
            .bind(&id.0)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

/// Idempotent fan-out insert inside the caller's transaction. Status-change
/// records ride request commits; standalone inserts go through the store.
pub(crate) async fn insert_if_new_tx(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    record: &NotificationRecord,
) -> Result<bool, RepositoryError> {
    let inserted = insert_if_new_query(record).execute(&mut **tx).await?;
    Ok(inserted.rows_affected() == 1)
}

fn insert_if_new_query(
    record: &NotificationRecord,
) -> sqlx::query::Query<'_, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'_>> {
    sqlx::query(
        "INSERT INTO notification (
            id,
            recipient_id,
            request_id,
            dedup_key,
            message,
            is_read,
            created_at,
            delivered_at
         ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT (recipient_id, request_id, dedup_key) DO NOTHING",
    )
    .bind(&record.id.0)
    .bind(&record.recipient_id.0)
    .bind(&record.request_id.0)
    .bind(record.dedup_key())
    .bind(&record.message)
    .bind(i64::from(record.is_read))
    .bind(record.created_at.to_rfc3339())
    .bind(record.delivered_at.map(|value| value.to_rfc3339()))
}

fn select_notification_sql(tail: &str) -> String {
    format!(
        "SELECT
            id,
            recipient_id,
            request_id,
            dedup_key,
            message,
            is_read,
            created_at,
            delivered_at
         FROM notification
         {tail}"
    )
}

fn notification_from_row(row: SqliteRow) -> Result<NotificationRecord, RepositoryError> {
    let dedup_key = row.try_get::<String, _>("dedup_key")?;
    let event = NotificationEvent::parse(&dedup_key).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown notification dedup key `{dedup_key}`"))
    })?;

    Ok(NotificationRecord {
        id: NotificationId(row.try_get("id")?),
        recipient_id: UserId(row.try_get("recipient_id")?),
        request_id: RequestId(row.try_get("request_id")?),
        event,
        message: row.try_get("message")?,
        is_read: row.try_get::<i64, _>("is_read")? != 0,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        delivered_at: parse_optional_timestamp("delivered_at", row.try_get("delivered_at")?)?,
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
