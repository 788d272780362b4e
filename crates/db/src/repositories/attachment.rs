use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use mendflow_core::domain::attachment::{Attachment, AttachmentId, AttachmentKind};
use mendflow_core::domain::request::RequestId;

use super::{AttachmentStore, RepositoryError};
use crate::DbPool;

pub struct SqlAttachmentStore {
    pool: DbPool,
}

impl SqlAttachmentStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl AttachmentStore for SqlAttachmentStore {
    async fn insert(&self, attachment: &Attachment) -> Result<(), RepositoryError> {
        insert_query(attachment).execute(&self.pool).await?;
        Ok(())
    }

    async fn list_for_request(
        &self,
        request_id: &RequestId,
    ) -> Result<Vec<Attachment>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT
                id,
                request_id,
                kind,
                attempt_no,
                storage_key,
                created_at
             FROM attachment
             WHERE request_id = ?
             ORDER BY created_at ASC, id ASC",
        )
        .bind(&request_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(attachment_from_row).collect()
    }
}

/// Writes a photo row inside the caller's transaction. Completion results
/// land together with the status move that carries them.
pub(crate) async fn insert_tx(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    attachment: &Attachment,
) -> Result<(), RepositoryError> {
    insert_query(attachment).execute(&mut **tx).await?;
    Ok(())
}

fn insert_query(
    attachment: &Attachment,
) -> sqlx::query::Query<'_, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'_>> {
    sqlx::query(
        "INSERT INTO attachment (
            id,
            request_id,
            kind,
            attempt_no,
            storage_key,
            created_at
         ) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&attachment.id.0)
    .bind(&attachment.request_id.0)
    .bind(attachment.kind.as_str())
    .bind(attachment.attempt_no.map(i64::from))
    .bind(&attachment.storage_key)
    .bind(attachment.created_at.to_rfc3339())
}

fn attachment_from_row(row: SqliteRow) -> Result<Attachment, RepositoryError> {
    let kind_raw = row.try_get::<String, _>("kind")?;
    let kind = AttachmentKind::parse(&kind_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown attachment kind `{kind_raw}`")))?;

    let attempt_no = row
        .try_get::<Option<i64>, _>("attempt_no")?
        .map(|value| {
            u32::try_from(value).map_err(|_| {
                RepositoryError::Decode(format!(
                    "invalid value for `attempt_no` (expected non-negative u32): {value}"
                ))
            })
        })
        .transpose()?;

    Ok(Attachment {
        id: AttachmentId(row.try_get("id")?),
        request_id: RequestId(row.try_get("request_id")?),
        kind,
        attempt_no,
        storage_key: row.try_get("storage_key")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}

fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}
