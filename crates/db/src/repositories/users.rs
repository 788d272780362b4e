use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use mendflow_core::domain::actor::{AppUser, BranchId, Role, UserId};

use super::{RepositoryError, UserStore};
use crate::DbPool;

pub struct SqlUserStore {
    pool: DbPool,
}

impl SqlUserStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl UserStore for SqlUserStore {
    async fn find_by_id(&self, id: &UserId) -> Result<Option<AppUser>, RepositoryError> {
        let row = sqlx::query(
            "SELECT
                id,
                display_name,
                role,
                branch_id,
                phone,
                created_at
             FROM app_user
             WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(user_from_row).transpose()
    }

    async fn save(&self, user: &AppUser) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO app_user (
                id,
                display_name,
                role,
                branch_id,
                phone,
                created_at
             ) VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                display_name = excluded.display_name,
                role = excluded.role,
                branch_id = excluded.branch_id,
                phone = excluded.phone",
        )
        .bind(&user.id.0)
        .bind(&user.display_name)
        .bind(user.role.as_str())
        .bind(user.branch_id.as_ref().map(|id| id.0.as_str()))
        .bind(user.phone.as_deref())
        .bind(user.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_hq_ids(&self) -> Result<Vec<UserId>, RepositoryError> {
        let rows = sqlx::query("SELECT id FROM app_user WHERE role = 'hq' ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(|row| Ok(UserId(row.try_get("id")?)))
            .collect()
    }
}

fn user_from_row(row: SqliteRow) -> Result<AppUser, RepositoryError> {
    let role_raw = row.try_get::<String, _>("role")?;
    let role = Role::parse(&role_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown role `{role_raw}`")))?;

    Ok(AppUser {
        id: UserId(row.try_get("id")?),
        display_name: row.try_get("display_name")?,
        role,
        branch_id: row.try_get::<Option<String>, _>("branch_id")?.map(BranchId),
        phone: row.try_get("phone")?,
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
