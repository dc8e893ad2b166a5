//! Activity repository - append-only log of lifecycle transitions

use chrono::{DateTime, Utc};
use nodedeck_core::{ActivityAction, ActivityRecord, Error, Result};
use sqlx::sqlite::SqlitePool;
use sqlx::Row;

/// Repository for the activity log
pub struct ActivityRepository {
    pool: SqlitePool,
}

impl ActivityRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Append one entry
    pub async fn append(&self, app_id: u32, app_name: &str, action: ActivityAction) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO activity (app_id, app_name, action, created_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(app_id as i64)
        .bind(app_name)
        .bind(action.as_str())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| Error::DbError(e.to_string()))?;

        Ok(())
    }

    /// Most recent entries first
    pub async fn recent(&self, limit: usize) -> Result<Vec<ActivityRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, app_id, app_name, action, created_at
            FROM activity
            ORDER BY id DESC
            LIMIT ?
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::DbError(e.to_string()))?;

        rows.iter()
            .map(|row| {
                let action: String = row.get("action");
                let created_at: String = row.get("created_at");
                let app_id: i64 = row.get("app_id");
                Ok(ActivityRecord {
                    id: row.get("id"),
                    app_id: app_id as u32,
                    app_name: row.get("app_name"),
                    action: action.parse()?,
                    created_at: DateTime::parse_from_rfc3339(&created_at)
                        .map(|dt| dt.with_timezone(&Utc))
                        .map_err(|e| Error::DbError(e.to_string()))?,
                })
            })
            .collect()
    }
}
