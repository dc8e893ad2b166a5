//! NodeDeck Database - record store trait and SQLite persistence

pub mod activity;
pub mod apps;
pub mod schema;
pub mod store;

use nodedeck_core::{Error, Result};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use std::path::Path;
use tracing::info;

pub use activity::ActivityRepository;
pub use apps::AppsRepository;
pub use store::RecordStore;

/// Database connection and operations
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (or create) the database file and bootstrap the schema
    pub async fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::DbError(e.to_string()))?;
        }

        let url = format!("sqlite:{}?mode=rwc", path.display());
        info!("Connecting to database: {}", url);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await
            .map_err(|e| Error::DbError(e.to_string()))?;

        // Owner-only (0600)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Err(e) = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)) {
                tracing::warn!("Failed to set database file permissions: {}", e);
            }
        }

        sqlx::query(schema::SCHEMA)
            .execute(&pool)
            .await
            .map_err(|e| Error::DbError(e.to_string()))?;

        info!("Database initialized");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn apps(&self) -> AppsRepository {
        AppsRepository::new(self.pool.clone())
    }

    pub fn activity(&self) -> ActivityRepository {
        ActivityRepository::new(self.pool.clone())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_database_creation() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("nested").join("nodedeck.db");

        let db = Database::new(&db_path).await.unwrap();
        assert!(db_path.exists());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&db_path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
        db.close().await;
    }

    #[tokio::test]
    async fn test_reopen_keeps_rows() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("nodedeck.db");

        let db = Database::new(&db_path).await.unwrap();
        db.activity()
            .append(1, "web", nodedeck_core::ActivityAction::Created)
            .await
            .unwrap();
        db.close().await;

        let db = Database::new(&db_path).await.unwrap();
        assert_eq!(db.activity().recent(10).await.unwrap().len(), 1);
    }
}
