//! Apps repository - CRUD operations for deployed applications

use chrono::{DateTime, Utc};
use nodedeck_core::{App, AppPatch, AppSource, Error, NewApp, Result};
use sqlx::sqlite::{Sqlite, SqlitePool};
use sqlx::{QueryBuilder, Row};

const SELECT_APP: &str = r#"
    SELECT id, name, repo_url, git_ref, install_cmd, build_cmd, start_cmd,
           node_version, port, domain, ssl_enabled, max_restarts, restart_delay_ms,
           created_at, updated_at
    FROM apps
"#;

/// Repository for app operations
pub struct AppsRepository {
    pool: SqlitePool,
}

impl AppsRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a new app and return the stored row
    pub async fn insert(&self, new: &NewApp) -> Result<App> {
        let now = Utc::now().to_rfc3339();

        let result = sqlx::query(
            r#"
            INSERT INTO apps (
                name, repo_url, git_ref, install_cmd, build_cmd, start_cmd, node_version,
                port, domain, ssl_enabled, max_restarts, restart_delay_ms, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&new.name)
        .bind(new.source.stored_repo_url())
        .bind(new.source.git_ref())
        .bind(&new.install_cmd)
        .bind(&new.build_cmd)
        .bind(&new.start_cmd)
        .bind(&new.node_version)
        .bind(new.port as i64)
        .bind(&new.domain)
        .bind(new.ssl_enabled)
        .bind(new.max_restarts.map(|n| n as i64))
        .bind(new.restart_delay_ms.map(|n| n as i64))
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(|e| map_write_error(e, &new.name, new.port))?;

        let id = result.last_insert_rowid() as u32;
        self.get_by_id(id).await?.ok_or(Error::AppNotFound(id))
    }

    /// Get app by ID
    pub async fn get_by_id(&self, id: u32) -> Result<Option<App>> {
        let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_APP))
            .bind(id as i64)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Error::DbError(e.to_string()))?;

        row.as_ref().map(row_to_app).transpose()
    }

    /// Get app by name
    pub async fn get_by_name(&self, name: &str) -> Result<Option<App>> {
        let row = sqlx::query(&format!("{} WHERE name = ?", SELECT_APP))
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Error::DbError(e.to_string()))?;

        row.as_ref().map(row_to_app).transpose()
    }

    /// Get all apps, newest first
    pub async fn get_all(&self) -> Result<Vec<App>> {
        let rows = sqlx::query(&format!("{} ORDER BY id DESC", SELECT_APP))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Error::DbError(e.to_string()))?;

        rows.iter().map(row_to_app).collect()
    }

    /// Ports currently assigned to apps
    pub async fn ports(&self) -> Result<Vec<u16>> {
        let rows: Vec<(i64,)> = sqlx::query_as("SELECT port FROM apps")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Error::DbError(e.to_string()))?;

        Ok(rows.into_iter().map(|(p,)| p as u16).collect())
    }

    /// Apply a partial update and return the stored row
    pub async fn update(&self, id: u32, patch: &AppPatch) -> Result<App> {
        let current = self.get_by_id(id).await?.ok_or(Error::AppNotFound(id))?;
        if patch.is_empty() {
            return Ok(current);
        }

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE apps SET ");
        {
            let mut set = qb.separated(", ");
            if let Some(name) = &patch.name {
                set.push("name = ").push_bind_unseparated(name.clone());
            }
            if let Some(git_ref) = &patch.git_ref {
                set.push("git_ref = ").push_bind_unseparated(git_ref.clone());
            }
            if let Some(cmd) = &patch.install_cmd {
                set.push("install_cmd = ").push_bind_unseparated(cmd.clone());
            }
            if let Some(cmd) = &patch.build_cmd {
                set.push("build_cmd = ").push_bind_unseparated(cmd.clone());
            }
            if let Some(cmd) = &patch.start_cmd {
                set.push("start_cmd = ").push_bind_unseparated(cmd.clone());
            }
            if let Some(v) = &patch.node_version {
                set.push("node_version = ").push_bind_unseparated(v.clone());
            }
            if let Some(domain) = &patch.domain {
                set.push("domain = ").push_bind_unseparated(domain.clone());
            }
            if let Some(ssl) = patch.ssl_enabled {
                set.push("ssl_enabled = ").push_bind_unseparated(ssl);
            }
            if let Some(n) = patch.max_restarts {
                set.push("max_restarts = ")
                    .push_bind_unseparated(n.map(|n| n as i64));
            }
            if let Some(ms) = patch.restart_delay_ms {
                set.push("restart_delay_ms = ")
                    .push_bind_unseparated(ms.map(|n| n as i64));
            }
            set.push("updated_at = ")
                .push_bind_unseparated(Utc::now().to_rfc3339());
        }
        qb.push(" WHERE id = ").push_bind(id as i64);

        let name = patch.name.as_deref().unwrap_or(&current.name);
        qb.build()
            .execute(&self.pool)
            .await
            .map_err(|e| map_write_error(e, name, current.port))?;

        self.get_by_id(id).await?.ok_or(Error::AppNotFound(id))
    }

    /// Delete app by ID
    pub async fn delete(&self, id: u32) -> Result<bool> {
        let result = sqlx::query("DELETE FROM apps WHERE id = ?")
            .bind(id as i64)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::DbError(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }
}

/// Translate UNIQUE violations into conflicts
fn map_write_error(err: sqlx::Error, name: &str, port: u16) -> Error {
    if let Some(db_err) = err.as_database_error() {
        if db_err.is_unique_violation() {
            let message = db_err.message();
            if message.contains("apps.port") {
                return Error::PortTaken(port);
            }
            if message.contains("apps.name") {
                return Error::NameTaken(name.to_string());
            }
        }
    }
    Error::DbError(err.to_string())
}

fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn row_to_app(row: &sqlx::sqlite::SqliteRow) -> Result<App> {
    let id: i64 = row.get("id");
    let repo_url: String = row.get("repo_url");
    let git_ref: Option<String> = row.get("git_ref");
    let port: i64 = row.get("port");
    let max_restarts: Option<i64> = row.get("max_restarts");
    let restart_delay_ms: Option<i64> = row.get("restart_delay_ms");
    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");

    let port = u16::try_from(port).map_err(|_| Error::db(format!("Invalid port in row {}", id)))?;

    Ok(App {
        id: id as u32,
        name: row.get("name"),
        source: AppSource::from_stored(repo_url, git_ref),
        install_cmd: row.get("install_cmd"),
        build_cmd: row.get("build_cmd"),
        start_cmd: row.get("start_cmd"),
        node_version: row.get("node_version"),
        port,
        domain: row.get("domain"),
        ssl_enabled: row.get("ssl_enabled"),
        max_restarts: max_restarts.map(|n| n as u32),
        restart_delay_ms: restart_delay_ms.map(|n| n as u64),
        created_at: parse_timestamp(&created_at),
        updated_at: parse_timestamp(&updated_at),
    })
}
