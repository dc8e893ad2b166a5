//! Database schema for NodeDeck

/// SQLite schema initialization
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS apps (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    repo_url TEXT NOT NULL,
    git_ref TEXT,
    install_cmd TEXT NOT NULL DEFAULT 'npm install',
    build_cmd TEXT,
    start_cmd TEXT NOT NULL DEFAULT 'npm start',
    node_version TEXT NOT NULL DEFAULT '20',
    port INTEGER NOT NULL UNIQUE,
    domain TEXT,
    ssl_enabled INTEGER NOT NULL DEFAULT 0,
    max_restarts INTEGER,
    restart_delay_ms INTEGER,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS activity (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    app_id INTEGER NOT NULL,
    app_name TEXT NOT NULL,
    action TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_activity_app_id ON activity(app_id);
"#;
