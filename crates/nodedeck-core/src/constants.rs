//! Constants and default values for NodeDeck

use std::path::PathBuf;

/// Default NodeDeck home directory name
pub const NODEDECK_DIR: &str = ".nodedeck";

/// Default database file name
pub const DB_FILE: &str = "nodedeck.db";

/// Default config file names to search for (in priority order)
pub const CONFIG_FILES: &[&str] = &[
    "nodedeck.toml",
    "nodedeck.yaml",
    "nodedeck.yml",
    "nodedeck.json",
];

/// Prefix shared by PM2 process names and nginx config files
pub const RESOURCE_PREFIX: &str = "nodedeck-app-";

/// Sentinel stored in place of a repository URL for uploaded apps
pub const UPLOAD_SENTINEL: &str = "upload://";

/// Launcher script written into each app directory
pub const START_SCRIPT_NAME: &str = ".nodedeck-start.sh";

/// Environment file read by apps at startup
pub const ENV_FILE_NAME: &str = ".env";

/// Default panel listen port
pub const DEFAULT_PANEL_PORT: u16 = 3000;

/// Default port range for app allocation (inclusive)
pub const DEFAULT_PORT_RANGE_START: u16 = 4000;
pub const DEFAULT_PORT_RANGE_END: u16 = 4999;

/// Random draws before port allocation gives up
pub const DEFAULT_PORT_DRAW_ATTEMPTS: u32 = 50;

pub const DEFAULT_INSTALL_CMD: &str = "npm install";
pub const DEFAULT_START_CMD: &str = "npm start";
pub const DEFAULT_NODE_VERSION: &str = "20";

pub const DEFAULT_APPS_DIR: &str = "/var/www/nodedeck-apps";
pub const DEFAULT_NGINX_CONF_DIR: &str = "/etc/nginx/conf.d";
pub const DEFAULT_NGINX_BIN: &str = "/usr/sbin/nginx";
pub const DEFAULT_LETSENCRYPT_DIR: &str = "/etc/letsencrypt/live";
pub const DEFAULT_CERTBOT_LOG: &str = "/var/log/letsencrypt/letsencrypt.log";
pub const DEFAULT_DAEMON_HOME: &str = "/root";

/// Default log lines returned by a tail request
pub const DEFAULT_LOG_LINES: usize = 100;

/// Upper bound on log lines per tail request
pub const MAX_LOG_LINES: usize = 500;

/// Default timeout for install/build/clone commands in seconds
pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 1800;

/// Default timeout for short control commands (pm2, nginx) in seconds
pub const DEFAULT_CONTROL_TIMEOUT_SECS: u64 = 60;

/// Get the NodeDeck home directory
pub fn nodedeck_home() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(NODEDECK_DIR))
        .unwrap_or_else(|| PathBuf::from(NODEDECK_DIR))
}

/// Get the default database path
pub fn db_path() -> PathBuf {
    nodedeck_home().join(DB_FILE)
}

/// PM2 process name for an app id
pub fn process_name(app_id: u32) -> String {
    format!("{}{}", RESOURCE_PREFIX, app_id)
}

/// nginx config file name for an app id
pub fn vhost_file_name(app_id: u32) -> String {
    format!("{}{}.conf", RESOURCE_PREFIX, app_id)
}

/// On-disk directory name for an app id
pub fn app_dir_name(app_id: u32) -> String {
    format!("app-{}", app_id)
}
