//! Error types for NodeDeck

use std::path::PathBuf;

/// NodeDeck error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{field}: {reason}")]
    Validation { field: &'static str, reason: String },

    #[error("App not found: {0}")]
    AppNotFound(u32),

    #[error("App name already in use: {0}")]
    NameTaken(String),

    #[error("Port {0} is already in use by another process")]
    PortInUse(u16),

    #[error("Port {0} is already assigned to another app")]
    PortTaken(u16),

    #[error("No free port left in range {start}-{end}")]
    PortRangeExhausted { start: u16, end: u16 },

    #[error("Another action is already running for app {0}, try again shortly")]
    Busy(u32),

    #[error("{tool} failed: {message}")]
    ToolFailed { tool: String, message: String },

    #[error("Node.js {0} is not installed (install it with nvm first)")]
    NodeVersionMissing(String),

    #[error("nginx reload failed: {0}")]
    ProxyReload(String),

    #[error("Certificate request failed: {0}")]
    Certificate(String),

    #[error("App directory not found: {0}")]
    AppDirMissing(PathBuf),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(PathBuf),

    #[error("Database error: {0}")]
    DbError(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("YAML parse error: {0}")]
    YamlError(#[from] serde_yaml::Error),
}

/// Coarse error classes callers map to user-facing statuses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Conflict,
    NotFound,
    External,
    Internal,
}

/// Result type alias for NodeDeck
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn validation<S: Into<String>>(field: &'static str, reason: S) -> Self {
        Error::Validation {
            field,
            reason: reason.into(),
        }
    }

    pub fn tool<T: Into<String>, S: Into<String>>(tool: T, message: S) -> Self {
        Error::ToolFailed {
            tool: tool.into(),
            message: message.into(),
        }
    }

    pub fn config<S: Into<String>>(msg: S) -> Self {
        Error::ConfigError(msg.into())
    }

    pub fn db<S: Into<String>>(msg: S) -> Self {
        Error::DbError(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation { .. } => ErrorKind::Validation,
            Error::NameTaken(_)
            | Error::PortInUse(_)
            | Error::PortTaken(_)
            | Error::PortRangeExhausted { .. }
            | Error::Busy(_) => ErrorKind::Conflict,
            Error::AppNotFound(_) => ErrorKind::NotFound,
            Error::ToolFailed { .. }
            | Error::NodeVersionMissing(_)
            | Error::ProxyReload(_)
            | Error::Certificate(_)
            | Error::AppDirMissing(_)
            | Error::Timeout(_) => ErrorKind::External,
            _ => ErrorKind::Internal,
        }
    }

    pub fn is_busy(&self) -> bool {
        matches!(self, Error::Busy(_))
    }
}
