//! Core types for NodeDeck

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::constants::*;
use crate::error::{Error, Result};
use crate::validate::is_commit_sha;

/// A git ref requested by the operator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GitRef {
    /// Branch or tag name
    Named(String),
    /// Abbreviated or full commit hash
    Commit(String),
}

impl GitRef {
    /// Classify an already validated ref string
    pub fn parse(value: &str) -> Self {
        if is_commit_sha(value) {
            GitRef::Commit(value.to_string())
        } else {
            GitRef::Named(value.to_string())
        }
    }
}

/// Where an app's source tree comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "lowercase")]
pub enum AppSource {
    Git {
        repo_url: String,
        /// `None` means the repository default branch
        git_ref: Option<String>,
    },
    Upload,
}

impl AppSource {
    /// Rebuild from the persisted `repo_url` column
    pub fn from_stored(repo_url: String, git_ref: Option<String>) -> Self {
        if repo_url == UPLOAD_SENTINEL {
            AppSource::Upload
        } else {
            AppSource::Git { repo_url, git_ref }
        }
    }

    /// Value persisted in the `repo_url` column
    pub fn stored_repo_url(&self) -> &str {
        match self {
            AppSource::Git { repo_url, .. } => repo_url,
            AppSource::Upload => UPLOAD_SENTINEL,
        }
    }

    pub fn git_ref(&self) -> Option<&str> {
        match self {
            AppSource::Git { git_ref, .. } => git_ref.as_deref(),
            AppSource::Upload => None,
        }
    }

    pub fn is_upload(&self) -> bool {
        matches!(self, AppSource::Upload)
    }
}

/// One managed deployment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct App {
    pub id: u32,
    pub name: String,
    #[serde(flatten)]
    pub source: AppSource,
    pub install_cmd: String,
    pub build_cmd: Option<String>,
    pub start_cmd: String,
    pub node_version: String,
    pub port: u16,
    pub domain: Option<String>,
    pub ssl_enabled: bool,
    pub max_restarts: Option<u32>,
    pub restart_delay_ms: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl App {
    /// PM2 process name, derived from the immutable id
    pub fn process_name(&self) -> String {
        process_name(self.id)
    }

    pub fn vhost_file_name(&self) -> String {
        vhost_file_name(self.id)
    }

    pub fn domain(&self) -> Option<&str> {
        self.domain.as_deref().filter(|d| !d.trim().is_empty())
    }
}

/// Fields for a new row. The store assigns id and timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct NewApp {
    pub name: String,
    pub source: AppSource,
    pub install_cmd: String,
    pub build_cmd: Option<String>,
    pub start_cmd: String,
    pub node_version: String,
    pub port: u16,
    pub domain: Option<String>,
    pub ssl_enabled: bool,
    pub max_restarts: Option<u32>,
    pub restart_delay_ms: Option<u64>,
}

/// Partial update of an app row.
///
/// Outer `None` leaves the column untouched; for nullable columns
/// `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppPatch {
    pub name: Option<String>,
    pub git_ref: Option<Option<String>>,
    pub install_cmd: Option<String>,
    pub build_cmd: Option<Option<String>>,
    pub start_cmd: Option<String>,
    pub node_version: Option<String>,
    pub domain: Option<Option<String>>,
    pub ssl_enabled: Option<bool>,
    pub max_restarts: Option<Option<u32>>,
    pub restart_delay_ms: Option<Option<u64>>,
}

impl AppPatch {
    pub fn is_empty(&self) -> bool {
        *self == AppPatch::default()
    }

    /// Patch that only records a resolved ref
    pub fn git_ref(git_ref: Option<String>) -> Self {
        Self {
            git_ref: Some(git_ref),
            ..Default::default()
        }
    }

    /// True when applying this patch to `app` changes its reverse-proxy setup
    pub fn changes_proxy(&self, app: &App) -> bool {
        let domain_changed = self
            .domain
            .as_ref()
            .is_some_and(|d| d.as_deref() != app.domain());
        let ssl_changed = self.ssl_enabled.is_some_and(|s| s != app.ssl_enabled);
        domain_changed || ssl_changed
    }
}

/// Process state as reported by PM2
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessState {
    Running,
    Stopped,
    Unknown,
}

impl ProcessState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessState::Running => "running",
            ProcessState::Stopped => "stopped",
            ProcessState::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ProcessState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Status of one supervisor entry. Never an error: failures become `Unknown`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessStatus {
    pub state: ProcessState,
    pub detail: Option<String>,
}

impl ProcessStatus {
    pub fn running() -> Self {
        Self {
            state: ProcessState::Running,
            detail: None,
        }
    }

    pub fn stopped() -> Self {
        Self {
            state: ProcessState::Stopped,
            detail: None,
        }
    }

    pub fn unknown(detail: impl Into<String>) -> Self {
        Self {
            state: ProcessState::Unknown,
            detail: Some(detail.into()),
        }
    }

    pub fn is_running(&self) -> bool {
        self.state == ProcessState::Running
    }
}

/// App plus live state, as returned to callers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppView {
    #[serde(flatten)]
    pub app: App,
    pub status: ProcessState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_detail: Option<String>,
    /// Certificate files are present for the domain
    pub ssl_active: bool,
}

impl AppView {
    pub fn new(app: App, status: ProcessStatus, ssl_active: bool) -> Self {
        Self {
            app,
            status: status.state,
            status_detail: status.detail,
            ssl_active,
        }
    }
}

/// Lifecycle transitions recorded in the activity log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityAction {
    Created,
    Updated,
    Started,
    Stopped,
    Restarted,
    Reloaded,
    Installed,
    Built,
    Pulled,
    Redeployed,
    Deleted,
}

impl ActivityAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityAction::Created => "created",
            ActivityAction::Updated => "updated",
            ActivityAction::Started => "started",
            ActivityAction::Stopped => "stopped",
            ActivityAction::Restarted => "restarted",
            ActivityAction::Reloaded => "reloaded",
            ActivityAction::Installed => "installed",
            ActivityAction::Built => "built",
            ActivityAction::Pulled => "pulled",
            ActivityAction::Redeployed => "redeployed",
            ActivityAction::Deleted => "deleted",
        }
    }
}

impl FromStr for ActivityAction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "created" => Ok(ActivityAction::Created),
            "updated" => Ok(ActivityAction::Updated),
            "started" => Ok(ActivityAction::Started),
            "stopped" => Ok(ActivityAction::Stopped),
            "restarted" => Ok(ActivityAction::Restarted),
            "reloaded" => Ok(ActivityAction::Reloaded),
            "installed" => Ok(ActivityAction::Installed),
            "built" => Ok(ActivityAction::Built),
            "pulled" => Ok(ActivityAction::Pulled),
            "redeployed" => Ok(ActivityAction::Redeployed),
            "deleted" => Ok(ActivityAction::Deleted),
            _ => Err(Error::db(format!("Unknown activity action: {}", s))),
        }
    }
}

impl std::fmt::Display for ActivityAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Append-only activity log entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub id: i64,
    pub app_id: u32,
    pub app_name: String,
    pub action: ActivityAction,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    Certificate,
    ProxyReload,
    Restart,
    Teardown,
}

/// Non-fatal problem attached to an otherwise successful operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warning {
    pub kind: WarningKind,
    pub message: String,
}

impl Warning {
    pub fn new(kind: WarningKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Result of an operation that may carry warnings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Outcome<T> {
    pub value: T,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<Warning>,
}

impl<T> Outcome<T> {
    pub fn new(value: T, warnings: Vec<Warning>) -> Self {
        Self { value, warnings }
    }

    pub fn clean(value: T) -> Self {
        Self {
            value,
            warnings: Vec::new(),
        }
    }
}

/// Deploy/redeploy phases, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhaseStep {
    Validate,
    Clone,
    Install,
    Build,
    Nginx,
    Ssl,
    Start,
}

impl PhaseStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            PhaseStep::Validate => "validate",
            PhaseStep::Clone => "clone",
            PhaseStep::Install => "install",
            PhaseStep::Build => "build",
            PhaseStep::Nginx => "nginx",
            PhaseStep::Ssl => "ssl",
            PhaseStep::Start => "start",
        }
    }
}

impl std::fmt::Display for PhaseStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Event emitted while a deploy or redeploy runs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PhaseEvent {
    Progress {
        step: PhaseStep,
        message: String,
    },
    Warning {
        step: PhaseStep,
        warning: Warning,
    },
    Done {
        app: Box<AppView>,
        warnings: Vec<Warning>,
    },
    Failed {
        step: PhaseStep,
        message: String,
    },
}

impl PhaseEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PhaseEvent::Done { .. } | PhaseEvent::Failed { .. })
    }
}
