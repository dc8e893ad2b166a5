//! Typed commands accepted by the orchestrator
//!
//! Raw request bodies deserialize into the `*Request` structs; each has a
//! `validate` that produces the typed command or an `Error::Validation`.

use serde::{Deserialize, Deserializer, Serialize};

use crate::constants::*;
use crate::error::{Error, Result};
use crate::types::{AppPatch, AppSource};
use crate::validate::*;

/// Distinguishes an absent field (`None`) from an explicit `null` (`Some(None)`)
fn double_option<'de, T, D>(deserializer: D) -> std::result::Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Body of a create request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CreateAppRequest {
    pub name: String,
    pub repo_url: Option<String>,
    #[serde(alias = "branch")]
    pub git_ref: Option<String>,
    pub install_cmd: Option<String>,
    pub build_cmd: Option<String>,
    pub start_cmd: Option<String>,
    pub node_version: Option<String>,
    pub domain: Option<String>,
    pub ssl_enabled: bool,
    pub max_restarts: Option<u32>,
    pub restart_delay_ms: Option<u64>,
    /// Defaults to true
    pub auto_start: Option<bool>,
}

/// Validated create command
#[derive(Debug, Clone, PartialEq)]
pub struct CreateApp {
    pub name: String,
    pub source: AppSource,
    pub install_cmd: String,
    pub build_cmd: Option<String>,
    pub start_cmd: String,
    /// `None` means the configured default version
    pub node_version: Option<String>,
    pub domain: Option<String>,
    pub ssl_enabled: bool,
    pub max_restarts: Option<u32>,
    pub restart_delay_ms: Option<u64>,
    pub auto_start: bool,
}

impl CreateAppRequest {
    /// Validate a git-backed create
    pub fn validate(self) -> Result<CreateApp> {
        let repo_url = validate_repo_url(self.repo_url.as_deref().unwrap_or_default())?;
        let git_ref = validate_ref(self.git_ref.as_deref())?;
        self.validate_with_source(AppSource::Git { repo_url, git_ref })
    }

    /// Validate a create whose tree comes from an uploaded archive
    pub fn validate_upload(self) -> Result<CreateApp> {
        self.validate_with_source(AppSource::Upload)
    }

    fn validate_with_source(self, source: AppSource) -> Result<CreateApp> {
        let name = validate_name(&self.name)?;
        let install_cmd = validate_command("install_cmd", self.install_cmd.as_deref())?
            .unwrap_or_else(|| DEFAULT_INSTALL_CMD.to_string());
        let build_cmd = validate_command("build_cmd", self.build_cmd.as_deref())?;
        let start_cmd = validate_command("start_cmd", self.start_cmd.as_deref())?
            .unwrap_or_else(|| DEFAULT_START_CMD.to_string());
        let node_version = validate_node_version(self.node_version.as_deref())?;
        let domain = validate_domain(self.domain.as_deref())?;
        let max_restarts = validate_max_restarts(self.max_restarts)?;
        let restart_delay_ms = validate_restart_delay(self.restart_delay_ms)?;

        Ok(CreateApp {
            name,
            source,
            install_cmd,
            build_cmd,
            start_cmd,
            node_version,
            domain,
            ssl_enabled: self.ssl_enabled,
            max_restarts,
            restart_delay_ms,
            auto_start: self.auto_start.unwrap_or(true),
        })
    }
}

/// Body of a settings update. Absent fields are left alone; `null` or an
/// empty string resets a field to its default (or clears it when nullable).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateAppRequest {
    pub name: Option<String>,
    #[serde(alias = "branch", deserialize_with = "double_option")]
    pub git_ref: Option<Option<String>>,
    #[serde(deserialize_with = "double_option")]
    pub install_cmd: Option<Option<String>>,
    #[serde(deserialize_with = "double_option")]
    pub build_cmd: Option<Option<String>>,
    #[serde(deserialize_with = "double_option")]
    pub start_cmd: Option<Option<String>>,
    #[serde(deserialize_with = "double_option")]
    pub node_version: Option<Option<String>>,
    #[serde(deserialize_with = "double_option")]
    pub domain: Option<Option<String>>,
    pub ssl_enabled: Option<bool>,
    #[serde(deserialize_with = "double_option")]
    pub max_restarts: Option<Option<u32>>,
    #[serde(deserialize_with = "double_option")]
    pub restart_delay_ms: Option<Option<u64>>,
}

/// Validated settings update
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UpdateApp {
    pub patch: AppPatch,
}

impl UpdateAppRequest {
    pub fn validate(self) -> Result<UpdateApp> {
        let mut patch = AppPatch::default();

        if let Some(name) = self.name {
            patch.name = Some(validate_name(&name)?);
        }
        if let Some(git_ref) = self.git_ref {
            patch.git_ref = Some(validate_ref(git_ref.as_deref())?);
        }
        if let Some(cmd) = self.install_cmd {
            patch.install_cmd = Some(
                validate_command("install_cmd", cmd.as_deref())?
                    .unwrap_or_else(|| DEFAULT_INSTALL_CMD.to_string()),
            );
        }
        if let Some(cmd) = self.build_cmd {
            patch.build_cmd = Some(validate_command("build_cmd", cmd.as_deref())?);
        }
        if let Some(cmd) = self.start_cmd {
            patch.start_cmd = Some(
                validate_command("start_cmd", cmd.as_deref())?
                    .unwrap_or_else(|| DEFAULT_START_CMD.to_string()),
            );
        }
        if let Some(v) = self.node_version {
            patch.node_version = Some(
                validate_node_version(v.as_deref())?
                    .unwrap_or_else(|| DEFAULT_NODE_VERSION.to_string()),
            );
        }
        if let Some(domain) = self.domain {
            patch.domain = Some(validate_domain(domain.as_deref())?);
        }
        patch.ssl_enabled = self.ssl_enabled;
        if let Some(n) = self.max_restarts {
            patch.max_restarts = Some(validate_max_restarts(n)?);
        }
        if let Some(ms) = self.restart_delay_ms {
            patch.restart_delay_ms = Some(validate_restart_delay(ms)?);
        }

        Ok(UpdateApp { patch })
    }
}

/// Body of a redeploy or pull request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RedeployRequest {
    /// New ref to persist before fetching; absent keeps the stored one
    #[serde(alias = "branch")]
    pub git_ref: Option<String>,
    pub no_start: bool,
}

/// Validated redeploy command
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RedeployApp {
    pub git_ref: Option<String>,
    pub no_start: bool,
}

impl RedeployRequest {
    pub fn validate(self) -> Result<RedeployApp> {
        Ok(RedeployApp {
            git_ref: validate_ref(self.git_ref.as_deref())?,
            no_start: self.no_start,
        })
    }
}

/// Body of an env file write
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnvFileRequest {
    #[serde(default)]
    pub content: String,
}

impl EnvFileRequest {
    pub fn validate(self) -> Result<String> {
        validate_env_content(&self.content)?;
        Ok(self.content)
    }
}

/// Body of a package.json suggestion request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SuggestRequest {
    pub repo_url: String,
    #[serde(alias = "branch")]
    pub git_ref: Option<String>,
}

/// Validated suggestion request
#[derive(Debug, Clone, PartialEq)]
pub struct SuggestCommands {
    pub repo_url: String,
    pub git_ref: Option<String>,
}

impl SuggestRequest {
    pub fn validate(self) -> Result<SuggestCommands> {
        let repo_url = validate_repo_url(&self.repo_url)?;
        if !(repo_url.starts_with("http://") || repo_url.starts_with("https://")) {
            return Err(Error::validation(
                "repo_url",
                "suggestions need an http or https URL",
            ));
        }
        Ok(SuggestCommands {
            repo_url,
            git_ref: validate_ref(self.git_ref.as_deref())?,
        })
    }
}

/// Clamp a requested log line count
pub fn clamp_log_lines(lines: Option<usize>) -> usize {
    match lines {
        Some(0) | None => DEFAULT_LOG_LINES,
        Some(n) => n.min(MAX_LOG_LINES),
    }
}
