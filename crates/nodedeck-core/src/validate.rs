//! Input validation
//!
//! Every externally supplied string passes through one of these functions before
//! it can reach a command line or a file path. Each returns the trimmed value,
//! `None` for empty input where the field is optional, or `Error::Validation`
//! naming the field and the constraint.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{Error, Result};

pub const MAX_NAME_LEN: usize = 100;
pub const MAX_REF_LEN: usize = 200;
pub const MAX_REPO_URL_LEN: usize = 2048;
pub const MAX_DOMAIN_LEN: usize = 253;
pub const MAX_COMMAND_LEN: usize = 500;
pub const MAX_NODE_VERSION_LEN: usize = 20;
pub const MAX_RESTARTS: u32 = 1000;
pub const MAX_RESTART_DELAY_MS: u64 = 600_000;
pub const MAX_ENV_FILE_BYTES: usize = 64 * 1024;

static NAME_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9_.-]+$").expect("Invalid name regex"));

static REF_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9/_.-]+$").expect("Invalid ref regex"));

static SHA_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9a-fA-F]{7,40}$").expect("Invalid sha regex"));

static DOMAIN_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9]([a-zA-Z0-9.-]*[a-zA-Z0-9])?$").expect("Invalid domain regex")
});

static COMMAND_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9\s\-_./:]+$").expect("Invalid command regex"));

static NODE_VERSION_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d+(\.\d+){0,2}|lts|node)$").expect("Invalid node version regex")
});

/// scp-like git address: `user@host:path`
static SCP_URL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9_.-]+@[a-zA-Z0-9.-]+:[a-zA-Z0-9_./~-]+$").expect("Invalid scp url regex")
});

const URL_FORBIDDEN: &[char] = &[
    ';', '|', '&', '$', '`', '\'', '"', '<', '>', '(', ')', '\\',
];

fn trimmed(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

fn check_len(field: &'static str, value: &str, max: usize) -> Result<()> {
    if value.chars().count() > max {
        return Err(Error::validation(
            field,
            format!("must be at most {} characters", max),
        ));
    }
    Ok(())
}

/// True when `value` looks like an abbreviated or full commit hash
pub fn is_commit_sha(value: &str) -> bool {
    SHA_REGEX.is_match(value)
}

/// App display name. Required wherever it appears.
pub fn validate_name(value: &str) -> Result<String> {
    let s = value.trim();
    if s.is_empty() {
        return Err(Error::validation("name", "is required"));
    }
    check_len("name", s, MAX_NAME_LEN)?;
    if !NAME_REGEX.is_match(s) {
        return Err(Error::validation(
            "name",
            "may only contain letters, numbers, _, ., -",
        ));
    }
    Ok(s.to_string())
}

/// Repository URL: http(s)/ssh URL or scp-like `user@host:path`
pub fn validate_repo_url(value: &str) -> Result<String> {
    let s = value.trim();
    if s.is_empty() {
        return Err(Error::validation("repo_url", "is required"));
    }
    check_len("repo_url", s, MAX_REPO_URL_LEN)?;

    if s.chars().any(|c| c.is_whitespace() || URL_FORBIDDEN.contains(&c)) {
        return Err(Error::validation("repo_url", "contains invalid characters"));
    }

    if let Some((scheme, rest)) = s.split_once("://") {
        let scheme = scheme.to_ascii_lowercase();
        if scheme != "http" && scheme != "https" && scheme != "ssh" {
            return Err(Error::validation("repo_url", "must be http, https or ssh"));
        }
        let host = rest.split(['/', '?', '#']).next().unwrap_or_default();
        let host = host.rsplit('@').next().unwrap_or_default();
        if host.is_empty() || rest.starts_with('-') {
            return Err(Error::validation("repo_url", "must be a valid URL"));
        }
        return Ok(s.to_string());
    }

    if SCP_URL_REGEX.is_match(s) && !s.starts_with('-') {
        return Ok(s.to_string());
    }

    Err(Error::validation(
        "repo_url",
        "must be a valid http, https or ssh URL",
    ))
}

/// Branch, tag or commit SHA. Empty means "repository default".
pub fn validate_ref(value: Option<&str>) -> Result<Option<String>> {
    let Some(s) = trimmed(value) else {
        return Ok(None);
    };
    check_len("ref", s, MAX_REF_LEN)?;
    if is_commit_sha(s) {
        return Ok(Some(s.to_string()));
    }
    if !REF_REGEX.is_match(s) {
        return Err(Error::validation(
            "ref",
            "may only contain letters, numbers, /, ., _, -",
        ));
    }
    if s.starts_with('-') {
        return Err(Error::validation("ref", "must not start with '-'"));
    }
    if s.contains("..") {
        return Err(Error::validation("ref", "must not contain '..'"));
    }
    Ok(Some(s.to_string()))
}

/// DNS hostname. Empty means "no domain".
pub fn validate_domain(value: Option<&str>) -> Result<Option<String>> {
    let Some(s) = trimmed(value) else {
        return Ok(None);
    };
    check_len("domain", s, MAX_DOMAIN_LEN)?;
    if !DOMAIN_REGEX.is_match(s) || s.contains("..") {
        return Err(Error::validation("domain", "must be a valid hostname"));
    }
    Ok(Some(s.to_ascii_lowercase()))
}

/// Shell command fragment (install/build/start). Empty means "use default".
pub fn validate_command(field: &'static str, value: Option<&str>) -> Result<Option<String>> {
    let Some(s) = trimmed(value) else {
        return Ok(None);
    };
    check_len(field, s, MAX_COMMAND_LEN)?;
    if !COMMAND_REGEX.is_match(s) {
        return Err(Error::validation(
            field,
            "may only contain letters, numbers, spaces, and - _ . / :",
        ));
    }
    Ok(Some(s.to_string()))
}

/// Node.js version selector. Empty means "use default".
pub fn validate_node_version(value: Option<&str>) -> Result<Option<String>> {
    let Some(s) = trimmed(value) else {
        return Ok(None);
    };
    check_len("node_version", s, MAX_NODE_VERSION_LEN)?;
    if !NODE_VERSION_REGEX.is_match(s) {
        return Err(Error::validation(
            "node_version",
            "must be a version like 20 or 22.1.0, or lts/node",
        ));
    }
    Ok(Some(s.to_string()))
}

pub fn validate_max_restarts(value: Option<u32>) -> Result<Option<u32>> {
    match value {
        Some(n) if n > MAX_RESTARTS => Err(Error::validation(
            "max_restarts",
            format!("must be between 0 and {}", MAX_RESTARTS),
        )),
        other => Ok(other),
    }
}

pub fn validate_restart_delay(value: Option<u64>) -> Result<Option<u64>> {
    match value {
        Some(n) if n > MAX_RESTART_DELAY_MS => Err(Error::validation(
            "restart_delay_ms",
            format!("must be between 0 and {}", MAX_RESTART_DELAY_MS),
        )),
        other => Ok(other),
    }
}

/// `.env` file content is opaque; only its size is bounded.
pub fn validate_env_content(value: &str) -> Result<()> {
    if value.len() > MAX_ENV_FILE_BYTES {
        return Err(Error::validation(
            "env",
            format!("must be at most {} bytes", MAX_ENV_FILE_BYTES),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name() {
        assert_eq!(validate_name("  my-app_1.0 ").unwrap(), "my-app_1.0");
        assert!(validate_name("my app").is_err());
        assert!(validate_name("").is_err());
        assert!(validate_name("../etc").is_err());
        assert!(validate_name(&"a".repeat(101)).is_err());
    }

    #[test]
    fn test_name_error_names_field() {
        let err = validate_name("my app").unwrap_err();
        assert!(matches!(err, Error::Validation { field: "name", .. }));
        assert!(err.to_string().starts_with("name:"));
    }

    #[test]
    fn test_repo_url() {
        assert!(validate_repo_url("https://github.com/acme/app.git").is_ok());
        assert!(validate_repo_url("http://git.local/app").is_ok());
        assert!(validate_repo_url("ssh://git@github.com/acme/app.git").is_ok());
        assert!(validate_repo_url("git@github.com:acme/app.git").is_ok());

        assert!(validate_repo_url("https://x/y; rm -rf /").is_err());
        assert!(validate_repo_url("https://x/$(whoami)").is_err());
        assert!(validate_repo_url("file:///etc/passwd").is_err());
        assert!(validate_repo_url("ftp://host/repo").is_err());
        assert!(validate_repo_url("https://").is_err());
        assert!(validate_repo_url("not a url").is_err());
        assert!(validate_repo_url("--upload-pack=evil").is_err());
    }

    #[test]
    fn test_ref() {
        assert_eq!(validate_ref(Some("a1b2c3d")).unwrap().as_deref(), Some("a1b2c3d"));
        assert!(is_commit_sha("a1b2c3d"));
        assert!(!is_commit_sha("a1b2c3"));
        assert!(!is_commit_sha("main"));

        assert_eq!(validate_ref(Some("feature/x-1")).unwrap().as_deref(), Some("feature/x-1"));
        assert_eq!(validate_ref(Some("v1.2.3")).unwrap().as_deref(), Some("v1.2.3"));
        assert_eq!(validate_ref(Some("  ")).unwrap(), None);
        assert_eq!(validate_ref(None).unwrap(), None);

        assert!(validate_ref(Some("-rf")).is_err());
        assert!(validate_ref(Some("main..evil")).is_err());
        assert!(validate_ref(Some("main;ls")).is_err());
    }

    #[test]
    fn test_domain() {
        assert_eq!(
            validate_domain(Some("App.Example.com")).unwrap().as_deref(),
            Some("app.example.com")
        );
        assert_eq!(validate_domain(Some("")).unwrap(), None);
        assert!(validate_domain(Some("-bad.com")).is_err());
        assert!(validate_domain(Some("bad_domain.com")).is_err());
        assert!(validate_domain(Some("a..b")).is_err());
        assert!(validate_domain(Some("x.com;reboot")).is_err());
    }

    #[test]
    fn test_command() {
        assert_eq!(
            validate_command("start_cmd", Some("node dist/server.js --port 3000")).unwrap().as_deref(),
            Some("node dist/server.js --port 3000")
        );
        assert_eq!(validate_command("build_cmd", Some("")).unwrap(), None);

        let err = validate_command("install_cmd", Some("npm i && rm -rf /")).unwrap_err();
        assert!(matches!(err, Error::Validation { field: "install_cmd", .. }));
        assert!(validate_command("start_cmd", Some("echo \"hi\"")).is_err());
        assert!(validate_command("start_cmd", Some(&"x".repeat(501))).is_err());
    }

    #[test]
    fn test_node_version() {
        for ok in ["20", "22.1", "22.1.0", "lts", "node"] {
            assert_eq!(validate_node_version(Some(ok)).unwrap().as_deref(), Some(ok));
        }
        assert_eq!(validate_node_version(None).unwrap(), None);
        assert!(validate_node_version(Some("v20")).is_err());
        assert!(validate_node_version(Some("1.2.3.4")).is_err());
        assert!(validate_node_version(Some("latest")).is_err());
    }

    #[test]
    fn test_numeric_knobs() {
        assert_eq!(validate_max_restarts(Some(10)).unwrap(), Some(10));
        assert!(validate_max_restarts(Some(1001)).is_err());
        assert_eq!(validate_restart_delay(None).unwrap(), None);
        assert!(validate_restart_delay(Some(600_001)).is_err());
    }

    #[test]
    fn test_env_content() {
        assert!(validate_env_content("A=1\nB=2\n").is_ok());
        assert!(validate_env_content(&"x".repeat(MAX_ENV_FILE_BYTES + 1)).is_err());
    }
}
