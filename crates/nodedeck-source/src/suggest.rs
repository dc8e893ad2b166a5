//! Command suggestions from a repository's package.json

use nodedeck_core::{Error, Result, SuggestCommands, DEFAULT_INSTALL_CMD, DEFAULT_START_CMD};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

const DEFAULT_REF: &str = "main";

static ENGINES_EXACT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+)(?:\.\d+)*$").expect("Invalid engines regex"));
static ENGINES_RANGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r">=?\s*(\d+)").expect("Invalid engines regex"));
static ENGINES_MAJOR_X: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(\d+)\.x$").expect("Invalid engines regex"));

/// Proposed settings for a new app
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestedCommands {
    pub install_cmd: String,
    pub build_cmd: Option<String>,
    pub start_cmd: String,
    pub node_version: Option<String>,
}

impl Default for SuggestedCommands {
    fn default() -> Self {
        Self {
            install_cmd: DEFAULT_INSTALL_CMD.to_string(),
            build_cmd: None,
            start_cmd: DEFAULT_START_CMD.to_string(),
            node_version: None,
        }
    }
}

/// Fetches package.json over HTTPS from GitHub or GitLab
pub struct Suggester {
    client: reqwest::Client,
}

impl Suggester {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .user_agent(concat!("nodedeck/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::config(format!("HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    pub async fn suggest(&self, request: &SuggestCommands) -> Result<SuggestedCommands> {
        let git_ref = request.git_ref.as_deref().unwrap_or(DEFAULT_REF);
        let url = raw_package_json_url(&request.repo_url, git_ref).ok_or_else(|| {
            Error::validation(
                "repo_url",
                "suggestions support GitHub and GitLab repositories only",
            )
        })?;

        debug!("Fetching {}", url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::tool("package.json", e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(Error::tool(
                "package.json",
                format!("not found at ref '{}'", git_ref),
            ));
        }
        if !status.is_success() {
            return Err(Error::tool(
                "package.json",
                format!("could not fetch: HTTP {}", status.as_u16()),
            ));
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::tool("package.json", e.to_string()))?;
        Ok(parse_package_json(&body))
    }
}

/// Raw package.json URL for GitHub and GitLab repositories
pub fn raw_package_json_url(repo_url: &str, git_ref: &str) -> Option<String> {
    let url = Url::parse(repo_url).ok()?;
    let host = url.host_str()?.to_ascii_lowercase();
    let path = url.path().trim_start_matches('/');
    let path = path.strip_suffix(".git").unwrap_or(path).trim_end_matches('/');
    let encoded_ref = git_ref.replace('/', "%2F");

    match host.as_str() {
        "github.com" | "www.github.com" => {
            let mut parts = path.split('/').filter(|p| !p.is_empty());
            let owner = parts.next()?;
            let repo = parts.next()?;
            Some(format!(
                "https://raw.githubusercontent.com/{}/{}/{}/package.json",
                owner, repo, encoded_ref
            ))
        }
        "gitlab.com" => {
            if path.is_empty() {
                return None;
            }
            Some(format!(
                "https://gitlab.com/{}/-/raw/{}/package.json",
                path, encoded_ref
            ))
        }
        _ => None,
    }
}

/// Major version suggested by an `engines.node` constraint
pub fn parse_engines_node(value: &str) -> Option<String> {
    let s = value.trim();
    if let Some(caps) = ENGINES_EXACT.captures(s) {
        return Some(caps[1].to_string());
    }
    if let Some(caps) = ENGINES_RANGE.captures(s) {
        return Some(caps[1].to_string());
    }
    ENGINES_MAJOR_X.captures(s).map(|caps| caps[1].to_string())
}

/// Suggestions from package.json text; unparsable input yields defaults
pub fn parse_package_json(text: &str) -> SuggestedCommands {
    let mut out = SuggestedCommands::default();
    let Ok(pkg) = serde_json::from_str::<serde_json::Value>(text) else {
        return out;
    };

    if let Some(scripts) = pkg.get("scripts").and_then(|s| s.as_object()) {
        if scripts.contains_key("build") {
            out.build_cmd = Some("npm run build".to_string());
        }
        if scripts.contains_key("start") {
            out.start_cmd = DEFAULT_START_CMD.to_string();
        } else if scripts.contains_key("start:prod") {
            out.start_cmd = "npm run start:prod".to_string();
        } else if scripts.contains_key("start:production") {
            out.start_cmd = "npm run start:production".to_string();
        }
    }

    out.node_version = pkg
        .get("engines")
        .and_then(|e| e.get("node"))
        .and_then(|n| n.as_str())
        .and_then(parse_engines_node);

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_url_github() {
        assert_eq!(
            raw_package_json_url("https://github.com/acme/shop.git", "main").as_deref(),
            Some("https://raw.githubusercontent.com/acme/shop/main/package.json")
        );
        assert_eq!(
            raw_package_json_url("https://github.com/acme/shop", "feature/x").as_deref(),
            Some("https://raw.githubusercontent.com/acme/shop/feature%2Fx/package.json")
        );
        assert_eq!(raw_package_json_url("https://github.com/acme", "main"), None);
    }

    #[test]
    fn test_raw_url_gitlab_and_others() {
        assert_eq!(
            raw_package_json_url("https://gitlab.com/group/sub/app.git", "v1").as_deref(),
            Some("https://gitlab.com/group/sub/app/-/raw/v1/package.json")
        );
        assert_eq!(raw_package_json_url("https://bitbucket.org/a/b.git", "main"), None);
        assert_eq!(raw_package_json_url("git@github.com:a/b.git", "main"), None);
    }

    #[test]
    fn test_engines_node() {
        assert_eq!(parse_engines_node("20").as_deref(), Some("20"));
        assert_eq!(parse_engines_node("18.17.1").as_deref(), Some("18"));
        assert_eq!(parse_engines_node(">=18").as_deref(), Some("18"));
        assert_eq!(parse_engines_node("> 16 <21").as_deref(), Some("16"));
        assert_eq!(parse_engines_node("22.x").as_deref(), Some("22"));
        assert_eq!(parse_engines_node("^20.0.0"), None);
    }

    #[test]
    fn test_parse_package_json() {
        let text = r#"{
            "scripts": { "build": "tsc", "start:prod": "node dist/main.js" },
            "engines": { "node": ">=20" }
        }"#;
        let s = parse_package_json(text);
        assert_eq!(s.install_cmd, "npm install");
        assert_eq!(s.build_cmd.as_deref(), Some("npm run build"));
        assert_eq!(s.start_cmd, "npm run start:prod");
        assert_eq!(s.node_version.as_deref(), Some("20"));
    }

    #[test]
    fn test_parse_package_json_defaults() {
        assert_eq!(parse_package_json("not json"), SuggestedCommands::default());
        let s = parse_package_json(r#"{ "scripts": { "start": "node ." } }"#);
        assert_eq!(s.start_cmd, "npm start");
        assert_eq!(s.build_cmd, None);
    }
}
