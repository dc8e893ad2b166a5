//! Parsing of `pm2 jlist` output

use nodedeck_core::{Error, ProcessStatus, Result};
use serde::Deserialize;
use std::collections::HashMap;

#[derive(Debug, Deserialize)]
struct JlistEntry {
    name: String,
    #[serde(default)]
    pm2_env: Option<JlistEnv>,
}

#[derive(Debug, Deserialize)]
struct JlistEnv {
    #[serde(default)]
    status: Option<String>,
}

/// Status of every process PM2 knows, keyed by name
pub fn parse_jlist(stdout: &str) -> Result<HashMap<String, ProcessStatus>> {
    // PM2 may print notices (some starting with "[PM2]") before the JSON array
    let entries: Vec<JlistEntry> = stdout
        .match_indices('[')
        .find_map(|(start, _)| serde_json::from_str(stdout[start..].trim()).ok())
        .ok_or_else(|| Error::tool("pm2", "jlist returned no process list"))?;

    Ok(entries
        .into_iter()
        .map(|entry| {
            let online = entry
                .pm2_env
                .and_then(|env| env.status)
                .is_some_and(|s| s == "online");
            let status = if online {
                ProcessStatus::running()
            } else {
                ProcessStatus::stopped()
            };
            (entry.name, status)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodedeck_core::ProcessState;

    #[test]
    fn test_parse_jlist() {
        let out = r#"[
            {"name":"nodedeck-app-1","pm2_env":{"status":"online"}},
            {"name":"nodedeck-app-2","pm2_env":{"status":"stopped"}},
            {"name":"other","pm2_env":{"status":"errored"}}
        ]"#;
        let map = parse_jlist(out).unwrap();
        assert_eq!(map["nodedeck-app-1"].state, ProcessState::Running);
        assert_eq!(map["nodedeck-app-2"].state, ProcessState::Stopped);
        assert_eq!(map["other"].state, ProcessState::Stopped);
    }

    #[test]
    fn test_parse_jlist_with_preamble() {
        let out = ">>>> In-memory PM2 is out-of-date, do:\n>>>> $ pm2 update\n[]";
        assert!(parse_jlist(out).unwrap().is_empty());

        let out = "[PM2] Spawning PM2 daemon\n[PM2] PM2 Successfully daemonized\n[{\"name\":\"a\",\"pm2_env\":{\"status\":\"online\"}}]";
        assert!(parse_jlist(out).unwrap()["a"].is_running());
    }

    #[test]
    fn test_parse_jlist_garbage() {
        assert!(parse_jlist("daemon not running").is_err());
        assert!(parse_jlist("[{").is_err());
    }
}
