//! nvm-scoped shell commands and installed Node.js versions

use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::exec::CommandSpec;

/// Builds `bash -c` invocations with nvm sourced and a Node version selected.
///
/// The embedded command strings must already have passed the command
/// validator; nothing here quotes or escapes them.
#[derive(Debug, Clone)]
pub struct NvmShell {
    nvm_dir: PathBuf,
    bash: String,
}

impl NvmShell {
    pub fn new<P: Into<PathBuf>, S: Into<String>>(nvm_dir: P, bash: S) -> Self {
        Self {
            nvm_dir: nvm_dir.into(),
            bash: bash.into(),
        }
    }

    pub fn nvm_dir(&self) -> &Path {
        &self.nvm_dir
    }

    /// Shell prelude that loads nvm
    pub fn prelude(&self) -> String {
        format!(
            "export NVM_DIR=\"{}\"\n[ -s \"$NVM_DIR/nvm.sh\" ] && . \"$NVM_DIR/nvm.sh\"",
            self.nvm_dir.display()
        )
    }

    /// `nvm use` line for a stored selector; aborts the script when the
    /// version cannot be selected
    pub fn use_line(&self, node_version: &str) -> String {
        format!("nvm use {} >/dev/null || exit 1", shell_selector(node_version))
    }

    /// Run `command` in `cwd` under the given Node version
    pub fn command(&self, node_version: &str, command: &str, cwd: &Path) -> CommandSpec {
        let script = format!(
            "{}\n{}\n{}",
            self.prelude(),
            self.use_line(node_version),
            command
        );
        CommandSpec::new(&self.bash).arg("-c").arg(script).cwd(cwd)
    }
}

/// nvm spelling of a stored selector as a shell word. nvm has no plain `lts`
/// alias; `lts/*` is quoted so the shell never globs it.
fn shell_selector(node_version: &str) -> &str {
    match node_version {
        "lts" => "'lts/*'",
        other => other,
    }
}

/// Installed Node.js versions under `$NVM_DIR/versions/node`
#[derive(Debug, Clone)]
pub struct NodeVersions {
    versions_dir: PathBuf,
}

impl NodeVersions {
    pub fn new(nvm_dir: &Path) -> Self {
        Self {
            versions_dir: nvm_dir.join("versions").join("node"),
        }
    }

    /// Installed versions, newest first, normalised to `major.minor.patch`
    pub fn list(&self) -> Vec<String> {
        let entries = match std::fs::read_dir(&self.versions_dir) {
            Ok(entries) => entries,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(
                        "Could not read {}: {}",
                        self.versions_dir.display(),
                        e
                    );
                }
                return Vec::new();
            }
        };

        let mut versions: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_dir())
            .filter_map(|entry| parse_version_dir(&entry.file_name().to_string_lossy()))
            .collect();

        versions.sort_by(|a, b| compare_versions(b, a));
        versions.dedup();
        versions
    }

    /// Whether a selector (`20`, `22.1`, `22.1.0`, `lts`, `node`) resolves to an
    /// installed version. `lts` and `node` only need some version present.
    pub fn is_installed(&self, selector: &str) -> bool {
        let installed = self.list();
        match selector {
            "lts" | "node" => !installed.is_empty(),
            _ => installed.iter().any(|v| version_matches(selector, v)),
        }
    }
}

/// `v20.10.0` -> `20.10.0`, `v20` -> `20.0.0`
fn parse_version_dir(name: &str) -> Option<String> {
    let v = name.trim().trim_start_matches('v');
    let parts: Vec<&str> = v.split('.').collect();
    if parts.is_empty() || parts.len() > 3 {
        return None;
    }
    if !parts
        .iter()
        .all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()))
    {
        return None;
    }
    let mut normalised: Vec<&str> = parts;
    while normalised.len() < 3 {
        normalised.push("0");
    }
    Some(normalised.join("."))
}

/// Prefix match on dot-separated components
fn version_matches(selector: &str, version: &str) -> bool {
    let wanted: Vec<&str> = selector.split('.').collect();
    let have: Vec<&str> = version.split('.').collect();
    wanted.len() <= have.len() && wanted.iter().zip(&have).all(|(w, h)| w == h)
}

fn compare_versions(a: &str, b: &str) -> Ordering {
    let parse = |s: &str| -> Vec<u64> { s.split('.').filter_map(|p| p.parse().ok()).collect() };
    parse(a).cmp(&parse(b))
}
