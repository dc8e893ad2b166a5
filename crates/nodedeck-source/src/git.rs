//! Git clone/update with ref resolution

use nodedeck_core::{Error, GitRef, Result};
use nodedeck_runtime::{CommandOutput, CommandSpec, Executor};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Result of a fetch: the ref the working tree ended up on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutcome {
    pub resolved_ref: String,
}

/// Clones or updates app working trees
pub struct GitFetcher {
    exec: Arc<dyn Executor>,
    git_bin: String,
    timeout: Duration,
}

impl GitFetcher {
    pub fn new(exec: Arc<dyn Executor>, git_bin: impl Into<String>, timeout: Duration) -> Self {
        Self {
            exec,
            git_bin: git_bin.into(),
            timeout,
        }
    }

    fn git(&self, args: &[&str], cwd: Option<&Path>) -> CommandSpec {
        let mut spec = CommandSpec::new(&self.git_bin)
            .args(args.iter().copied())
            .env("GIT_TERMINAL_PROMPT", "0")
            .timeout(self.timeout);
        if let Some(dir) = cwd {
            spec = spec.cwd(dir);
        }
        spec
    }

    async fn run(&self, args: &[&str], cwd: Option<&Path>) -> Result<CommandOutput> {
        self.exec.run(&self.git(args, cwd)).await
    }

    async fn run_ok(
        &self,
        args: &[&str],
        cwd: Option<&Path>,
        git_ref: Option<&str>,
    ) -> Result<CommandOutput> {
        let output = self.run(args, cwd).await?;
        if output.success() {
            Ok(output)
        } else {
            Err(git_error(&output, git_ref))
        }
    }

    /// Clone `repo_url` into `dest`, or update an existing clone, and check out
    /// `git_ref` (or the repository default when `None`).
    pub async fn fetch(
        &self,
        dest: &Path,
        repo_url: &str,
        git_ref: Option<&str>,
    ) -> Result<FetchOutcome> {
        let git_ref = git_ref.map(GitRef::parse);
        if dest.exists() {
            self.update(dest, git_ref.as_ref()).await
        } else {
            if let Some(parent) = dest.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            self.clone_fresh(dest, repo_url, git_ref.as_ref()).await
        }
    }

    async fn clone_fresh(
        &self,
        dest: &Path,
        repo_url: &str,
        git_ref: Option<&GitRef>,
    ) -> Result<FetchOutcome> {
        let dest_owned = dest.to_string_lossy().into_owned();
        let dest_str = dest_owned.as_str();
        info!("Cloning {} into {}", repo_url, dest.display());

        match git_ref {
            None => {
                self.run_ok(&["clone", "--", repo_url, dest_str], None, None)
                    .await?;
                let resolved = self.current_branch(dest).await?;
                Ok(FetchOutcome {
                    resolved_ref: resolved,
                })
            }
            Some(GitRef::Commit(sha)) => {
                self.run_ok(&["clone", "--", repo_url, dest_str], None, None)
                    .await?;
                self.checkout_commit(dest, sha).await?;
                Ok(FetchOutcome {
                    resolved_ref: sha.clone(),
                })
            }
            Some(GitRef::Named(name)) => {
                let args = ["clone", "--branch", name.as_str(), "--", repo_url, dest_str];
                let output = self.run(&args, None).await?;
                if output.success() {
                    return Ok(FetchOutcome {
                        resolved_ref: name.clone(),
                    });
                }

                if name == "main" && is_missing_ref(&output) {
                    warn!("Branch 'main' not found in {}, retrying with 'master'", repo_url);
                    remove_partial(dest).await;
                    let retry = self
                        .run(
                            &["clone", "--branch", "master", "--", repo_url, dest_str],
                            None,
                        )
                        .await?;
                    if retry.success() {
                        return Ok(FetchOutcome {
                            resolved_ref: "master".to_string(),
                        });
                    }
                }

                Err(git_error(&output, Some(name.as_str())))
            }
        }
    }

    async fn update(&self, dest: &Path, git_ref: Option<&GitRef>) -> Result<FetchOutcome> {
        info!("Updating existing clone at {}", dest.display());
        self.run_ok(&["fetch", "--all", "--tags", "--prune"], Some(dest), None)
            .await?;

        match git_ref {
            Some(GitRef::Commit(sha)) => {
                self.checkout_commit(dest, sha).await?;
                Ok(FetchOutcome {
                    resolved_ref: sha.clone(),
                })
            }
            Some(GitRef::Named(name)) => {
                self.checkout_and_pull(dest, name).await?;
                Ok(FetchOutcome {
                    resolved_ref: name.clone(),
                })
            }
            None => {
                let default = self.default_branch(dest).await?;
                self.checkout_and_pull(dest, &default).await?;
                Ok(FetchOutcome {
                    resolved_ref: default,
                })
            }
        }
    }

    /// Detach at `sha`. Abbreviated SHAs resolve only against local objects,
    /// so the fetch by name runs just when the commit is not already present.
    async fn checkout_commit(&self, dest: &Path, sha: &str) -> Result<()> {
        let checkout = self.run(&["checkout", "--detach", sha], Some(dest)).await?;
        if checkout.success() {
            return Ok(());
        }
        self.run_ok(&["fetch", "origin", sha], Some(dest), Some(sha))
            .await?;
        self.run_ok(&["checkout", "--detach", sha], Some(dest), Some(sha))
            .await?;
        Ok(())
    }

    async fn checkout_and_pull(&self, dest: &Path, name: &str) -> Result<()> {
        self.run_ok(&["checkout", name], Some(dest), Some(name))
            .await?;

        // Tags leave HEAD detached; only branches are pulled
        let on_branch = self
            .run(&["symbolic-ref", "-q", "--short", "HEAD"], Some(dest))
            .await?
            .success();
        if on_branch {
            self.run_ok(&["pull", "--ff-only"], Some(dest), Some(name))
                .await?;
        }
        Ok(())
    }

    async fn current_branch(&self, dest: &Path) -> Result<String> {
        let output = self
            .run_ok(&["rev-parse", "--abbrev-ref", "HEAD"], Some(dest), None)
            .await?;
        let branch = output.stdout.trim();
        if branch.is_empty() || branch == "HEAD" {
            return Err(Error::tool("git", "could not determine the checked-out branch"));
        }
        Ok(branch.to_string())
    }

    /// Remote default branch (`origin/HEAD`), else the current branch
    async fn default_branch(&self, dest: &Path) -> Result<String> {
        let output = self
            .run(
                &["symbolic-ref", "--short", "refs/remotes/origin/HEAD"],
                Some(dest),
            )
            .await?;
        if output.success() {
            let name = output.stdout.trim();
            let name = name.strip_prefix("origin/").unwrap_or(name);
            if !name.is_empty() {
                return Ok(name.to_string());
            }
        }
        self.current_branch(dest).await
    }
}

async fn remove_partial(dest: &Path) {
    if dest.exists() {
        if let Err(e) = tokio::fs::remove_dir_all(dest).await {
            warn!("Could not remove partial clone {}: {}", dest.display(), e);
        }
    }
}

fn is_missing_ref(output: &CommandOutput) -> bool {
    let text = output.combined().to_lowercase();
    (text.contains("remote branch") && text.contains("not found"))
        || text.contains("could not find remote branch")
}

/// Tool text plus a hint for failures with a known cause
fn git_error(output: &CommandOutput, git_ref: Option<&str>) -> Error {
    let message = output.error_text();
    let lower = message.to_lowercase();

    let hint = if is_missing_ref(output)
        || lower.contains("did not match any file(s) known to git")
        || lower.contains("couldn't find remote ref")
    {
        match git_ref {
            Some("main") => Some(
                "Branch 'main' not found. Try 'master' or leave the ref empty to use the repository default."
                    .to_string(),
            ),
            Some(r) => Some(format!("Ref '{}' not found in the repository.", r)),
            None => None,
        }
    } else if lower.contains("authentication failed")
        || lower.contains("could not read username")
        || lower.contains("permission denied (publickey)")
    {
        Some(
            "Authentication failed. Make the repository public or give this host credentials for it."
                .to_string(),
        )
    } else if lower.contains("repository not found")
        || lower.contains("does not appear to be a git repository")
    {
        Some("Repository not found. Check the repository URL.".to_string())
    } else if lower.contains("not possible to fast-forward") || lower.contains("diverging branches")
    {
        Some("Local branch has diverged from the remote; it cannot be fast-forwarded.".to_string())
    } else {
        None
    };

    match hint {
        Some(hint) => Error::tool("git", format!("{} {}", message, hint)),
        None => Error::tool("git", message),
    }
}
