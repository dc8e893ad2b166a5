//! NodeDeck Source - populate app working trees from git or uploaded archives

pub mod archive;
pub mod git;
pub mod suggest;

pub use archive::{hoist_single_root, ArchiveExtractor};
pub use git::{FetchOutcome, GitFetcher};
pub use suggest::{SuggestedCommands, Suggester};

use nodedeck_core::{PanelConfig, Result};
use nodedeck_runtime::Executor;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Source fetcher used by the orchestrator
pub struct SourceFetcher {
    git: GitFetcher,
    archive: ArchiveExtractor,
}

impl SourceFetcher {
    pub fn new(exec: Arc<dyn Executor>, config: &PanelConfig) -> Self {
        let timeout = Duration::from_secs(config.command_timeout_secs);
        Self {
            git: GitFetcher::new(exec.clone(), config.git_bin.clone(), timeout),
            archive: ArchiveExtractor::new(exec, config.unzip_bin.clone(), timeout),
        }
    }

    /// Clone or update `dest` at `git_ref`
    pub async fn fetch(
        &self,
        dest: &Path,
        repo_url: &str,
        git_ref: Option<&str>,
    ) -> Result<FetchOutcome> {
        self.git.fetch(dest, repo_url, git_ref).await
    }

    /// Replace `dest` with the contents of a zip archive
    pub async fn extract_archive(&self, dest: &Path, archive: &Path) -> Result<()> {
        self.archive.extract(dest, archive).await
    }
}
