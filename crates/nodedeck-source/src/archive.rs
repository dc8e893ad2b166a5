//! Uploaded archive extraction

use nodedeck_core::{Error, Result};
use nodedeck_runtime::{CommandSpec, Executor};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Metadata directory some zip tools add next to the real content
const MACOS_METADATA_DIR: &str = "__MACOSX";

/// Extracts `.zip` uploads into app directories with `unzip`
pub struct ArchiveExtractor {
    exec: Arc<dyn Executor>,
    unzip_bin: String,
    timeout: Duration,
}

impl ArchiveExtractor {
    pub fn new(exec: Arc<dyn Executor>, unzip_bin: impl Into<String>, timeout: Duration) -> Self {
        Self {
            exec,
            unzip_bin: unzip_bin.into(),
            timeout,
        }
    }

    /// Replace `dest` with the archive contents. A single top-level directory
    /// is hoisted so `package.json` ends up at the root.
    pub async fn extract(&self, dest: &Path, archive: &Path) -> Result<()> {
        if dest.exists() {
            tokio::fs::remove_dir_all(dest).await?;
        }
        tokio::fs::create_dir_all(dest).await?;

        info!("Extracting {} into {}", archive.display(), dest.display());
        let spec = CommandSpec::new(&self.unzip_bin)
            .arg("-q")
            .arg("-o")
            .arg(archive.to_string_lossy())
            .arg("-d")
            .arg(dest.to_string_lossy())
            .timeout(self.timeout);
        self.exec.run_checked(&spec).await?;

        hoist_single_root(dest).await
    }
}

/// If `dir` holds exactly one directory (ignoring macOS metadata), move its
/// children up one level.
pub async fn hoist_single_root(dir: &Path) -> Result<()> {
    let mut entries = Vec::new();
    let mut reader = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = reader.next_entry().await? {
        if entry.file_name() == MACOS_METADATA_DIR {
            tokio::fs::remove_dir_all(entry.path()).await?;
            continue;
        }
        entries.push(entry);
    }

    if entries.len() != 1 || !entries[0].file_type().await?.is_dir() {
        return Ok(());
    }

    // Rename first so a child sharing the root's name cannot collide
    let root = entries[0].path();
    let staging = dir.join(".nodedeck-hoist");
    tokio::fs::rename(&root, &staging).await?;

    let mut children = tokio::fs::read_dir(&staging).await?;
    while let Some(child) = children.next_entry().await? {
        let target = dir.join(child.file_name());
        tokio::fs::rename(child.path(), &target).await.map_err(|e| {
            Error::tool(
                "unzip",
                format!("could not move {} into place: {}", target.display(), e),
            )
        })?;
    }
    tokio::fs::remove_dir(&staging).await?;
    debug!("Hoisted single archive root in {}", dir.display());
    Ok(())
}
