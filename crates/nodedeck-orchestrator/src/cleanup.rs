//! Ordered best-effort cleanup that collects failures as warnings

use nodedeck_core::{Result, Warning, WarningKind};
use std::future::Future;
use std::path::Path;
use tracing::{debug, warn};

pub(crate) struct Cleanup {
    label: &'static str,
    warnings: Vec<Warning>,
}

impl Cleanup {
    pub(crate) fn new(label: &'static str) -> Self {
        Self {
            label,
            warnings: Vec::new(),
        }
    }

    /// Run one step; a failure is logged and recorded, never propagated
    pub(crate) async fn step<F>(&mut self, what: &str, step: F)
    where
        F: Future<Output = Result<()>>,
    {
        match step.await {
            Ok(()) => debug!("{}: {} done", self.label, what),
            Err(e) => {
                warn!("{}: {} failed: {}", self.label, what, e);
                self.warnings.push(Warning::new(
                    WarningKind::Teardown,
                    format!("Could not {}: {}", what, e),
                ));
            }
        }
    }

    pub(crate) fn into_warnings(self) -> Vec<Warning> {
        self.warnings
    }
}

/// Remove a directory tree; a missing directory is already clean
pub(crate) async fn remove_dir(dir: &Path) -> Result<()> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
