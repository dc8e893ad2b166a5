//! Start/stop control, settings updates and teardown

use nodedeck_core::{
    ActivityAction, AppView, Error, Outcome, Result, UpdateApp, Warning, WarningKind,
};
use tracing::{info, warn};

use crate::cleanup::{remove_dir, Cleanup};
use crate::orchestrator::Orchestrator;

impl Orchestrator {
    pub async fn start(&self, id: u32) -> Result<AppView> {
        let _guard = self.locks.try_acquire(id)?;
        let app = self.load(id).await?;
        self.pm2.start(&app, &self.app_dir(id)).await?;
        info!("Started app {} ({})", app.name, app.process_name());
        self.record(&app, ActivityAction::Started).await;
        Ok(self.view(app).await)
    }

    /// Stopping an app that is not running succeeds
    pub async fn stop(&self, id: u32) -> Result<AppView> {
        let _guard = self.locks.try_acquire(id)?;
        let app = self.load(id).await?;
        self.pm2.stop(id).await?;
        info!("Stopped app {}", app.name);
        self.record(&app, ActivityAction::Stopped).await;
        Ok(self.view(app).await)
    }

    /// Restart, or start when PM2 has no entry for the app
    pub async fn restart(&self, id: u32) -> Result<AppView> {
        let _guard = self.locks.try_acquire(id)?;
        let app = self.load(id).await?;
        self.pm2.restart(&app, &self.app_dir(id)).await?;
        info!("Restarted app {}", app.name);
        self.record(&app, ActivityAction::Restarted).await;
        Ok(self.view(app).await)
    }

    pub async fn reload(&self, id: u32) -> Result<AppView> {
        let _guard = self.locks.try_acquire(id)?;
        let app = self.load(id).await?;
        self.pm2.reload(&app, &self.app_dir(id)).await?;
        info!("Reloaded app {}", app.name);
        self.record(&app, ActivityAction::Reloaded).await;
        Ok(self.view(app).await)
    }

    /// Apply a settings patch.
    ///
    /// The proxy phase re-runs only when the domain or TLS flag changed. Its
    /// failures are warnings; the saved settings are kept.
    pub async fn update(&self, id: u32, cmd: UpdateApp) -> Result<Outcome<AppView>> {
        let current = self.load(id).await?;
        let patch = cmd.patch;
        if patch.is_empty() {
            return Ok(Outcome::clean(self.view(current).await));
        }
        if patch.git_ref.is_some() && current.source.is_upload() {
            return Err(Error::validation("git_ref", "uploaded apps have no git source"));
        }
        if let Some(version) = &patch.node_version {
            if !self.versions.is_installed(version) {
                return Err(Error::NodeVersionMissing(version.clone()));
            }
        }

        let proxy_changed = patch.changes_proxy(&current);
        // Vhost rewrites serialize with redeploy and teardown
        let _guard = if proxy_changed {
            Some(self.locks.try_acquire(id)?)
        } else {
            None
        };
        let app = self.store.update(id, &patch).await?;
        info!("Updated app {}", id);

        let mut warnings = Vec::new();
        if proxy_changed {
            match self.configure_proxy(&app, &()).await {
                Ok(cert_warnings) => warnings.extend(cert_warnings),
                Err(e) => {
                    warn!("Settings for app {} saved but proxy update failed: {}", id, e);
                    warnings.push(Warning::new(
                        WarningKind::ProxyReload,
                        format!("Settings saved but proxy reload failed: {}", e),
                    ));
                }
            }
        }

        self.record(&app, ActivityAction::Updated).await;
        Ok(Outcome::new(self.view(app).await, warnings))
    }

    /// Delete an app.
    ///
    /// PM2 entry, vhost and directory are removed best effort, in that order;
    /// each failure becomes a warning. The row is deleted regardless.
    pub async fn teardown(&self, id: u32) -> Result<Outcome<()>> {
        let _guard = self.locks.try_acquire(id)?;
        let app = self.load(id).await?;
        info!("Tearing down app {} ({})", app.name, id);

        let mut cleanup = Cleanup::new("teardown");
        cleanup.step("remove PM2 entry", self.pm2.delete(id)).await;
        cleanup.step("remove nginx vhost", self.remove_vhost(id)).await;
        cleanup
            .step("remove app directory", remove_dir(&self.app_dir(id)))
            .await;

        self.store.delete(id).await?;
        self.record(&app, ActivityAction::Deleted).await;

        let warnings = cleanup.into_warnings();
        if warnings.is_empty() {
            info!("Deleted app {}", id);
        } else {
            warn!("Deleted app {} with {} warning(s)", id, warnings.len());
        }
        Ok(Outcome::new((), warnings))
    }
}
