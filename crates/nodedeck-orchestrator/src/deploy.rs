//! Deploy, redeploy, pull and the proxy phase

use nodedeck_core::{
    ActivityAction, App, AppPatch, AppView, CreateApp, Error, NewApp, Outcome,
    PhaseStep, RedeployApp, Result, Warning, WarningKind,
};
use std::path::Path;
use tracing::{error, info, warn};

use crate::cleanup::{remove_dir, Cleanup};
use crate::orchestrator::{finish, AtStep, Orchestrator, StepFailure};
use crate::progress::ProgressSink;

type StepResult<T> = std::result::Result<T, StepFailure>;

impl Orchestrator {
    /// Create and provision a git-backed app without progress reporting
    pub async fn deploy(&self, cmd: CreateApp) -> Result<Outcome<AppView>> {
        self.deploy_with_progress(cmd, None, &()).await
    }

    /// Create and provision an app from an uploaded zip archive
    pub async fn deploy_upload(&self, cmd: CreateApp, archive: &Path) -> Result<Outcome<AppView>> {
        self.deploy_with_progress(cmd, Some(archive), &()).await
    }

    /// Create an app and run every provisioning phase, reporting into `sink`.
    ///
    /// All or nothing: if any phase after the row is created fails, the row,
    /// PM2 entry, vhost and directory are removed again and the original error
    /// is returned.
    pub async fn deploy_with_progress(
        &self,
        cmd: CreateApp,
        archive: Option<&Path>,
        sink: &dyn ProgressSink,
    ) -> Result<Outcome<AppView>> {
        let result = self.provision(cmd, archive, sink).await;
        finish(result, sink)
    }

    async fn provision(
        &self,
        cmd: CreateApp,
        archive: Option<&Path>,
        sink: &dyn ProgressSink,
    ) -> StepResult<Outcome<AppView>> {
        if cmd.source.is_upload() && archive.is_none() {
            return Err(Error::validation("archive", "a .zip archive is required"))
                .at(PhaseStep::Validate);
        }
        let node_version = cmd
            .node_version
            .clone()
            .unwrap_or_else(|| self.config.node.default_version.clone());
        if !self.versions.is_installed(&node_version) {
            return Err(Error::NodeVersionMissing(node_version)).at(PhaseStep::Validate);
        }
        if self
            .store
            .get_by_name(&cmd.name)
            .await
            .at(PhaseStep::Validate)?
            .is_some()
        {
            return Err(Error::NameTaken(cmd.name)).at(PhaseStep::Validate);
        }

        let port = self.next_port().await.at(PhaseStep::Validate)?;
        let app = self
            .store
            .create(&NewApp {
                name: cmd.name,
                source: cmd.source,
                install_cmd: cmd.install_cmd,
                build_cmd: cmd.build_cmd,
                start_cmd: cmd.start_cmd,
                node_version,
                port,
                domain: cmd.domain,
                ssl_enabled: cmd.ssl_enabled,
                max_restarts: cmd.max_restarts,
                restart_delay_ms: cmd.restart_delay_ms,
            })
            .await
            .at(PhaseStep::Validate)?;
        info!("Created app '{}' (id: {}, port: {})", app.name, app.id, app.port);
        sink.progress(
            PhaseStep::Validate,
            format!("Created app #{} on port {}", app.id, app.port),
        );

        let id = app.id;
        match self.bring_up(app, cmd.auto_start, archive, sink).await {
            Ok(outcome) => Ok(outcome),
            Err(failure) => {
                error!(
                    "Deploy of app {} failed at {}: {}",
                    id, failure.step, failure.error
                );
                self.roll_back(id).await;
                Err(failure)
            }
        }
    }

    async fn bring_up(
        &self,
        app: App,
        auto_start: bool,
        archive: Option<&Path>,
        sink: &dyn ProgressSink,
    ) -> StepResult<Outcome<AppView>> {
        let dir = self.app_dir(app.id);

        let app = match archive {
            Some(archive) if app.source.is_upload() => {
                sink.progress(PhaseStep::Clone, "Extracting uploaded archive".to_string());
                self.source
                    .extract_archive(&dir, archive)
                    .await
                    .at(PhaseStep::Clone)?;
                app
            }
            _ => {
                sink.progress(
                    PhaseStep::Clone,
                    format!("Cloning {}", app.source.stored_repo_url()),
                );
                self.fetch_source(app).await.at(PhaseStep::Clone)?
            }
        };

        self.install_and_build(&app, sink).await?;

        let warnings = if app.domain().is_some() {
            self.configure_proxy(&app, sink).await.at(PhaseStep::Nginx)?
        } else {
            Vec::new()
        };

        if auto_start {
            sink.progress(PhaseStep::Start, format!("Starting {}", app.process_name()));
            self.pm2.start(&app, &dir).await.at(PhaseStep::Start)?;
        }

        self.record(&app, ActivityAction::Created).await;
        Ok(Outcome::new(self.view(app).await, warnings))
    }

    /// Undo a failed deploy. Every step runs regardless of earlier failures.
    async fn roll_back(&self, id: u32) {
        let mut cleanup = Cleanup::new("rollback");
        cleanup
            .step("delete app row", async {
                self.store.delete(id).await.map(|_| ())
            })
            .await;
        cleanup.step("remove PM2 entry", self.pm2.delete(id)).await;
        cleanup.step("remove nginx vhost", self.remove_vhost(id)).await;
        cleanup
            .step("remove app directory", remove_dir(&self.app_dir(id)))
            .await;
        info!("Rolled back app {}", id);
    }

    /// Remove the app's vhost and reload nginx if there was one
    pub(crate) async fn remove_vhost(&self, id: u32) -> Result<()> {
        if self.nginx.read(id).await.is_none() {
            return Ok(());
        }
        self.nginx.remove(id).await?;
        self.nginx.reload().await
    }

    /// HTTP vhost first, then a certificate if TLS is wanted and missing,
    /// then the final vhost. Certificate failures become warnings; the app
    /// stays reachable over plain HTTP.
    pub(crate) async fn configure_proxy(
        &self,
        app: &App,
        sink: &dyn ProgressSink,
    ) -> Result<Vec<Warning>> {
        let Some(domain) = app.domain() else {
            self.remove_vhost(app.id).await?;
            return Ok(Vec::new());
        };

        sink.progress(PhaseStep::Nginx, format!("Configuring nginx for {}", domain));
        self.nginx.write(app, true, false).await?;
        self.nginx.reload().await?;

        let mut warnings = Vec::new();
        if app.ssl_enabled {
            if self.nginx.certs_exist(domain) {
                sink.progress(
                    PhaseStep::Ssl,
                    format!("Certificate for {} already present", domain),
                );
            } else {
                sink.progress(PhaseStep::Ssl, format!("Requesting certificate for {}", domain));
                if let Err(e) = self.certbot.obtain(domain).await {
                    let warning = Warning::new(
                        WarningKind::Certificate,
                        format!("{}; {} is served over plain HTTP", e, domain),
                    );
                    sink.warning(PhaseStep::Ssl, warning.clone());
                    warnings.push(warning);
                }
            }
            self.nginx.write(app, false, false).await?;
            self.nginx.reload().await?;
        }
        Ok(warnings)
    }

    /// Redeploy without progress reporting
    pub async fn redeploy(&self, id: u32, cmd: RedeployApp) -> Result<Outcome<AppView>> {
        self.redeploy_with_progress(id, cmd, &()).await
    }

    /// Fetch new code, reinstall, rebuild and restart an existing app.
    ///
    /// Nothing is rolled back. A failed restart after a good build is a
    /// warning on the result.
    pub async fn redeploy_with_progress(
        &self,
        id: u32,
        cmd: RedeployApp,
        sink: &dyn ProgressSink,
    ) -> Result<Outcome<AppView>> {
        let result = self.refresh(id, cmd, sink).await;
        finish(result, sink)
    }

    async fn refresh(
        &self,
        id: u32,
        cmd: RedeployApp,
        sink: &dyn ProgressSink,
    ) -> StepResult<Outcome<AppView>> {
        let _guard = self.locks.try_acquire(id).at(PhaseStep::Validate)?;
        let mut app = self.load(id).await.at(PhaseStep::Validate)?;
        let dir = self.app_dir(id);

        if app.source.is_upload() {
            if cmd.git_ref.is_some() {
                return Err(Error::validation("git_ref", "uploaded apps have no git source"))
                    .at(PhaseStep::Validate);
            }
            sink.progress(PhaseStep::Clone, "Uploaded app, keeping current files".to_string());
        } else {
            if let Some(git_ref) = cmd.git_ref {
                app = self
                    .store
                    .update(id, &AppPatch::git_ref(Some(git_ref)))
                    .await
                    .at(PhaseStep::Validate)?;
            }
            sink.progress(
                PhaseStep::Clone,
                format!("Fetching {}", app.source.stored_repo_url()),
            );
            app = self.fetch_source(app).await.at(PhaseStep::Clone)?;
        }

        self.install_and_build(&app, sink).await?;

        let mut warnings = Vec::new();
        if cmd.no_start {
            sink.progress(PhaseStep::Start, "Restart skipped".to_string());
        } else {
            sink.progress(PhaseStep::Start, format!("Restarting {}", app.process_name()));
            if let Err(e) = self.pm2.restart(&app, &dir).await {
                warn!("Redeployed app {} but restart failed: {}", id, e);
                let warning = Warning::new(
                    WarningKind::Restart,
                    format!("Code updated but the app could not be restarted: {}", e),
                );
                sink.warning(PhaseStep::Start, warning.clone());
                warnings.push(warning);
            }
        }

        self.record(&app, ActivityAction::Redeployed).await;
        info!("Redeployed app {}", id);
        Ok(Outcome::new(self.view(app).await, warnings))
    }

    /// Fetch source only, optionally switching to another ref first
    pub async fn pull(&self, id: u32, git_ref: Option<String>) -> Result<AppView> {
        let _guard = self.locks.try_acquire(id)?;
        let mut app = self.load(id).await?;
        if app.source.is_upload() {
            return Err(Error::validation("source", "uploaded apps have no git source"));
        }
        if let Some(git_ref) = git_ref {
            app = self.store.update(id, &AppPatch::git_ref(Some(git_ref))).await?;
        }
        let app = self.fetch_source(app).await?;
        self.record(&app, ActivityAction::Pulled).await;
        Ok(self.view(app).await)
    }

    /// Run the install command on demand
    pub async fn install(&self, id: u32) -> Result<AppView> {
        let _guard = self.locks.try_acquire(id)?;
        let app = self.load(id).await?;
        self.run_in_app(&app, "install", &app.install_cmd).await?;
        self.record(&app, ActivityAction::Installed).await;
        Ok(self.view(app).await)
    }

    /// Run the build command on demand; a no-op when none is set
    pub async fn build(&self, id: u32) -> Result<AppView> {
        let _guard = self.locks.try_acquire(id)?;
        let app = self.load(id).await?;
        if let Some(build) = &app.build_cmd {
            self.run_in_app(&app, "build", build).await?;
            self.record(&app, ActivityAction::Built).await;
        }
        Ok(self.view(app).await)
    }
}
