//! The orchestrator: shared handles, queries and small helpers

use nodedeck_core::{
    ActivityAction, ActivityRecord, App, AppPatch, AppView, Error, Outcome, PanelConfig,
    PhaseEvent, PhaseStep, ProcessStatus, Result, SuggestCommands, ENV_FILE_NAME,
};
use nodedeck_db::RecordStore;
use nodedeck_pm2::Pm2;
use nodedeck_proxy::{Certbot, NginxWriter};
use nodedeck_runtime::{Executor, LineStream, NodeVersions, NvmShell};
use nodedeck_source::{SourceFetcher, SuggestedCommands, Suggester};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::locks::ActionLocks;
use crate::ports::allocate_port;
use crate::progress::ProgressSink;

/// Coordinates the record store, git, nvm, PM2, nginx and certbot for every
/// app. Cheap to share behind an `Arc`; all state lives in the collaborators.
pub struct Orchestrator {
    pub(crate) config: Arc<PanelConfig>,
    pub(crate) store: Arc<dyn RecordStore>,
    pub(crate) exec: Arc<dyn Executor>,
    pub(crate) source: SourceFetcher,
    pub(crate) pm2: Pm2,
    pub(crate) nginx: NginxWriter,
    pub(crate) certbot: Certbot,
    pub(crate) suggester: Suggester,
    pub(crate) nvm: NvmShell,
    pub(crate) versions: NodeVersions,
    pub(crate) locks: ActionLocks,
}

impl Orchestrator {
    pub fn new(
        config: Arc<PanelConfig>,
        store: Arc<dyn RecordStore>,
        exec: Arc<dyn Executor>,
    ) -> Result<Self> {
        Self::with_locks(config, store, exec, ActionLocks::new())
    }

    /// Build with an explicit lock registry
    pub fn with_locks(
        config: Arc<PanelConfig>,
        store: Arc<dyn RecordStore>,
        exec: Arc<dyn Executor>,
        locks: ActionLocks,
    ) -> Result<Self> {
        Ok(Self {
            source: SourceFetcher::new(exec.clone(), &config),
            pm2: Pm2::new(exec.clone(), &config),
            nginx: NginxWriter::new(exec.clone(), &config),
            certbot: Certbot::new(exec.clone(), &config),
            suggester: Suggester::new()?,
            nvm: NvmShell::new(config.node.nvm_dir.clone(), config.pm2.shell.clone()),
            versions: NodeVersions::new(&config.node.nvm_dir),
            config,
            store,
            exec,
            locks,
        })
    }

    pub fn config(&self) -> &PanelConfig {
        &self.config
    }

    pub fn locks(&self) -> &ActionLocks {
        &self.locks
    }

    // ---- queries ----

    /// Every app with live status, newest first
    pub async fn list(&self) -> Result<Vec<AppView>> {
        let apps = self.store.list().await?;
        let statuses = self.pm2.statuses().await;
        Ok(apps
            .into_iter()
            .map(|app| {
                let status = match &statuses {
                    Ok(map) => map
                        .get(&app.process_name())
                        .cloned()
                        .unwrap_or_else(ProcessStatus::stopped),
                    Err(e) => ProcessStatus::unknown(e.to_string()),
                };
                let ssl_active = self.ssl_active(&app);
                AppView::new(app, status, ssl_active)
            })
            .collect())
    }

    pub async fn get(&self, id: u32) -> Result<AppView> {
        let app = self.load(id).await?;
        Ok(self.view(app).await)
    }

    /// Last `lines` lines of the app's PM2 logs
    pub async fn tail_logs(&self, id: u32, lines: usize) -> Result<String> {
        self.load(id).await?;
        self.pm2.tail_logs(id, lines).await
    }

    /// Live PM2 log lines; dropping the stream ends the tail
    pub async fn stream_logs(&self, id: u32) -> Result<LineStream> {
        self.load(id).await?;
        self.pm2.stream_logs(id).await
    }

    /// Contents of the app's `.env`, empty when none was written
    pub async fn read_env(&self, id: u32) -> Result<String> {
        self.load(id).await?;
        let path = self.app_dir(id).join(ENV_FILE_NAME);
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Replace the app's `.env`. The app picks it up on its next restart.
    pub async fn write_env(&self, id: u32, content: &str) -> Result<()> {
        self.load(id).await?;
        let dir = self.app_dir(id);
        if !dir.is_dir() {
            return Err(Error::AppDirMissing(dir));
        }
        tokio::fs::write(dir.join(ENV_FILE_NAME), content).await?;
        info!("Wrote {} for app {}", ENV_FILE_NAME, id);
        Ok(())
    }

    pub async fn activity(&self, limit: usize) -> Result<Vec<ActivityRecord>> {
        self.store.list_activity(limit).await
    }

    /// Node.js versions installed under nvm, newest first
    pub fn node_versions(&self) -> Vec<String> {
        self.versions.list()
    }

    /// Install, build and start commands proposed from a repository's package.json
    pub async fn suggest(&self, request: &SuggestCommands) -> Result<SuggestedCommands> {
        self.suggester.suggest(request).await
    }

    /// Rewrite every app's vhost and reload nginx once.
    ///
    /// An app whose current vhost already serves TLS keeps it, even when the
    /// certificate files are not readable by this process.
    pub async fn sync_vhosts(&self) -> Result<usize> {
        let apps = self.store.list().await?;
        let mut written = 0;
        for app in apps.iter().filter(|a| a.domain().is_some()) {
            let force_tls = app.ssl_enabled && self.nginx.config_has_tls(app.id).await;
            match self.nginx.write(app, false, force_tls).await {
                Ok(_) => written += 1,
                Err(e) => warn!("Could not write vhost for app {}: {}", app.id, e),
            }
        }
        if written > 0 {
            self.nginx.reload().await?;
            info!(
                "Wrote {} app vhost(s) to {}",
                written,
                self.config.nginx.conf_dir.display()
            );
        }
        Ok(written)
    }

    // ---- helpers ----

    pub(crate) fn app_dir(&self, id: u32) -> PathBuf {
        self.config.app_dir(id)
    }

    pub(crate) async fn load(&self, id: u32) -> Result<App> {
        self.store.get(id).await?.ok_or(Error::AppNotFound(id))
    }

    pub(crate) fn ssl_active(&self, app: &App) -> bool {
        app.ssl_enabled && app.domain().is_some_and(|d| self.nginx.certs_exist(d))
    }

    pub(crate) async fn view(&self, app: App) -> AppView {
        let status = self.pm2.status(app.id).await;
        let ssl_active = self.ssl_active(&app);
        AppView::new(app, status, ssl_active)
    }

    /// Append to the activity log. A failed append is logged, not returned.
    pub(crate) async fn record(&self, app: &App, action: ActivityAction) {
        if let Err(e) = self.store.append_activity(app.id, &app.name, action).await {
            warn!("Could not record '{}' for app {}: {}", action, app.id, e);
        }
    }

    pub(crate) async fn next_port(&self) -> Result<u16> {
        let taken: HashSet<u16> = self.store.ports().await?.into_iter().collect();
        allocate_port(
            &mut rand::thread_rng(),
            &self.config.port_range,
            self.config.panel_port,
            &taken,
            self.config.port_draw_attempts,
        )
    }

    /// Run a user command in the app directory under its Node version
    pub(crate) async fn run_in_app(&self, app: &App, label: &str, command: &str) -> Result<()> {
        let dir = self.app_dir(app.id);
        if !dir.is_dir() {
            return Err(Error::AppDirMissing(dir));
        }
        let spec = self
            .nvm
            .command(&app.node_version, command, &dir)
            .timeout(Duration::from_secs(self.config.command_timeout_secs));

        info!("Running {} for app {}: {}", label, app.id, command);
        let output = self.exec.run(&spec).await?;
        if !output.success() {
            return Err(Error::tool(label, output.error_text()));
        }
        Ok(())
    }

    /// Install, then build when a build command is set
    pub(crate) async fn install_and_build(
        &self,
        app: &App,
        sink: &dyn ProgressSink,
    ) -> std::result::Result<(), StepFailure> {
        sink.progress(PhaseStep::Install, format!("Running {}", app.install_cmd));
        self.run_in_app(app, "install", &app.install_cmd)
            .await
            .at(PhaseStep::Install)?;

        if let Some(build) = &app.build_cmd {
            sink.progress(PhaseStep::Build, format!("Running {}", build));
            self.run_in_app(app, "build", build)
                .await
                .at(PhaseStep::Build)?;
        }
        Ok(())
    }

    /// Fetch the app's git source and persist the ref it resolved to
    pub(crate) async fn fetch_source(&self, app: App) -> Result<App> {
        let repo_url = app.source.stored_repo_url().to_string();
        let git_ref = app.source.git_ref().map(str::to_string);
        let outcome = self
            .source
            .fetch(&self.app_dir(app.id), &repo_url, git_ref.as_deref())
            .await?;

        if git_ref.as_deref() == Some(outcome.resolved_ref.as_str()) {
            return Ok(app);
        }
        info!("App {} resolved to ref '{}'", app.id, outcome.resolved_ref);
        self.store
            .update(app.id, &AppPatch::git_ref(Some(outcome.resolved_ref)))
            .await
    }
}

/// An error tagged with the phase it happened in
#[derive(Debug)]
pub(crate) struct StepFailure {
    pub step: PhaseStep,
    pub error: Error,
}

pub(crate) trait AtStep<T> {
    fn at(self, step: PhaseStep) -> std::result::Result<T, StepFailure>;
}

impl<T> AtStep<T> for Result<T> {
    fn at(self, step: PhaseStep) -> std::result::Result<T, StepFailure> {
        self.map_err(|error| StepFailure { step, error })
    }
}

/// Emit the terminal event for a phased operation and unwrap its result
pub(crate) fn finish(
    result: std::result::Result<Outcome<AppView>, StepFailure>,
    sink: &dyn ProgressSink,
) -> Result<Outcome<AppView>> {
    match result {
        Ok(outcome) => {
            sink.emit(PhaseEvent::Done {
                app: Box::new(outcome.value.clone()),
                warnings: outcome.warnings.clone(),
            });
            Ok(outcome)
        }
        Err(StepFailure { step, error }) => {
            sink.emit(PhaseEvent::Failed {
                step,
                message: error.to_string(),
            });
            Err(error)
        }
    }
}
