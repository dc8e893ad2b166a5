//! NodeDeck PM2 - process supervisor adapter
//!
//! One PM2 entry per app, named `nodedeck-app-{id}`. Every call pins `HOME`
//! and `PM2_HOME` so the panel and an operator's shell talk to the same daemon.

pub mod launcher;
pub mod status;

use nodedeck_core::{
    process_name, App, Error, PanelConfig, ProcessStatus, Result, START_SCRIPT_NAME,
};
use nodedeck_runtime::{
    port_in_use, CommandOutput, CommandSpec, Executor, LineStream, NodeVersions, NvmShell,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub use status::parse_jlist;

/// PM2 CLI wrapper
pub struct Pm2 {
    exec: Arc<dyn Executor>,
    bin: String,
    home: PathBuf,
    pm2_home: PathBuf,
    shell: String,
    nvm: NvmShell,
    versions: NodeVersions,
    timeout: Duration,
}

impl Pm2 {
    pub fn new(exec: Arc<dyn Executor>, config: &PanelConfig) -> Self {
        Self {
            exec,
            bin: config.pm2.bin.clone(),
            home: config.pm2.home.clone(),
            pm2_home: config.pm2.pm2_home.clone(),
            shell: config.pm2.shell.clone(),
            nvm: NvmShell::new(config.node.nvm_dir.clone(), config.pm2.shell.clone()),
            versions: NodeVersions::new(&config.node.nvm_dir),
            timeout: Duration::from_secs(config.control_timeout_secs),
        }
    }

    fn pm2<I, S>(&self, args: I) -> CommandSpec
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        CommandSpec::new(&self.bin)
            .args(args)
            .env("HOME", self.home.to_string_lossy())
            .env("PM2_HOME", self.pm2_home.to_string_lossy())
            .timeout(self.timeout)
    }

    async fn run(&self, spec: CommandSpec) -> Result<CommandOutput> {
        self.exec.run(&spec).await
    }

    async fn run_checked(&self, spec: CommandSpec) -> Result<CommandOutput> {
        self.exec.run_checked(&spec).await
    }

    /// Start or resume the app's process.
    ///
    /// Fails before touching PM2 when the app directory is missing, the Node
    /// version is not installed, or the port is held by something other than
    /// this app's own online process.
    pub async fn start(&self, app: &App, dir: &Path) -> Result<()> {
        if !dir.exists() {
            return Err(Error::AppDirMissing(dir.to_path_buf()));
        }
        if !self.versions.is_installed(&app.node_version) {
            return Err(Error::NodeVersionMissing(app.node_version.clone()));
        }

        let name = process_name(app.id);
        let online = self.status(app.id).await.is_running();
        if !online && port_in_use(app.port).await {
            return Err(Error::PortInUse(app.port));
        }

        let script_path = dir.join(START_SCRIPT_NAME);
        write_script(&script_path, &launcher::render(app, dir, &self.nvm)).await?;

        let registered = self.run(self.pm2(["describe", name.as_str()])).await?.success();
        if registered {
            info!("Resuming PM2 entry {}", name);
            self.run_checked(self.pm2(["start", name.as_str()])).await?;
            return Ok(());
        }

        info!("Registering PM2 entry {} on port {}", name, app.port);
        let mut args = vec![
            "start".to_string(),
            self.shell.clone(),
            "--name".to_string(),
            name.clone(),
        ];
        if let Some(n) = app.max_restarts {
            args.push("--max-restarts".to_string());
            args.push(n.to_string());
        }
        if let Some(ms) = app.restart_delay_ms {
            args.push("--restart-delay".to_string());
            args.push(ms.to_string());
        }
        args.push("--".to_string());
        args.push(script_path.to_string_lossy().into_owned());

        let spec = self
            .pm2(args)
            .env("PORT", app.port.to_string())
            .cwd(dir);
        self.run_checked(spec).await?;
        Ok(())
    }

    /// Stop the process. Not-found counts as stopped.
    pub async fn stop(&self, app_id: u32) -> Result<()> {
        let name = process_name(app_id);
        let output = self.run(self.pm2(["stop", name.as_str()])).await?;
        if output.success() || is_not_found(&output) {
            Ok(())
        } else {
            Err(Error::tool("pm2", output.error_text()))
        }
    }

    /// Restart the process, starting it when PM2 has no entry
    pub async fn restart(&self, app: &App, dir: &Path) -> Result<()> {
        self.cycle("restart", app, dir).await
    }

    /// Zero-downtime reload, starting the process when PM2 has no entry
    pub async fn reload(&self, app: &App, dir: &Path) -> Result<()> {
        self.cycle("reload", app, dir).await
    }

    async fn cycle(&self, action: &str, app: &App, dir: &Path) -> Result<()> {
        let name = process_name(app.id);
        let output = self.run(self.pm2([action, name.as_str()])).await?;
        if output.success() {
            return Ok(());
        }
        if is_not_found(&output) {
            debug!("{} not registered, starting instead of {}", name, action);
            return self.start(app, dir).await;
        }
        Err(Error::tool("pm2", output.error_text()))
    }

    /// Remove the PM2 entry. Not-found counts as removed.
    pub async fn delete(&self, app_id: u32) -> Result<()> {
        let name = process_name(app_id);
        let output = self.run(self.pm2(["delete", name.as_str()])).await?;
        if output.success() || is_not_found(&output) {
            Ok(())
        } else {
            Err(Error::tool("pm2", output.error_text()))
        }
    }

    /// Status of every PM2 entry, keyed by process name
    pub async fn statuses(&self) -> Result<HashMap<String, ProcessStatus>> {
        let output = self.run_checked(self.pm2(["jlist"])).await?;
        parse_jlist(&output.stdout)
    }

    /// Status of one app. Never fails; communication errors become `Unknown`.
    pub async fn status(&self, app_id: u32) -> ProcessStatus {
        match self.statuses().await {
            Ok(map) => map
                .get(&process_name(app_id))
                .cloned()
                .unwrap_or_else(ProcessStatus::stopped),
            Err(e) => {
                warn!("PM2 status unavailable: {}", e);
                ProcessStatus::unknown(e.to_string())
            }
        }
    }

    /// Last `lines` lines of the app's stdout and stderr logs
    pub async fn tail_logs(&self, app_id: u32, lines: usize) -> Result<String> {
        let name = process_name(app_id);
        let lines = lines.to_string();
        let output = self
            .run(self.pm2([
                "logs",
                name.as_str(),
                "--lines",
                lines.as_str(),
                "--nostream",
            ]))
            .await?;
        if output.success() {
            Ok(output.stdout)
        } else if is_not_found(&output) {
            Ok(String::new())
        } else {
            Err(Error::tool("pm2", output.error_text()))
        }
    }

    /// Live log lines. Dropping the stream stops the underlying `pm2 logs`.
    pub async fn stream_logs(&self, app_id: u32) -> Result<LineStream> {
        let name = process_name(app_id);
        let mut spec = self.pm2(["logs", name.as_str(), "--raw", "--lines", "0"]);
        spec.timeout = None;
        self.exec.spawn_lines(&spec).await
    }

    /// Installed Node.js versions, newest first
    pub fn node_versions(&self) -> Vec<String> {
        self.versions.list()
    }
}

fn is_not_found(output: &CommandOutput) -> bool {
    output.combined().to_lowercase().contains("not found")
}

async fn write_script(path: &Path, body: &str) -> Result<()> {
    tokio::fs::write(path, body).await?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).await?;
    }
    Ok(())
}
