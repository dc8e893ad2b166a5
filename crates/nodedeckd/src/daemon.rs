//! Daemon wiring: store, executor, orchestrator, startup sync, API server

use anyhow::{Context, Result};
use nodedeck_core::PanelConfig;
use nodedeck_db::Database;
use nodedeck_orchestrator::Orchestrator;
use nodedeck_runtime::{locate, SystemExecutor};
use nodedeck_web::AppState;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Main daemon struct
pub struct Daemon {
    config: Arc<PanelConfig>,
    db: Arc<Database>,
    orch: Arc<Orchestrator>,
}

impl Daemon {
    /// Open the store and build the orchestrator
    pub async fn new(config: PanelConfig) -> Result<Self> {
        let config = Arc::new(config);

        check_tools(&config);

        std::fs::create_dir_all(&config.apps_dir)
            .with_context(|| format!("Cannot create {}", config.apps_dir.display()))?;

        let db = Arc::new(Database::new(&config.db_path).await?);
        info!("Database initialized at {}", config.db_path.display());

        let orch = Orchestrator::new(config.clone(), db.clone(), Arc::new(SystemExecutor))?;

        Ok(Self {
            config,
            db,
            orch: Arc::new(orch),
        })
    }

    /// Rewrite every vhost once, then serve until `shutdown` resolves
    pub async fn run<F>(self, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        match self.orch.sync_vhosts().await {
            Ok(0) => {}
            Ok(count) => info!("Synced {} vhost(s) at startup", count),
            Err(e) => error!("Startup vhost sync failed: {}", e),
        }

        if self.config.api_key.is_none() {
            warn!("No API key configured; the API is open to anyone who can reach it");
        }

        let bind_addr = format!("{}:{}", self.config.bind_address, self.config.panel_port);
        let state = AppState::new(self.orch.clone(), self.config.api_key.clone());
        nodedeck_web::serve(
            &bind_addr,
            state,
            self.config.cors_origin.as_deref(),
            shutdown,
        )
        .await
        .with_context(|| format!("API server on {} failed", bind_addr))?;

        self.db.close().await;
        Ok(())
    }
}

/// Warn about missing external tools; requests that need them fail later
fn check_tools(config: &PanelConfig) {
    let nginx = config.nginx.bin.to_string_lossy();
    let tools = [
        ("git", config.git_bin.as_str()),
        ("unzip", config.unzip_bin.as_str()),
        ("pm2", config.pm2.bin.as_str()),
        ("nginx", nginx.as_ref()),
        ("certbot", config.certbot.bin.as_str()),
    ];
    for (label, program) in tools {
        match locate(program) {
            Some(path) => info!("Found {} at {}", label, path.display()),
            None => warn!("{} not found ({}); related operations will fail", label, program),
        }
    }
    if !config.node.nvm_dir.join("nvm.sh").exists() {
        warn!(
            "nvm not found under {}; install and build commands will fail",
            config.node.nvm_dir.display()
        );
    }
}
