//! CLI argument definitions and config resolution

use anyhow::{Context, Result};
use clap::Parser;
use nodedeck_core::{constants, PanelConfig};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "nodedeckd")]
#[command(version, about = "Deployment control plane for Node.js apps (git, PM2, nginx, certbot)")]
pub struct Cli {
    /// Config file (.toml, .yaml, .yml or .json)
    #[arg(short, long, env = "NODEDECK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Address to bind the API to, overriding the config
    #[arg(long)]
    pub bind: Option<String>,

    /// API port, overriding the config
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Validate the configuration, print it as JSON and exit
    #[arg(long)]
    pub check: bool,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    pub fn log_filter(&self) -> String {
        let level = match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        };
        [
            "nodedeckd",
            "nodedeck_orchestrator",
            "nodedeck_web",
            "nodedeck_db",
            "nodedeck_source",
            "nodedeck_pm2",
            "nodedeck_proxy",
            "nodedeck_runtime",
        ]
        .iter()
        .map(|target| format!("{}={}", target, level))
        .chain(std::iter::once("tower_http=info".to_string()))
        .collect::<Vec<_>>()
        .join(",")
    }

    /// File config (explicit path, working directory, then NodeDeck home),
    /// then environment overrides, then flags
    pub fn resolve_config(&self) -> Result<PanelConfig> {
        let config = match &self.config {
            Some(path) => PanelConfig::load(path)
                .with_context(|| format!("Failed to load {}", path.display()))?,
            None => {
                let cwd = std::env::current_dir().context("Cannot read working directory")?;
                let dir = if has_config_file(&cwd) {
                    cwd
                } else {
                    constants::nodedeck_home()
                };
                PanelConfig::find_and_load(&dir)?
            }
        };

        let mut config = config.apply_env()?;
        if let Some(bind) = &self.bind {
            config.bind_address = bind.clone();
        }
        if let Some(port) = self.port {
            config.panel_port = port;
        }
        config.validate()?;
        Ok(config)
    }
}

fn has_config_file(dir: &std::path::Path) -> bool {
    constants::CONFIG_FILES
        .iter()
        .any(|name| dir.join(name).exists())
}
