//! Certificate issuance through `certbot --nginx`

use nodedeck_core::{Error, PanelConfig, Result};
use nodedeck_runtime::{CommandSpec, Executor};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const FAILURE_KEYWORDS: &[&str] = &[
    "error",
    "failed",
    "refused",
    "timeout",
    "timed out",
    "nxdomain",
    "denied",
    "unauthorized",
    "invalid",
    "too many",
];

const BOILERPLATE: &[&str] = &[
    "see the logfile",
    "ask for help",
    "saving debug log",
    "for more details",
    "letsencrypt.log",
];

pub struct Certbot {
    exec: Arc<dyn Executor>,
    bin: String,
    email: Option<String>,
    log_path: PathBuf,
    timeout: Duration,
}

impl Certbot {
    pub fn new(exec: Arc<dyn Executor>, config: &PanelConfig) -> Self {
        Self {
            exec,
            bin: config.certbot.bin.clone(),
            email: config.certbot.email.clone().filter(|e| !e.trim().is_empty()),
            log_path: config.certbot.log_path.clone(),
            timeout: Duration::from_secs(config.command_timeout_secs),
        }
    }

    /// Obtain a certificate for `domain`.
    ///
    /// nginx must already serve an HTTP vhost for the domain.
    pub async fn obtain(&self, domain: &str) -> Result<()> {
        let mut spec = CommandSpec::new(&self.bin)
            .args(["--nginx", "-d", domain, "--non-interactive", "--agree-tos"])
            .timeout(self.timeout);
        spec = match &self.email {
            Some(email) => spec.args(["--email", email.as_str()]),
            None => spec.arg("--register-unsafely-without-email"),
        };

        info!("Requesting certificate for {}", domain);
        let output = self
            .exec
            .run(&spec)
            .await
            .map_err(|e| Error::Certificate(e.to_string()))?;
        if output.success() {
            info!("Certificate issued for {}", domain);
            return Ok(());
        }

        let reason = extract_certbot_error(&output.combined(), &self.log_path);
        warn!("certbot failed for {}: {}", domain, reason);
        Err(Error::Certificate(reason))
    }
}

/// One actionable line from certbot's output
pub fn extract_certbot_error(output: &str, log_path: &Path) -> String {
    let lines: Vec<&str> = output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| {
            let lower = line.to_lowercase();
            !BOILERPLATE.iter().any(|b| lower.contains(b))
        })
        .collect();

    lines
        .iter()
        .find(|line| {
            let lower = line.to_lowercase();
            FAILURE_KEYWORDS.iter().any(|k| lower.contains(k))
        })
        .map(|line| line.to_string())
        .unwrap_or_else(|| format!("certbot failed; see {}", log_path.display()))
}
