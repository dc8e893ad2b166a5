//! Per-app nginx vhost files
//!
//! Each app with a domain owns exactly one file, `nodedeck-app-{id}.conf`, in a
//! directory nginx includes. Apps without a domain own no file.

use nodedeck_core::{vhost_file_name, App, Error, PanelConfig, Result};
use nodedeck_runtime::{CommandSpec, Executor};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// What `write` left on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VhostMode {
    /// No domain; any previous file was removed
    None,
    Http,
    Tls,
}

const PROXY_HEADERS: &str = "    proxy_http_version 1.1;
    proxy_set_header Upgrade $http_upgrade;
    proxy_set_header Connection 'upgrade';
    proxy_set_header Host $host;
    proxy_set_header X-Real-IP $remote_addr;
    proxy_set_header X-Forwarded-For $proxy_add_x_forwarded_for;
    proxy_set_header X-Forwarded-Proto $scheme;";

fn location_block(port: u16) -> String {
    format!(
        "  location / {{\n    proxy_pass http://127.0.0.1:{};\n{}\n  }}",
        port, PROXY_HEADERS
    )
}

/// Plain HTTP vhost forwarding to the app's local port
pub fn render_http(domain: &str, port: u16) -> String {
    format!(
        "server {{\n  listen 80;\n  server_name {};\n{}\n}}\n",
        domain,
        location_block(port)
    )
}

/// HTTP to HTTPS redirect plus a TLS server block
pub fn render_tls(domain: &str, port: u16, cert: &Path, key: &Path) -> String {
    format!(
        "server {{\n  listen 80;\n  server_name {domain};\n  return 301 https://$host$request_uri;\n}}\n\
         server {{\n  listen 443 ssl;\n  server_name {domain};\n  ssl_certificate {cert};\n  ssl_certificate_key {key};\n{location}\n}}\n",
        domain = domain,
        cert = cert.display(),
        key = key.display(),
        location = location_block(port)
    )
}

/// Writes, removes and reloads app vhosts
pub struct NginxWriter {
    exec: Arc<dyn Executor>,
    bin: String,
    conf_dir: PathBuf,
    live_dir: PathBuf,
    timeout: Duration,
}

impl NginxWriter {
    pub fn new(exec: Arc<dyn Executor>, config: &PanelConfig) -> Self {
        Self {
            exec,
            bin: config.nginx.bin.to_string_lossy().into_owned(),
            conf_dir: config.nginx.conf_dir.clone(),
            live_dir: config.certbot.live_dir.clone(),
            timeout: Duration::from_secs(config.control_timeout_secs),
        }
    }

    pub fn conf_path(&self, app_id: u32) -> PathBuf {
        self.conf_dir.join(vhost_file_name(app_id))
    }

    /// Certificate chain and key paths for a domain
    pub fn cert_paths(&self, domain: &str) -> (PathBuf, PathBuf) {
        let dir = self.live_dir.join(domain);
        (dir.join("fullchain.pem"), dir.join("privkey.pem"))
    }

    /// Both certificate files are readable. Never fails.
    pub fn certs_exist(&self, domain: &str) -> bool {
        let (cert, key) = self.cert_paths(domain);
        cert.is_file() && key.is_file()
    }

    /// Write the app's vhost.
    ///
    /// With `http_only` the HTTP vhost is always written; certbot needs it to
    /// validate the domain. Otherwise TLS is emitted when the app wants it and
    /// either the certificates are present or `force_tls` vouches for them.
    pub async fn write(&self, app: &App, http_only: bool, force_tls: bool) -> Result<VhostMode> {
        let path = self.conf_path(app.id);
        let Some(domain) = app.domain() else {
            self.remove(app.id).await?;
            return Ok(VhostMode::None);
        };
        let domain = domain.trim();

        tokio::fs::create_dir_all(&self.conf_dir).await?;

        let tls = !http_only && app.ssl_enabled && (force_tls || self.certs_exist(domain));
        let (body, mode) = if tls {
            let (cert, key) = self.cert_paths(domain);
            (render_tls(domain, app.port, &cert, &key), VhostMode::Tls)
        } else {
            (render_http(domain, app.port), VhostMode::Http)
        };

        tokio::fs::write(&path, body).await?;
        debug!("Wrote {:?} vhost for {} to {}", mode, domain, path.display());
        Ok(mode)
    }

    /// Delete the app's vhost file if present
    pub async fn remove(&self, app_id: u32) -> Result<()> {
        let path = self.conf_path(app_id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!("Removed {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Test the configuration, then signal nginx to reload it.
    /// A failed test leaves the running nginx untouched.
    pub async fn reload(&self) -> Result<()> {
        let test = self.nginx(["-t"]);
        let output = self
            .exec
            .run(&test)
            .await
            .map_err(|e| Error::ProxyReload(e.to_string()))?;
        if !output.success() {
            let diagnostic = output.error_text();
            warn!("nginx config test failed: {}", diagnostic);
            return Err(Error::ProxyReload(diagnostic));
        }

        let output = self
            .exec
            .run(&self.nginx(["-s", "reload"]))
            .await
            .map_err(|e| Error::ProxyReload(e.to_string()))?;
        if !output.success() {
            return Err(Error::ProxyReload(output.error_text()));
        }
        info!("nginx reloaded");
        Ok(())
    }

    /// Current vhost text, if any
    pub async fn read(&self, app_id: u32) -> Option<String> {
        tokio::fs::read_to_string(self.conf_path(app_id)).await.ok()
    }

    /// The existing vhost already serves TLS
    pub async fn config_has_tls(&self, app_id: u32) -> bool {
        self.read(app_id)
            .await
            .is_some_and(|text| text.contains("listen 443") && text.contains("ssl_certificate"))
    }

    fn nginx<const N: usize>(&self, args: [&str; N]) -> CommandSpec {
        CommandSpec::new(&self.bin).args(args).timeout(self.timeout)
    }
}
