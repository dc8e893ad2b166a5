//! Panel configuration for NodeDeck
//!
//! Configuration is assembled once at startup:
//! - a TOML, YAML, or JSON file (optional)
//! - environment overrides (`NODEDECK_*` and a few conventional names)
//!
//! The resulting [`PanelConfig`] is immutable and shared into every component.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::constants::*;
use crate::error::{Error, Result};

/// Supported configuration file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Yaml,
    Json,
}

impl ConfigFormat {
    /// Detect format from file extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "toml" => Some(ConfigFormat::Toml),
            "yaml" | "yml" => Some(ConfigFormat::Yaml),
            "json" => Some(ConfigFormat::Json),
            _ => None,
        }
    }

    /// Detect format from file path
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }
}

/// Inclusive port range apps are allocated from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PortRange {
    pub start: u16,
    pub end: u16,
}

impl Default for PortRange {
    fn default() -> Self {
        Self {
            start: DEFAULT_PORT_RANGE_START,
            end: DEFAULT_PORT_RANGE_END,
        }
    }
}

impl PortRange {
    pub fn contains(&self, port: u16) -> bool {
        port >= self.start && port <= self.end
    }

    pub fn len(&self) -> usize {
        (self.end as usize + 1).saturating_sub(self.start as usize)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Parse "4000-4999"
    pub fn parse(s: &str) -> Result<Self> {
        let (start, end) = s
            .split_once('-')
            .ok_or_else(|| Error::config(format!("Invalid port range '{}': expected START-END", s)))?;
        let start: u16 = start
            .trim()
            .parse()
            .map_err(|_| Error::config(format!("Invalid port range start in '{}'", s)))?;
        let end: u16 = end
            .trim()
            .parse()
            .map_err(|_| Error::config(format!("Invalid port range end in '{}'", s)))?;
        Ok(Self { start, end })
    }
}

/// Node.js version manager settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// nvm installation directory (contains nvm.sh and versions/node)
    pub nvm_dir: PathBuf,
    /// Version used when an app does not specify one
    pub default_version: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            nvm_dir: PathBuf::from(DEFAULT_DAEMON_HOME).join(".nvm"),
            default_version: DEFAULT_NODE_VERSION.to_string(),
        }
    }
}

/// PM2 settings. `home` and `pm2_home` pin the daemon identity so every call
/// talks to the same PM2 daemon regardless of who invoked the panel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Pm2Config {
    pub bin: String,
    pub home: PathBuf,
    pub pm2_home: PathBuf,
    /// Shell used to run the launcher script
    pub shell: String,
}

impl Default for Pm2Config {
    fn default() -> Self {
        Self {
            bin: "pm2".to_string(),
            home: PathBuf::from(DEFAULT_DAEMON_HOME),
            pm2_home: PathBuf::from(DEFAULT_DAEMON_HOME).join(".pm2"),
            shell: "/usr/bin/bash".to_string(),
        }
    }
}

/// nginx settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NginxConfig {
    pub bin: PathBuf,
    /// Directory nginx includes; one file per app is written here
    pub conf_dir: PathBuf,
}

impl Default for NginxConfig {
    fn default() -> Self {
        Self {
            bin: PathBuf::from(DEFAULT_NGINX_BIN),
            conf_dir: PathBuf::from(DEFAULT_NGINX_CONF_DIR),
        }
    }
}

/// certbot settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CertbotConfig {
    pub bin: String,
    pub email: Option<String>,
    /// Directory holding `<domain>/fullchain.pem` and `<domain>/privkey.pem`
    pub live_dir: PathBuf,
    pub log_path: PathBuf,
}

impl Default for CertbotConfig {
    fn default() -> Self {
        Self {
            bin: "certbot".to_string(),
            email: None,
            live_dir: PathBuf::from(DEFAULT_LETSENCRYPT_DIR),
            log_path: PathBuf::from(DEFAULT_CERTBOT_LOG),
        }
    }
}

/// Top-level panel configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PanelConfig {
    pub bind_address: String,
    pub panel_port: u16,
    /// When set, every API call except health must carry `X-API-Key`
    pub api_key: Option<String>,
    pub cors_origin: Option<String>,
    pub db_path: PathBuf,
    /// Root under which each app gets an id-keyed directory
    pub apps_dir: PathBuf,
    pub port_range: PortRange,
    pub port_draw_attempts: u32,
    pub git_bin: String,
    pub unzip_bin: String,
    /// Timeout for clone/install/build/extract commands
    pub command_timeout_secs: u64,
    /// Timeout for pm2/nginx/certbot calls
    pub control_timeout_secs: u64,
    pub node: NodeConfig,
    pub pm2: Pm2Config,
    pub nginx: NginxConfig,
    pub certbot: CertbotConfig,
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            panel_port: DEFAULT_PANEL_PORT,
            api_key: None,
            cors_origin: None,
            db_path: db_path(),
            apps_dir: PathBuf::from(DEFAULT_APPS_DIR),
            port_range: PortRange::default(),
            port_draw_attempts: DEFAULT_PORT_DRAW_ATTEMPTS,
            git_bin: "git".to_string(),
            unzip_bin: "unzip".to_string(),
            command_timeout_secs: DEFAULT_COMMAND_TIMEOUT_SECS,
            control_timeout_secs: DEFAULT_CONTROL_TIMEOUT_SECS,
            node: NodeConfig::default(),
            pm2: Pm2Config::default(),
            nginx: NginxConfig::default(),
            certbot: CertbotConfig::default(),
        }
    }
}

impl PanelConfig {
    /// Load config from file, automatically detecting format from extension
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::ConfigNotFound(path.to_path_buf()));
        }

        let format = ConfigFormat::from_path(path).ok_or_else(|| {
            Error::ConfigError(format!(
                "Unsupported config file extension: {}. Expected .toml, .yaml, .yml, or .json",
                path.display()
            ))
        })?;

        let content = std::fs::read_to_string(path)?;
        Self::parse(&content, format)
    }

    /// Parse config content with specified format
    pub fn parse(content: &str, format: ConfigFormat) -> Result<Self> {
        let config = match format {
            ConfigFormat::Toml => toml::from_str(content)?,
            ConfigFormat::Yaml => serde_yaml::from_str(content)?,
            ConfigFormat::Json => serde_json::from_str(content)?,
        };
        Ok(config)
    }

    /// Find a config file in `dir`, or fall back to defaults
    pub fn find_and_load(dir: &Path) -> Result<Self> {
        for name in CONFIG_FILES {
            let path = dir.join(name);
            if path.exists() {
                return Self::load(&path);
            }
        }
        Ok(Self::default())
    }

    /// Apply environment overrides from the process environment
    pub fn apply_env(self) -> Result<Self> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Apply environment overrides using a lookup function
    pub fn apply_env_from<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |keys: &[&str]| {
            keys.iter()
                .find_map(|k| lookup(k))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(v) = get(&["NODEDECK_BIND"]) {
            self.bind_address = v;
        }
        if let Some(v) = get(&["NODEDECK_PANEL_PORT", "PANEL_PORT"]) {
            self.panel_port = v
                .parse()
                .map_err(|_| Error::config(format!("Invalid panel port: {}", v)))?;
        }
        if let Some(v) = get(&["NODEDECK_API_KEY"]) {
            self.api_key = Some(v);
        }
        if let Some(v) = get(&["NODEDECK_DB_PATH", "DB_PATH"]) {
            self.db_path = PathBuf::from(v);
        }
        if let Some(v) = get(&["NODEDECK_APPS_DIR", "APPS_BASE_PATH"]) {
            self.apps_dir = PathBuf::from(v);
        }
        if let Some(v) = get(&["NODEDECK_PORT_RANGE"]) {
            self.port_range = PortRange::parse(&v)?;
        }
        if let Some(v) = get(&["NVM_DIR"]) {
            self.node.nvm_dir = PathBuf::from(v);
        }
        if let Some(v) = get(&["NGINX_APPS_CONF_DIR"]) {
            self.nginx.conf_dir = PathBuf::from(v);
        }
        if let Some(v) = get(&["NGINX_BIN"]) {
            self.nginx.bin = PathBuf::from(v);
        }
        if let Some(v) = get(&["CERTBOT_EMAIL"]) {
            self.certbot.email = Some(v);
        }
        if let Some(v) = get(&["PM2_HOME"]) {
            self.pm2.pm2_home = PathBuf::from(v);
        }

        Ok(self)
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<()> {
        if self.port_range.start == 0 || self.port_range.is_empty() {
            return Err(Error::config(format!(
                "Port range {}-{} is empty",
                self.port_range.start, self.port_range.end
            )));
        }
        if self.port_draw_attempts == 0 {
            return Err(Error::config("port_draw_attempts must be at least 1"));
        }
        if self.port_range.len() == 1 && self.port_range.contains(self.panel_port) {
            return Err(Error::config("Port range only contains the panel port"));
        }
        Ok(())
    }

    /// Directory of an app, keyed by its id
    pub fn app_dir(&self, app_id: u32) -> PathBuf {
        self.apps_dir.join(app_dir_name(app_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_config_format_detection() {
        assert_eq!(ConfigFormat::from_extension("toml"), Some(ConfigFormat::Toml));
        assert_eq!(ConfigFormat::from_extension("yml"), Some(ConfigFormat::Yaml));
        assert_eq!(ConfigFormat::from_extension("json"), Some(ConfigFormat::Json));
        assert_eq!(ConfigFormat::from_extension("ini"), None);
    }

    #[test]
    fn test_config_parse_toml() {
        let content = r#"
panel_port = 3100
apps_dir = "/srv/apps"

[port_range]
start = 5000
end = 5100

[nginx]
conf_dir = "/etc/nginx/sites-enabled"

[certbot]
email = "ops@example.com"
"#;
        let mut file = NamedTempFile::with_suffix(".toml").unwrap();
        file.write_all(content.as_bytes()).unwrap();

        let config = PanelConfig::load(file.path()).unwrap();
        assert_eq!(config.panel_port, 3100);
        assert_eq!(config.apps_dir, PathBuf::from("/srv/apps"));
        assert_eq!(config.port_range, PortRange { start: 5000, end: 5100 });
        assert_eq!(config.nginx.conf_dir, PathBuf::from("/etc/nginx/sites-enabled"));
        assert_eq!(config.certbot.email.as_deref(), Some("ops@example.com"));
        // Untouched sections keep defaults
        assert_eq!(config.pm2.bin, "pm2");
        assert_eq!(config.node.default_version, "20");
    }

    #[test]
    fn test_config_parse_yaml() {
        let content = r#"
panel_port: 8080
pm2:
  home: /home/deploy
  pm2_home: /home/deploy/.pm2
"#;
        let mut file = NamedTempFile::with_suffix(".yaml").unwrap();
        file.write_all(content.as_bytes()).unwrap();

        let config = PanelConfig::load(file.path()).unwrap();
        assert_eq!(config.panel_port, 8080);
        assert_eq!(config.pm2.home, PathBuf::from("/home/deploy"));
        assert_eq!(config.pm2.pm2_home, PathBuf::from("/home/deploy/.pm2"));
    }

    #[test]
    fn test_config_parse_json() {
        let content = r#"{ "api_key": "secret", "port_draw_attempts": 5 }"#;
        let config = PanelConfig::parse(content, ConfigFormat::Json).unwrap();
        assert_eq!(config.api_key.as_deref(), Some("secret"));
        assert_eq!(config.port_draw_attempts, 5);
    }

    #[test]
    fn test_config_not_found() {
        let result = PanelConfig::load(Path::new("/nonexistent/nodedeck.toml"));
        assert!(matches!(result, Err(Error::ConfigNotFound(_))));
    }

    #[test]
    fn test_find_and_load_defaults_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let config = PanelConfig::find_and_load(dir.path()).unwrap();
        assert_eq!(config.panel_port, DEFAULT_PANEL_PORT);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("PANEL_PORT", "3200"),
            ("APPS_BASE_PATH", "/data/apps"),
            ("NODEDECK_PORT_RANGE", "6000-6010"),
            ("CERTBOT_EMAIL", "  admin@example.com "),
            ("NVM_DIR", ""),
        ]);

        let config = PanelConfig::default()
            .apply_env_from(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.panel_port, 3200);
        assert_eq!(config.apps_dir, PathBuf::from("/data/apps"));
        assert_eq!(config.port_range, PortRange { start: 6000, end: 6010 });
        assert_eq!(config.certbot.email.as_deref(), Some("admin@example.com"));
        // Empty values are ignored
        assert_eq!(config.node.nvm_dir, PathBuf::from("/root/.nvm"));
    }

    #[test]
    fn test_env_override_rejects_bad_port() {
        let result = PanelConfig::default().apply_env_from(|k| {
            (k == "NODEDECK_PANEL_PORT").then(|| "not-a-port".to_string())
        });
        assert!(matches!(result, Err(Error::ConfigError(_))));
    }

    #[test]
    fn test_port_range() {
        let range = PortRange::parse("4000-4002").unwrap();
        assert_eq!(range.len(), 3);
        assert!(range.contains(4001));
        assert!(!range.contains(4003));
        assert!(PortRange::parse("4000").is_err());
        assert!(PortRange { start: 10, end: 5 }.is_empty());
    }

    #[test]
    fn test_validate() {
        assert!(PanelConfig::default().validate().is_ok());

        let mut config = PanelConfig::default();
        config.port_range = PortRange { start: 3000, end: 3000 };
        config.panel_port = 3000;
        assert!(config.validate().is_err());

        let mut config = PanelConfig::default();
        config.port_draw_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_app_dir_uses_id() {
        let mut config = PanelConfig::default();
        config.apps_dir = PathBuf::from("/srv/apps");
        assert_eq!(config.app_dir(3), PathBuf::from("/srv/apps/app-3"));
    }
}
