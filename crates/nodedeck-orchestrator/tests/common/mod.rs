//! Scripted host shared by the orchestrator integration tests
//!
//! A real SQLite store in a temp directory plus a `MockExecutor` that behaves
//! like git, unzip, PM2 and certbot closely enough for the orchestrator.

#![allow(dead_code)]

use nodedeck_core::{CreateApp, CreateAppRequest, PanelConfig, PortRange};
use nodedeck_db::Database;
use nodedeck_orchestrator::Orchestrator;
use nodedeck_runtime::testing::MockExecutor;
use nodedeck_runtime::{CommandOutput, CommandSpec};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

pub struct FakeHost {
    pub dir: TempDir,
    pub config: Arc<PanelConfig>,
    pub exec: MockExecutor,
    pub db: Arc<Database>,
    pub orch: Arc<Orchestrator>,
    /// PM2 entries: name -> online
    pub pm2: Arc<Mutex<BTreeMap<String, bool>>>,
    /// Remote branches; the first one is the default
    pub branches: Arc<Mutex<Vec<String>>>,
}

impl FakeHost {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        std::fs::create_dir_all(root.join("nvm/versions/node/v20.11.1")).unwrap();

        let mut config = PanelConfig::default();
        config.db_path = root.join("nodedeck.db");
        config.apps_dir = root.join("apps");
        config.port_range = PortRange {
            start: 47100,
            end: 47899,
        };
        config.node.nvm_dir = root.join("nvm");
        config.nginx.conf_dir = root.join("nginx");
        config.nginx.bin = PathBuf::from("nginx");
        config.certbot.live_dir = root.join("letsencrypt/live");
        let config = Arc::new(config);

        let exec = MockExecutor::new();
        let pm2 = Arc::new(Mutex::new(BTreeMap::new()));
        let branches = Arc::new(Mutex::new(vec!["main".to_string()]));
        install_git(&exec, branches.clone());
        install_unzip(&exec);
        install_pm2(&exec, pm2.clone());
        install_certbot(&exec, config.certbot.live_dir.clone());

        let db = Arc::new(Database::new(&config.db_path).await.unwrap());
        let orch = Orchestrator::new(config.clone(), db.clone(), Arc::new(exec.clone())).unwrap();

        Self {
            dir,
            config,
            exec,
            db,
            orch: Arc::new(orch),
            pm2,
            branches,
        }
    }

    pub fn set_branches(&self, branches: &[&str]) {
        *self.branches.lock() = branches.iter().map(|b| b.to_string()).collect();
    }

    /// Make every command containing `needle` fail with `stderr`
    pub fn fail(&self, needle: &str, stderr: &str) {
        self.exec.respond(needle, CommandOutput::failed(1, stderr));
    }

    pub fn pm2_entry(&self, id: u32) -> Option<bool> {
        self.pm2
            .lock()
            .get(&format!("nodedeck-app-{}", id))
            .copied()
    }

    pub fn app_dir(&self, id: u32) -> PathBuf {
        self.config.app_dir(id)
    }

    pub fn vhost_path(&self, id: u32) -> PathBuf {
        self.config
            .nginx
            .conf_dir
            .join(format!("nodedeck-app-{}.conf", id))
    }

    pub fn vhost(&self, id: u32) -> Option<String> {
        std::fs::read_to_string(self.vhost_path(id)).ok()
    }

    pub fn issue_certs(&self, domain: &str) {
        write_certs(&self.config.certbot.live_dir, domain);
    }

    pub fn revoke_certs(&self, domain: &str) {
        std::fs::remove_dir_all(self.config.certbot.live_dir.join(domain)).unwrap();
    }
}

/// A valid git create command
pub fn create(name: &str) -> CreateApp {
    request(name).validate().unwrap()
}

pub fn request(name: &str) -> CreateAppRequest {
    CreateAppRequest {
        name: name.to_string(),
        repo_url: Some("https://example.com/app.git".to_string()),
        ..Default::default()
    }
}

fn arg(spec: &CommandSpec, i: usize) -> String {
    spec.args.get(i).cloned().unwrap_or_default()
}

fn install_git(exec: &MockExecutor, branches: Arc<Mutex<Vec<String>>>) {
    exec.on(move |spec| {
        if spec.tool_name() != "git" {
            return None;
        }
        let branches = branches.lock();
        let default = branches.first().cloned().unwrap_or_default();
        match arg(spec, 0).as_str() {
            "clone" => {
                if let Some(i) = spec.args.iter().position(|a| a == "--branch") {
                    let wanted = arg(spec, i + 1);
                    if !branches.contains(&wanted) {
                        return Some(Ok(CommandOutput::failed(
                            128,
                            format!(
                                "warning: Could not find remote branch {0} to clone.\nfatal: Remote branch {0} not found in upstream origin",
                                wanted
                            ),
                        )));
                    }
                }
                let dest = PathBuf::from(spec.args.last()?);
                std::fs::create_dir_all(dest.join(".git")).ok()?;
                std::fs::write(dest.join("package.json"), r#"{"scripts":{"start":"node ."}}"#)
                    .ok()?;
                Some(Ok(CommandOutput::ok("")))
            }
            "rev-parse" => Some(Ok(CommandOutput::ok(format!("{}\n", default)))),
            "symbolic-ref" if arg(spec, 2) == "refs/remotes/origin/HEAD" => {
                Some(Ok(CommandOutput::ok(format!("origin/{}\n", default))))
            }
            _ => Some(Ok(CommandOutput::ok(""))),
        }
    });
}

fn install_unzip(exec: &MockExecutor) {
    exec.on(|spec| {
        if spec.tool_name() != "unzip" {
            return None;
        }
        let dest = PathBuf::from(spec.args.last()?);
        let root = dest.join("site-main");
        std::fs::create_dir_all(&root).ok()?;
        std::fs::write(root.join("package.json"), "{}").ok()?;
        Some(Ok(CommandOutput::ok("")))
    });
}

fn install_pm2(exec: &MockExecutor, procs: Arc<Mutex<BTreeMap<String, bool>>>) {
    exec.on(move |spec| {
        if spec.tool_name() != "pm2" {
            return None;
        }
        let mut procs = procs.lock();
        let not_found = |name: &str| {
            Some(Ok(CommandOutput::failed(
                1,
                format!("[PM2][ERROR] Process or Namespace {} not found", name),
            )))
        };
        let name = arg(spec, 1);
        match arg(spec, 0).as_str() {
            "jlist" => {
                let entries: Vec<String> = procs
                    .iter()
                    .map(|(n, online)| {
                        format!(
                            r#"{{"name":"{}","pm2_env":{{"status":"{}"}}}}"#,
                            n,
                            if *online { "online" } else { "stopped" }
                        )
                    })
                    .collect();
                Some(Ok(CommandOutput::ok(format!("[{}]", entries.join(",")))))
            }
            "describe" if procs.contains_key(&name) => Some(Ok(CommandOutput::ok(""))),
            "describe" => not_found(&name),
            "start" => match spec.args.iter().position(|a| a == "--name") {
                Some(i) => {
                    procs.insert(arg(spec, i + 1), true);
                    Some(Ok(CommandOutput::ok("")))
                }
                None if procs.contains_key(&name) => {
                    procs.insert(name, true);
                    Some(Ok(CommandOutput::ok("")))
                }
                None => not_found(&name),
            },
            "stop" | "restart" | "reload" => match procs.get_mut(&name) {
                Some(online) => {
                    *online = arg(spec, 0) != "stop";
                    Some(Ok(CommandOutput::ok("")))
                }
                None => not_found(&name),
            },
            "delete" => match procs.remove(&name) {
                Some(_) => Some(Ok(CommandOutput::ok(""))),
                None => not_found(&name),
            },
            "logs" => Some(Ok(CommandOutput::ok(format!("{} | listening\n", name)))),
            _ => None,
        }
    });
}

fn install_certbot(exec: &MockExecutor, live_dir: PathBuf) {
    exec.on(move |spec| {
        if spec.tool_name() != "certbot" {
            return None;
        }
        let i = spec.args.iter().position(|a| a == "-d")?;
        write_certs(&live_dir, &arg(spec, i + 1));
        Some(Ok(CommandOutput::ok("Successfully received certificate.")))
    });
}

fn write_certs(live_dir: &Path, domain: &str) {
    let dir = live_dir.join(domain);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("fullchain.pem"), "chain").unwrap();
    std::fs::write(dir.join("privkey.pem"), "key").unwrap();
}
