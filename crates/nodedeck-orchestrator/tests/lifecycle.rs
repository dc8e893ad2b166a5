//! End-to-end orchestrator behaviour against a scripted host

mod common;

use common::{create, request, FakeHost};
use futures::future::join_all;
use nodedeck_core::{
    ActivityAction, AppSource, Error, ErrorKind, PhaseEvent, PhaseStep, ProcessState,
    RedeployApp, UpdateAppRequest, WarningKind,
};
use nodedeck_db::RecordStore;
use std::collections::HashSet;

#[tokio::test]
async fn test_deploy_without_domain_runs_app() {
    let host = FakeHost::new().await;

    let outcome = host.orch.deploy(create("shop")).await.unwrap();
    let view = outcome.value;

    assert!(outcome.warnings.is_empty());
    assert_eq!(view.status, ProcessState::Running);
    assert!(!view.ssl_active);
    assert!(host.config.port_range.contains(view.app.port));
    assert_eq!(host.pm2_entry(view.app.id), Some(true));
    assert!(host.app_dir(view.app.id).join("package.json").exists());
    assert!(host.vhost(view.app.id).is_none());
    assert!(host.exec.calls_to("nginx").is_empty());

    // The default branch was resolved and persisted
    assert_eq!(view.app.source.git_ref(), Some("main"));

    let activity = host.orch.activity(10).await.unwrap();
    assert_eq!(activity[0].action, ActivityAction::Created);
    assert_eq!(activity[0].app_id, view.app.id);
}

#[tokio::test]
async fn test_deploy_streams_phase_events() {
    let host = FakeHost::new().await;
    let mut req = request("api");
    req.build_cmd = Some("npm run build".to_string());
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

    host.orch
        .deploy_with_progress(req.validate().unwrap(), None, &tx)
        .await
        .unwrap();
    drop(tx);

    let mut steps = Vec::new();
    let mut last = None;
    while let Some(event) = rx.recv().await {
        if let PhaseEvent::Progress { step, .. } = &event {
            steps.push(*step);
        }
        last = Some(event);
    }
    assert_eq!(
        steps,
        vec![
            PhaseStep::Validate,
            PhaseStep::Clone,
            PhaseStep::Install,
            PhaseStep::Build,
            PhaseStep::Start
        ]
    );
    assert!(matches!(last, Some(PhaseEvent::Done { .. })));
}

#[tokio::test]
async fn test_failed_build_rolls_back_everything() {
    let host = FakeHost::new().await;
    host.fail("npm run build", "error TS2304: Cannot find name 'foo'");
    let mut req = request("broken");
    req.build_cmd = Some("npm run build".to_string());
    req.domain = Some("broken.example.com".to_string());
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

    let err = host
        .orch
        .deploy_with_progress(req.validate().unwrap(), None, &tx)
        .await
        .unwrap_err();
    drop(tx);

    assert_eq!(err.kind(), ErrorKind::External);
    assert!(err.to_string().contains("TS2304"));

    assert!(host.db.list().await.unwrap().is_empty());
    assert!(host.pm2.lock().is_empty());
    assert!(!host.app_dir(1).exists());
    assert!(host.vhost(1).is_none());

    let mut failed = None;
    while let Some(event) = rx.recv().await {
        if let PhaseEvent::Failed { step, message } = event {
            failed = Some((step, message));
        }
    }
    let (step, message) = failed.unwrap();
    assert_eq!(step, PhaseStep::Build);
    assert!(message.contains("TS2304"));
}

#[tokio::test]
async fn test_failed_start_rolls_back_pm2_entry() {
    let host = FakeHost::new().await;
    host.fail("--name nodedeck-app-1", "spawn /usr/bin/bash EACCES");

    let err = host.orch.deploy(create("web")).await.unwrap_err();
    assert!(err.to_string().contains("EACCES"));
    assert!(host.db.get(1).await.unwrap().is_none());
    assert!(!host.app_dir(1).exists());
}

#[tokio::test]
async fn test_validation_happens_before_side_effects() {
    let host = FakeHost::new().await;
    let mut req = request("old-node");
    req.node_version = Some("16".to_string());

    let err = host.orch.deploy(req.validate().unwrap()).await.unwrap_err();
    assert!(matches!(err, Error::NodeVersionMissing(ref v) if v == "16"));
    assert!(host.exec.calls().is_empty());
    assert!(host.db.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_duplicate_name_is_conflict() {
    let host = FakeHost::new().await;
    host.orch.deploy(create("shop")).await.unwrap();
    let err = host.orch.deploy(create("shop")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert_eq!(host.db.list().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_null_ref_resolves_master_default() {
    let host = FakeHost::new().await;
    host.set_branches(&["master"]);

    let view = host.orch.deploy(create("legacy")).await.unwrap().value;
    assert_eq!(view.app.source.git_ref(), Some("master"));

    let stored = host.db.get(view.app.id).await.unwrap().unwrap();
    assert_eq!(stored.source.git_ref(), Some("master"));
}

#[tokio::test]
async fn test_main_falls_back_to_master() {
    let host = FakeHost::new().await;
    host.set_branches(&["master", "develop"]);
    let mut req = request("legacy");
    req.git_ref = Some("main".to_string());

    let view = host.orch.deploy(req.validate().unwrap()).await.unwrap().value;
    assert_eq!(view.app.source.git_ref(), Some("master"));
    assert!(host.exec.was_called("clone --branch master"));
}

#[tokio::test]
async fn test_missing_branch_fails_with_hint() {
    let host = FakeHost::new().await;
    let mut req = request("feature");
    req.git_ref = Some("feature/x".to_string());

    let err = host.orch.deploy(req.validate().unwrap()).await.unwrap_err();
    assert!(err.to_string().contains("feature/x"));
    assert!(host.db.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_concurrent_deploys_never_share_a_port() {
    let host = FakeHost::new().await;
    let deploys = (0..8).map(|i| {
        let orch = host.orch.clone();
        async move { orch.deploy(create(&format!("app-{}", i))).await }
    });
    let results = join_all(deploys).await;

    let mut ports = HashSet::new();
    for result in results {
        match result {
            Ok(outcome) => assert!(ports.insert(outcome.value.app.port)),
            Err(e) => assert_eq!(e.kind(), ErrorKind::Conflict),
        }
    }
    let stored: Vec<u16> = host.db.ports().await.unwrap();
    let unique: HashSet<u16> = stored.iter().copied().collect();
    assert_eq!(unique.len(), stored.len());
}

#[tokio::test]
async fn test_stop_twice_is_idempotent() {
    let host = FakeHost::new().await;
    let id = host.orch.deploy(create("shop")).await.unwrap().value.app.id;

    let view = host.orch.stop(id).await.unwrap();
    assert_eq!(view.status, ProcessState::Stopped);
    let view = host.orch.stop(id).await.unwrap();
    assert_eq!(view.status, ProcessState::Stopped);
}

#[tokio::test]
async fn test_restart_without_entry_behaves_like_start() {
    let host = FakeHost::new().await;
    let mut req = request("idle");
    req.auto_start = Some(false);
    let id = host
        .orch
        .deploy(req.validate().unwrap())
        .await
        .unwrap()
        .value
        .app
        .id;
    assert_eq!(host.pm2_entry(id), None);

    let view = host.orch.restart(id).await.unwrap();
    assert_eq!(view.status, ProcessState::Running);
    assert_eq!(host.pm2_entry(id), Some(true));
}

#[tokio::test]
async fn test_action_on_busy_app_is_rejected() {
    let host = FakeHost::new().await;
    let id = host.orch.deploy(create("shop")).await.unwrap().value.app.id;

    let guard = host.orch.locks().try_acquire(id).unwrap();
    let err = host.orch.stop(id).await.unwrap_err();
    assert!(matches!(err, Error::Busy(busy) if busy == id));
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert_eq!(host.pm2_entry(id), Some(true));

    drop(guard);
    host.orch.stop(id).await.unwrap();
}

#[tokio::test]
async fn test_back_to_back_start_and_stop() {
    let host = FakeHost::new().await;
    let id = host.orch.deploy(create("shop")).await.unwrap().value.app.id;

    let (start, stop) = tokio::join!(host.orch.start(id), host.orch.stop(id));
    for result in [start.map(|_| ()), stop.map(|_| ())] {
        if let Err(e) = result {
            assert!(matches!(e, Error::Busy(_)));
        }
    }
    // Whatever interleaving happened, PM2 holds exactly one consistent entry
    assert!(host.pm2_entry(id).is_some());
    assert!(!host.orch.locks().is_busy(id));
}

#[tokio::test]
async fn test_unknown_app_is_not_found() {
    let host = FakeHost::new().await;
    assert_eq!(host.orch.start(99).await.unwrap_err().kind(), ErrorKind::NotFound);
    assert_eq!(host.orch.teardown(99).await.unwrap_err().kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_update_adds_http_vhost_without_certbot() {
    let host = FakeHost::new().await;
    let id = host.orch.deploy(create("shop")).await.unwrap().value.app.id;
    host.exec.clear_calls();

    let cmd = UpdateAppRequest {
        domain: Some(Some("app.example.com".to_string())),
        ssl_enabled: Some(false),
        ..Default::default()
    }
    .validate()
    .unwrap();
    let outcome = host.orch.update(id, cmd).await.unwrap();

    assert!(outcome.warnings.is_empty());
    let vhost = host.vhost(id).unwrap();
    assert!(vhost.contains("server_name app.example.com;"));
    assert!(vhost.contains(&format!("proxy_pass http://127.0.0.1:{};", outcome.value.app.port)));
    assert!(!vhost.contains("listen 443"));
    assert!(host.exec.was_called("nginx -t"));
    assert!(host.exec.was_called("nginx -s reload"));
    assert!(host.exec.calls_to("certbot").is_empty());
}

#[tokio::test]
async fn test_update_restart_policy_leaves_nginx_alone() {
    let host = FakeHost::new().await;
    let mut req = request("shop");
    req.domain = Some("shop.example.com".to_string());
    let id = host.orch.deploy(req.validate().unwrap()).await.unwrap().value.app.id;
    host.exec.clear_calls();

    let cmd = UpdateAppRequest {
        max_restarts: Some(Some(3)),
        ..Default::default()
    }
    .validate()
    .unwrap();
    let outcome = host.orch.update(id, cmd).await.unwrap();

    assert_eq!(outcome.value.app.max_restarts, Some(3));
    assert!(host.exec.calls_to("nginx").is_empty());
}

#[tokio::test]
async fn test_domain_update_on_busy_app_is_rejected() {
    let host = FakeHost::new().await;
    let id = host.orch.deploy(create("shop")).await.unwrap().value.app.id;
    let guard = host.orch.locks().try_acquire(id).unwrap();

    let domain = UpdateAppRequest {
        domain: Some(Some("app.example.com".to_string())),
        ..Default::default()
    }
    .validate()
    .unwrap();
    let err = host.orch.update(id, domain).await.unwrap_err();
    assert!(matches!(err, Error::Busy(busy) if busy == id));
    assert_eq!(host.orch.get(id).await.unwrap().app.domain, None);
    assert!(host.vhost(id).is_none());

    // Settings that leave the proxy alone do not wait for the action
    let policy = UpdateAppRequest {
        max_restarts: Some(Some(3)),
        ..Default::default()
    }
    .validate()
    .unwrap();
    let outcome = host.orch.update(id, policy).await.unwrap();
    assert_eq!(outcome.value.app.max_restarts, Some(3));

    drop(guard);
    let domain = UpdateAppRequest {
        domain: Some(Some("app.example.com".to_string())),
        ..Default::default()
    }
    .validate()
    .unwrap();
    host.orch.update(id, domain).await.unwrap();
    assert!(host.vhost(id).is_some());
    assert!(!host.orch.locks().is_busy(id));
}

#[tokio::test]
async fn test_update_reports_reload_failure_as_warning() {
    let host = FakeHost::new().await;
    let id = host.orch.deploy(create("shop")).await.unwrap().value.app.id;
    host.fail("nginx -t", "nginx: [emerg] duplicate listen options");

    let cmd = UpdateAppRequest {
        domain: Some(Some("app.example.com".to_string())),
        ..Default::default()
    }
    .validate()
    .unwrap();
    let outcome = host.orch.update(id, cmd).await.unwrap();

    assert_eq!(outcome.warnings.len(), 1);
    assert_eq!(outcome.warnings[0].kind, WarningKind::ProxyReload);
    assert!(outcome.warnings[0].message.starts_with("Settings saved but proxy reload failed"));
    let stored = host.db.get(id).await.unwrap().unwrap();
    assert_eq!(stored.domain.as_deref(), Some("app.example.com"));
}

#[tokio::test]
async fn test_update_removing_domain_deletes_vhost() {
    let host = FakeHost::new().await;
    let mut req = request("shop");
    req.domain = Some("shop.example.com".to_string());
    let id = host.orch.deploy(req.validate().unwrap()).await.unwrap().value.app.id;
    assert!(host.vhost(id).is_some());

    let cmd = UpdateAppRequest {
        domain: Some(None),
        ..Default::default()
    }
    .validate()
    .unwrap();
    host.orch.update(id, cmd).await.unwrap();
    assert!(host.vhost(id).is_none());
}

#[tokio::test]
async fn test_deploy_with_tls_issues_certificate() {
    let host = FakeHost::new().await;
    let mut req = request("secure");
    req.domain = Some("secure.example.com".to_string());
    req.ssl_enabled = true;

    let outcome = host.orch.deploy(req.validate().unwrap()).await.unwrap();
    let id = outcome.value.app.id;

    assert!(outcome.warnings.is_empty());
    assert!(outcome.value.ssl_active);
    let vhost = host.vhost(id).unwrap();
    assert!(vhost.contains("listen 443 ssl;"));
    assert!(vhost.contains("return 301 https://$host$request_uri;"));

    // HTTP vhost and reload come before certbot, the TLS vhost after
    let lines = host.exec.command_lines();
    let first_reload = lines.iter().position(|l| l.ends_with("-s reload")).unwrap();
    let certbot = lines.iter().position(|l| l.starts_with("certbot")).unwrap();
    let last_reload = lines.iter().rposition(|l| l.ends_with("-s reload")).unwrap();
    assert!(first_reload < certbot && certbot < last_reload);
}

#[tokio::test]
async fn test_certificate_failure_is_warning() {
    let host = FakeHost::new().await;
    host.fail(
        "certbot",
        "Saving debug log to /var/log/letsencrypt/letsencrypt.log\nDNS problem: NXDOMAIN looking up A for secure.example.com",
    );
    let mut req = request("secure");
    req.domain = Some("secure.example.com".to_string());
    req.ssl_enabled = true;

    let outcome = host.orch.deploy(req.validate().unwrap()).await.unwrap();

    assert_eq!(outcome.value.status, ProcessState::Running);
    assert!(!outcome.value.ssl_active);
    assert_eq!(outcome.warnings.len(), 1);
    assert_eq!(outcome.warnings[0].kind, WarningKind::Certificate);
    assert!(outcome.warnings[0].message.contains("NXDOMAIN"));
    assert!(!host.vhost(outcome.value.app.id).unwrap().contains("443"));
}

#[tokio::test]
async fn test_existing_certificate_is_reused() {
    let host = FakeHost::new().await;
    host.issue_certs("secure.example.com");
    let mut req = request("secure");
    req.domain = Some("secure.example.com".to_string());
    req.ssl_enabled = true;

    let outcome = host.orch.deploy(req.validate().unwrap()).await.unwrap();
    assert!(outcome.value.ssl_active);
    assert!(host.exec.calls_to("certbot").is_empty());
}

#[tokio::test]
async fn test_teardown_removes_everything() {
    let host = FakeHost::new().await;
    let mut req = request("shop");
    req.domain = Some("shop.example.com".to_string());
    let id = host.orch.deploy(req.validate().unwrap()).await.unwrap().value.app.id;

    let outcome = host.orch.teardown(id).await.unwrap();

    assert!(outcome.warnings.is_empty());
    assert!(host.db.get(id).await.unwrap().is_none());
    assert_eq!(host.pm2_entry(id), None);
    assert!(host.vhost(id).is_none());
    assert!(!host.app_dir(id).exists());
    let activity = host.orch.activity(1).await.unwrap();
    assert_eq!(activity[0].action, ActivityAction::Deleted);
}

#[tokio::test]
async fn test_teardown_with_failing_pm2_still_deletes_row() {
    let host = FakeHost::new().await;
    let id = host.orch.deploy(create("shop")).await.unwrap().value.app.id;
    host.fail("pm2 delete", "connect ECONNREFUSED /root/.pm2/rpc.sock");

    let outcome = host.orch.teardown(id).await.unwrap();

    assert_eq!(outcome.warnings.len(), 1);
    assert_eq!(outcome.warnings[0].kind, WarningKind::Teardown);
    assert!(outcome.warnings[0].message.contains("ECONNREFUSED"));
    assert!(host.db.get(id).await.unwrap().is_none());
    assert!(!host.app_dir(id).exists());
}

#[tokio::test]
async fn test_redeploy_restart_failure_is_warning() {
    let host = FakeHost::new().await;
    let id = host.orch.deploy(create("shop")).await.unwrap().value.app.id;
    host.fail("pm2 restart", "connect EACCES /root/.pm2/rpc.sock");

    let outcome = host
        .orch
        .redeploy(
            id,
            RedeployApp {
                git_ref: Some("v2.0.0".to_string()),
                no_start: false,
            },
        )
        .await
        .unwrap();

    assert_eq!(outcome.warnings.len(), 1);
    assert_eq!(outcome.warnings[0].kind, WarningKind::Restart);
    assert_eq!(outcome.value.app.source.git_ref(), Some("v2.0.0"));
    assert!(host.exec.was_called("checkout v2.0.0"));
}

#[tokio::test]
async fn test_redeploy_no_start_skips_restart() {
    let host = FakeHost::new().await;
    let id = host.orch.deploy(create("shop")).await.unwrap().value.app.id;
    host.exec.clear_calls();

    host.orch
        .redeploy(
            id,
            RedeployApp {
                git_ref: None,
                no_start: true,
            },
        )
        .await
        .unwrap();

    assert!(host.exec.was_called("fetch --all --tags --prune"));
    assert!(!host.exec.was_called("pm2 restart"));
}

#[tokio::test]
async fn test_redeploy_install_failure_keeps_app() {
    let host = FakeHost::new().await;
    let id = host.orch.deploy(create("shop")).await.unwrap().value.app.id;
    host.fail("npm install", "npm ERR! code ERESOLVE");

    let err = host
        .orch
        .redeploy(id, RedeployApp::default())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("ERESOLVE"));
    assert!(host.db.get(id).await.unwrap().is_some());
    assert!(host.app_dir(id).exists());
}

#[tokio::test]
async fn test_pull_with_ref_override() {
    let host = FakeHost::new().await;
    let id = host.orch.deploy(create("shop")).await.unwrap().value.app.id;
    host.exec.clear_calls();

    let view = host.orch.pull(id, Some("develop".to_string())).await.unwrap();
    assert_eq!(view.app.source.git_ref(), Some("develop"));
    assert!(host.exec.was_called("checkout develop"));
    assert!(host.exec.calls_to("bash").is_empty());

    let activity = host.orch.activity(1).await.unwrap();
    assert_eq!(activity[0].action, ActivityAction::Pulled);
}

#[tokio::test]
async fn test_upload_deploy() {
    let host = FakeHost::new().await;
    let archive = host.dir.path().join("site.zip");
    std::fs::write(&archive, b"PK").unwrap();
    let cmd = request("site").validate_upload().unwrap();

    let view = host.orch.deploy_upload(cmd, &archive).await.unwrap().value;

    assert_eq!(view.app.source, AppSource::Upload);
    assert!(host.app_dir(view.app.id).join("package.json").exists());
    assert!(host.exec.calls_to("git").is_empty());

    let err = host.orch.pull(view.app.id, None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn test_env_file_round_trip() {
    let host = FakeHost::new().await;
    let id = host.orch.deploy(create("shop")).await.unwrap().value.app.id;

    assert_eq!(host.orch.read_env(id).await.unwrap(), "");
    host.orch
        .write_env(id, "DATABASE_URL=postgres://db/shop\n")
        .await
        .unwrap();
    assert_eq!(
        host.orch.read_env(id).await.unwrap(),
        "DATABASE_URL=postgres://db/shop\n"
    );
}

#[tokio::test]
async fn test_sync_keeps_existing_tls_block() {
    let host = FakeHost::new().await;
    let mut req = request("secure");
    req.domain = Some("secure.example.com".to_string());
    req.ssl_enabled = true;
    let id = host.orch.deploy(req.validate().unwrap()).await.unwrap().value.app.id;
    assert!(host.vhost(id).unwrap().contains("listen 443"));

    // Certificates unreadable from the panel's point of view
    host.revoke_certs("secure.example.com");
    host.exec.clear_calls();

    assert_eq!(host.orch.sync_vhosts().await.unwrap(), 1);
    assert!(host.vhost(id).unwrap().contains("listen 443"));
    assert_eq!(host.exec.calls_to("nginx").len(), 2);
}

#[tokio::test]
async fn test_list_and_logs() {
    let host = FakeHost::new().await;
    let first = host.orch.deploy(create("one")).await.unwrap().value.app.id;
    let second = host.orch.deploy(create("two")).await.unwrap().value.app.id;
    host.orch.stop(first).await.unwrap();

    let views = host.orch.list().await.unwrap();
    assert_eq!(views.len(), 2);
    assert_eq!(views[0].app.id, second);
    assert_eq!(views[0].status, ProcessState::Running);
    assert_eq!(views[1].status, ProcessState::Stopped);

    let logs = host.orch.tail_logs(second, 20).await.unwrap();
    assert!(logs.contains("listening"));
}
