//! Route handlers: decode, validate, call the orchestrator, wrap the result

use axum::{
    body::Bytes,
    extract::{Multipart, Path, Query, State},
    response::{IntoResponse, Json, Response},
};
use nodedeck_core::{
    clamp_log_lines, AppView, CreateApp, CreateAppRequest, EnvFileRequest, Error, Outcome,
    RedeployApp, RedeployRequest, SuggestRequest, UpdateAppRequest,
};
use nodedeck_orchestrator::Orchestrator;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::NamedTempFile;
use tracing::{error, info};

use crate::error::{ApiError, ApiResponse, ApiResult};
use crate::stream;
use crate::AppState;

const DEFAULT_ACTIVITY_LIMIT: usize = 50;
const MAX_ACTIVITY_LIMIT: usize = 500;

#[derive(Debug, Default, Deserialize)]
pub struct StreamQuery {
    pub stream: Option<String>,
}

impl StreamQuery {
    fn enabled(&self) -> bool {
        matches!(self.stream.as_deref(), Some("1" | "true" | "yes"))
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct LogsQuery {
    pub lines: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ActivityQuery {
    pub limit: Option<usize>,
}

fn ok<T: serde::Serialize>(data: T) -> Response {
    Json(ApiResponse::ok(data)).into_response()
}

fn outcome<T: serde::Serialize>(outcome: Outcome<T>) -> Response {
    Json(ApiResponse::with_warnings(outcome.value, outcome.warnings)).into_response()
}

/// Empty bodies decode to the default value
fn parse_optional<T: DeserializeOwned + Default>(body: &Bytes) -> ApiResult<T> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| ApiError(Error::validation("body", format!("invalid JSON: {}", e))))
}

/// Run a deploy-style task on its own task so a disconnecting client does
/// not cancel it halfway
async fn detached<F>(task: F) -> ApiResult<Outcome<AppView>>
where
    F: Future<Output = nodedeck_core::Result<Outcome<AppView>>> + Send + 'static,
{
    match tokio::spawn(task).await {
        Ok(result) => Ok(result?),
        Err(e) => {
            error!("Deploy task panicked: {}", e);
            Err(ApiError(Error::config(format!("deploy task aborted: {}", e))))
        }
    }
}

// === System ===

pub async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION")
    })))
}

pub async fn node_versions(State(state): State<AppState>) -> Response {
    ok(state.orch.node_versions())
}

pub async fn activity(
    State(state): State<AppState>,
    Query(query): Query<ActivityQuery>,
) -> ApiResult<Response> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_ACTIVITY_LIMIT)
        .clamp(1, MAX_ACTIVITY_LIMIT);
    Ok(ok(state.orch.activity(limit).await?))
}

pub async fn suggest(
    State(state): State<AppState>,
    Json(req): Json<SuggestRequest>,
) -> ApiResult<Response> {
    let cmd = req.validate()?;
    Ok(ok(state.orch.suggest(&cmd).await?))
}

// === Apps ===

pub async fn list_apps(State(state): State<AppState>) -> ApiResult<Response> {
    Ok(ok(state.orch.list().await?))
}

pub async fn get_app(State(state): State<AppState>, Path(id): Path<u32>) -> ApiResult<Response> {
    Ok(ok(state.orch.get(id).await?))
}

pub async fn create_app(
    State(state): State<AppState>,
    Query(query): Query<StreamQuery>,
    Json(req): Json<CreateAppRequest>,
) -> ApiResult<Response> {
    let cmd = req.validate()?;
    info!("Deploy requested for '{}'", cmd.name);
    deploy(state.orch, cmd, None, query.enabled()).await
}

/// Multipart create: an `archive` (or `file`) zip part plus the same text
/// fields as the JSON body
pub async fn upload_app(
    State(state): State<AppState>,
    Query(query): Query<StreamQuery>,
    mut multipart: Multipart,
) -> ApiResult<Response> {
    let mut req = CreateAppRequest::default();
    let mut archive: Option<NamedTempFile> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError(Error::validation("archive", e.body_text())))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if name == "archive" || name == "file" {
            let data = field
                .bytes()
                .await
                .map_err(|e| ApiError(Error::validation("archive", e.body_text())))?;
            let file = tempfile::Builder::new()
                .prefix("nodedeck-upload-")
                .suffix(".zip")
                .tempfile()
                .map_err(Error::from)?;
            tokio::fs::write(file.path(), &data)
                .await
                .map_err(Error::from)?;
            archive = Some(file);
            continue;
        }

        let value = field
            .text()
            .await
            .map_err(|e| ApiError(Error::validation("body", e.body_text())))?;
        apply_form_field(&mut req, &name, value)?;
    }

    let archive = archive.ok_or_else(|| {
        ApiError(Error::validation("archive", "a .zip archive is required"))
    })?;
    let cmd = req.validate_upload()?;
    info!("Upload deploy requested for '{}'", cmd.name);
    deploy(state.orch, cmd, Some(archive), query.enabled()).await
}

fn apply_form_field(req: &mut CreateAppRequest, name: &str, value: String) -> ApiResult<()> {
    let blank = value.trim().is_empty();
    let opt = |v: String| if blank { None } else { Some(v) };
    match name {
        "name" => req.name = value,
        "install_cmd" => req.install_cmd = opt(value),
        "build_cmd" => req.build_cmd = opt(value),
        "start_cmd" => req.start_cmd = opt(value),
        "node_version" => req.node_version = opt(value),
        "domain" => req.domain = opt(value),
        "ssl_enabled" => req.ssl_enabled = parse_flag(&value),
        "auto_start" => req.auto_start = (!blank).then(|| parse_flag(&value)),
        "max_restarts" => req.max_restarts = parse_number("max_restarts", &value)?,
        "restart_delay_ms" => req.restart_delay_ms = parse_number("restart_delay_ms", &value)?,
        _ => {}
    }
    Ok(())
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim(), "1" | "true" | "on" | "yes")
}

fn parse_number<T: std::str::FromStr>(field: &'static str, value: &str) -> ApiResult<Option<T>> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }
    value
        .parse()
        .map(Some)
        .map_err(|_| ApiError(Error::validation(field, "must be a non-negative integer")))
}

async fn deploy(
    orch: Arc<Orchestrator>,
    cmd: CreateApp,
    archive: Option<NamedTempFile>,
    streamed: bool,
) -> ApiResult<Response> {
    let archive_path: Option<PathBuf> = archive.as_ref().map(|f| f.path().to_path_buf());

    if streamed {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        tokio::spawn(async move {
            // Outcome and failure both reach the client as terminal events
            let _ = orch
                .deploy_with_progress(cmd, archive_path.as_deref(), &tx)
                .await;
            drop(archive);
        });
        return Ok(stream::ndjson(rx));
    }

    let result = detached(async move {
        let result = orch
            .deploy_with_progress(cmd, archive_path.as_deref(), &())
            .await;
        drop(archive);
        result
    })
    .await?;
    Ok(outcome(result))
}

pub async fn update_app(
    State(state): State<AppState>,
    Path(id): Path<u32>,
    Json(req): Json<UpdateAppRequest>,
) -> ApiResult<Response> {
    let cmd = req.validate()?;
    Ok(outcome(state.orch.update(id, cmd).await?))
}

pub async fn delete_app(
    State(state): State<AppState>,
    Path(id): Path<u32>,
) -> ApiResult<Response> {
    let result = state.orch.teardown(id).await?;
    Ok(outcome(Outcome::new(
        serde_json::json!({ "deleted": id }),
        result.warnings,
    )))
}

pub async fn start_app(State(state): State<AppState>, Path(id): Path<u32>) -> ApiResult<Response> {
    Ok(ok(state.orch.start(id).await?))
}

pub async fn stop_app(State(state): State<AppState>, Path(id): Path<u32>) -> ApiResult<Response> {
    Ok(ok(state.orch.stop(id).await?))
}

pub async fn restart_app(
    State(state): State<AppState>,
    Path(id): Path<u32>,
) -> ApiResult<Response> {
    Ok(ok(state.orch.restart(id).await?))
}

pub async fn reload_app(
    State(state): State<AppState>,
    Path(id): Path<u32>,
) -> ApiResult<Response> {
    Ok(ok(state.orch.reload(id).await?))
}

pub async fn install_app(
    State(state): State<AppState>,
    Path(id): Path<u32>,
) -> ApiResult<Response> {
    Ok(ok(state.orch.install(id).await?))
}

pub async fn build_app(State(state): State<AppState>, Path(id): Path<u32>) -> ApiResult<Response> {
    Ok(ok(state.orch.build(id).await?))
}

pub async fn pull_app(
    State(state): State<AppState>,
    Path(id): Path<u32>,
    body: Bytes,
) -> ApiResult<Response> {
    let cmd = parse_optional::<RedeployRequest>(&body)?.validate()?;
    Ok(ok(state.orch.pull(id, cmd.git_ref).await?))
}

pub async fn redeploy_app(
    State(state): State<AppState>,
    Path(id): Path<u32>,
    Query(query): Query<StreamQuery>,
    body: Bytes,
) -> ApiResult<Response> {
    let cmd: RedeployApp = parse_optional::<RedeployRequest>(&body)?.validate()?;
    let orch = state.orch;

    if query.enabled() {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        tokio::spawn(async move {
            let _ = orch.redeploy_with_progress(id, cmd, &tx).await;
        });
        return Ok(stream::ndjson(rx));
    }

    let result = detached(async move { orch.redeploy(id, cmd).await }).await?;
    Ok(outcome(result))
}

pub async fn app_logs(
    State(state): State<AppState>,
    Path(id): Path<u32>,
    Query(query): Query<LogsQuery>,
) -> ApiResult<Response> {
    let lines = clamp_log_lines(query.lines);
    let logs = state.orch.tail_logs(id, lines).await?;
    Ok(ok(serde_json::json!({ "lines": lines, "logs": logs })))
}

pub async fn stream_app_logs(
    State(state): State<AppState>,
    Path(id): Path<u32>,
) -> ApiResult<Response> {
    let lines = state.orch.stream_logs(id).await?;
    Ok(stream::log_lines(lines))
}

pub async fn read_env(State(state): State<AppState>, Path(id): Path<u32>) -> ApiResult<Response> {
    let content = state.orch.read_env(id).await?;
    Ok(ok(serde_json::json!({ "content": content })))
}

pub async fn write_env(
    State(state): State<AppState>,
    Path(id): Path<u32>,
    Json(req): Json<EnvFileRequest>,
) -> ApiResult<Response> {
    let content = req.validate()?;
    state.orch.write_env(id, &content).await?;
    Ok(ok(serde_json::json!({ "saved": true })))
}
