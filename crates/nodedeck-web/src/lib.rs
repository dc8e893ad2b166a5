//! NodeDeck Web API Server
//!
//! Thin REST layer over the orchestrator. Deploys and redeploys can stream
//! their phase events as NDJSON with `?stream=1`.

pub mod error;
pub mod handlers;
pub mod stream;

use axum::{
    extract::{DefaultBodyLimit, Request as AxumRequest, State},
    http::{header::HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::Response as AxumResponse,
    routing::{get, post},
    Router,
};
use nodedeck_orchestrator::Orchestrator;
use std::future::Future;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

pub use error::{status_for, ApiError, ApiResponse, ApiResult};

/// Largest accepted upload body
pub const MAX_UPLOAD_BYTES: usize = 200 * 1024 * 1024;

const DEFAULT_CORS_ORIGIN: &str = "http://localhost:3000";

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    orch: Arc<Orchestrator>,
    api_key: Option<String>,
}

impl AppState {
    pub fn new(orch: Arc<Orchestrator>, api_key: Option<String>) -> Self {
        Self {
            orch,
            // A blank key would lock every client out
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        }
    }
}

/// API key authentication middleware
async fn api_key_auth(
    State(state): State<AppState>,
    request: AxumRequest,
    next: Next,
) -> Result<AxumResponse, StatusCode> {
    // If no API key is configured, allow all requests
    let Some(expected_key) = &state.api_key else {
        return Ok(next.run(request).await);
    };

    let provided_key = request
        .headers()
        .get("X-API-Key")
        .and_then(|v| v.to_str().ok());

    match provided_key {
        Some(key) if key == expected_key => Ok(next.run(request).await),
        _ => Err(StatusCode::UNAUTHORIZED),
    }
}

fn cors_layer(cors_origin: Option<&str>) -> CorsLayer {
    let origin = cors_origin
        .and_then(|o| o.parse::<HeaderValue>().ok())
        .unwrap_or_else(|| HeaderValue::from_static(DEFAULT_CORS_ORIGIN));
    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any)
}

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    create_router_with_cors(state, None)
}

/// Create the API router with custom CORS origin
pub fn create_router_with_cors(state: AppState, cors_origin: Option<&str>) -> Router {
    use handlers::*;

    // Routes that require authentication
    let protected_routes = Router::new()
        .route("/api/apps", get(list_apps).post(create_app))
        .route(
            "/api/apps/upload",
            post(upload_app).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/api/apps/suggest", post(suggest))
        .route(
            "/api/apps/:id",
            get(get_app).put(update_app).delete(delete_app),
        )
        .route("/api/apps/:id/start", post(start_app))
        .route("/api/apps/:id/stop", post(stop_app))
        .route("/api/apps/:id/restart", post(restart_app))
        .route("/api/apps/:id/reload", post(reload_app))
        .route("/api/apps/:id/install", post(install_app))
        .route("/api/apps/:id/build", post(build_app))
        .route("/api/apps/:id/pull", post(pull_app))
        .route("/api/apps/:id/redeploy", post(redeploy_app))
        .route("/api/apps/:id/logs", get(app_logs))
        .route("/api/apps/:id/logs/stream", get(stream_app_logs))
        .route("/api/apps/:id/env", get(read_env).put(write_env))
        .route("/api/activity", get(activity))
        .route("/api/node/versions", get(node_versions))
        .route_layer(middleware::from_fn_with_state(state.clone(), api_key_auth));

    // Public routes (no auth required)
    let public_routes = Router::new().route("/api/health", get(health_check));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(cors_layer(cors_origin))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the API until `shutdown` resolves
pub async fn serve<F>(
    bind_addr: &str,
    state: AppState,
    cors_origin: Option<&str>,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = create_router_with_cors(state, cors_origin);

    info!("Starting NodeDeck API on {}", bind_addr);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("NodeDeck API stopped");
    Ok(())
}
