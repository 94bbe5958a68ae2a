//! HTTP route definitions.
//!
//! `/health` and `/livez` are public. Everything under `/api` goes
//! through [`require_bearer`].

use std::sync::Arc;
use std::time::Duration;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::middleware;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};
use tower_http::trace::TraceLayer;
use tracing::info;

use agentd_runner::AgentRunner;
use agentd_update::{RebootManager, RebootOutcome};

use crate::auth::require_bearer;
use crate::bash::{BashRequest, BashResponse};
use crate::browser::BrowserProxy;
use crate::error::ApiError;
use crate::state::ApiState;

/// Pause between answering a reboot request and exiting.
pub const RELAUNCH_EXIT_DELAY: Duration = Duration::from_millis(500);

pub fn create_router(state: Arc<ApiState>) -> Router {
    let api_routes = Router::new()
        .route("/reboot", post(reboot))
        .route("/reload-jobs", post(reload_jobs))
        .route("/jobs", get(list_jobs))
        .route("/bash", post(bash))
        .route("/browser/session", post(start_browser).delete(stop_browser))
        .route("/browser/pages", get(list_pages).post(open_page))
        .route("/browser/pages/{id}", delete(close_page))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_bearer));

    Router::new()
        .route("/health", get(health))
        .route("/livez", get(livez))
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

fn ok(message: impl Into<String>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "message": message.into(),
        "timestamp": now(),
    }))
}

fn runner(state: &ApiState) -> Result<&Arc<AgentRunner>, ApiError> {
    state
        .runner
        .as_ref()
        .ok_or_else(|| ApiError::Unavailable("Agent runner not attached".to_string()))
}

fn reboot_manager(state: &ApiState) -> Result<&Arc<RebootManager>, ApiError> {
    state
        .reboot_manager
        .as_ref()
        .ok_or_else(|| ApiError::Unavailable("Reboot manager not attached".to_string()))
}

fn browser(state: &ApiState) -> Result<&Arc<BrowserProxy>, ApiError> {
    state
        .browser
        .as_ref()
        .ok_or_else(|| ApiError::Unavailable("Browser proxy not enabled".to_string()))
}

/// Health document. Always 200; the body carries the verdict.
async fn health(State(state): State<Arc<ApiState>>) -> Json<Value> {
    let result = state.health.check().await;
    Json(json!({
        "status": result.status,
        "version": agentd_update::CURRENT_VERSION,
        "uptimeSeconds": state.uptime().as_secs(),
        "timestamp": result.timestamp.to_rfc3339(),
        "components": result.checks,
    }))
}

async fn livez() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Update to the latest release.
///
/// On a relaunch the response is sent first and the process exits
/// shortly after.
async fn reboot(State(state): State<Arc<ApiState>>) -> Result<Json<Value>, ApiError> {
    let manager = reboot_manager(&state)?;

    match manager.reboot_agent(None).await? {
        RebootOutcome::UpToDate { version } => {
            Ok(ok(format!("Already running version {}", version)))
        }
        RebootOutcome::Relaunched { version } => {
            info!("Reboot into {} initiated over the API", version);
            let manager = Arc::clone(manager);
            tokio::spawn(async move {
                tokio::time::sleep(RELAUNCH_EXIT_DELAY).await;
                manager.exit_for_relaunch();
            });
            Ok(ok(format!("Rebooting into version {}", version)))
        }
    }
}

async fn reload_jobs(State(state): State<Arc<ApiState>>) -> Result<Json<Value>, ApiError> {
    let runner = runner(&state)?;
    let count = runner
        .reload_routine_jobs()
        .await
        .map_err(|e| ApiError::Internal(format!("Failed to reload routine jobs: {}", e)))?;

    Ok(Json(json!({
        "status": "ok",
        "message": format!("Reloaded {} routine jobs", count),
        "jobCount": count,
        "timestamp": now(),
    })))
}

async fn list_jobs(State(state): State<Arc<ApiState>>) -> Result<Json<Value>, ApiError> {
    let runner = runner(&state)?;
    Ok(Json(json!({
        "status": "ok",
        "running": runner.is_running(),
        "loopCount": runner.loop_count(),
        "jobs": runner.jobs_snapshot(),
        "timestamp": now(),
    })))
}

async fn bash(
    State(state): State<Arc<ApiState>>,
    payload: Result<Json<BashRequest>, JsonRejection>,
) -> Result<Json<BashResponse>, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    Ok(Json(state.bash.execute(request).await?))
}

async fn start_browser(State(state): State<Arc<ApiState>>) -> Result<Json<Value>, ApiError> {
    let version = browser(&state)?.start_session().await?;
    Ok(Json(json!({
        "status": "ok",
        "browser": version,
        "timestamp": now(),
    })))
}

async fn stop_browser(State(state): State<Arc<ApiState>>) -> Result<Json<Value>, ApiError> {
    let closed = browser(&state)?.close_session().await?;
    Ok(ok(format!("Closed {} pages", closed)))
}

async fn list_pages(State(state): State<Arc<ApiState>>) -> Result<Json<Value>, ApiError> {
    let pages = browser(&state)?.list_pages().await?;
    Ok(Json(json!({
        "status": "ok",
        "pages": pages,
        "timestamp": now(),
    })))
}

#[derive(Debug, Deserialize)]
struct OpenPageRequest {
    url: String,
}

async fn open_page(
    State(state): State<Arc<ApiState>>,
    payload: Result<Json<OpenPageRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    if request.url.trim().is_empty() {
        return Err(ApiError::BadRequest("url is required".to_string()));
    }

    let page = browser(&state)?.open_page(&request.url).await?;
    Ok(Json(json!({
        "status": "ok",
        "page": page,
        "timestamp": now(),
    })))
}

async fn close_page(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    browser(&state)?.close_page(&id).await?;
    Ok(ok(format!("Closed page {}", id)))
}

#[cfg(test)]
#[path = "routes_tests.rs"]
mod tests;
