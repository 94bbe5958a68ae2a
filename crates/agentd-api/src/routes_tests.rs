//! Tests for the HTTP routes.

use super::*;
use std::path::{Path as FsPath, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use tokio::sync::Notify;
use tower::ServiceExt;

use agentd_jobs::{JobError, MemoryRoutineJobRepository, RoutineExecutor, RoutineOutcome};
use agentd_runner::RunnerSettings;
use agentd_update::{CommandOutput, CommandRunner, RebootSettings, UpdateError, VersionSource};

const TOKEN: &str = "test-token";

struct NoopExecutor;

#[async_trait]
impl RoutineExecutor for NoopExecutor {
    async fn execute(&self, _job_name: &str) -> Result<RoutineOutcome, JobError> {
        Ok(RoutineOutcome::default())
    }
}

struct FixedFeed(Option<String>);

#[async_trait]
impl VersionSource for FixedFeed {
    async fn latest_version(&self) -> Option<String> {
        self.0.clone()
    }
}

#[derive(Default)]
struct RecordingShell {
    commands: Mutex<Vec<String>>,
}

#[async_trait]
impl CommandRunner for RecordingShell {
    async fn run(&self, command: &str, _cwd: &FsPath) -> Result<CommandOutput, UpdateError> {
        self.commands.lock().unwrap().push(command.to_string());
        Ok(CommandOutput::success())
    }

    async fn spawn_detached(
        &self,
        command: &str,
        _cwd: &FsPath,
        _log: &FsPath,
    ) -> Result<(), UpdateError> {
        self.commands.lock().unwrap().push(command.to_string());
        Ok(())
    }
}

fn reboot_settings() -> RebootSettings {
    RebootSettings {
        install_dir: PathBuf::from("/opt/agentd"),
        release_prefix: "agentd-".to_string(),
        cache_dirs: vec![".venv".to_string()],
        env_file: ".env".to_string(),
        tarball_url: "https://releases.example.com/agentd-{version}.tar.gz".to_string(),
        install_command: "./install.sh".to_string(),
        launch_command: "./agentd run".to_string(),
        launch_log: "agentd.log".to_string(),
    }
}

async fn runner_with(jobs: &[(&str, &str, bool)]) -> Arc<AgentRunner> {
    let repo = MemoryRoutineJobRepository::with_jobs(jobs.iter().copied())
        .await
        .unwrap();
    Arc::new(AgentRunner::new(
        RunnerSettings::default(),
        Arc::new(repo),
        Arc::new(NoopExecutor),
    ))
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post(uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method("POST").uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn without_timestamp(mut body: Value) -> Value {
    body.as_object_mut().unwrap().remove("timestamp");
    body
}

#[tokio::test]
async fn test_health_is_public() {
    let app = create_router(Arc::new(ApiState::new(None)));
    let (status, body) = send(app, get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["version"], agentd_update::CURRENT_VERSION);
    assert!(body["timestamp"].is_string());
    assert!(body["components"].is_array());
}

#[tokio::test]
async fn test_health_reports_stopped_scheduler() {
    let health = Arc::new(crate::HealthChecker::new());
    let runner = runner_with(&[]).await;
    health
        .register(Arc::new(crate::SchedulerCheck::new(runner.clone())))
        .await;
    let state = ApiState::new(None).with_runner(runner).with_health(health);

    let (status, body) = send(create_router(Arc::new(state)), get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "unhealthy");
    assert_eq!(body["components"][0]["name"], "scheduler");
}

#[tokio::test]
async fn test_livez() {
    let app = create_router(Arc::new(ApiState::new(None)));
    let (status, body) = send(app, get("/livez")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_missing_secret_and_bad_token_look_the_same() {
    let unconfigured = create_router(Arc::new(ApiState::new(None)));
    let (status_a, body_a) = send(unconfigured, post("/api/reload-jobs", Some(TOKEN), None)).await;

    let configured = create_router(Arc::new(ApiState::new(Some(TOKEN.to_string()))));
    let (status_b, body_b) =
        send(configured.clone(), post("/api/reload-jobs", Some("wrong"), None)).await;
    let (status_c, body_c) = send(configured, post("/api/reload-jobs", None, None)).await;

    assert_eq!(status_a, StatusCode::UNAUTHORIZED);
    assert_eq!(status_b, StatusCode::UNAUTHORIZED);
    assert_eq!(status_c, StatusCode::UNAUTHORIZED);

    let body_a = without_timestamp(body_a);
    assert_eq!(body_a, without_timestamp(body_b));
    assert_eq!(body_a, without_timestamp(body_c));
    assert_eq!(body_a["status"], "error");
    assert_eq!(body_a["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn test_non_bearer_scheme_rejected() {
    let app = create_router(Arc::new(ApiState::new(Some(TOKEN.to_string()))));
    let request = Request::builder()
        .method("POST")
        .uri("/api/reload-jobs")
        .header("authorization", format!("Basic {}", TOKEN))
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_reload_jobs_without_runner() {
    let app = create_router(Arc::new(ApiState::new(Some(TOKEN.to_string()))));
    let (status, body) = send(app, post("/api/reload-jobs", Some(TOKEN), None)).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["code"], "SERVICE_UNAVAILABLE");
}

#[tokio::test]
async fn test_reload_jobs() {
    let runner = runner_with(&[
        ("daily-report", "0 8 * * *", true),
        ("paused", "* * * * *", false),
    ])
    .await;
    let state = ApiState::new(Some(TOKEN.to_string())).with_runner(runner.clone());
    let app = create_router(Arc::new(state));

    let (status, body) = send(app.clone(), post("/api/reload-jobs", Some(TOKEN), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["jobCount"], 1);
    assert_eq!(runner.jobs_snapshot().len(), 1);

    let request = Request::builder()
        .uri("/api/jobs")
        .header("authorization", format!("Bearer {}", TOKEN))
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["jobs"][0]["name"], "daily-report");
    assert_eq!(body["jobs"][0]["cronExpression"], "0 8 * * *");
}

#[tokio::test]
async fn test_bash_rejections() {
    let app = create_router(Arc::new(ApiState::new(Some(TOKEN.to_string()))));

    let (status, body) = send(
        app.clone(),
        post("/api/bash", Some(TOKEN), Some(json!({"command": "ls; rm -rf /"}))),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "error");

    let (status, body) = send(
        app.clone(),
        post("/api/bash", Some(TOKEN), Some(json!({"command": "rm -rf /"}))),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "FORBIDDEN");

    let (status, _) = send(app, post("/api/bash", Some(TOKEN), Some(json!({"cmd": "ls"})))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[cfg(unix)]
#[tokio::test]
async fn test_bash_runs_allowed_command() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("notes.txt"), "hello").unwrap();

    let app = create_router(Arc::new(ApiState::new(Some(TOKEN.to_string()))));
    let (status, body) = send(
        app,
        post(
            "/api/bash",
            Some(TOKEN),
            Some(json!({"command": "ls", "cwd": dir.path().display().to_string()})),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["exitCode"], 0);
    assert!(body["stdout"].as_str().unwrap().contains("notes.txt"));
    assert!(body["stderr"].is_string());
}

#[tokio::test]
async fn test_reboot_up_to_date_touches_nothing() {
    let shell = Arc::new(RecordingShell::default());
    let manager = RebootManager::new(
        reboot_settings(),
        Arc::new(FixedFeed(Some("1.4.0".to_string()))),
        shell.clone(),
    )
    .with_current_version("1.4.0");
    let state = ApiState::new(Some(TOKEN.to_string())).with_reboot_manager(Arc::new(manager));

    let app = create_router(Arc::new(state));
    let (status, body) = send(app, post("/api/reboot", Some(TOKEN), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert!(body["message"].as_str().unwrap().contains("1.4.0"));
    assert!(shell.commands.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_reboot_relaunches_then_exits() {
    let shell = Arc::new(RecordingShell::default());
    let exited = Arc::new(Notify::new());
    let hook_exited = exited.clone();
    let manager = RebootManager::new(
        reboot_settings(),
        Arc::new(FixedFeed(Some("1.5.0".to_string()))),
        shell.clone(),
    )
    .with_current_version("1.4.0")
    .with_exit_hook(Arc::new(move |code: i32| {
        assert_eq!(code, 0);
        hook_exited.notify_one();
    }));
    let state = ApiState::new(Some(TOKEN.to_string())).with_reboot_manager(Arc::new(manager));

    let app = create_router(Arc::new(state));
    let (status, body) = send(app, post("/api/reboot", Some(TOKEN), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["message"].as_str().unwrap().contains("1.5.0"));

    let commands = shell.commands.lock().unwrap().clone();
    assert_eq!(commands.last().map(String::as_str), Some("./agentd run"));

    tokio::time::timeout(Duration::from_secs(5), exited.notified())
        .await
        .expect("exit hook should run after the response");
}

#[tokio::test]
async fn test_reboot_failure_is_500() {
    let manager = RebootManager::new(
        reboot_settings(),
        Arc::new(FixedFeed(None)),
        Arc::new(RecordingShell::default()),
    )
    .with_current_version("1.4.0");
    let state = ApiState::new(Some(TOKEN.to_string())).with_reboot_manager(Arc::new(manager));

    let app = create_router(Arc::new(state));
    let (status, body) = send(app, post("/api/reboot", Some(TOKEN), None)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["code"], "REBOOT_FAILED");
}

#[tokio::test]
async fn test_browser_routes_without_proxy() {
    let app = create_router(Arc::new(ApiState::new(Some(TOKEN.to_string()))));
    let (status, _) = send(app, post("/api/browser/session", Some(TOKEN), None)).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_open_page_requires_url() {
    let proxy = BrowserProxy::new(agentd_config::BrowserConfig::default())
        .with_endpoint("http://127.0.0.1:1");
    let state = ApiState::new(Some(TOKEN.to_string())).with_browser(Arc::new(proxy));
    let app = create_router(Arc::new(state));

    let (status, _) = send(
        app.clone(),
        post("/api/browser/pages", Some(TOKEN), Some(json!({"url": " "}))),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        app,
        post("/api/browser/pages", Some(TOKEN), Some(json!({"url": "https://example.com"}))),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}
