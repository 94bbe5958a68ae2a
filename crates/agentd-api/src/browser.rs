//! Browser automation proxy.
//!
//! Drives a Chromium-family browser through its DevTools HTTP endpoints
//! (`/json/version`, `/json/list`, `/json/new`, `/json/close`). The proxy
//! launches the browser on demand and remembers the pages it opened so a
//! session close only touches its own tabs.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::process::{Child, Command};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use agentd_config::BrowserConfig;

use crate::error::ApiError;

const READY_ATTEMPTS: u32 = 30;
const READY_DELAY: Duration = Duration::from_millis(200);

#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("No Chrome or Chromium executable found")]
    ChromeNotFound,

    #[error("Failed to launch browser: {0}")]
    LaunchFailed(String),

    #[error("Browser is not running on {0}")]
    NotRunning(String),

    #[error("Page not found: {0}")]
    PageNotFound(String),

    #[error("Browser request failed: {0}")]
    Request(#[from] reqwest::Error),
}

impl From<BrowserError> for ApiError {
    fn from(err: BrowserError) -> Self {
        match err {
            BrowserError::NotRunning(_) => ApiError::Unavailable(err.to_string()),
            BrowserError::PageNotFound(_) => ApiError::NotFound(err.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

/// `/json/version` document. Chrome uses PascalCase keys here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrowserVersion {
    #[serde(rename = "Browser")]
    pub browser: String,
    #[serde(rename = "Protocol-Version")]
    pub protocol_version: String,
    #[serde(rename = "User-Agent", default)]
    pub user_agent: String,
    #[serde(rename = "webSocketDebuggerUrl", default)]
    pub web_socket_debugger_url: Option<String>,
}

/// One browser target as listed by `/json/list`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub id: String,
    #[serde(rename = "type", default)]
    pub page_type: String,
    #[serde(default)]
    pub title: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web_socket_debugger_url: Option<String>,
}

/// Session and page lifecycle over a local browser.
pub struct BrowserProxy {
    config: BrowserConfig,
    endpoint: String,
    client: reqwest::Client,
    chrome_process: Mutex<Option<Child>>,
    pages: RwLock<HashMap<String, PageInfo>>,
}

impl BrowserProxy {
    pub fn new(config: BrowserConfig) -> Self {
        let endpoint = format!("http://127.0.0.1:{}", config.debug_port);
        Self {
            config,
            endpoint,
            client: reqwest::Client::new(),
            chrome_process: Mutex::new(None),
            pages: RwLock::new(HashMap::new()),
        }
    }

    /// Talk to an already running DevTools endpoint.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Configured executable, falling back to well-known install paths.
    pub fn find_chrome(&self) -> Option<PathBuf> {
        if let Some(path) = &self.config.chrome_path {
            return path.exists().then(|| path.clone());
        }

        let candidates: &[&str] = if cfg!(target_os = "macos") {
            &[
                "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
                "/Applications/Chromium.app/Contents/MacOS/Chromium",
            ]
        } else {
            &[
                "/usr/bin/google-chrome",
                "/usr/bin/google-chrome-stable",
                "/usr/bin/chromium",
                "/usr/bin/chromium-browser",
                "/snap/bin/chromium",
            ]
        };

        candidates.iter().map(PathBuf::from).find(|p| p.exists())
    }

    fn profile_dir(&self) -> PathBuf {
        self.config.profile_dir.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".agentd")
                .join("browser-profile")
        })
    }

    async fn fetch_version(&self) -> Result<BrowserVersion, BrowserError> {
        let url = format!("{}/json/version", self.endpoint);
        let response = self.client.get(&url).send().await.map_err(|e| self.classify(e))?;
        Ok(response.error_for_status()?.json().await?)
    }

    fn classify(&self, err: reqwest::Error) -> BrowserError {
        if err.is_connect() {
            BrowserError::NotRunning(self.endpoint.clone())
        } else {
            BrowserError::Request(err)
        }
    }

    fn launch(&self) -> Result<Child, BrowserError> {
        let chrome = self.find_chrome().ok_or(BrowserError::ChromeNotFound)?;
        let profile_dir = self.profile_dir();
        if let Err(e) = std::fs::create_dir_all(&profile_dir) {
            warn!("Failed to create browser profile directory: {}", e);
        }

        let mut cmd = Command::new(&chrome);
        cmd.arg(format!("--remote-debugging-port={}", self.config.debug_port))
            .arg(format!("--user-data-dir={}", profile_dir.display()))
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--disable-background-networking")
            .arg("--disable-sync")
            .arg("--disable-translate")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        if self.config.headless {
            cmd.arg("--headless=new");
        }

        let child = cmd
            .spawn()
            .map_err(|e| BrowserError::LaunchFailed(e.to_string()))?;
        info!("Browser launched from {} (pid {:?})", chrome.display(), child.id());
        Ok(child)
    }

    /// Attach to a running browser, launching one if nothing answers.
    pub async fn start_session(&self) -> Result<BrowserVersion, BrowserError> {
        match self.fetch_version().await {
            Ok(version) => {
                info!("Attached to running browser {}", version.browser);
                return Ok(version);
            }
            Err(BrowserError::NotRunning(_)) => {}
            Err(e) => return Err(e),
        }

        let mut process = self.chrome_process.lock().await;
        *process = Some(self.launch()?);

        for _ in 0..READY_ATTEMPTS {
            tokio::time::sleep(READY_DELAY).await;
            if let Ok(version) = self.fetch_version().await {
                info!("Browser ready: {}", version.browser);
                return Ok(version);
            }
        }

        if let Some(mut child) = process.take() {
            let _ = child.kill().await;
        }
        Err(BrowserError::LaunchFailed(
            "browser did not answer on its debugging port".to_string(),
        ))
    }

    /// Close every page this proxy opened and stop a browser it launched.
    ///
    /// Returns the number of pages closed.
    pub async fn close_session(&self) -> Result<usize, BrowserError> {
        let ids: Vec<String> = self.pages.write().await.drain().map(|(id, _)| id).collect();

        let mut closed = 0;
        for id in &ids {
            match self.close_target(id).await {
                Ok(()) => closed += 1,
                Err(e) => debug!("Page {} already gone: {}", id, e),
            }
        }

        if let Some(mut child) = self.chrome_process.lock().await.take() {
            info!("Stopping launched browser");
            let _ = child.kill().await;
        }

        Ok(closed)
    }

    /// Pages the browser currently reports.
    pub async fn list_pages(&self) -> Result<Vec<PageInfo>, BrowserError> {
        let url = format!("{}/json/list", self.endpoint);
        let response = self.client.get(&url).send().await.map_err(|e| self.classify(e))?;
        let targets: Vec<PageInfo> = response.error_for_status()?.json().await?;
        Ok(targets.into_iter().filter(|t| t.page_type == "page").collect())
    }

    /// Open a new tab at `url`.
    pub async fn open_page(&self, url: &str) -> Result<PageInfo, BrowserError> {
        // PUT is required by current Chrome builds
        let target = new_page_target(&self.endpoint, url);
        let response = self.client.put(&target).send().await.map_err(|e| self.classify(e))?;
        let page: PageInfo = response.error_for_status()?.json().await?;

        debug!("Opened page {} at {}", page.id, page.url);
        self.pages.write().await.insert(page.id.clone(), page.clone());
        Ok(page)
    }

    /// Close a tab by target id.
    pub async fn close_page(&self, id: &str) -> Result<(), BrowserError> {
        self.close_target(id).await?;
        self.pages.write().await.remove(id);
        Ok(())
    }

    async fn close_target(&self, id: &str) -> Result<(), BrowserError> {
        let url = format!("{}/json/close/{}", self.endpoint, id);
        let response = self.client.get(&url).send().await.map_err(|e| self.classify(e))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(BrowserError::PageNotFound(id.to_string()));
        }
        response.error_for_status()?;
        Ok(())
    }

    /// Ids of pages opened through this proxy.
    pub async fn tracked_pages(&self) -> Vec<String> {
        self.pages.read().await.keys().cloned().collect()
    }
}

/// `/json/new` takes the whole query string as the page URL.
fn new_page_target(endpoint: &str, page_url: &str) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(page_url.as_bytes()).collect();
    format!("{}/json/new?{}", endpoint, encoded)
}
