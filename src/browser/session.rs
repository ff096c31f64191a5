//! Browser session lifecycle.
//!
//! A [`Session`] owns a single headless Chromium process and the DevTools
//! connection to it. Launch configuration is fixed: sandboxing disabled,
//! certificate errors ignored, a spoofed user agent, and a throwaway profile
//! directory. A preload script is installed into every created page before
//! any page script runs.
//!
//! `start()` is idempotent; page creation before `start()` or after `stop()`
//! fails fast with [`Error::SessionNotStarted`].

// ============================================================================
// Imports
// ============================================================================

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use serde_json::json;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::site;
use crate::transport::Connection;

use super::page::Page;

// ============================================================================
// Constants
// ============================================================================

/// Maximum time to wait for the browser to print its DevTools endpoint.
const LAUNCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Binary names probed on `PATH` when no explicit path is configured.
const BROWSER_CANDIDATES: &[&str] = &[
    "chromium",
    "chromium-browser",
    "google-chrome",
    "google-chrome-stable",
    "chrome",
];

// ============================================================================
// SessionConfig
// ============================================================================

/// Session configuration.
///
/// Launch flags themselves are not configurable; only the environment around
/// them is.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Base URL relative paths are resolved against.
    pub base_url: Url,

    /// Directory for diagnostic screenshots and markup dumps.
    pub screenshot_dir: PathBuf,

    /// Script injected into every page before its own scripts execute.
    pub preload_script: String,

    /// Explicit browser binary; `PATH` is probed when unset.
    pub browser_binary: Option<PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            screenshot_dir: site::default_screenshot_dir(),
            preload_script: site::PRELOAD_SCRIPT.to_string(),
            browser_binary: None,
        }
    }
}

/// Parses the compile-time site base URL.
fn default_base_url() -> Url {
    Url::parse(site::BASE_URL).expect("site base URL is a valid constant")
}

// ============================================================================
// Types
// ============================================================================

/// State held while the browser is running.
struct Running {
    child: Child,
    connection: Connection,
    /// Profile directory; removed from disk when the session stops.
    _user_data_dir: TempDir,
}

struct SessionInner {
    config: SessionConfig,
    running: Mutex<Option<Running>>,
}

// ============================================================================
// Session
// ============================================================================

/// A handle to a browser session.
///
/// Cheap to clone; all clones share the same process and connection.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("base_url", &self.inner.config.base_url.as_str())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Creates a session; the browser is not launched until [`Session::start`].
    #[must_use]
    pub fn new(config: SessionConfig) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                config,
                running: Mutex::new(None),
            }),
        }
    }

    /// Returns the configured base URL.
    #[inline]
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.inner.config.base_url
    }

    /// Returns the configured screenshot directory.
    #[inline]
    #[must_use]
    pub fn screenshot_dir(&self) -> &Path {
        &self.inner.config.screenshot_dir
    }

    /// Returns `true` while the browser process is running.
    pub async fn is_running(&self) -> bool {
        self.inner.running.lock().await.is_some()
    }

    /// Launches the browser if it is not already running.
    ///
    /// Starting twice is a no-op.
    ///
    /// # Errors
    ///
    /// - [`Error::BrowserNotFound`] if no Chromium binary can be located
    /// - [`Error::ProcessLaunchFailed`] if the process fails to spawn
    /// - [`Error::ConnectionTimeout`] if the DevTools endpoint never appears
    pub async fn start(&self) -> Result<()> {
        let mut slot = self.inner.running.lock().await;
        if slot.is_some() {
            debug!("session already started");
            return Ok(());
        }

        let running = launch(&self.inner.config).await?;
        info!(pid = running.child.id(), "browser session started");
        *slot = Some(running);
        Ok(())
    }

    /// Tears down the browser.
    ///
    /// Stopping a session that is not running is a no-op. Any further page
    /// creation or navigation fails fast with [`Error::SessionNotStarted`].
    pub async fn stop(&self) -> Result<()> {
        let Some(mut running) = self.inner.running.lock().await.take() else {
            return Ok(());
        };

        if let Err(e) = running.connection.send("Browser.close", json!({})).await {
            debug!(error = %e, "Browser.close failed, killing process");
        }
        running.connection.shutdown();

        if let Err(e) = running.child.kill().await {
            warn!(error = %e, "failed to kill browser process");
        }

        info!("browser session stopped");
        Ok(())
    }

    /// Creates a new page with the preload script installed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionNotStarted`] before `start()` or after
    /// `stop()`.
    pub async fn new_page(&self) -> Result<Page> {
        let connection = self.connection().await?;

        let target = connection
            .send("Target.createTarget", json!({ "url": "about:blank" }))
            .await?;
        let target_id = target
            .get("targetId")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::protocol("no targetId in createTarget response"))?
            .to_string();

        let attach = connection
            .send(
                "Target.attachToTarget",
                json!({ "targetId": target_id, "flatten": true }),
            )
            .await?;
        let session_id = attach
            .get("sessionId")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::protocol("no sessionId in attachToTarget response"))?
            .to_string();

        debug!(%target_id, %session_id, "page created");

        let page = Page::new(connection, session_id, target_id);
        page.enable_domains().await?;
        page.install_preload(&self.inner.config.preload_script)
            .await?;

        Ok(page)
    }

    /// Resolves a path against the base URL.
    ///
    /// Absolute URLs pass through untouched.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Url`] if the result is not a valid URL.
    pub fn resolve_url(&self, path: &str) -> Result<Url> {
        if path.starts_with("http") {
            Ok(Url::parse(path)?)
        } else {
            Ok(self.inner.config.base_url.join(path)?)
        }
    }

    /// Clones the live connection, failing fast when not running.
    async fn connection(&self) -> Result<Connection> {
        self.inner
            .running
            .lock()
            .await
            .as_ref()
            .map(|r| r.connection.clone())
            .ok_or(Error::SessionNotStarted)
    }
}

// ============================================================================
// Launch
// ============================================================================

/// Spawns the browser and connects to its DevTools endpoint.
async fn launch(config: &SessionConfig) -> Result<Running> {
    let binary = resolve_binary(config.browser_binary.as_deref())?;
    let user_data_dir = TempDir::with_prefix("toutiao-client-")?;

    let mut cmd = Command::new(&binary);
    cmd.args(launch_args(user_data_dir.path()));
    cmd.stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    debug!(binary = %binary.display(), "spawning browser");
    let mut child = cmd.spawn().map_err(Error::process_launch_failed)?;

    let stderr = child.stderr.take().ok_or_else(|| {
        Error::process_launch_failed(std::io::Error::other("stderr not captured"))
    })?;

    let ws_url = wait_for_devtools_url(stderr).await?;
    debug!(url = %ws_url, "DevTools endpoint ready");

    let connection = Connection::connect(&ws_url).await?;

    Ok(Running {
        child,
        connection,
        _user_data_dir: user_data_dir,
    })
}

/// Locates the browser binary.
fn resolve_binary(configured: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = configured {
        if path.exists() {
            return Ok(path.to_path_buf());
        }
        return Err(Error::browser_not_found(path.display().to_string()));
    }

    for name in BROWSER_CANDIDATES {
        if let Ok(path) = which::which(name) {
            return Ok(path);
        }
    }

    Err(Error::browser_not_found(BROWSER_CANDIDATES.join(", ")))
}

/// Fixed launch arguments.
fn launch_args(user_data_dir: &Path) -> Vec<String> {
    vec![
        "--headless=new".to_string(),
        "--no-sandbox".to_string(),
        "--disable-setuid-sandbox".to_string(),
        "--ignore-certificate-errors".to_string(),
        "--disable-gpu".to_string(),
        "--disable-dev-shm-usage".to_string(),
        "--no-first-run".to_string(),
        "--no-default-browser-check".to_string(),
        "--window-size=1280,720".to_string(),
        "--remote-debugging-port=0".to_string(),
        format!("--user-agent={}", site::USER_AGENT),
        format!("--user-data-dir={}", user_data_dir.display()),
    ]
}

/// Reads browser stderr until the DevTools endpoint line appears.
///
/// The remaining stderr is drained on a background task so the pipe never
/// fills up.
async fn wait_for_devtools_url(stderr: ChildStderr) -> Result<String> {
    let pattern = Regex::new(r"DevTools listening on (ws://\S+)")
        .map_err(|e| Error::config(format!("bad devtools pattern: {e}")))?;

    let mut lines = BufReader::new(stderr).lines();

    let scan = async {
        while let Some(line) = lines.next_line().await? {
            if let Some(captures) = pattern.captures(&line) {
                let url = captures[1].to_string();

                // Keep draining so the browser never blocks on stderr.
                tokio::spawn(async move {
                    while let Ok(Some(_)) = lines.next_line().await {}
                });

                return Ok(url);
            }
        }
        Err(Error::connection("browser exited before DevTools endpoint"))
    };

    timeout(LAUNCH_TIMEOUT, scan)
        .await
        .map_err(|_| Error::connection_timeout(LAUNCH_TIMEOUT.as_millis() as u64))?
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_launch_args_fixed_flags() {
        let dir = PathBuf::from("/tmp/profile");
        let args = launch_args(&dir);

        assert!(args.contains(&"--headless=new".to_string()));
        assert!(args.contains(&"--no-sandbox".to_string()));
        assert!(args.contains(&"--ignore-certificate-errors".to_string()));
        assert!(args.contains(&"--remote-debugging-port=0".to_string()));
        assert!(args.iter().any(|a| a.starts_with("--user-agent=")));
        assert!(args.iter().any(|a| a == "--user-data-dir=/tmp/profile"));
    }

    #[test]
    fn test_devtools_line_pattern() {
        let pattern = Regex::new(r"DevTools listening on (ws://\S+)").expect("pattern");
        let line = "DevTools listening on ws://127.0.0.1:9222/devtools/browser/abc-def";

        let captures = pattern.captures(line).expect("matches");
        assert_eq!(
            &captures[1],
            "ws://127.0.0.1:9222/devtools/browser/abc-def"
        );
        assert!(pattern.captures("[WARNING] something else").is_none());
    }

    #[test]
    fn test_resolve_url_relative() {
        let session = Session::new(SessionConfig::default());
        let url = session.resolve_url("auth/page/login").expect("resolves");
        assert_eq!(url.as_str(), "https://mp.toutiao.com/auth/page/login");
    }

    #[test]
    fn test_resolve_url_absolute_passthrough() {
        let session = Session::new(SessionConfig::default());
        let url = session
            .resolve_url("https://example.com/x?y=1")
            .expect("resolves");
        assert_eq!(url.as_str(), "https://example.com/x?y=1");
    }

    #[test]
    fn test_resolve_binary_missing_configured_path() {
        let err = resolve_binary(Some(Path::new("/nonexistent/chromium"))).unwrap_err();
        assert!(matches!(err, Error::BrowserNotFound { .. }));
    }

    #[tokio::test]
    async fn test_new_page_before_start_fails_fast() {
        let session = Session::new(SessionConfig::default());
        let err = session.new_page().await.unwrap_err();
        assert!(matches!(err, Error::SessionNotStarted));
    }

    #[tokio::test]
    async fn test_stop_without_start_is_noop() {
        let session = Session::new(SessionConfig::default());
        assert!(session.stop().await.is_ok());
        assert!(!session.is_running().await);
    }
}
