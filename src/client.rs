//! The Toutiao client.
//!
//! [`ToutiaoClient`] ties the browser session, the response-wait registry and
//! the site flows together. `start()` launches the browser and kicks off the
//! QR login flow as a background task; callers that need authentication use
//! the [`ToutiaoClient::online`] readiness gate.

// ============================================================================
// Imports
// ============================================================================

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::browser::{Page, PageResponse, ResponseHandler, ResponseWaiter, Session, SessionConfig};
use crate::error::Result;
use crate::login::{self, LoginConfig, LoginState};
use crate::publish;
use crate::site;

// ============================================================================
// ClientConfig
// ============================================================================

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Directory for diagnostic screenshots and markup dumps.
    pub screenshot_dir: PathBuf,

    /// Path the login QR image is written to.
    ///
    /// The companion web endpoint serves exactly this file.
    pub qr_image_path: PathBuf,

    /// Explicit browser binary; `PATH` is probed when unset.
    pub browser_binary: Option<PathBuf>,

    /// Login flow tuning.
    pub login: LoginConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            screenshot_dir: site::default_screenshot_dir(),
            qr_image_path: site::default_qr_path(),
            browser_binary: None,
            login: LoginConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Sets the screenshot directory.
    #[must_use]
    pub fn with_screenshot_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.screenshot_dir = dir.into();
        self
    }

    /// Sets the QR image path.
    #[must_use]
    pub fn with_qr_image_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.qr_image_path = path.into();
        self
    }

    /// Sets an explicit browser binary.
    #[must_use]
    pub fn with_browser_binary(mut self, path: impl Into<PathBuf>) -> Self {
        self.browser_binary = Some(path.into());
        self
    }

    /// Sets the login flow tuning.
    #[must_use]
    pub fn with_login(mut self, login: LoginConfig) -> Self {
        self.login = login;
        self
    }
}

// ============================================================================
// ToutiaoClient
// ============================================================================

struct ClientInner {
    session: Session,
    waiter: ResponseWaiter,
    qr_image_path: PathBuf,
    login_config: LoginConfig,
    login_state: Mutex<LoginState>,
    online_tx: watch::Sender<bool>,
    online_rx: watch::Receiver<bool>,
    login_task: Mutex<Option<JoinHandle<()>>>,
}

/// A client for the Toutiao authoring area.
///
/// Cheap to clone; all clones share the same session and registry.
#[derive(Clone)]
pub struct ToutiaoClient {
    inner: Arc<ClientInner>,
}

impl std::fmt::Debug for ToutiaoClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToutiaoClient")
            .field("online", &self.is_online())
            .field("login_state", &self.login_state())
            .finish_non_exhaustive()
    }
}

impl ToutiaoClient {
    /// Creates a client and its artifact directories.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Io`] if the artifact directories cannot be
    /// created.
    pub fn new(config: ClientConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.screenshot_dir)?;
        if let Some(parent) = config.qr_image_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let session_config = SessionConfig {
            screenshot_dir: config.screenshot_dir.clone(),
            browser_binary: config.browser_binary.clone(),
            ..SessionConfig::default()
        };

        let (online_tx, online_rx) = watch::channel(false);

        Ok(Self {
            inner: Arc::new(ClientInner {
                session: Session::new(session_config),
                waiter: ResponseWaiter::new(),
                qr_image_path: config.qr_image_path,
                login_config: config.login,
                login_state: Mutex::new(LoginState::NotStarted),
                online_tx,
                online_rx,
                login_task: Mutex::new(None),
            }),
        })
    }
}

// ============================================================================
// ToutiaoClient - Lifecycle
// ============================================================================

impl ToutiaoClient {
    /// Launches the browser and starts the QR login flow in the background.
    ///
    /// Returns before authentication completes; use
    /// [`ToutiaoClient::online`] to wait for it.
    ///
    /// # Errors
    ///
    /// Returns the session launch error; login errors never surface here.
    pub async fn start(&self) -> Result<()> {
        self.inner.session.start().await?;

        let mut task = self.inner.login_task.lock();
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            debug!("login task already running");
            return Ok(());
        }

        let client = self.clone();
        *task = Some(tokio::spawn(async move {
            login::run(client).await;
        }));

        info!("session started, login running in background");
        Ok(())
    }

    /// Stops the login task and tears down the browser.
    pub async fn stop(&self) -> Result<()> {
        if let Some(task) = self.inner.login_task.lock().take() {
            task.abort();
        }
        self.inner.session.stop().await
    }

    /// Readiness gate: resolves once login has succeeded.
    ///
    /// Returns immediately if already online; otherwise suspends until the
    /// login-succeeded signal fires. Permanently satisfied afterwards; any
    /// number of concurrent callers unblock together.
    pub async fn online(&self) {
        let mut rx = self.inner.online_rx.clone();
        if *rx.borrow() {
            return;
        }
        while rx.changed().await.is_ok() {
            if *rx.borrow() {
                return;
            }
        }
    }

    /// Returns `true` once login has succeeded.
    #[inline]
    #[must_use]
    pub fn is_online(&self) -> bool {
        *self.inner.online_rx.borrow()
    }

    /// Returns the current login state.
    #[must_use]
    pub fn login_state(&self) -> LoginState {
        self.inner.login_state.lock().clone()
    }

    /// Marks the client online, releasing all readiness waiters.
    pub(crate) fn set_online(&self) {
        let _ = self.inner.online_tx.send(true);
    }

    /// Records a login state transition.
    pub(crate) fn set_login_state(&self, state: LoginState) {
        *self.inner.login_state.lock() = state;
    }
}

// ============================================================================
// ToutiaoClient - Navigation
// ============================================================================

impl ToutiaoClient {
    /// Opens a page at `path`, optionally intercepting its responses.
    ///
    /// `path` is joined with the base URL unless it is already absolute.
    /// With a `name`, the interceptor is registered for
    /// [`ToutiaoClient::wait_response`]; without one it runs fire-and-forget
    /// and its results are discarded.
    ///
    /// Returns the page and the top-level document response; subsidiary
    /// requests are not awaited.
    pub async fn goto(
        &self,
        path: &str,
        interceptor: Option<ResponseHandler>,
        name: Option<&str>,
    ) -> Result<(Page, PageResponse)> {
        let url = self.inner.session.resolve_url(path)?;
        let page = self.inner.session.new_page().await?;

        if let Some(handler) = interceptor {
            match name {
                Some(name) => self.inner.waiter.attach(&page, name, handler),
                None => self.inner.waiter.attach_raw(&page, handler),
            }
        }

        let response = page.navigate(url.as_str()).await?;
        debug!(url = %url, status = response.status, "page loaded");

        Ok((page, response))
    }

    /// Waits for a named interceptor's result.
    ///
    /// # Errors
    ///
    /// See [`ResponseWaiter::wait`].
    pub async fn wait_response(&self, name: &str, wait: Duration) -> Result<Value> {
        self.inner.waiter.wait(name, wait).await
    }

    /// Publishes a short text post with optional image attachments.
    ///
    /// Failures are logged and absorbed; callers must infer the outcome from
    /// logs and diagnostics.
    pub async fn post_weitoutiao(&self, text: &str, images: &[PathBuf]) {
        publish::run(self, text, images).await;
    }
}

// ============================================================================
// ToutiaoClient - Accessors & Diagnostics
// ============================================================================

impl ToutiaoClient {
    /// Returns the underlying browser session.
    #[inline]
    #[must_use]
    pub fn session(&self) -> &Session {
        &self.inner.session
    }

    /// Returns the QR image path.
    #[inline]
    #[must_use]
    pub fn qr_image_path(&self) -> &Path {
        &self.inner.qr_image_path
    }

    /// Returns the login flow tuning.
    #[inline]
    #[must_use]
    pub(crate) fn login_config(&self) -> &LoginConfig {
        &self.inner.login_config
    }

    /// Captures a screenshot and a full-markup dump for a failed flow.
    ///
    /// Best effort: diagnostics must never mask the original failure.
    pub(crate) async fn dump_diagnostics(&self, page: &Page) {
        let url = page.url().await.unwrap_or_default();
        let stem = diagnostic_stem(&url, Local::now());
        let dir = self.inner.session.screenshot_dir();

        match page.screenshot_png().await {
            Ok(bytes) => {
                let path = dir.join(format!("{stem}.png"));
                if let Err(e) = tokio::fs::write(&path, bytes).await {
                    debug!(error = %e, path = %path.display(), "screenshot write failed");
                } else {
                    info!(path = %path.display(), "diagnostic screenshot saved");
                }
            }
            Err(e) => debug!(error = %e, "screenshot capture failed"),
        }

        match page.content().await {
            Ok(markup) => {
                let path = dir.join(format!("{stem}.html"));
                if let Err(e) = tokio::fs::write(&path, markup).await {
                    debug!(error = %e, path = %path.display(), "markup dump failed");
                }
            }
            Err(e) => debug!(error = %e, "markup capture failed"),
        }
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Builds the `<lastPathSegment>-<YYYYMMDD-HHMM>` artifact stem for a URL.
pub(crate) fn diagnostic_stem(url: &str, now: DateTime<Local>) -> String {
    let path = url.split('?').next().unwrap_or(url);
    let last = path.rsplit('/').next().unwrap_or("");
    let stem = if last.is_empty() { "page" } else { last };

    format!("{stem}-{}", now.format("%Y%m%d-%H%M"))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::TimeZone;

    fn fixed_time() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 7, 14, 5, 0).unwrap()
    }

    #[test]
    fn test_diagnostic_stem_uses_last_segment() {
        let stem = diagnostic_stem("https://mp.toutiao.com/auth/page/login", fixed_time());
        assert_eq!(stem, "login-20240307-1405");
    }

    #[test]
    fn test_diagnostic_stem_strips_query() {
        let stem = diagnostic_stem("https://mp.toutiao.com/auth/page/login?next=x", fixed_time());
        assert_eq!(stem, "login-20240307-1405");
    }

    #[test]
    fn test_diagnostic_stem_handles_bare_host() {
        let stem = diagnostic_stem("https://mp.toutiao.com/", fixed_time());
        assert_eq!(stem, "page-20240307-1405");

        let stem = diagnostic_stem("", fixed_time());
        assert_eq!(stem, "page-20240307-1405");
    }

    #[test]
    fn test_config_builders() {
        let config = ClientConfig::default()
            .with_screenshot_dir("/tmp/shots")
            .with_qr_image_path("/tmp/qr.png")
            .with_browser_binary("/usr/bin/chromium");

        assert_eq!(config.screenshot_dir, PathBuf::from("/tmp/shots"));
        assert_eq!(config.qr_image_path, PathBuf::from("/tmp/qr.png"));
        assert_eq!(
            config.browser_binary,
            Some(PathBuf::from("/usr/bin/chromium"))
        );
    }

    #[tokio::test]
    async fn test_online_gate_releases_all_waiters() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = ClientConfig::default()
            .with_screenshot_dir(dir.path().join("shots"))
            .with_qr_image_path(dir.path().join("qr.png"));
        let client = ToutiaoClient::new(config).expect("client");

        assert!(!client.is_online());
        assert_eq!(client.login_state(), LoginState::NotStarted);

        let mut waiters = Vec::new();
        for _ in 0..3 {
            let client = client.clone();
            waiters.push(tokio::spawn(async move {
                client.online().await;
            }));
        }

        // Not yet signalled: no waiter may complete.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(waiters.iter().all(|w| !w.is_finished()));

        client.set_online();

        for waiter in waiters {
            waiter.await.expect("waiter released");
        }

        // Memoized: later callers return immediately.
        client.online().await;
        assert!(client.is_online());
    }
}
