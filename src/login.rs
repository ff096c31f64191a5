//! QR-code login flow.
//!
//! The flow is a retrying state machine driven by out-of-band human action:
//! navigate to the login page, extract the QR code from its inlined data
//! URL, persist it for the companion web endpoint, then block until the page
//! navigates into the authenticated profile area.
//!
//! Every failure — missing element, malformed data URL, wrong redirect
//! target, timeout — is converted into a retry with exponential backoff.
//! The flow never surfaces an error to its caller; by default it retries
//! until it succeeds or the process is torn down. [`LoginConfig`] can cap
//! the attempt count and the backoff ceiling.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use tracing::{error, info, warn};

use crate::browser::Page;
use crate::client::ToutiaoClient;
use crate::dataurl::DataUrl;
use crate::error::{Error, Result};
use crate::site;

// ============================================================================
// LoginState
// ============================================================================

/// Observable state of the login flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginState {
    /// The flow has not been started.
    NotStarted,
    /// The QR image is published; waiting for a scan.
    AwaitingScan,
    /// Login succeeded; terminal.
    Authenticated,
    /// An attempt failed; a retry is scheduled.
    ///
    /// Never terminal — the flow always schedules another attempt (unless a
    /// configured cap stops it).
    Failed {
        /// The attempt that failed, 1-based.
        attempt: u32,
        /// The backoff slept before the next attempt.
        delay: Duration,
    },
}

// ============================================================================
// LoginConfig
// ============================================================================

/// Login flow tuning.
#[derive(Debug, Clone)]
pub struct LoginConfig {
    /// Backoff slept after the first failed attempt; doubles each failure.
    pub initial_backoff: Duration,

    /// Ceiling for the backoff delay. Unlimited when unset.
    pub max_backoff: Option<Duration>,

    /// Maximum number of attempts. Unlimited when unset, matching the
    /// observed retry-forever behavior.
    pub max_attempts: Option<u32>,

    /// Window to wait for the post-scan navigation before retrying.
    pub navigation_timeout: Duration,
}

impl Default for LoginConfig {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_millis(1500),
            max_backoff: None,
            max_attempts: None,
            navigation_timeout: Duration::from_secs(30),
        }
    }
}

// ============================================================================
// Flow
// ============================================================================

/// Drives the login flow until it succeeds or a configured cap stops it.
pub(crate) async fn run(client: ToutiaoClient) {
    let config = client.login_config().clone();
    let mut delay = config.initial_backoff;
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;
        client.set_login_state(LoginState::AwaitingScan);

        match attempt_once(&client, &config).await {
            Ok(url) => {
                info!(url = %url, attempt, "login succeeded");
                client.set_login_state(LoginState::Authenticated);
                client.set_online();
                return;
            }

            Err((err, page)) => {
                warn!(
                    error = %err,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "login failed, retrying"
                );
                client.set_login_state(LoginState::Failed { attempt, delay });

                if let Some(page) = page {
                    client.dump_diagnostics(&page).await;
                    let _ = page.close().await;
                }

                if let Some(max) = config.max_attempts
                    && attempt >= max
                {
                    error!(attempts = attempt, "login attempt cap reached, giving up");
                    return;
                }

                tokio::time::sleep(delay).await;
                delay = next_delay(delay, config.max_backoff);
            }
        }
    }
}

/// One login attempt: QR publication plus navigation validation.
///
/// The failed page rides along for diagnostics.
async fn attempt_once(
    client: &ToutiaoClient,
    config: &LoginConfig,
) -> std::result::Result<String, (Error, Option<Page>)> {
    let (page, _response) = client
        .goto(site::LOGIN_PATH, None, None)
        .await
        .map_err(|e| (e, None))?;

    match drive(client, config, &page).await {
        Ok(url) => Ok(url),
        Err(e) => Err((e, Some(page))),
    }
}

/// The attempt body, separated so any failure keeps the page for dumping.
async fn drive(client: &ToutiaoClient, config: &LoginConfig, page: &Page) -> Result<String> {
    let data_url = img_data_url(page, site::QRCODE_IMG).await?;
    let image = DataUrl::parse(&data_url)?.decode()?;

    image.save(client.qr_image_path())?;
    info!(
        path = %client.qr_image_path().display(),
        "QR image written; scan it from the companion endpoint to log in"
    );

    let url = page.wait_for_navigation(config.navigation_timeout).await?;

    if !url.contains(site::PROFILE_MARKER) {
        return Err(Error::navigation_mismatch(url, site::PROFILE_MARKER));
    }

    Ok(url)
}

/// Reads the inlined data URL from an image element's `src` attribute.
async fn img_data_url(page: &Page, selector: &str) -> Result<String> {
    let element = page.wait_for_selector(selector).await?;

    element
        .attribute("src")
        .await?
        .ok_or_else(|| Error::data_url(format!("element '{selector}' has no src attribute")))
}

/// Doubles the backoff, honoring the configured ceiling.
fn next_delay(current: Duration, ceiling: Option<Duration>) -> Duration {
    let doubled = current.saturating_mul(2);
    match ceiling {
        Some(max) => doubled.min(max),
        None => doubled,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_from_initial() {
        let config = LoginConfig::default();
        assert_eq!(config.initial_backoff, Duration::from_millis(1500));

        let second = next_delay(config.initial_backoff, None);
        let third = next_delay(second, None);

        assert_eq!(second, Duration::from_millis(3000));
        assert_eq!(third, Duration::from_millis(6000));
    }

    #[test]
    fn test_backoff_honors_ceiling() {
        let ceiling = Some(Duration::from_secs(4));

        let delay = next_delay(Duration::from_secs(3), ceiling);
        assert_eq!(delay, Duration::from_secs(4));

        let delay = next_delay(delay, ceiling);
        assert_eq!(delay, Duration::from_secs(4));
    }

    #[test]
    fn test_default_config_retries_forever() {
        let config = LoginConfig::default();
        assert!(config.max_attempts.is_none());
        assert!(config.max_backoff.is_none());
        assert_eq!(config.navigation_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_failed_state_carries_attempt_and_delay() {
        let state = LoginState::Failed {
            attempt: 2,
            delay: Duration::from_secs(3),
        };

        assert_ne!(state, LoginState::Authenticated);
        let LoginState::Failed { attempt, delay } = state else {
            panic!("expected failed state");
        };
        assert_eq!(attempt, 2);
        assert_eq!(delay, Duration::from_secs(3));
    }
}
