//! Error types for the Toutiao client.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use toutiao_client::{Result, ElementQuery, Selection};
//!
//! async fn example(page: &Page) -> Result<()> {
//!     let button = ElementQuery::button(Selection::caption("发布"))?;
//!     button.bind(page).await?.click().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`], [`Error::BrowserNotFound`] |
//! | Lifecycle | [`Error::ProcessLaunchFailed`], [`Error::SessionNotStarted`] |
//! | Connection | [`Error::Connection`], [`Error::ConnectionTimeout`], [`Error::ConnectionClosed`] |
//! | Protocol | [`Error::Cdp`], [`Error::Protocol`] |
//! | Element | [`Error::InvalidSelector`], [`Error::ElementNotFound`], [`Error::MultipleMatches`] |
//! | Flow | [`Error::NavigationMismatch`], [`Error::DataUrl`] |
//! | Execution | [`Error::ScriptError`], [`Error::Timeout`], [`Error::WaitNotFound`] |
//! | External | [`Error::Io`], [`Error::Json`], [`Error::WebSocket`], [`Error::Image`], [`Error::Url`] |

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;

use thiserror::Error;
use tokio::sync::oneshot::error::RecvError;
use tokio_tungstenite::tungstenite::Error as WsError;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when client or session configuration is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// No Chromium/Chrome binary could be located.
    #[error("Browser binary not found (looked for {candidates})")]
    BrowserNotFound {
        /// The names/paths that were tried.
        candidates: String,
    },

    /// Failed to launch the browser process.
    #[error("Failed to launch browser: {message}")]
    ProcessLaunchFailed {
        /// Description of the launch failure.
        message: String,
    },

    /// Operation attempted on a session that is not running.
    ///
    /// Returned for navigation or page creation before `start()` or after
    /// `stop()`.
    #[error("Session is not started")]
    SessionNotStarted,

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// DevTools WebSocket connection failed.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// Timed out waiting for the browser to expose its DevTools endpoint.
    #[error("Connection timeout after {timeout_ms}ms")]
    ConnectionTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// DevTools connection closed unexpectedly.
    #[error("Connection closed")]
    ConnectionClosed,

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// Error response from the DevTools protocol.
    #[error("CDP error {code}: {message}")]
    Cdp {
        /// Protocol error code.
        code: i64,
        /// Protocol error message.
        message: String,
    },

    /// Protocol violation or unexpected message shape.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    // ========================================================================
    // Element Errors
    // ========================================================================
    /// Invalid element selection specification.
    ///
    /// Returned when an element query is built with zero or more than one
    /// selection key. This is a caller bug, never retried.
    #[error("Invalid selector: {message}")]
    InvalidSelector {
        /// Description of the invalid selection.
        message: String,
    },

    /// No element matched the query within the bind timeout.
    #[error("Element not found: {selector} (waited {timeout_ms}ms)")]
    ElementNotFound {
        /// Selector that was searched.
        selector: String,
        /// Milliseconds waited before giving up.
        timeout_ms: u64,
    },

    /// More than one element matched an unambiguous query.
    ///
    /// Ambiguous selectors are a caller bug, never retried.
    #[error("Multiple matches ({count}) for: {selector}")]
    MultipleMatches {
        /// Selector that was searched.
        selector: String,
        /// Number of matching nodes.
        count: usize,
    },

    // ========================================================================
    // Flow Errors
    // ========================================================================
    /// Post-login navigation landed on an unexpected URL.
    #[error("Navigation mismatch: {url} does not contain '{expected}'")]
    NavigationMismatch {
        /// The URL the page actually navigated to.
        url: String,
        /// Substring expected in the authenticated-area URL.
        expected: String,
    },

    /// Malformed or unsupported inline data URL.
    #[error("Data URL error: {message}")]
    DataUrl {
        /// Description of the problem.
        message: String,
    },

    // ========================================================================
    // Execution Errors
    // ========================================================================
    /// JavaScript evaluation failed in the page.
    #[error("Script error: {message}")]
    ScriptError {
        /// Error message from script execution.
        message: String,
    },

    /// Operation timeout.
    #[error("Timeout after {timeout_ms}ms: {operation}")]
    Timeout {
        /// Description of the operation that timed out.
        operation: String,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// Waited on a response name with no registered entry.
    #[error("No pending wait registered as '{name}'")]
    WaitNotFound {
        /// The unregistered wait name.
        name: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),

    /// Channel receive error.
    #[error("Channel closed")]
    ChannelClosed(#[from] RecvError),

    /// Image decode/encode error.
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// URL parse error.
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a browser-not-found error.
    #[inline]
    pub fn browser_not_found(candidates: impl Into<String>) -> Self {
        Self::BrowserNotFound {
            candidates: candidates.into(),
        }
    }

    /// Creates a process launch failed error.
    #[inline]
    pub fn process_launch_failed(err: IoError) -> Self {
        Self::ProcessLaunchFailed {
            message: err.to_string(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a connection timeout error.
    #[inline]
    pub fn connection_timeout(timeout_ms: u64) -> Self {
        Self::ConnectionTimeout { timeout_ms }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates an invalid selector error.
    #[inline]
    pub fn invalid_selector(message: impl Into<String>) -> Self {
        Self::InvalidSelector {
            message: message.into(),
        }
    }

    /// Creates an element-not-found error.
    #[inline]
    pub fn element_not_found(selector: impl Into<String>, timeout_ms: u64) -> Self {
        Self::ElementNotFound {
            selector: selector.into(),
            timeout_ms,
        }
    }

    /// Creates a multiple-matches error.
    #[inline]
    pub fn multiple_matches(selector: impl Into<String>, count: usize) -> Self {
        Self::MultipleMatches {
            selector: selector.into(),
            count,
        }
    }

    /// Creates a navigation mismatch error.
    #[inline]
    pub fn navigation_mismatch(url: impl Into<String>, expected: impl Into<String>) -> Self {
        Self::NavigationMismatch {
            url: url.into(),
            expected: expected.into(),
        }
    }

    /// Creates a data URL error.
    #[inline]
    pub fn data_url(message: impl Into<String>) -> Self {
        Self::DataUrl {
            message: message.into(),
        }
    }

    /// Creates a script error.
    #[inline]
    pub fn script_error(message: impl Into<String>) -> Self {
        Self::ScriptError {
            message: message.into(),
        }
    }

    /// Creates a timeout error.
    #[inline]
    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    /// Creates a wait-not-found error.
    #[inline]
    pub fn wait_not_found(name: impl Into<String>) -> Self {
        Self::WaitNotFound { name: name.into() }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::ConnectionTimeout { .. } | Self::Timeout { .. })
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::ConnectionTimeout { .. }
                | Self::ConnectionClosed
                | Self::WebSocket(_)
        )
    }

    /// Returns `true` if this error is a non-retryable caller bug.
    ///
    /// Selector construction and ambiguity errors must be fixed at the call
    /// site; retrying them can never succeed.
    #[inline]
    #[must_use]
    pub fn is_caller_bug(&self) -> bool {
        matches!(
            self,
            Self::InvalidSelector { .. } | Self::MultipleMatches { .. }
        )
    }

    /// Returns `true` if this error may succeed on retry.
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ConnectionTimeout { .. }
                | Self::Timeout { .. }
                | Self::ElementNotFound { .. }
                | Self::NavigationMismatch { .. }
        )
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::ErrorKind;

    #[test]
    fn test_error_display() {
        let err = Error::connection("failed to connect");
        assert_eq!(err.to_string(), "Connection failed: failed to connect");
    }

    #[test]
    fn test_invalid_selector_display() {
        let err = Error::invalid_selector("no selection key set");
        assert_eq!(err.to_string(), "Invalid selector: no selection key set");
    }

    #[test]
    fn test_multiple_matches_display() {
        let err = Error::multiple_matches("//button", 3);
        assert_eq!(err.to_string(), "Multiple matches (3) for: //button");
    }

    #[test]
    fn test_is_timeout() {
        let timeout_err = Error::timeout("bind", 5000);
        let other_err = Error::connection("test");

        assert!(timeout_err.is_timeout());
        assert!(!other_err.is_timeout());
    }

    #[test]
    fn test_is_caller_bug() {
        assert!(Error::invalid_selector("x").is_caller_bug());
        assert!(Error::multiple_matches("//a", 2).is_caller_bug());
        assert!(!Error::timeout("bind", 1).is_caller_bug());
    }

    #[test]
    fn test_is_retryable() {
        assert!(Error::timeout("wait", 1000).is_retryable());
        assert!(Error::element_not_found("//button", 10_000).is_retryable());
        assert!(Error::navigation_mismatch("https://x", "profile_v4").is_retryable());
        assert!(!Error::invalid_selector("bad").is_retryable());
    }

    #[test]
    fn test_is_connection_error() {
        assert!(Error::connection("test").is_connection_error());
        assert!(Error::connection_timeout(1000).is_connection_error());
        assert!(Error::ConnectionClosed.is_connection_error());
        assert!(!Error::config("test").is_connection_error());
    }

    #[test]
    fn test_from_io_error() {
        let io_err = IoError::new(ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }
}
