//! Outgoing command messages.
//!
//! A [`MethodCall`] is the single wire shape for every command sent to the
//! browser.
//!
//! # Format
//!
//! ```json
//! {
//!   "id": 12,
//!   "sessionId": "8E5A...",
//!   "method": "Page.navigate",
//!   "params": { "url": "https://mp.toutiao.com/" }
//! }
//! ```
//!
//! `sessionId` is omitted for browser-level commands (`Target.*`,
//! `Browser.*`).

// ============================================================================
// Imports
// ============================================================================

use serde::Serialize;
use serde_json::Value;

// ============================================================================
// MethodCall
// ============================================================================

/// A command message from the client to the browser.
#[derive(Debug, Clone, Serialize)]
pub struct MethodCall {
    /// Monotonic identifier for request/response correlation.
    pub id: u64,

    /// Target session (page) the command applies to, if any.
    #[serde(rename = "sessionId", skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    /// Method in `Domain.method` format.
    pub method: String,

    /// Method parameters.
    pub params: Value,
}

impl MethodCall {
    /// Creates a browser-level command (no session).
    #[inline]
    #[must_use]
    pub fn browser(id: u64, method: impl Into<String>, params: Value) -> Self {
        Self {
            id,
            session_id: None,
            method: method.into(),
            params,
        }
    }

    /// Creates a session-scoped command.
    #[inline]
    #[must_use]
    pub fn session(
        id: u64,
        session_id: impl Into<String>,
        method: impl Into<String>,
        params: Value,
    ) -> Self {
        Self {
            id,
            session_id: Some(session_id.into()),
            method: method.into(),
            params,
        }
    }

    /// Returns the protocol domain of the method.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let call = MethodCall::browser(1, "Target.createTarget", json!({}));
    /// assert_eq!(call.domain(), "Target");
    /// ```
    #[inline]
    #[must_use]
    pub fn domain(&self) -> &str {
        self.method.split('.').next().unwrap_or_default()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_browser_command_omits_session() {
        let call = MethodCall::browser(1, "Target.createTarget", json!({ "url": "about:blank" }));
        let wire = serde_json::to_string(&call).expect("serialize");

        assert!(wire.contains("\"id\":1"));
        assert!(wire.contains("Target.createTarget"));
        assert!(!wire.contains("sessionId"));
    }

    #[test]
    fn test_session_command_carries_session() {
        let call = MethodCall::session(7, "ABC123", "Page.navigate", json!({ "url": "https://x" }));
        let wire = serde_json::to_string(&call).expect("serialize");

        assert!(wire.contains("\"sessionId\":\"ABC123\""));
        assert!(wire.contains("Page.navigate"));
    }

    #[test]
    fn test_domain() {
        let call = MethodCall::browser(1, "Network.enable", json!({}));
        assert_eq!(call.domain(), "Network");
    }
}
