//! Incoming responses and events.
//!
//! Every text frame received from the browser is either a response (carries
//! an `id` matching a previously sent [`crate::protocol::MethodCall`]) or an
//! event (carries a `method`). [`CdpMessage::parse`] performs that split;
//! typed payload structs cover the events this crate consumes.

// ============================================================================
// Imports
// ============================================================================

use serde::Deserialize;
use serde_json::Value;

use crate::error::{Error, Result};

// ============================================================================
// CdpResponse
// ============================================================================

/// A response to a previously sent command.
///
/// # Format
///
/// Success:
/// ```json
/// { "id": 12, "result": { ... }, "sessionId": "..." }
/// ```
///
/// Error:
/// ```json
/// { "id": 12, "error": { "code": -32000, "message": "..." } }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct CdpResponse {
    /// Matches the command `id`.
    pub id: u64,

    /// Result data (if success).
    #[serde(default)]
    pub result: Option<Value>,

    /// Error data (if failure).
    #[serde(default)]
    pub error: Option<CdpErrorData>,

    /// Session the response belongs to, if session-scoped.
    #[serde(rename = "sessionId", default)]
    pub session_id: Option<String>,
}

/// Error payload of a failed command.
#[derive(Debug, Clone, Deserialize)]
pub struct CdpErrorData {
    /// Protocol error code.
    pub code: i64,
    /// Protocol error message.
    pub message: String,
}

impl CdpResponse {
    /// Returns `true` if this is a success response.
    #[inline]
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Extracts the result value, returning an error for failed commands.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cdp`] if the browser reported a command failure.
    pub fn into_result(self) -> Result<Value> {
        match self.error {
            None => Ok(self.result.unwrap_or(Value::Null)),
            Some(err) => Err(Error::Cdp {
                code: err.code,
                message: err.message,
            }),
        }
    }
}

// ============================================================================
// CdpEvent
// ============================================================================

/// An unsolicited event from the browser.
///
/// # Format
///
/// ```json
/// {
///   "method": "Network.responseReceived",
///   "params": { ... },
///   "sessionId": "8E5A..."
/// }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct CdpEvent {
    /// Event name in `Domain.event` format.
    pub method: String,

    /// Event-specific data.
    #[serde(default)]
    pub params: Value,

    /// Session the event originated from; absent for browser-level events.
    #[serde(rename = "sessionId", default)]
    pub session_id: Option<String>,
}

impl CdpEvent {
    /// Returns the protocol domain of the event.
    #[inline]
    #[must_use]
    pub fn domain(&self) -> &str {
        self.method.split('.').next().unwrap_or_default()
    }

    /// Deserializes the params into a typed payload.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if the params do not match the expected shape.
    pub fn params_as<'a, T: Deserialize<'a>>(&'a self) -> Result<T> {
        Ok(T::deserialize(&self.params)?)
    }
}

// ============================================================================
// CdpMessage
// ============================================================================

/// An incoming message, split into its two wire shapes.
#[derive(Debug, Clone)]
pub enum CdpMessage {
    /// Response to a command.
    Response(CdpResponse),
    /// Unsolicited event.
    Event(CdpEvent),
}

impl CdpMessage {
    /// Parses a raw text frame.
    ///
    /// Messages with an `id` are responses; messages with a `method` are
    /// events.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] for frames that are neither.
    pub fn parse(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)?;

        if value.get("id").is_some() {
            let response = CdpResponse::deserialize(&value)?;
            return Ok(Self::Response(response));
        }

        if value.get("method").is_some() {
            let event = CdpEvent::deserialize(&value)?;
            return Ok(Self::Event(event));
        }

        Err(Error::protocol(format!(
            "message is neither response nor event: {text}"
        )))
    }
}

// ============================================================================
// Typed Event Payloads
// ============================================================================

/// Payload of `Network.responseReceived`.
#[derive(Debug, Clone, Deserialize)]
pub struct ResponseReceivedParams {
    /// Network request id; key for `Network.getResponseBody`.
    #[serde(rename = "requestId")]
    pub request_id: String,

    /// Loader the response belongs to; matches `Page.navigate`'s loader.
    #[serde(rename = "loaderId", default)]
    pub loader_id: Option<String>,

    /// Resource type (`Document`, `XHR`, `Image`, ...).
    #[serde(rename = "type", default)]
    pub resource_type: Option<String>,

    /// Response data.
    pub response: ResponseData,
}

/// Response data within `Network.responseReceived`.
#[derive(Debug, Clone, Deserialize)]
pub struct ResponseData {
    /// Response URL.
    pub url: String,

    /// HTTP status code.
    pub status: u16,

    /// HTTP status text.
    #[serde(rename = "statusText", default)]
    pub status_text: String,

    /// MIME type of the response body.
    #[serde(rename = "mimeType", default)]
    pub mime_type: String,
}

/// Payload of `Page.frameNavigated`.
#[derive(Debug, Clone, Deserialize)]
pub struct FrameNavigatedParams {
    /// The frame that navigated.
    pub frame: FrameData,
}

/// Frame data within `Page.frameNavigated`.
#[derive(Debug, Clone, Deserialize)]
pub struct FrameData {
    /// Frame id.
    pub id: String,

    /// Parent frame id; absent for the main frame.
    #[serde(rename = "parentId", default)]
    pub parent_id: Option<String>,

    /// Document URL the frame navigated to.
    pub url: String,
}

impl FrameData {
    /// Returns `true` if this is the main frame of its target.
    #[inline]
    #[must_use]
    pub fn is_main(&self) -> bool {
        self.parent_id.is_none()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_success_response() {
        let text = r#"{ "id": 3, "result": { "frameId": "F1", "loaderId": "L1" } }"#;

        let msg = CdpMessage::parse(text).expect("parse");
        let CdpMessage::Response(resp) = msg else {
            panic!("expected response");
        };

        assert_eq!(resp.id, 3);
        assert!(resp.is_success());
        let result = resp.into_result().expect("success");
        assert_eq!(result.get("loaderId").and_then(Value::as_str), Some("L1"));
    }

    #[test]
    fn test_parse_error_response() {
        let text = r#"{ "id": 5, "error": { "code": -32000, "message": "No target" } }"#;

        let msg = CdpMessage::parse(text).expect("parse");
        let CdpMessage::Response(resp) = msg else {
            panic!("expected response");
        };

        assert!(!resp.is_success());
        let err = resp.into_result().unwrap_err();
        assert!(matches!(err, Error::Cdp { code: -32000, .. }));
    }

    #[test]
    fn test_parse_event_with_session() {
        let text = r#"{
            "method": "Page.frameNavigated",
            "params": { "frame": { "id": "F1", "url": "https://mp.toutiao.com/profile_v4/" } },
            "sessionId": "S1"
        }"#;

        let msg = CdpMessage::parse(text).expect("parse");
        let CdpMessage::Event(event) = msg else {
            panic!("expected event");
        };

        assert_eq!(event.method, "Page.frameNavigated");
        assert_eq!(event.domain(), "Page");
        assert_eq!(event.session_id.as_deref(), Some("S1"));

        let params: FrameNavigatedParams = event.params_as().expect("typed params");
        assert!(params.frame.is_main());
        assert!(params.frame.url.contains("profile_v4"));
    }

    #[test]
    fn test_parse_response_received_params() {
        let text = r#"{
            "method": "Network.responseReceived",
            "params": {
                "requestId": "R9",
                "loaderId": "L1",
                "type": "Document",
                "response": {
                    "url": "https://mp.toutiao.com/auth/page/login",
                    "status": 200,
                    "statusText": "OK",
                    "mimeType": "text/html"
                }
            },
            "sessionId": "S1"
        }"#;

        let CdpMessage::Event(event) = CdpMessage::parse(text).expect("parse") else {
            panic!("expected event");
        };

        let params: ResponseReceivedParams = event.params_as().expect("typed params");
        assert_eq!(params.request_id, "R9");
        assert_eq!(params.resource_type.as_deref(), Some("Document"));
        assert_eq!(params.response.status, 200);
        assert_eq!(params.response.mime_type, "text/html");
    }

    #[test]
    fn test_parse_rejects_unknown_shape() {
        let err = CdpMessage::parse(r#"{ "neither": true }"#).unwrap_err();
        assert!(matches!(err, Error::Protocol { .. }));
    }
}
