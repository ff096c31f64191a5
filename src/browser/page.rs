//! Page targets: navigation, scripting, screenshots.
//!
//! A [`Page`] wraps an attached browser target. Navigation returns the
//! top-level document response only; subsidiary requests (images, scripts,
//! XHR) are observed through [`crate::browser::ResponseWaiter`] instead.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as Base64Standard;
use parking_lot::Mutex as ParkingMutex;
use serde_json::{Value, json};
use tokio::sync::{Notify, oneshot};
use tokio::time::timeout;
use tracing::debug;

use crate::error::{Error, Result};
use crate::protocol::{FrameNavigatedParams, ResponseData, ResponseReceivedParams};
use crate::transport::{Connection, EventHandler, HandlerId};

use super::element::ElementHandle;

// ============================================================================
// Constants
// ============================================================================

/// Maximum time to wait for the top-level document response of a navigation.
const NAVIGATION_RESPONSE_TIMEOUT: Duration = Duration::from_secs(30);

/// Default timeout for [`Page::wait_for_selector`].
const DEFAULT_SELECTOR_TIMEOUT: Duration = Duration::from_secs(10);

/// Poll interval for selector waits.
const SELECTOR_POLL_INTERVAL: Duration = Duration::from_millis(100);

// ============================================================================
// PageResponse
// ============================================================================

/// The top-level document response of a navigation.
#[derive(Debug, Clone)]
pub struct PageResponse {
    /// Final document URL.
    pub url: String,
    /// HTTP status code.
    pub status: u16,
    /// HTTP status text.
    pub status_text: String,
    /// MIME type of the document.
    pub mime_type: String,
}

impl From<ResponseData> for PageResponse {
    fn from(data: ResponseData) -> Self {
        Self {
            url: data.url,
            status: data.status,
            status_text: data.status_text,
            mime_type: data.mime_type,
        }
    }
}

// ============================================================================
// Page
// ============================================================================

struct PageInner {
    connection: Connection,
    session_id: String,
    target_id: String,
}

/// A handle to an attached page.
///
/// Cheap to clone; all clones refer to the same target.
#[derive(Clone)]
pub struct Page {
    inner: Arc<PageInner>,
}

impl fmt::Debug for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Page")
            .field("target_id", &self.inner.target_id)
            .field("session_id", &self.inner.session_id)
            .finish_non_exhaustive()
    }
}

impl Page {
    /// Creates a page handle for an attached target.
    pub(crate) fn new(connection: Connection, session_id: String, target_id: String) -> Self {
        Self {
            inner: Arc::new(PageInner {
                connection,
                session_id,
                target_id,
            }),
        }
    }

    /// Returns the DevTools session id of this page.
    #[inline]
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.inner.session_id
    }

    /// Returns the target id of this page.
    #[inline]
    #[must_use]
    pub fn target_id(&self) -> &str {
        &self.inner.target_id
    }
}

// ============================================================================
// Page - Internal plumbing
// ============================================================================

impl Page {
    /// Sends a session-scoped command and returns its result.
    pub(crate) async fn command(&self, method: &str, params: Value) -> Result<Value> {
        self.inner
            .connection
            .send_to_session(&self.inner.session_id, method, params)
            .await
    }

    /// Registers an event handler scoped to this page's session.
    pub(crate) fn add_event_handler(&self, handler: EventHandler) -> HandlerId {
        self.inner
            .connection
            .add_event_handler(Some(self.inner.session_id.clone()), handler)
    }

    /// Removes a previously registered event handler.
    pub(crate) fn remove_event_handler(&self, id: HandlerId) {
        self.inner.connection.remove_event_handler(id);
    }

    /// Enables the protocol domains this crate relies on.
    pub(crate) async fn enable_domains(&self) -> Result<()> {
        self.command("Page.enable", json!({})).await?;
        self.command("Runtime.enable", json!({})).await?;
        self.command("Network.enable", json!({})).await?;
        Ok(())
    }

    /// Installs the preload script, executed before any page script on every
    /// subsequent navigation of this page.
    pub(crate) async fn install_preload(&self, source: &str) -> Result<()> {
        if source.trim().is_empty() {
            return Ok(());
        }
        self.command(
            "Page.addScriptToEvaluateOnNewDocument",
            json!({ "source": source }),
        )
        .await?;
        Ok(())
    }
}

// ============================================================================
// Page - Navigation
// ============================================================================

impl Page {
    /// Navigates to an absolute URL and returns the document response.
    ///
    /// Only the top-level document response is awaited; subsidiary requests
    /// continue in the background.
    ///
    /// # Errors
    ///
    /// - [`Error::Connection`] if the navigation itself fails (DNS, refused)
    /// - [`Error::Timeout`] if no document response arrives in time
    pub async fn navigate(&self, url: &str) -> Result<PageResponse> {
        debug!(url = %url, target_id = %self.inner.target_id, "navigating");

        let captured: Arc<ParkingMutex<Vec<ResponseReceivedParams>>> =
            Arc::new(ParkingMutex::new(Vec::new()));
        let notify = Arc::new(Notify::new());

        let captured_clone = Arc::clone(&captured);
        let notify_clone = Arc::clone(&notify);
        let handler_id = self.add_event_handler(Box::new(move |event| {
            if event.method != "Network.responseReceived" {
                return;
            }
            if let Ok(params) = event.params_as::<ResponseReceivedParams>()
                && params.resource_type.as_deref() == Some("Document")
            {
                captured_clone.lock().push(params);
                notify_clone.notify_waiters();
            }
        }));

        let navigate = self.command("Page.navigate", json!({ "url": url })).await;
        let result = match navigate {
            Ok(result) => result,
            Err(e) => {
                self.remove_event_handler(handler_id);
                return Err(e);
            }
        };

        if let Some(error_text) = result.get("errorText").and_then(Value::as_str)
            && !error_text.is_empty()
        {
            self.remove_event_handler(handler_id);
            return Err(Error::connection(format!("navigation failed: {error_text}")));
        }

        let loader_id = result
            .get("loaderId")
            .and_then(Value::as_str)
            .map(str::to_string);

        let response = self
            .await_document_response(&captured, &notify, loader_id.as_deref())
            .await;

        self.remove_event_handler(handler_id);
        response
    }

    /// Waits for the document response matching the navigation's loader.
    async fn await_document_response(
        &self,
        captured: &ParkingMutex<Vec<ResponseReceivedParams>>,
        notify: &Notify,
        loader_id: Option<&str>,
    ) -> Result<PageResponse> {
        let deadline = tokio::time::Instant::now() + NAVIGATION_RESPONSE_TIMEOUT;

        loop {
            let notified = notify.notified();

            let matched = {
                let responses = captured.lock();
                responses
                    .iter()
                    .find(|params| match loader_id {
                        Some(id) => params.loader_id.as_deref() == Some(id),
                        None => true,
                    })
                    .map(|params| params.response.clone())
            };

            if let Some(response) = matched {
                debug!(status = response.status, url = %response.url, "document response");
                return Ok(PageResponse::from(response));
            }

            if timeout(deadline - tokio::time::Instant::now(), notified)
                .await
                .is_err()
            {
                return Err(Error::timeout(
                    "navigation document response",
                    NAVIGATION_RESPONSE_TIMEOUT.as_millis() as u64,
                ));
            }
        }
    }

    /// Waits for the next main-frame navigation and returns the new URL.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Timeout`] if no navigation occurs within the window.
    pub async fn wait_for_navigation(&self, wait: Duration) -> Result<String> {
        let (tx, rx) = oneshot::channel::<String>();
        let tx = Arc::new(ParkingMutex::new(Some(tx)));

        let tx_clone = Arc::clone(&tx);
        let handler_id = self.add_event_handler(Box::new(move |event| {
            if event.method != "Page.frameNavigated" {
                return;
            }
            if let Ok(params) = event.params_as::<FrameNavigatedParams>()
                && params.frame.is_main()
                && let Some(tx) = tx_clone.lock().take()
            {
                let _ = tx.send(params.frame.url);
            }
        }));

        let outcome = timeout(wait, rx).await;
        self.remove_event_handler(handler_id);

        match outcome {
            Ok(Ok(url)) => {
                debug!(url = %url, "page navigated");
                Ok(url)
            }
            Ok(Err(e)) => Err(Error::ChannelClosed(e)),
            Err(_) => Err(Error::timeout(
                "wait_for_navigation",
                wait.as_millis() as u64,
            )),
        }
    }

    /// Returns the current document URL.
    pub async fn url(&self) -> Result<String> {
        let value = self.evaluate("document.location.href").await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    /// Closes this page's target.
    pub async fn close(&self) -> Result<()> {
        debug!(target_id = %self.inner.target_id, "closing page");
        self.inner
            .connection
            .send(
                "Target.closeTarget",
                json!({ "targetId": self.inner.target_id }),
            )
            .await?;
        Ok(())
    }
}

// ============================================================================
// Page - Scripting
// ============================================================================

impl Page {
    /// Evaluates a JavaScript expression and returns its value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ScriptError`] if the expression throws.
    pub async fn evaluate(&self, expression: &str) -> Result<Value> {
        let result = self
            .command(
                "Runtime.evaluate",
                json!({
                    "expression": expression,
                    "returnByValue": true,
                    "awaitPromise": true,
                }),
            )
            .await?;

        check_exception(&result)?;

        Ok(result
            .get("result")
            .and_then(|r| r.get("value"))
            .cloned()
            .unwrap_or(Value::Null))
    }

    /// Evaluates an expression and returns a remote object id, if the result
    /// is an object.
    pub(crate) async fn evaluate_object(&self, expression: &str) -> Result<Option<String>> {
        let result = self
            .command(
                "Runtime.evaluate",
                json!({
                    "expression": expression,
                    "returnByValue": false,
                    "awaitPromise": true,
                }),
            )
            .await?;

        check_exception(&result)?;

        Ok(result
            .get("result")
            .and_then(|r| r.get("objectId"))
            .and_then(Value::as_str)
            .map(str::to_string))
    }

    /// Calls a function with a remote object as `this`.
    pub(crate) async fn call_function_on(
        &self,
        object_id: &str,
        declaration: &str,
        return_by_value: bool,
    ) -> Result<Value> {
        let result = self
            .command(
                "Runtime.callFunctionOn",
                json!({
                    "objectId": object_id,
                    "functionDeclaration": declaration,
                    "returnByValue": return_by_value,
                    "awaitPromise": true,
                }),
            )
            .await?;

        check_exception(&result)?;

        Ok(result
            .get("result")
            .and_then(|r| r.get("value"))
            .cloned()
            .unwrap_or(Value::Null))
    }

    /// Finds an element by CSS selector in the current DOM.
    ///
    /// Returns `None` when nothing matches; use [`Page::wait_for_selector`]
    /// for elements that appear asynchronously.
    pub async fn query_selector(&self, selector: &str) -> Result<Option<ElementHandle>> {
        let expression = format!("document.querySelector({})", json_string(selector));
        let object_id = self.evaluate_object(&expression).await?;
        Ok(object_id.map(|id| ElementHandle::new(self.clone(), id)))
    }

    /// Waits for a CSS selector to match, polling the live DOM.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ElementNotFound`] after the default timeout.
    pub async fn wait_for_selector(&self, selector: &str) -> Result<ElementHandle> {
        self.wait_for_selector_timeout(selector, DEFAULT_SELECTOR_TIMEOUT)
            .await
    }

    /// Waits for a CSS selector to match with a custom timeout.
    pub async fn wait_for_selector_timeout(
        &self,
        selector: &str,
        wait: Duration,
    ) -> Result<ElementHandle> {
        let deadline = tokio::time::Instant::now() + wait;

        loop {
            if let Some(handle) = self.query_selector(selector).await? {
                return Ok(handle);
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(Error::element_not_found(selector, wait.as_millis() as u64));
            }
            tokio::time::sleep(SELECTOR_POLL_INTERVAL).await;
        }
    }

    /// Returns the full page markup.
    pub async fn content(&self) -> Result<String> {
        let value = self.evaluate("document.documentElement.outerHTML").await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }
}

// ============================================================================
// Page - Network & Screenshots
// ============================================================================

impl Page {
    /// Fetches the body of a previously observed response.
    pub async fn response_body(&self, request_id: &str) -> Result<Vec<u8>> {
        let result = self
            .command(
                "Network.getResponseBody",
                json!({ "requestId": request_id }),
            )
            .await?;

        let body = result
            .get("body")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let encoded = result
            .get("base64Encoded")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        if encoded {
            Base64Standard
                .decode(body)
                .map_err(|e| Error::protocol(format!("invalid response body base64: {e}")))
        } else {
            Ok(body.as_bytes().to_vec())
        }
    }

    /// Captures a PNG screenshot of the viewport.
    pub async fn screenshot_png(&self) -> Result<Vec<u8>> {
        let result = self
            .command("Page.captureScreenshot", json!({ "format": "png" }))
            .await?;

        let data = result
            .get("data")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::protocol("screenshot response missing data"))?;

        Base64Standard
            .decode(data)
            .map_err(|e| Error::protocol(format!("invalid screenshot base64: {e}")))
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Escapes a string for safe embedding in JavaScript source.
pub(crate) fn json_string(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| format!("\"{s}\""))
}

/// Surfaces a Runtime exception as [`Error::ScriptError`].
fn check_exception(result: &Value) -> Result<()> {
    let Some(details) = result.get("exceptionDetails") else {
        return Ok(());
    };

    let message = details
        .get("exception")
        .and_then(|e| e.get("description"))
        .and_then(Value::as_str)
        .or_else(|| details.get("text").and_then(Value::as_str))
        .unwrap_or("unknown script exception");

    Err(Error::script_error(message))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_string_escapes() {
        assert_eq!(json_string("div.editor"), "\"div.editor\"");
        assert_eq!(json_string("a\"b"), "\"a\\\"b\"");
    }

    #[test]
    fn test_check_exception_passes_clean_result() {
        let result = json!({ "result": { "value": 1 } });
        assert!(check_exception(&result).is_ok());
    }

    #[test]
    fn test_check_exception_surfaces_description() {
        let result = json!({
            "result": {},
            "exceptionDetails": {
                "text": "Uncaught",
                "exception": { "description": "TypeError: x is not a function" }
            }
        });

        let err = check_exception(&result).unwrap_err();
        assert!(matches!(err, Error::ScriptError { .. }));
        assert!(err.to_string().contains("TypeError"));
    }

    #[test]
    fn test_page_response_from_data() {
        let data = ResponseData {
            url: "https://mp.toutiao.com/auth/page/login".to_string(),
            status: 200,
            status_text: "OK".to_string(),
            mime_type: "text/html".to_string(),
        };

        let response = PageResponse::from(data);
        assert_eq!(response.status, 200);
        assert_eq!(response.mime_type, "text/html");
    }
}
