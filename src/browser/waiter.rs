//! Named one-shot response waits.
//!
//! A [`ResponseWaiter`] pairs an asynchronous network-response interceptor
//! with a blocking consumer. The interceptor inspects every response the
//! page observes and may derive a result from one of them; the first
//! non-empty result fires the wait exactly once.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let handler: ResponseHandler = Arc::new(|resp: CapturedResponse| {
//!     Box::pin(async move {
//!         if resp.url.contains("/api/stats") {
//!             resp.json().await.ok()
//!         } else {
//!             None
//!         }
//!     })
//! });
//!
//! client.goto("report", Some(handler), Some("stats")).await?;
//! let data = client.wait_response("stats", Duration::from_secs(5)).await?;
//! ```
//!
//! # Sharp edge
//!
//! Entries are keyed by caller-chosen names with no mutual exclusion: a
//! second `attach` reusing an in-flight name silently replaces the first
//! entry. Callers that run concurrent navigations must pick distinct names.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::protocol::ResponseReceivedParams;
use crate::transport::HandlerId;

use super::page::Page;

// ============================================================================
// Types
// ============================================================================

/// Asynchronous response interceptor.
///
/// Invoked for every network response observed on the page; returns
/// `Some(value)` to complete the named wait with that value, `None` to keep
/// listening.
pub type ResponseHandler =
    Arc<dyn Fn(CapturedResponse) -> BoxFuture<'static, Option<Value>> + Send + Sync>;

// ============================================================================
// CapturedResponse
// ============================================================================

/// A network response observed on a page.
///
/// Carries the response metadata and fetches the body lazily.
#[derive(Debug, Clone)]
pub struct CapturedResponse {
    /// Response URL.
    pub url: String,
    /// HTTP status code.
    pub status: u16,
    /// MIME type of the body.
    pub mime_type: String,
    /// Network request id, key for body retrieval.
    request_id: String,
    /// Page the response was observed on.
    page: Page,
}

impl CapturedResponse {
    fn new(page: Page, params: ResponseReceivedParams) -> Self {
        Self {
            url: params.response.url,
            status: params.response.status,
            mime_type: params.response.mime_type,
            request_id: params.request_id,
            page,
        }
    }

    /// Fetches the response body.
    pub async fn body(&self) -> Result<Vec<u8>> {
        self.page.response_body(&self.request_id).await
    }

    /// Fetches the response body and parses it as JSON.
    pub async fn json(&self) -> Result<Value> {
        let bytes = self.body().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

// ============================================================================
// PendingWait
// ============================================================================

/// One registered named wait.
struct PendingWait {
    /// Fires once with the interceptor's first non-empty result.
    result_rx: oneshot::Receiver<Value>,
    /// The interceptor task, aborted on cleanup.
    task: Option<JoinHandle<()>>,
    /// The page listener registration, removed on cleanup.
    listener: Option<(Page, HandlerId)>,
}

impl PendingWait {
    /// Tears down the interceptor machinery.
    fn dispose(&mut self) {
        if let Some((page, handler_id)) = self.listener.take() {
            page.remove_event_handler(handler_id);
        }
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// ============================================================================
// ResponseWaiter
// ============================================================================

/// Registry of named one-shot response waits.
///
/// Cheap to clone; all clones share the same registry.
#[derive(Clone, Default)]
pub struct ResponseWaiter {
    entries: Arc<Mutex<FxHashMap<String, PendingWait>>>,
}

impl ResponseWaiter {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if a wait is currently registered under `name`.
    #[must_use]
    pub fn is_registered(&self, name: &str) -> bool {
        self.entries.lock().contains_key(name)
    }

    /// Attaches a named interceptor to a page.
    ///
    /// Every response observed on `page` is fed to `handler`; the first
    /// `Some(value)` completes the wait registered under `name`. Reusing an
    /// in-flight name silently replaces the earlier entry.
    pub fn attach(&self, page: &Page, name: &str, handler: ResponseHandler) {
        let (result_tx, result_rx) = oneshot::channel();
        let (feed_tx, feed_rx) = mpsc::unbounded_channel();

        let handler_id = register_feed(page, feed_tx);
        let task = tokio::spawn(run_interceptor(feed_rx, handler, result_tx));

        let entry = PendingWait {
            result_rx,
            task: Some(task),
            listener: Some((page.clone(), handler_id)),
        };

        if let Some(mut replaced) = self.entries.lock().insert(name.to_string(), entry) {
            warn!(name = %name, "overwriting in-flight response wait");
            replaced.dispose();
        }

        debug!(name = %name, "response wait registered");
    }

    /// Attaches an unnamed fire-and-forget interceptor to a page.
    ///
    /// Results are discarded by the framework; the handler must persist any
    /// data itself. The interceptor lives for the page's lifetime.
    pub fn attach_raw(&self, page: &Page, handler: ResponseHandler) {
        let (feed_tx, mut feed_rx) = mpsc::unbounded_channel::<CapturedResponse>();
        register_feed(page, feed_tx);

        tokio::spawn(async move {
            while let Some(response) = feed_rx.recv().await {
                let _ = handler(response).await;
            }
        });
    }

    /// Blocks until the named wait fires or the timeout elapses.
    ///
    /// The entry is removed unconditionally — success, failure and timeout
    /// all clean up; no entry is leaked.
    ///
    /// # Errors
    ///
    /// - [`Error::WaitNotFound`] immediately if `name` was never registered
    /// - [`Error::Timeout`] if no result arrives within `wait`
    pub async fn wait(&self, name: &str, wait: Duration) -> Result<Value> {
        let Some(mut entry) = self.entries.lock().remove(name) else {
            return Err(Error::wait_not_found(name));
        };

        debug!(name = %name, timeout_ms = wait.as_millis() as u64, "waiting for response");

        let outcome = timeout(wait, &mut entry.result_rx).await;
        entry.dispose();

        match outcome {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(Error::ChannelClosed(e)),
            Err(_) => Err(Error::timeout(
                format!("response wait '{name}'"),
                wait.as_millis() as u64,
            )),
        }
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Registers a page listener that feeds observed responses into a channel.
fn register_feed(page: &Page, feed_tx: mpsc::UnboundedSender<CapturedResponse>) -> HandlerId {
    let page_clone = page.clone();
    page.add_event_handler(Box::new(move |event| {
        if event.method != "Network.responseReceived" {
            return;
        }
        if let Ok(params) = event.params_as::<ResponseReceivedParams>() {
            let _ = feed_tx.send(CapturedResponse::new(page_clone.clone(), params));
        }
    }))
}

/// Drives the interceptor until its first non-empty result.
///
/// Responses after the first hit are ignored (one-shot semantics).
async fn run_interceptor(
    mut feed_rx: mpsc::UnboundedReceiver<CapturedResponse>,
    handler: ResponseHandler,
    result_tx: oneshot::Sender<Value>,
) {
    while let Some(response) = feed_rx.recv().await {
        if let Some(value) = handler(response).await {
            let _ = result_tx.send(value);
            return;
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Instant;

    use serde_json::json;

    impl ResponseWaiter {
        /// Inserts a bare entry, returning its result sender.
        fn insert_for_test(&self, name: &str) -> oneshot::Sender<Value> {
            let (result_tx, result_rx) = oneshot::channel();
            self.entries.lock().insert(
                name.to_string(),
                PendingWait {
                    result_rx,
                    task: None,
                    listener: None,
                },
            );
            result_tx
        }
    }

    #[tokio::test]
    async fn test_wait_on_unregistered_name_fails_immediately() {
        let waiter = ResponseWaiter::new();

        let started = Instant::now();
        let err = waiter.wait("missing", Duration::from_secs(5)).await.unwrap_err();

        assert!(matches!(err, Error::WaitNotFound { .. }));
        assert!(started.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_wait_returns_delivered_result() {
        let waiter = ResponseWaiter::new();
        let tx = waiter.insert_for_test("r1");
        assert!(waiter.is_registered("r1"));

        tx.send(json!({ "views": 42 })).expect("receiver alive");

        let value = waiter.wait("r1", Duration::from_secs(1)).await.expect("result");
        assert_eq!(value.get("views").and_then(Value::as_u64), Some(42));
        assert!(!waiter.is_registered("r1"));
    }

    #[tokio::test]
    async fn test_wait_timeout_removes_entry() {
        let waiter = ResponseWaiter::new();
        let _tx = waiter.insert_for_test("slow");

        let err = waiter
            .wait("slow", Duration::from_millis(50))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Timeout { .. }));
        assert!(!waiter.is_registered("slow"));
    }

    #[tokio::test]
    async fn test_second_wait_sees_no_entry() {
        let waiter = ResponseWaiter::new();
        let tx = waiter.insert_for_test("once");
        tx.send(json!(1)).expect("receiver alive");

        waiter.wait("once", Duration::from_secs(1)).await.expect("first");

        let err = waiter.wait("once", Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, Error::WaitNotFound { .. }));
    }

    #[tokio::test]
    async fn test_interceptor_first_result_wins() {
        let (feed_tx, feed_rx) = mpsc::unbounded_channel();
        let (result_tx, result_rx) = oneshot::channel();

        let handler: ResponseHandler = Arc::new(|resp: CapturedResponse| {
            Box::pin(async move {
                if resp.url.contains("/api/stats") {
                    Some(json!({ "hit": resp.status }))
                } else {
                    None
                }
            })
        });

        let task = tokio::spawn(run_interceptor(feed_rx, handler, result_tx));

        feed_tx
            .send(fake_response("https://mp.toutiao.com/other", 200))
            .expect("open");
        feed_tx
            .send(fake_response("https://mp.toutiao.com/api/stats", 201))
            .expect("open");
        // The task may already have stopped after the first hit.
        let _ = feed_tx.send(fake_response("https://mp.toutiao.com/api/stats", 500));

        let value = result_rx.await.expect("result delivered");
        assert_eq!(value.get("hit").and_then(Value::as_u64), Some(201));

        task.await.expect("interceptor stops after first hit");
    }

    /// Builds a CapturedResponse with a detached page for channel tests.
    fn fake_response(url: &str, status: u16) -> CapturedResponse {
        use crate::transport::Connection;

        CapturedResponse {
            url: url.to_string(),
            status,
            mime_type: "application/json".to_string(),
            request_id: "R1".to_string(),
            page: Page::new(
                Connection::test_disconnected(),
                "S-test".to_string(),
                "T-test".to_string(),
            ),
        }
    }
}
