//! WebSocket connection and event loop.
//!
//! This module handles the DevTools WebSocket connection to the browser,
//! including request/response correlation and event routing.
//!
//! # Event Loop
//!
//! The connection spawns a tokio task that handles:
//!
//! - Incoming messages from the browser (responses, events)
//! - Outgoing commands from the Rust API
//! - Request/response correlation by message id
//! - Event handler callbacks, filtered by session

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async_with_config};
use tracing::{debug, error, trace, warn};

use crate::error::{Error, Result};
use crate::protocol::{CdpEvent, CdpMessage, MethodCall};

// ============================================================================
// Constants
// ============================================================================

/// Default timeout for command execution.
const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum pending requests before rejecting new ones.
const MAX_PENDING_REQUESTS: usize = 256;

// ============================================================================
// Types
// ============================================================================

/// Map of message ids to response channels.
type CorrelationMap = FxHashMap<u64, oneshot::Sender<Result<Value>>>;

/// Event handler callback type.
///
/// Called for each event whose session matches the registration.
pub type EventHandler = Box<dyn Fn(&CdpEvent) + Send + Sync>;

/// Identifier of a registered event handler, used for removal.
pub type HandlerId = u64;

/// Registered handlers: id -> (session filter, callback).
///
/// A `None` session filter receives browser-level events only.
type HandlerMap = FxHashMap<HandlerId, (Option<String>, EventHandler)>;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// ============================================================================
// ConnectionCommand
// ============================================================================

/// Internal commands for the event loop.
enum ConnectionCommand {
    /// Send a call and correlate its response.
    Send {
        call: MethodCall,
        response_tx: oneshot::Sender<Result<Value>>,
    },
    /// Remove a timed-out correlation entry.
    RemoveCorrelation(u64),
    /// Shutdown the connection.
    Shutdown,
}

// ============================================================================
// Connection
// ============================================================================

/// DevTools WebSocket connection to the browser.
///
/// Handles request/response correlation and event routing. The connection
/// spawns an internal event loop task.
///
/// # Thread Safety
///
/// `Connection` is `Send + Sync` and can be shared across tasks. All
/// operations are non-blocking.
pub struct Connection {
    /// Channel for sending commands to the event loop.
    command_tx: mpsc::UnboundedSender<ConnectionCommand>,
    /// Correlation map (shared with event loop).
    correlation: Arc<Mutex<CorrelationMap>>,
    /// Event handlers (shared with event loop).
    handlers: Arc<Mutex<HandlerMap>>,
    /// Next message id.
    next_id: Arc<AtomicU64>,
    /// Next handler id.
    next_handler_id: Arc<AtomicU64>,
}

impl Clone for Connection {
    fn clone(&self) -> Self {
        Self {
            command_tx: self.command_tx.clone(),
            correlation: Arc::clone(&self.correlation),
            handlers: Arc::clone(&self.handlers),
            next_id: Arc::clone(&self.next_id),
            next_handler_id: Arc::clone(&self.next_handler_id),
        }
    }
}

impl Connection {
    /// Connects to a DevTools WebSocket endpoint.
    ///
    /// Spawns the event loop task internally. Message size limits are
    /// lifted; screenshot responses exceed the tungstenite defaults.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WebSocket`] if the connection cannot be established.
    pub async fn connect(ws_url: &str) -> Result<Self> {
        let config = WebSocketConfig::default()
            .max_message_size(None)
            .max_frame_size(None);

        let (ws_stream, _) = connect_async_with_config(ws_url, Some(config), false).await?;
        debug!(url = %ws_url, "DevTools connection established");

        Ok(Self::new(ws_stream))
    }

    /// Creates a connection from an established WebSocket stream.
    fn new(ws_stream: WsStream) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let correlation = Arc::new(Mutex::new(CorrelationMap::default()));
        let handlers: Arc<Mutex<HandlerMap>> = Arc::new(Mutex::new(HandlerMap::default()));

        tokio::spawn(Self::run_event_loop(
            ws_stream,
            command_rx,
            Arc::clone(&correlation),
            Arc::clone(&handlers),
        ));

        Self {
            command_tx,
            correlation,
            handlers,
            next_id: Arc::new(AtomicU64::new(1)),
            next_handler_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Sends a browser-level command and waits for its result.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionClosed`] if the connection is closed
    /// - [`Error::Timeout`] if no response arrives within the default timeout
    /// - [`Error::Cdp`] if the browser reports a command failure
    pub async fn send(&self, method: &str, params: Value) -> Result<Value> {
        let call = MethodCall::browser(self.next_message_id(), method, params);
        self.dispatch(call, DEFAULT_COMMAND_TIMEOUT).await
    }

    /// Sends a session-scoped command and waits for its result.
    ///
    /// # Errors
    ///
    /// Same as [`Connection::send`].
    pub async fn send_to_session(
        &self,
        session_id: &str,
        method: &str,
        params: Value,
    ) -> Result<Value> {
        let call = MethodCall::session(self.next_message_id(), session_id, method, params);
        self.dispatch(call, DEFAULT_COMMAND_TIMEOUT).await
    }

    /// Sends a session-scoped command with a custom timeout.
    ///
    /// # Errors
    ///
    /// Same as [`Connection::send`].
    pub async fn send_to_session_with_timeout(
        &self,
        session_id: &str,
        method: &str,
        params: Value,
        command_timeout: Duration,
    ) -> Result<Value> {
        let call = MethodCall::session(self.next_message_id(), session_id, method, params);
        self.dispatch(call, command_timeout).await
    }

    /// Registers an event handler.
    ///
    /// `session` filters delivery: `Some(id)` receives that session's events,
    /// `None` receives browser-level events.
    pub fn add_event_handler(&self, session: Option<String>, handler: EventHandler) -> HandlerId {
        let id = self.next_handler_id.fetch_add(1, Ordering::Relaxed);
        self.handlers.lock().insert(id, (session, handler));
        id
    }

    /// Removes a previously registered event handler.
    pub fn remove_event_handler(&self, id: HandlerId) {
        self.handlers.lock().remove(&id);
    }

    /// Returns the number of pending requests.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.correlation.lock().len()
    }

    /// Shuts down the connection gracefully.
    pub fn shutdown(&self) {
        let _ = self.command_tx.send(ConnectionCommand::Shutdown);
    }

    /// Allocates the next message id.
    fn next_message_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Sends a call to the event loop and awaits its correlated response.
    async fn dispatch(&self, call: MethodCall, command_timeout: Duration) -> Result<Value> {
        let message_id = call.id;

        // Check pending request limit
        {
            let correlation = self.correlation.lock();
            if correlation.len() >= MAX_PENDING_REQUESTS {
                warn!(
                    pending = correlation.len(),
                    max = MAX_PENDING_REQUESTS,
                    "Too many pending requests"
                );
                return Err(Error::protocol(format!(
                    "Too many pending requests: {}/{}",
                    correlation.len(),
                    MAX_PENDING_REQUESTS
                )));
            }
        }

        let (response_tx, response_rx) = oneshot::channel();

        self.command_tx
            .send(ConnectionCommand::Send { call, response_tx })
            .map_err(|_| Error::ConnectionClosed)?;

        match timeout(command_timeout, response_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::ConnectionClosed),
            Err(_) => {
                // Timeout - clean up the correlation entry
                let _ = self
                    .command_tx
                    .send(ConnectionCommand::RemoveCorrelation(message_id));

                Err(Error::timeout(
                    format!("command #{message_id}"),
                    command_timeout.as_millis() as u64,
                ))
            }
        }
    }

    /// Event loop that handles WebSocket I/O.
    async fn run_event_loop(
        ws_stream: WsStream,
        mut command_rx: mpsc::UnboundedReceiver<ConnectionCommand>,
        correlation: Arc<Mutex<CorrelationMap>>,
        handlers: Arc<Mutex<HandlerMap>>,
    ) {
        let (mut ws_write, mut ws_read) = ws_stream.split();

        loop {
            tokio::select! {
                // Incoming messages from the browser
                message = ws_read.next() => {
                    match message {
                        Some(Ok(Message::Text(text))) => {
                            Self::handle_incoming_message(&text, &correlation, &handlers);
                        }

                        Some(Ok(Message::Close(_))) => {
                            debug!("WebSocket closed by browser");
                            break;
                        }

                        Some(Err(e)) => {
                            error!(error = %e, "WebSocket error");
                            break;
                        }

                        None => {
                            debug!("WebSocket stream ended");
                            break;
                        }

                        // Ignore Binary, Ping, Pong
                        _ => {}
                    }
                }

                // Commands from the Rust API
                command = command_rx.recv() => {
                    match command {
                        Some(ConnectionCommand::Send { call, response_tx }) => {
                            Self::handle_send_command(
                                call,
                                response_tx,
                                &mut ws_write,
                                &correlation,
                            ).await;
                        }

                        Some(ConnectionCommand::RemoveCorrelation(message_id)) => {
                            correlation.lock().remove(&message_id);
                            debug!(message_id, "Removed timed-out correlation");
                        }

                        Some(ConnectionCommand::Shutdown) => {
                            debug!("Shutdown command received");
                            let _ = ws_write.close().await;
                            break;
                        }

                        None => {
                            debug!("Command channel closed");
                            break;
                        }
                    }
                }
            }
        }

        // Fail all pending requests on shutdown
        Self::fail_pending_requests(&correlation);

        debug!("Event loop terminated");
    }

    /// Handles an incoming text frame from the browser.
    fn handle_incoming_message(
        text: &str,
        correlation: &Arc<Mutex<CorrelationMap>>,
        handlers: &Arc<Mutex<HandlerMap>>,
    ) {
        let message = match CdpMessage::parse(text) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "Failed to parse incoming message");
                return;
            }
        };

        match message {
            CdpMessage::Response(response) => {
                let tx = correlation.lock().remove(&response.id);

                if let Some(tx) = tx {
                    let _ = tx.send(response.into_result());
                } else {
                    warn!(id = response.id, "Response for unknown request");
                }
            }

            CdpMessage::Event(event) => {
                trace!(method = %event.method, session = ?event.session_id, "Event");

                let handlers = handlers.lock();
                for (session, handler) in handlers.values() {
                    if *session == event.session_id {
                        handler(&event);
                    }
                }
            }
        }
    }

    /// Handles a send command from the Rust API.
    async fn handle_send_command(
        call: MethodCall,
        response_tx: oneshot::Sender<Result<Value>>,
        ws_write: &mut SplitSink<WsStream, Message>,
        correlation: &Arc<Mutex<CorrelationMap>>,
    ) {
        let message_id = call.id;

        // Serialize the call
        let json = match serde_json::to_string(&call) {
            Ok(j) => j,
            Err(e) => {
                let _ = response_tx.send(Err(Error::Json(e)));
                return;
            }
        };

        // Store correlation before sending
        correlation.lock().insert(message_id, response_tx);

        // Send over WebSocket
        if let Err(e) = ws_write.send(Message::Text(json.into())).await
            && let Some(tx) = correlation.lock().remove(&message_id)
        {
            let _ = tx.send(Err(Error::connection(e.to_string())));
        }

        trace!(message_id, "Command sent");
    }

    /// Fails all pending requests with ConnectionClosed.
    fn fail_pending_requests(correlation: &Arc<Mutex<CorrelationMap>>) {
        let pending: Vec<_> = correlation.lock().drain().collect();
        let count = pending.len();

        for (_, tx) in pending {
            let _ = tx.send(Err(Error::ConnectionClosed));
        }

        if count > 0 {
            debug!(count, "Failed pending requests on shutdown");
        }
    }
}

// ============================================================================
// Test Support
// ============================================================================

#[cfg(test)]
impl Connection {
    /// Creates a connection with no live socket.
    ///
    /// Sends fail with [`Error::ConnectionClosed`]; handler registration
    /// works normally.
    pub(crate) fn test_disconnected() -> Self {
        let (command_tx, _command_rx) = mpsc::unbounded_channel();
        Self {
            command_tx,
            correlation: Arc::new(Mutex::new(CorrelationMap::default())),
            handlers: Arc::new(Mutex::new(HandlerMap::default())),
            next_id: Arc::new(AtomicU64::new(1)),
            next_handler_id: Arc::new(AtomicU64::new(1)),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constants() {
        assert_eq!(DEFAULT_COMMAND_TIMEOUT.as_secs(), 30);
        assert_eq!(MAX_PENDING_REQUESTS, 256);
    }

    #[test]
    fn test_event_dispatch_filters_by_session() {
        let correlation = Arc::new(Mutex::new(CorrelationMap::default()));
        let handlers: Arc<Mutex<HandlerMap>> = Arc::new(Mutex::new(HandlerMap::default()));

        let hits = Arc::new(AtomicU64::new(0));
        let hits_clone = Arc::clone(&hits);
        handlers.lock().insert(
            1,
            (
                Some("S1".to_string()),
                Box::new(move |_| {
                    hits_clone.fetch_add(1, Ordering::Relaxed);
                }),
            ),
        );

        let s1_event =
            r#"{ "method": "Page.loadEventFired", "params": {}, "sessionId": "S1" }"#;
        let s2_event =
            r#"{ "method": "Page.loadEventFired", "params": {}, "sessionId": "S2" }"#;
        let browser_event = r#"{ "method": "Target.targetCreated", "params": {} }"#;

        Connection::handle_incoming_message(s1_event, &correlation, &handlers);
        Connection::handle_incoming_message(s2_event, &correlation, &handlers);
        Connection::handle_incoming_message(browser_event, &correlation, &handlers);

        assert_eq!(hits.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_response_resolves_correlation() {
        let correlation = Arc::new(Mutex::new(CorrelationMap::default()));
        let handlers: Arc<Mutex<HandlerMap>> = Arc::new(Mutex::new(HandlerMap::default()));

        let (tx, mut rx) = oneshot::channel();
        correlation.lock().insert(42, tx);

        let response = r#"{ "id": 42, "result": { "ok": true } }"#;
        Connection::handle_incoming_message(response, &correlation, &handlers);

        assert!(correlation.lock().is_empty());
        let value = rx.try_recv().expect("resolved").expect("success");
        assert_eq!(value.get("ok").and_then(Value::as_bool), Some(true));
    }
}
