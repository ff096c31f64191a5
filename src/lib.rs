//! Toutiao headless publishing client.
//!
//! This library automates a headless Chromium browser to authenticate
//! against the Toutiao authoring area (`mp.toutiao.com`) via QR-code login
//! and to publish short text posts with optional image attachments. The site
//! exposes no stable API: the browser is the transport and DOM elements are
//! the protocol.
//!
//! # Architecture
//!
//! The crate drives Chromium over the DevTools protocol directly:
//!
//! - **Transport (Rust)**: launches the browser process, connects the
//!   DevTools WebSocket, correlates command responses, routes events
//! - **Flows**: a retrying QR login state machine and a scripted publish
//!   sequence, both built on the session/page/element layers
//!
//! Key design principles:
//!
//! - One [`Session`] owns: Chromium process + DevTools connection + profile
//! - Pages are independent targets; concurrent navigations do not interfere
//! - Named response waits are one-shot; name collisions silently overwrite
//!   (a documented sharp edge, kept as-is)
//! - Login never fails outward: every error becomes a backoff retry
//!
//! # Quick Start
//!
//! ```no_run
//! use toutiao_client::{ClientConfig, Result, ToutiaoClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let client = ToutiaoClient::new(ClientConfig::default())?;
//!
//!     // Launches the browser; QR login proceeds in the background.
//!     client.start().await?;
//!
//!     // Wait until the QR code has been scanned.
//!     client.online().await;
//!
//!     // Publish a post with one image.
//!     client
//!         .post_weitoutiao("hello\nworld", &["/tmp/pic.png".into()])
//!         .await;
//!
//!     client.stop().await
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`browser`] | Browser entities: [`Session`], [`Page`], [`ElementQuery`], [`ResponseWaiter`] |
//! | [`client`] | The [`ToutiaoClient`] facade |
//! | [`dataurl`] | Inline image data-URL decoding |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`login`] | QR login flow and its configuration |
//! | [`protocol`] | DevTools message types (internal) |
//! | [`site`] | Site constants: URLs, selectors, captions |
//! | [`transport`] | DevTools WebSocket transport (internal) |
//! | [`web`] | Companion endpoint serving the QR image |

// ============================================================================
// Modules
// ============================================================================

/// Browser entities: Session, Page, ElementQuery, ResponseWaiter.
pub mod browser;

/// The client facade tying session, registry and flows together.
pub mod client;

/// Inline image data-URL parsing and decoding.
pub mod dataurl;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// QR-code login flow.
pub mod login;

/// DevTools protocol message types.
///
/// Internal module defining command/response/event structures.
pub mod protocol;

/// Weitoutiao publish flow.
mod publish;

/// Site-specific constants.
pub mod site;

/// DevTools WebSocket transport layer.
///
/// Internal module handling the connection and event loop.
pub mod transport;

/// Companion web endpoint serving the login QR image.
pub mod web;

// ============================================================================
// Re-exports
// ============================================================================

// Browser types
pub use browser::{
    CapturedResponse, ElementHandle, ElementQuery, Page, PageResponse, ResponseHandler,
    ResponseWaiter, Selection, Session, SessionConfig, Strategy, Tag,
};

// Client types
pub use client::{ClientConfig, ToutiaoClient};

// Flow types
pub use login::{LoginConfig, LoginState};

// Data types
pub use dataurl::DataUrl;

// Error types
pub use error::{Error, Result};
