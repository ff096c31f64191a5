//! Chrome DevTools Protocol message types.
//!
//! The browser is driven over a single WebSocket speaking CDP: JSON command
//! messages with integer ids, JSON responses correlated by id, and
//! unsolicited JSON events. Commands addressed to a page carry the
//! `sessionId` obtained from `Target.attachToTarget`.
//!
//! | Module | Description |
//! |--------|-------------|
//! | `command` | Outgoing [`MethodCall`] messages |
//! | `message` | Incoming [`CdpResponse`] / [`CdpEvent`] messages and typed event payloads |

// ============================================================================
// Submodules
// ============================================================================

/// Outgoing command messages.
pub mod command;

/// Incoming responses and events.
pub mod message;

// ============================================================================
// Re-exports
// ============================================================================

pub use command::MethodCall;
pub use message::{
    CdpEvent, CdpMessage, CdpResponse, FrameNavigatedParams, ResponseData, ResponseReceivedParams,
};
