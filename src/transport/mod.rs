//! DevTools WebSocket transport layer.
//!
//! A single [`Connection`] is established to the endpoint the browser prints
//! at startup. All commands for all pages are multiplexed over it; events
//! are routed to per-session handlers.

// ============================================================================
// Submodules
// ============================================================================

mod connection;

// ============================================================================
// Re-exports
// ============================================================================

pub use connection::{Connection, EventHandler, HandlerId};
