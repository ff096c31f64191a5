//! Browser entities module.
//!
//! This module provides the core browser automation types:
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Session`] | Browser session (owns the Chromium process + DevTools connection) |
//! | [`Page`] | An attached page target |
//! | [`ElementQuery`] | Declarative element locator |
//! | [`ElementHandle`] | Resolved DOM element reference |
//! | [`ResponseWaiter`] | Named one-shot network response registry |
//!
//! # Example
//!
//! ```no_run
//! use toutiao_client::{Session, SessionConfig, ElementQuery, Selection, Result};
//!
//! # async fn example() -> Result<()> {
//! let session = Session::new(SessionConfig::default());
//! session.start().await?;
//!
//! let page = session.new_page().await?;
//! page.navigate("https://mp.toutiao.com/").await?;
//!
//! let button = ElementQuery::button(Selection::caption("发布"))?;
//! button.bind(&page).await?.click().await?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Submodules
// ============================================================================

/// Element location and interaction.
pub mod element;

/// Page targets: navigation, scripting, screenshots.
pub mod page;

/// Browser process lifecycle.
pub mod session;

/// Named one-shot response waits.
pub mod waiter;

// ============================================================================
// Re-exports
// ============================================================================

pub use element::{ElementHandle, ElementQuery, Selection, Strategy, Tag};
pub use page::{Page, PageResponse};
pub use session::{Session, SessionConfig};
pub use waiter::{CapturedResponse, ResponseHandler, ResponseWaiter};
