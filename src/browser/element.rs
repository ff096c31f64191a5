//! Element location and interaction.
//!
//! An [`ElementQuery`] describes how to find one element: a tag plus exactly
//! one selection strategy. [`ElementQuery::bind`] waits for the element to
//! appear in the live DOM and resolves it to an [`ElementHandle`].
//!
//! # Example
//!
//! ```ignore
//! use toutiao_client::{ElementQuery, Selection};
//!
//! // By caption (text containment)
//! let publish = ElementQuery::button(Selection::caption("发布"))?;
//!
//! // By explicit path expression
//! let confirm = ElementQuery::button(Selection::xpath("//button/span/text()[. = '确定']"))?;
//!
//! let handle = publish.bind(&page).await?;
//! handle.click().await?;
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::path::PathBuf;
use std::time::Duration;

use serde_json::json;
use tracing::debug;

use crate::error::{Error, Result};

use super::page::{Page, json_string};

// ============================================================================
// Constants
// ============================================================================

/// Default timeout for [`ElementQuery::bind`].
const DEFAULT_BIND_TIMEOUT: Duration = Duration::from_secs(10);

/// Poll interval for bind waits.
const BIND_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Path expression file-input controls always bind by.
const FILE_INPUT_XPATH: &str = "//input[@type='file']";

// ============================================================================
// Tag
// ============================================================================

/// Element tag a query targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    /// `<button>` controls.
    Button,
    /// `<a>` links.
    Link,
    /// `<input>` controls.
    Input,
}

impl Tag {
    /// Returns the markup tag name.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Button => "button",
            Self::Link => "a",
            Self::Input => "input",
        }
    }
}

// ============================================================================
// Selection
// ============================================================================

/// Declarative selection criteria for one element.
///
/// Exactly one key must be set; [`ElementQuery::new`] rejects anything else.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    /// Explicit path expression.
    pub xpath: Option<String>,
    /// `name` attribute match.
    pub name: Option<String>,
    /// Visible caption/text containment match.
    pub caption: Option<String>,
    /// Tooltip (`title` attribute) match.
    pub tooltip: Option<String>,
}

impl Selection {
    /// Selects by explicit path expression.
    #[inline]
    #[must_use]
    pub fn xpath(value: impl Into<String>) -> Self {
        Self {
            xpath: Some(value.into()),
            ..Self::default()
        }
    }

    /// Selects by `name` attribute.
    #[inline]
    #[must_use]
    pub fn name(value: impl Into<String>) -> Self {
        Self {
            name: Some(value.into()),
            ..Self::default()
        }
    }

    /// Selects by visible caption.
    #[inline]
    #[must_use]
    pub fn caption(value: impl Into<String>) -> Self {
        Self {
            caption: Some(value.into()),
            ..Self::default()
        }
    }

    /// Selects by tooltip.
    #[inline]
    #[must_use]
    pub fn tooltip(value: impl Into<String>) -> Self {
        Self {
            tooltip: Some(value.into()),
            ..Self::default()
        }
    }

    /// Number of selection keys that are set.
    fn key_count(&self) -> usize {
        [
            self.xpath.is_some(),
            self.name.is_some(),
            self.caption.is_some(),
            self.tooltip.is_some(),
        ]
        .iter()
        .filter(|set| **set)
        .count()
    }
}

// ============================================================================
// Strategy
// ============================================================================

/// The single active selection strategy of a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Strategy {
    /// Explicit path expression, used verbatim.
    ByPath(String),
    /// `//{tag}[@name='..']`
    ByName(String),
    /// `//{tag}[contains(., '..')]`
    ByCaption(String),
    /// `//{tag}[@title='..']`
    ByTooltip(String),
}

// ============================================================================
// ElementQuery
// ============================================================================

/// A structural query locating exactly one element.
#[derive(Debug, Clone)]
pub struct ElementQuery {
    tag: Tag,
    strategy: Strategy,
}

impl ElementQuery {
    /// Builds a query from a tag and selection criteria.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSelector`] unless exactly one selection key
    /// is set.
    pub fn new(tag: Tag, selection: Selection) -> Result<Self> {
        match selection.key_count() {
            0 => {
                return Err(Error::invalid_selector(
                    "one of xpath, name, caption or tooltip must be set",
                ));
            }
            1 => {}
            n => {
                return Err(Error::invalid_selector(format!(
                    "exactly one selection key must be set, got {n}"
                )));
            }
        }

        let strategy = if let Some(xpath) = selection.xpath {
            Strategy::ByPath(xpath)
        } else if let Some(name) = selection.name {
            Strategy::ByName(name)
        } else if let Some(caption) = selection.caption {
            Strategy::ByCaption(caption)
        } else if let Some(tooltip) = selection.tooltip {
            Strategy::ByTooltip(tooltip)
        } else {
            // key_count() == 1 guarantees one branch above matched.
            return Err(Error::invalid_selector("no selection key set"));
        };

        Ok(Self { tag, strategy })
    }

    /// Builds a button query.
    ///
    /// # Errors
    ///
    /// Same as [`ElementQuery::new`].
    #[inline]
    pub fn button(selection: Selection) -> Result<Self> {
        Self::new(Tag::Button, selection)
    }

    /// Builds a link query.
    ///
    /// # Errors
    ///
    /// Same as [`ElementQuery::new`].
    #[inline]
    pub fn link(selection: Selection) -> Result<Self> {
        Self::new(Tag::Link, selection)
    }

    /// Builds a file-input query.
    ///
    /// Input controls always bind by a fixed internal path expression; any
    /// supplied selection keys are ignored. Observed behavior of the site
    /// flows, kept as-is.
    #[inline]
    #[must_use]
    pub fn input(_selection: Selection) -> Self {
        Self {
            tag: Tag::Input,
            strategy: Strategy::ByPath(FILE_INPUT_XPATH.to_string()),
        }
    }

    /// Returns the tag this query targets.
    #[inline]
    #[must_use]
    pub fn tag(&self) -> Tag {
        self.tag
    }

    /// Returns the path expression this query resolves to.
    #[must_use]
    pub fn xpath(&self) -> String {
        let tag = self.tag.as_str();
        match &self.strategy {
            Strategy::ByPath(path) => path.clone(),
            Strategy::ByName(name) => format!("//{tag}[@name='{name}']"),
            Strategy::ByCaption(caption) => format!("//{tag}[contains(., '{caption}')]"),
            Strategy::ByTooltip(tooltip) => format!("//{tag}[@title='{tooltip}']"),
        }
    }

    /// Waits for the query to match and returns the element.
    ///
    /// Uses the default 10 second timeout.
    ///
    /// # Errors
    ///
    /// - [`Error::ElementNotFound`] if nothing matches within the timeout
    /// - [`Error::MultipleMatches`] if the query is ambiguous (fatal, not
    ///   retried — an ambiguous selector is a caller bug)
    pub async fn bind(&self, page: &Page) -> Result<ElementHandle> {
        self.bind_with_timeout(page, DEFAULT_BIND_TIMEOUT).await
    }

    /// Waits for the query to match with a custom timeout.
    ///
    /// # Errors
    ///
    /// Same as [`ElementQuery::bind`].
    pub async fn bind_with_timeout(&self, page: &Page, wait: Duration) -> Result<ElementHandle> {
        let xpath = self.xpath();
        debug!(xpath = %xpath, timeout_ms = wait.as_millis() as u64, "binding element");

        let deadline = tokio::time::Instant::now() + wait;

        loop {
            let count = self.match_count(page, &xpath).await?;

            if count > 1 {
                return Err(Error::multiple_matches(xpath.clone(), count));
            }
            if count == 1 {
                break;
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(Error::element_not_found(xpath.clone(), wait.as_millis() as u64));
            }

            tokio::time::sleep(BIND_POLL_INTERVAL).await;
        }

        let expression = format!(
            "document.evaluate({}, document, null, XPathResult.FIRST_ORDERED_NODE_TYPE, null).singleNodeValue",
            json_string(&xpath)
        );

        let object_id = page
            .evaluate_object(&expression)
            .await?
            .ok_or_else(|| Error::element_not_found(xpath, wait.as_millis() as u64))?;

        Ok(ElementHandle::new(page.clone(), object_id))
    }

    /// Counts current matches in the live DOM.
    async fn match_count(&self, page: &Page, xpath: &str) -> Result<usize> {
        let expression = format!(
            "document.evaluate({}, document, null, XPathResult.ORDERED_NODE_SNAPSHOT_TYPE, null).snapshotLength",
            json_string(xpath)
        );

        let value = page.evaluate(&expression).await?;
        Ok(value.as_u64().unwrap_or(0) as usize)
    }
}

// ============================================================================
// ElementHandle
// ============================================================================

/// A resolved DOM element.
///
/// Holds a remote object reference; operations dispatch into the page.
#[derive(Debug, Clone)]
pub struct ElementHandle {
    page: Page,
    object_id: String,
}

impl ElementHandle {
    /// Creates a handle from a remote object id.
    pub(crate) fn new(page: Page, object_id: String) -> Self {
        Self { page, object_id }
    }

    /// Clicks the element.
    pub async fn click(&self) -> Result<()> {
        self.page
            .call_function_on(&self.object_id, "function() { this.click(); }", false)
            .await?;
        Ok(())
    }

    /// Reads an attribute value.
    pub async fn attribute(&self, name: &str) -> Result<Option<String>> {
        let declaration = format!(
            "function() {{ return this.getAttribute({}); }}",
            json_string(name)
        );
        let value = self
            .page
            .call_function_on(&self.object_id, &declaration, true)
            .await?;
        Ok(value.as_str().map(str::to_string))
    }

    /// Reads the element's text content.
    pub async fn text(&self) -> Result<String> {
        let value = self
            .page
            .call_function_on(
                &self.object_id,
                "function() { return this.textContent; }",
                true,
            )
            .await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    /// Replaces the element's inner markup.
    pub async fn set_inner_html(&self, html: &str) -> Result<()> {
        let declaration = format!(
            "function() {{ this.innerHTML = {}; }}",
            json_string(html)
        );
        self.page
            .call_function_on(&self.object_id, &declaration, false)
            .await?;
        Ok(())
    }

    /// Submits local file paths to a file-input control.
    pub async fn set_input_files(&self, paths: &[PathBuf]) -> Result<()> {
        let files: Vec<String> = paths
            .iter()
            .map(|p| p.display().to_string())
            .collect();

        self.page
            .command(
                "DOM.setFileInputFiles",
                json!({ "files": files, "objectId": self.object_id }),
            )
            .await?;
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exactly_one_key_required() {
        let err = ElementQuery::button(Selection::default()).unwrap_err();
        assert!(matches!(err, Error::InvalidSelector { .. }));

        let two_keys = Selection {
            caption: Some("发布".to_string()),
            tooltip: Some("publish".to_string()),
            ..Selection::default()
        };
        let err = ElementQuery::button(two_keys).unwrap_err();
        assert!(matches!(err, Error::InvalidSelector { .. }));
    }

    #[test]
    fn test_single_key_accepted() {
        assert!(ElementQuery::button(Selection::caption("发布")).is_ok());
        assert!(ElementQuery::button(Selection::name("submit")).is_ok());
        assert!(ElementQuery::link(Selection::tooltip("home")).is_ok());
        assert!(ElementQuery::button(Selection::xpath("//button")).is_ok());
    }

    #[test]
    fn test_xpath_templates() {
        let by_name = ElementQuery::button(Selection::name("submit")).expect("valid");
        assert_eq!(by_name.xpath(), "//button[@name='submit']");

        let by_caption = ElementQuery::button(Selection::caption("图片")).expect("valid");
        assert_eq!(by_caption.xpath(), "//button[contains(., '图片')]");

        let by_tooltip = ElementQuery::link(Selection::tooltip("首页")).expect("valid");
        assert_eq!(by_tooltip.xpath(), "//a[@title='首页']");

        let by_path = ElementQuery::button(Selection::xpath("//button/span")).expect("valid");
        assert_eq!(by_path.xpath(), "//button/span");
    }

    #[test]
    fn test_link_uses_anchor_tag() {
        let query = ElementQuery::link(Selection::caption("登录")).expect("valid");
        assert_eq!(query.tag(), Tag::Link);
        assert_eq!(query.xpath(), "//a[contains(., '登录')]");
    }

    #[test]
    fn test_input_ignores_selection_keys() {
        let query = ElementQuery::input(Selection::caption("anything"));
        assert_eq!(query.tag(), Tag::Input);
        assert_eq!(query.xpath(), FILE_INPUT_XPATH);

        let query = ElementQuery::input(Selection::default());
        assert_eq!(query.xpath(), FILE_INPUT_XPATH);
    }

    #[test]
    fn test_tag_names() {
        assert_eq!(Tag::Button.as_str(), "button");
        assert_eq!(Tag::Link.as_str(), "a");
        assert_eq!(Tag::Input.as_str(), "input");
    }

    #[test]
    fn test_default_bind_timeout() {
        assert_eq!(DEFAULT_BIND_TIMEOUT.as_secs(), 10);
    }
}
