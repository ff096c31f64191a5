//! Weitoutiao publish flow.
//!
//! A pure sequential script: open the compose page, attach images when
//! supplied, inject the post text into the rich-text surface, click publish.
//!
//! Every failure anywhere in the sequence is logged with diagnostics and
//! absorbed — the caller sees no error and must infer the outcome from logs
//! and the screenshot directory. That propagation policy is part of the
//! contract; do not bubble errors out of [`run`].

// ============================================================================
// Imports
// ============================================================================

use std::path::PathBuf;

use tracing::{debug, error, info};

use crate::browser::{ElementQuery, Page, Selection};
use crate::client::ToutiaoClient;
use crate::error::{Error, Result};
use crate::site;

// ============================================================================
// Flow
// ============================================================================

/// Publishes a post, absorbing all failures.
pub(crate) async fn run(client: &ToutiaoClient, text: &str, images: &[PathBuf]) {
    match publish_once(client, text, images).await {
        Ok(()) => info!(chars = text.chars().count(), images = images.len(), "weitoutiao published"),
        Err((err, page)) => {
            error!(error = %err, "publish failed");
            if let Some(page) = page {
                client.dump_diagnostics(&page).await;
                let _ = page.close().await;
            }
        }
    }
}

/// One publish pass; the failed page rides along for diagnostics.
async fn publish_once(
    client: &ToutiaoClient,
    text: &str,
    images: &[PathBuf],
) -> std::result::Result<(), (Error, Option<Page>)> {
    let (page, _response) = client
        .goto(site::COMPOSE_PATH, None, None)
        .await
        .map_err(|e| (e, None))?;

    match drive(&page, text, images).await {
        Ok(()) => Ok(()),
        Err(e) => Err((e, Some(page))),
    }
}

/// The scripted UI sequence.
async fn drive(page: &Page, text: &str, images: &[PathBuf]) -> Result<()> {
    if !images.is_empty() {
        attach_images(page, images).await?;
    }

    let editor = page.wait_for_selector(site::EDITOR).await?;
    editor.set_inner_html(&text_to_markup(text)).await?;
    debug!("post text injected");

    ElementQuery::button(Selection::caption(site::PUBLISH_CAPTION))?
        .bind(page)
        .await?
        .click()
        .await?;

    Ok(())
}

/// Opens the upload dialog, submits the files, confirms.
async fn attach_images(page: &Page, images: &[PathBuf]) -> Result<()> {
    ElementQuery::button(Selection::caption(site::IMAGE_BUTTON_CAPTION))?
        .bind(page)
        .await?
        .click()
        .await?;

    let file_input = ElementQuery::input(Selection::default()).bind(page).await?;
    file_input.set_input_files(images).await?;
    debug!(count = images.len(), "images submitted");

    ElementQuery::button(Selection::caption(site::UPLOAD_CONFIRM_CAPTION))?
        .bind(page)
        .await?
        .click()
        .await?;

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Converts newline-delimited plain text into one paragraph block per line.
pub(crate) fn text_to_markup(text: &str) -> String {
    text.lines().map(|line| format!("<p>{line}</p>")).collect()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_to_markup_one_paragraph_per_line() {
        assert_eq!(text_to_markup("hello\nworld"), "<p>hello</p><p>world</p>");
    }

    #[test]
    fn test_text_to_markup_single_line() {
        assert_eq!(text_to_markup("大家好"), "<p>大家好</p>");
    }

    #[test]
    fn test_text_to_markup_empty() {
        assert_eq!(text_to_markup(""), "");
    }

    #[test]
    fn test_text_to_markup_skips_trailing_newline_artifact() {
        assert_eq!(text_to_markup("hello\n"), "<p>hello</p>");
    }
}
