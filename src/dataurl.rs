//! Inline data-URL parsing and image decoding.
//!
//! The login page embeds the QR code as a `data:image/png;base64,...` URL in
//! the `src` attribute of an `<img>`. This module extracts and decodes that
//! payload.
//!
//! Only base64-encoded `data:image/...` URLs are accepted; anything else is
//! rejected with [`Error::DataUrl`].

// ============================================================================
// Imports
// ============================================================================

use base64::Engine;
use base64::engine::general_purpose::STANDARD as Base64Standard;
use image::DynamicImage;

use crate::error::{Error, Result};

// ============================================================================
// DataUrl
// ============================================================================

/// A parsed `data:image/<format>;base64,<payload>` URL.
#[derive(Debug, Clone)]
pub struct DataUrl {
    /// Image format token from the MIME type (e.g. `png`, `jpeg`).
    pub format: String,
    /// Decoded payload bytes.
    pub bytes: Vec<u8>,
}

impl DataUrl {
    /// Parses an inline image data URL.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DataUrl`] if the value does not start with
    /// `data:image/`, if the encoding token is not `base64`, or if the
    /// payload fails base64 decoding.
    pub fn parse(value: &str) -> Result<Self> {
        let rest = value
            .strip_prefix("data:image/")
            .ok_or_else(|| Error::data_url(format!("not an image data URL: {}", truncated(value))))?;

        let (meta, payload) = rest
            .split_once(',')
            .ok_or_else(|| Error::data_url("missing ',' separator"))?;

        let (format, encoding) = meta
            .split_once(';')
            .ok_or_else(|| Error::data_url("missing ';' encoding token"))?;

        if encoding != "base64" {
            return Err(Error::data_url(format!(
                "unsupported encoding: {encoding}"
            )));
        }

        let bytes = Base64Standard
            .decode(payload)
            .map_err(|e| Error::data_url(format!("invalid base64 payload: {e}")))?;

        Ok(Self {
            format: format.to_string(),
            bytes,
        })
    }

    /// Decodes the payload into a raster image.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Image`] if the bytes are not a decodable image.
    pub fn decode(&self) -> Result<DynamicImage> {
        Ok(image::load_from_memory(&self.bytes)?)
    }
}

/// Truncates a value for error messages; data URLs can be tens of KB.
fn truncated(value: &str) -> String {
    const LIMIT: usize = 64;
    if value.len() <= LIMIT {
        value.to_string()
    } else {
        let cut = value
            .char_indices()
            .take_while(|(i, _)| *i < LIMIT)
            .last()
            .map_or(0, |(i, c)| i + c.len_utf8());
        format!("{}...", &value[..cut])
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    /// 1x1 transparent PNG.
    const PNG_1X1: &str = "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJ\
                           AAAADUlEQVR42mNkYPhfDwAChwGA60e6kgAAAABJRU5ErkJggg==";

    #[test]
    fn test_parse_valid_png() {
        let url = format!("data:image/png;base64,{PNG_1X1}");
        let parsed = DataUrl::parse(&url).expect("parses");
        assert_eq!(parsed.format, "png");
        assert!(!parsed.bytes.is_empty());
    }

    #[test]
    fn test_decode_valid_png() {
        let url = format!("data:image/png;base64,{PNG_1X1}");
        let img = DataUrl::parse(&url).expect("parses").decode().expect("decodes");
        assert_eq!(img.width(), 1);
        assert_eq!(img.height(), 1);
    }

    #[test]
    fn test_rejects_non_base64_encoding() {
        let err = DataUrl::parse("data:image/png;utf8,xxxx").unwrap_err();
        assert!(matches!(err, Error::DataUrl { .. }));
    }

    #[test]
    fn test_rejects_missing_image_prefix() {
        let err = DataUrl::parse("data:text/plain;base64,aGVsbG8=").unwrap_err();
        assert!(matches!(err, Error::DataUrl { .. }));

        let err = DataUrl::parse("https://example.com/qr.png").unwrap_err();
        assert!(matches!(err, Error::DataUrl { .. }));
    }

    #[test]
    fn test_rejects_invalid_payload() {
        let err = DataUrl::parse("data:image/png;base64,!!not-base64!!").unwrap_err();
        assert!(matches!(err, Error::DataUrl { .. }));
    }

    #[test]
    fn test_rejects_missing_separator() {
        let err = DataUrl::parse("data:image/png;base64").unwrap_err();
        assert!(matches!(err, Error::DataUrl { .. }));
    }
}
