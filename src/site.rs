//! Site-specific constants for the Toutiao authoring area.
//!
//! Everything the automation core needs to know about `mp.toutiao.com` lives
//! here: base URL, page paths, DOM selectors, control captions and the
//! default filesystem locations for artifacts. The core consumes these as
//! opaque configuration; a site redesign is handled by editing this module,
//! not the flows.

use std::path::PathBuf;

// ============================================================================
// URLs and Paths
// ============================================================================

/// Base URL of the authoring subdomain.
pub const BASE_URL: &str = "https://mp.toutiao.com/";

/// Relative path of the QR login page.
pub const LOGIN_PATH: &str = "auth/page/login";

/// Relative path of the weitoutiao compose page.
pub const COMPOSE_PATH: &str = "profile_v4/weitoutiao/publish";

/// Substring identifying the authenticated profile area.
///
/// After a successful scan the login page redirects here; any other
/// destination is treated as a failed login.
pub const PROFILE_MARKER: &str = "profile_v4";

// ============================================================================
// Selectors
// ============================================================================

/// CSS selector of the `<img>` carrying the login QR code as a data URL.
pub const QRCODE_IMG: &str = "img.web-login-scan-code__content__qrcode-wrapper__qrcode";

/// CSS selector of the rich-text editing surface on the compose page.
pub const EDITOR: &str = "div.syl-editor";

/// Caption of the toolbar button that opens the image-upload dialog.
pub const IMAGE_BUTTON_CAPTION: &str = "图片";

/// Caption of the button confirming an image upload.
pub const UPLOAD_CONFIRM_CAPTION: &str = "确定";

/// Caption of the publish button.
pub const PUBLISH_CAPTION: &str = "发布";

// ============================================================================
// Browser Identity
// ============================================================================

/// Spoofed user-agent string applied at browser launch.
///
/// A stock desktop Chrome identity; the headless token must not leak.
pub const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Default preload script, injected into every page before site scripts run.
///
/// Normalizes the automation fingerprint the site checks first.
pub const PRELOAD_SCRIPT: &str = r#"
Object.defineProperty(navigator, 'webdriver', { get: () => undefined });
window.chrome = window.chrome || { runtime: {} };
Object.defineProperty(navigator, 'languages', { get: () => ['zh-CN', 'zh', 'en'] });
"#;

// ============================================================================
// Default Artifact Locations
// ============================================================================

/// Default path the login QR image is written to.
///
/// The companion web endpoint serves exactly this file.
#[must_use]
pub fn default_qr_path() -> PathBuf {
    home_dir().join("toutiao").join("login_qr.png")
}

/// Default directory for diagnostic screenshots and markup dumps.
#[must_use]
pub fn default_screenshot_dir() -> PathBuf {
    home_dir().join("toutiao").join("screenshots")
}

fn home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_is_absolute() {
        let url = url::Url::parse(BASE_URL).expect("base url parses");
        assert_eq!(url.scheme(), "https");
        assert_eq!(url.host_str(), Some("mp.toutiao.com"));
    }

    #[test]
    fn test_paths_are_relative() {
        assert!(!LOGIN_PATH.starts_with('/'));
        assert!(!COMPOSE_PATH.starts_with('/'));
    }

    #[test]
    fn test_compose_path_in_profile_area() {
        assert!(COMPOSE_PATH.contains(PROFILE_MARKER));
    }

    #[test]
    fn test_default_paths() {
        assert!(default_qr_path().ends_with("toutiao/login_qr.png"));
        assert!(default_screenshot_dir().ends_with("toutiao/screenshots"));
    }

    #[test]
    fn test_user_agent_has_no_headless_token() {
        assert!(!USER_AGENT.to_lowercase().contains("headless"));
    }
}
