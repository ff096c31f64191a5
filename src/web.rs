//! Companion web endpoint serving the login QR image.
//!
//! The login flow writes the QR code to a fixed path; this router exposes it
//! at `GET /toutiao` so the image can be scanned from a phone without access
//! to the host's filesystem. No-cache headers keep the phone from seeing a
//! stale code after a login retry regenerates it.

// ============================================================================
// Imports
// ============================================================================

use std::path::PathBuf;

use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use tracing::debug;

// ============================================================================
// Router
// ============================================================================

/// Builds the QR endpoint router.
///
/// `qr_path` must match the client's configured QR image path.
#[must_use]
pub fn router(qr_path: PathBuf) -> Router {
    Router::new()
        .route("/toutiao", get(serve_qr))
        .with_state(qr_path)
}

/// Serves the QR image with no-cache headers.
async fn serve_qr(State(qr_path): State<PathBuf>) -> Response {
    match tokio::fs::read(&qr_path).await {
        Ok(bytes) => (
            [
                (header::CONTENT_TYPE, "image/png"),
                (header::CACHE_CONTROL, "no-cache"),
                (header::PRAGMA, "no-cache"),
            ],
            bytes,
        )
            .into_response(),

        Err(e) => {
            debug!(error = %e, path = %qr_path.display(), "QR image not readable");
            (StatusCode::NOT_FOUND, "QR code not generated yet").into_response()
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_serves_qr_with_no_cache_headers() {
        let dir = tempfile::tempdir().expect("tempdir");
        let qr_path = dir.path().join("login_qr.png");
        std::fs::write(&qr_path, b"png-bytes").expect("write");

        let app = router(qr_path);
        let response = app
            .oneshot(Request::get("/toutiao").body(Body::empty()).expect("request"))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).map(|v| v.as_bytes()),
            Some(b"image/png".as_slice())
        );
        assert_eq!(
            response.headers().get(header::CACHE_CONTROL).map(|v| v.as_bytes()),
            Some(b"no-cache".as_slice())
        );
        assert_eq!(
            response.headers().get(header::PRAGMA).map(|v| v.as_bytes()),
            Some(b"no-cache".as_slice())
        );

        let body = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        assert_eq!(&body[..], b"png-bytes");
    }

    #[tokio::test]
    async fn test_missing_qr_returns_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let app = router(dir.path().join("absent.png"));

        let response = app
            .oneshot(Request::get("/toutiao").body(Body::empty()).expect("request"))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
