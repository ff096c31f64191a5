//! Application entry point.
//!
//! Starts the Toutiao client (browser + background QR login) and serves the
//! QR image endpoint so the code can be scanned from a phone.

use std::future::IntoFuture;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use toutiao_client::{ClientConfig, ToutiaoClient, web};

/// Listen address of the QR endpoint.
const LISTEN_ADDR: &str = "0.0.0.0:3182";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ClientConfig::default();
    let qr_path = config.qr_image_path.clone();

    let client = ToutiaoClient::new(config).context("failed to create client")?;
    client
        .start()
        .await
        .context("failed to start browser session")?;

    let listener = tokio::net::TcpListener::bind(LISTEN_ADDR)
        .await
        .with_context(|| format!("failed to bind {LISTEN_ADDR}"))?;
    info!("QR endpoint listening on http://{LISTEN_ADDR}/toutiao");

    let serve = axum::serve(listener, web::router(qr_path)).into_future();

    tokio::select! {
        result = serve => result.context("QR endpoint failed")?,
        _ = tokio::signal::ctrl_c() => {
            info!("shutting down");
            client.stop().await.context("failed to stop session")?;
        }
    }

    Ok(())
}
