//! Streaming HTTP server for tagscout.
//!
//! ## Environment Variables
//!
//! - `TAGSCOUT_CONFIG`: Path to the config file (default: `config.toml`)
//! - `PORT`: Listen port, overrides `server.port`
//! - `HEADLESS`: `false` shows the browser window
//! - `PROXY_URL`: Proxy for the browser, overrides `browser.proxy`
//! - `RUST_LOG`: Log filter (e.g., `info`, `tagscout=debug`)

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tagscout::error::Result;
use tagscout::models::Config;
use tagscout::server::{self, AppState};

#[tokio::main]
async fn main() {
    let config_path = std::env::var("TAGSCOUT_CONFIG").unwrap_or_else(|_| "config.toml".into());
    let config = Config::load_or_default(&config_path);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level)),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    if let Err(e) = run(config, Path::new(&config_path)).await {
        tracing::error!(error = %e, "Server stopped");
        std::process::exit(1);
    }
}

async fn run(mut config: Config, config_path: &Path) -> Result<()> {
    apply_env_overrides(&mut config);
    config.validate()?;

    let base_dir = config_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    tracing::info!(
        host = %config.server.host,
        port = config.server.port,
        headless = config.browser.headless,
        proxy = config.browser.proxy.is_some(),
        "tagscout server starting"
    );

    let state = Arc::new(AppState {
        config: Arc::new(config),
        base_dir,
    });
    server::serve(state).await
}

fn apply_env_overrides(config: &mut Config) {
    if let Ok(port) = std::env::var("PORT") {
        match port.trim().parse() {
            Ok(port) => config.server.port = port,
            Err(_) => tracing::warn!(%port, "Ignoring invalid PORT"),
        }
    }
    if let Ok(headless) = std::env::var("HEADLESS") {
        config.browser.headless = !headless.trim().eq_ignore_ascii_case("false");
    }
    if let Ok(proxy) = std::env::var("PROXY_URL") {
        let proxy = proxy.trim();
        if !proxy.is_empty() {
            config.browser.proxy = Some(proxy.to_string());
        }
    }
}
