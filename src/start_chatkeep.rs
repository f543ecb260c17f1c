//! Startup helpers for the chatkeep server.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;

use crate::core::config::AppConfig;
use crate::server::{self, AppState};

/// Run the server (used by the `chatkeep-server` binary).
///
/// # Returns
/// `ExitCode::SUCCESS` on graceful shutdown, `1` on failure.
#[must_use]
pub fn run() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!("Starting chatkeep v{}", env!("CARGO_PKG_VERSION"));

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("Failed to create runtime: {e}");
            return ExitCode::from(1);
        }
    };

    if let Err(e) = rt.block_on(serve_until_ctrl_c()) {
        tracing::error!("Server error: {e:#}");
        return ExitCode::from(1);
    }

    ExitCode::SUCCESS
}

/// Load configuration and open the database without starting the server.
///
/// # Errors
/// Returns an error if the configuration is invalid or the database cannot be opened.
pub async fn initialize() -> anyhow::Result<Arc<AppState>> {
    let config = AppConfig::from_env().context("Failed to load configuration")?;
    tracing::info!("Database: {}", config.storage.sqlite_path.display());

    AppState::new(config)
        .await
        .context("Failed to open storage")
}

async fn serve_until_ctrl_c() -> anyhow::Result<()> {
    let state = initialize().await?;
    server::run_server_with_shutdown(state, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Cannot listen for ctrl-c: {e}");
            std::future::pending::<()>().await;
        }
        tracing::info!("Shutting down");
    })
    .await
    .context("HTTP server failed")
}
