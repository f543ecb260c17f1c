//! HTTP server for the chatkeep API.
//!
//! Provides REST endpoints for:
//! - Conversations (create, read, append, list, delete)
//! - Preferences (read with defaults, merge-on-write)
//! - Identity wipes (one transaction across both tables)

pub mod error;
pub mod extract;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use routes::create_router;
pub use state::AppState;

use std::future::Future;
use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Start the HTTP server on the configured address.
///
/// # Errors
/// Returns an error if the listener cannot be bound or the server fails.
pub async fn run_server(state: Arc<AppState>) -> std::io::Result<()> {
    run_server_with_shutdown(state, std::future::pending()).await
}

/// Start the HTTP server with graceful shutdown support.
///
/// The server will stop accepting new connections when `shutdown_signal` completes.
///
/// # Errors
/// Returns an error if the listener cannot be bound or the server fails.
pub async fn run_server_with_shutdown<F>(state: Arc<AppState>, shutdown_signal: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let addr = (state.config.server.host.clone(), state.config.server.port);
    let app: Router = create_router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("chatkeep listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await
}
