//! SSE server for braid runs (axum).
//!
//! `POST /runs` with `{"prompt": "..."}` answers with a `text/event-stream`
//! body: one frame per run event, then a terminal `done` or `error` frame.
//! Client disconnect cancels the run. Streams are not resumable; a reconnect
//! is a new run.
//!
//! **Public API**: [`run_serve`], [`run_serve_on_listener`], [`RunTarget`].

mod app;
mod run;

pub use app::{router, AppState};
pub use run::RunTarget;

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

const DEFAULT_ADDR: &str = "127.0.0.1:8080";

/// Runs the server on an existing listener. Used by tests (bind to
/// `127.0.0.1:0`, then pass the listener).
pub async fn run_serve_on_listener(
    listener: TcpListener,
    target: RunTarget,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = listener.local_addr()?;
    info!("braid serve listening on http://{}", addr);
    let state = Arc::new(AppState { target });
    axum::serve(listener, router(state)).await?;
    Ok(())
}

/// Binds `BRAID_SERVE_ADDR` (default `127.0.0.1:8080`) and serves runs of
/// `target` until the process exits.
pub async fn run_serve(target: RunTarget) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = std::env::var("BRAID_SERVE_ADDR").unwrap_or_else(|_| DEFAULT_ADDR.to_string());
    let listener = TcpListener::bind(&addr).await?;
    run_serve_on_listener(listener, target).await
}
