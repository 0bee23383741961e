//! Router and application state.

use std::sync::Arc;

use axum::routing::post;
use axum::Router;

use crate::run::{run_handler, RunTarget};

pub struct AppState {
    pub target: RunTarget,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/runs", post(run_handler))
        .with_state(state)
}
