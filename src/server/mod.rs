//! HTTP ingress: upload a PDF, poll status, fetch the Markdown artifact.
//!
//! The router also serves the output root statically; the URL adapter
//! depends on that to let the remote extraction service fetch shard PDFs.

pub mod routes;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::task::TaskManager;

/// Uploads above this size are rejected before touching disk.
pub const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

/// Timeout for enqueueing each shard of a freshly uploaded task.
pub const SUBMIT_TIMEOUT: Duration = Duration::from_secs(5);

pub struct AppState {
    pub manager: Arc<TaskManager>,
    pub uploads_dir: PathBuf,
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    let output_root = state.manager.config().output_root.clone();
    Router::new()
        .route("/api/tasks", post(routes::create_task))
        .route(
            "/api/tasks/{id}",
            get(routes::task_status).delete(routes::delete_task),
        )
        .route("/api/tasks/{id}/result", get(routes::task_result))
        .nest_service("/output", ServeDir::new(output_root))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}
