//! Route handlers.

use std::sync::Arc;

use axum::extract::{Multipart, Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::error;

use crate::task::TaskStatus;

use super::{AppState, SUBMIT_TIMEOUT};

/// `POST /api/tasks`: accept a PDF upload, create and submit a task.
pub async fn create_task(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Response {
    let mut upload: Option<(String, axum::body::Bytes)> = None;
    loop {
        match multipart.next_field().await {
            Ok(Some(field)) if field.name() == Some("file") => {
                let filename = field.file_name().unwrap_or("upload.pdf").to_string();
                match field.bytes().await {
                    Ok(bytes) => {
                        upload = Some((filename, bytes));
                        break;
                    }
                    Err(e) => {
                        return bad_request(format!("failed to read upload: {e}"));
                    }
                }
            }
            Ok(Some(_)) => continue,
            Ok(None) => break,
            Err(e) => return bad_request(format!("malformed multipart body: {e}")),
        }
    }

    let Some((filename, bytes)) = upload else {
        return bad_request("file is required".to_string());
    };
    let is_pdf = std::path::Path::new(&filename)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));
    if !is_pdf {
        return bad_request("only PDF files are supported".to_string());
    }

    if let Err(e) = tokio::fs::create_dir_all(&state.uploads_dir).await {
        error!(error = %e, "could not create uploads dir");
        return internal("failed to store upload".to_string());
    }
    let save_path = state.uploads_dir.join(&filename);
    if let Err(e) = tokio::fs::write(&save_path, &bytes).await {
        error!(error = %e, path = %save_path.display(), "could not save upload");
        return internal("failed to store upload".to_string());
    }

    let task_id = match state.manager.create(&save_path).await {
        Ok(id) => id,
        Err(e) => return internal(format!("failed to create task: {e}")),
    };
    if let Err(e) = state.manager.submit(&task_id, SUBMIT_TIMEOUT).await {
        return internal(format!("failed to submit task: {e}"));
    }

    (
        StatusCode::CREATED,
        Json(json!({
            "task_id": task_id,
            "status": "processing",
            "message": "task created successfully",
        })),
    )
        .into_response()
}

/// `GET /api/tasks/{id}`: progress and status.
pub async fn task_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    let Some(view) = state.manager.get(&id).await else {
        return not_found();
    };
    (
        StatusCode::OK,
        Json(json!({
            "task_id": view.id,
            "completed_count": format!("{} / {}", view.completed_shards, view.total_shards),
            "status": view.status,
        })),
    )
        .into_response()
}

/// `GET /api/tasks/{id}/result`: the aggregated Markdown once completed.
pub async fn task_result(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    let Some(view) = state.manager.get(&id).await else {
        return not_found();
    };
    if view.status != TaskStatus::Completed {
        return (
            StatusCode::ACCEPTED,
            Json(json!({
                "task_id": view.id,
                "status": view.status,
                "message": "task not completed yet",
            })),
        )
            .into_response();
    }

    match tokio::fs::read(&view.output_path).await {
        Ok(bytes) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/octet-stream")],
            bytes,
        )
            .into_response(),
        Err(e) => {
            error!(task = %id, error = %e, "result file unreadable");
            internal("result file unreadable".to_string())
        }
    }
}

/// `DELETE /api/tasks/{id}`: not supported yet.
pub async fn delete_task(Path(_id): Path<String>) -> Response {
    (
        StatusCode::NOT_IMPLEMENTED,
        Json(json!({"error": "not implemented"})),
    )
        .into_response()
}

fn bad_request(message: String) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({"error": message}))).into_response()
}

fn internal(message: String) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"error": message})),
    )
        .into_response()
}

fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({"error": "task not found"})),
    )
        .into_response()
}
