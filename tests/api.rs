//! HTTP surface tests: the router is exercised in-process with tower's
//! `oneshot`, against the real engine and a scripted backend.

mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use common::{ok, ok_after, pdf_bytes, ScriptedProcessor};
use pdfmill::processor::PdfProcessor;
use pdfmill::server::{router, AppState};
use pdfmill::{EngineConfig, TaskManager};
use serde_json::Value;
use tower::util::ServiceExt;

const BOUNDARY: &str = "pdfmill-test-boundary";

struct TestApp {
    app: Router,
    manager: Arc<TaskManager>,
    _dir: tempfile::TempDir,
}

async fn spawn_app(processor: Arc<dyn PdfProcessor>) -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let cfg = EngineConfig {
        output_root: dir.path().join("out"),
        retry_backoff: Duration::from_millis(5),
        ..EngineConfig::default()
    };
    let manager = Arc::new(TaskManager::new(cfg, processor, None));
    manager.start().await;
    let app = router(AppState {
        manager: Arc::clone(&manager),
        uploads_dir: dir.path().join("uploads"),
    });
    TestApp {
        app,
        manager,
        _dir: dir,
    }
}

fn upload_request(filename: &str, bytes: &[u8]) -> Request<Body> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\n\
             Content-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n\
             Content-Type: application/pdf\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri("/api/tasks")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn upload_poll_and_download() {
    let app = spawn_app(ScriptedProcessor::new(|start| ok(&format!("S{start}\n")))).await;

    let response = app
        .app
        .clone()
        .oneshot(upload_request("report.pdf", &pdf_bytes(4)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = json_body(response).await;
    assert_eq!(body["status"], "processing");
    let task_id = body["task_id"].as_str().unwrap().to_string();

    app.manager
        .wait(&task_id, Duration::from_secs(10))
        .await
        .unwrap();

    let response = app
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/api/tasks/{task_id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["completed_count"], "2 / 2");
    assert_eq!(body["status"], "completed");

    let response = app
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/api/tasks/{task_id}/result"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&bytes[..], &b"S1\nS3\n"[..]);

    app.manager.shutdown().await;
}

#[tokio::test]
async fn result_is_deferred_until_completion() {
    let app = spawn_app(ScriptedProcessor::new(|_| ok_after(300, "slow\n"))).await;

    let response = app
        .app
        .clone()
        .oneshot(upload_request("slow.pdf", &pdf_bytes(2)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let task_id = json_body(response).await["task_id"]
        .as_str()
        .unwrap()
        .to_string();

    let response = app
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/api/tasks/{task_id}/result"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body = json_body(response).await;
    assert_eq!(body["status"], "processing");

    app.manager
        .wait(&task_id, Duration::from_secs(10))
        .await
        .unwrap();
    app.manager.shutdown().await;
}

#[tokio::test]
async fn non_pdf_uploads_are_rejected() {
    let app = spawn_app(ScriptedProcessor::new(|_| ok("x"))).await;

    let response = app
        .app
        .clone()
        .oneshot(upload_request("notes.txt", b"just text"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert!(body["error"].as_str().unwrap().contains("PDF"));

    app.manager.shutdown().await;
}

#[tokio::test]
async fn missing_file_field_is_rejected() {
    let app = spawn_app(ScriptedProcessor::new(|_| ok("x"))).await;

    let body = format!(
        "--{BOUNDARY}\r\n\
         Content-Disposition: form-data; name=\"comment\"\r\n\r\n\
         hello\r\n--{BOUNDARY}--\r\n"
    );
    let request = Request::builder()
        .method("POST")
        .uri("/api/tasks")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap();

    let response = app.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error"], "file is required");

    app.manager.shutdown().await;
}

#[tokio::test]
async fn unknown_tasks_are_404() {
    let app = spawn_app(ScriptedProcessor::new(|_| ok("x"))).await;

    for uri in ["/api/tasks/ghost", "/api/tasks/ghost/result"] {
        let response = app
            .app
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    app.manager.shutdown().await;
}

#[tokio::test]
async fn delete_is_not_implemented() {
    let app = spawn_app(ScriptedProcessor::new(|_| ok("x"))).await;

    let response = app
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/api/tasks/whatever")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_IMPLEMENTED);

    app.manager.shutdown().await;
}

#[tokio::test]
async fn oversized_page_counts_are_rejected_with_500() {
    let app = spawn_app(ScriptedProcessor::new(|_| ok("x"))).await;

    let response = app
        .app
        .clone()
        .oneshot(upload_request("big.pdf", &pdf_bytes(30)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = json_body(response).await;
    assert!(body["error"].as_str().unwrap().contains("limit"));

    app.manager.shutdown().await;
}
