//! URL adapter: hosted extraction service that fetches the shard PDF itself.
//!
//! The service cannot accept uploads, only URLs, so the shard path is
//! rewritten to the address it is served under (`PUBLIC_URL` + `/output/` +
//! the path relative to the output root). The extraction task is then
//! created over HTTP, polled until it settles, and the result ZIP's
//! `full.md` entry becomes the shard Markdown.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::OcrError;

use super::{archive, PdfProcessor};

const API_TIMEOUT: Duration = Duration::from_secs(20);
const POLL_INTERVAL: Duration = Duration::from_secs(5);

/// MinerU-backed [`PdfProcessor`].
pub struct MinerUProcessor {
    http: reqwest::Client,
    base_url: String,
    token: String,
    public_url: String,
    output_root: PathBuf,
    poll_interval: Duration,
}

impl MinerUProcessor {
    pub fn new(base_url: &str, token: &str, public_url: &str, output_root: &Path) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            public_url: public_url.trim_end_matches('/').to_string(),
            output_root: output_root.to_path_buf(),
            poll_interval: POLL_INTERVAL,
        }
    }

    /// Rewrite a shard path under the output root into its public URL.
    pub fn publish_url(&self, local: &Path) -> Result<String, OcrError> {
        let rel = local
            .strip_prefix(&self.output_root)
            .map_err(|_| OcrError::OutsidePublicRoot {
                path: local.to_path_buf(),
            })?;
        let rel: Vec<String> = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        Ok(format!("{}/output/{}", self.public_url, rel.join("/")))
    }

    async fn create_task(&self, file_url: &str) -> Result<String, OcrError> {
        let response = self
            .http
            .post(format!("{}/api/v4/extract/task", self.base_url))
            .bearer_auth(&self.token)
            .timeout(API_TIMEOUT)
            .json(&CreateTaskRequest {
                url: file_url,
                model_version: Some("vlm"),
            })
            .send()
            .await
            .map_err(|e| OcrError::backend(e.to_string()))?;

        let envelope: Envelope<CreatedTask> = response
            .json()
            .await
            .map_err(|e| OcrError::backend(format!("malformed create response: {e}")))?;
        let data = envelope.into_data()?;
        if data.task_id.is_empty() {
            return Err(OcrError::backend("create response carried no task_id"));
        }
        Ok(data.task_id)
    }

    async fn get_task(&self, task_id: &str) -> Result<ExtractTask, OcrError> {
        let response = self
            .http
            .get(format!("{}/api/v4/extract/task/{task_id}", self.base_url))
            .bearer_auth(&self.token)
            .timeout(API_TIMEOUT)
            .send()
            .await
            .map_err(|e| OcrError::backend(e.to_string()))?;

        let envelope: Envelope<ExtractTask> = response
            .json()
            .await
            .map_err(|e| OcrError::backend(format!("malformed task response: {e}")))?;
        envelope.into_data()
    }

    /// Poll until the remote task reaches `done` or `failed`.
    async fn wait_for_completion(
        &self,
        cancel: &CancellationToken,
        task_id: &str,
    ) -> Result<ExtractTask, OcrError> {
        loop {
            let task = self.get_task(task_id).await?;
            match task.state.as_str() {
                "done" => return Ok(task),
                "failed" => {
                    return Err(OcrError::RemoteTaskFailed {
                        detail: task.err_msg,
                    })
                }
                state => {
                    let progress = task.extract_progress.unwrap_or_default();
                    info!(
                        task_id,
                        state,
                        extracted = progress.extracted_pages,
                        total = progress.total_pages,
                        "extraction in progress"
                    );
                }
            }
            tokio::select! {
                _ = cancel.cancelled() => return Err(OcrError::Cancelled),
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }
}

#[async_trait]
impl PdfProcessor for MinerUProcessor {
    async fn process_pdf(
        &self,
        cancel: &CancellationToken,
        pdf_path: &Path,
    ) -> Result<String, OcrError> {
        let file_url = self.publish_url(pdf_path)?;
        debug!(pdf = %pdf_path.display(), url = %file_url, "publishing shard");

        let task_id = self.create_task(&file_url).await?;
        let task = self.wait_for_completion(cancel, &task_id).await?;

        let zip_url = task
            .full_zip_url
            .filter(|u| !u.is_empty())
            .ok_or_else(|| OcrError::backend("task done but no zip url returned"))?;

        // The ZIP lands in a managed temp dir so it is removed even when
        // extraction fails.
        let tmp = tempfile::tempdir().map_err(|e| OcrError::io(std::env::temp_dir(), e))?;
        let zip_path = tmp.path().join(format!("{task_id}.zip"));
        archive::download_zip(&self.http, &zip_url, &zip_path).await?;

        let markdown = tokio::task::spawn_blocking(move || {
            let md = archive::extract_markdown(&zip_path);
            drop(tmp);
            md
        })
        .await
        .map_err(|e| OcrError::backend(format!("extract task panicked: {e}")))??;

        Ok(markdown)
    }
}

// ── Wire types ───────────────────────────────────────────────────────────

#[derive(Serialize)]
struct CreateTaskRequest<'a> {
    url: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    model_version: Option<&'a str>,
}

/// Common `{code, msg, trace_id, data}` response wrapper.
#[derive(Deserialize)]
struct Envelope<T> {
    code: i64,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    trace_id: String,
    data: Option<T>,
}

impl<T> Envelope<T> {
    fn into_data(self) -> Result<T, OcrError> {
        if self.code != 0 {
            return Err(OcrError::RemoteApi {
                code: self.code,
                msg: self.msg,
                trace_id: self.trace_id,
            });
        }
        self.data
            .ok_or_else(|| OcrError::backend("response carried no data"))
    }
}

#[derive(Debug, Deserialize)]
struct CreatedTask {
    #[serde(default)]
    task_id: String,
}

#[derive(Deserialize)]
struct ExtractTask {
    #[serde(default)]
    state: String,
    #[serde(default)]
    full_zip_url: Option<String>,
    #[serde(default)]
    err_msg: String,
    #[serde(default)]
    extract_progress: Option<ExtractProgress>,
}

#[derive(Deserialize, Default)]
struct ExtractProgress {
    #[serde(default)]
    extracted_pages: u32,
    #[serde(default)]
    total_pages: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn processor() -> MinerUProcessor {
        MinerUProcessor::new(
            "https://mineru.net/",
            "tok",
            "https://ocr.example.com/",
            Path::new("output"),
        )
    }

    #[test]
    fn publish_url_maps_under_output_root() {
        let p = processor();
        let url = p
            .publish_url(Path::new("output/abc-123/doc_1-2.pdf"))
            .unwrap();
        assert_eq!(url, "https://ocr.example.com/output/abc-123/doc_1-2.pdf");
    }

    #[test]
    fn publish_url_rejects_foreign_paths() {
        let p = processor();
        let err = p.publish_url(Path::new("/tmp/doc.pdf")).unwrap_err();
        assert!(matches!(err, OcrError::OutsidePublicRoot { .. }));
    }

    #[test]
    fn envelope_surfaces_api_errors() {
        let raw = r#"{"code": -60012, "msg": "file too large", "trace_id": "t-9"}"#;
        let envelope: Envelope<CreatedTask> = serde_json::from_str(raw).unwrap();
        let err = envelope.into_data().unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("-60012"));
        assert!(msg.contains("file too large"));
        assert!(msg.contains("t-9"));
    }

    #[test]
    fn task_response_parses_progress() {
        let raw = r#"{
            "code": 0, "msg": "ok", "trace_id": "t",
            "data": {
                "task_id": "x", "state": "running",
                "extract_progress": {"extracted_pages": 3, "total_pages": 10}
            }
        }"#;
        let envelope: Envelope<ExtractTask> = serde_json::from_str(raw).unwrap();
        let task = envelope.into_data().unwrap();
        assert_eq!(task.state, "running");
        let progress = task.extract_progress.unwrap();
        assert_eq!(progress.extracted_pages, 3);
        assert_eq!(progress.total_pages, 10);
    }

    #[test]
    fn done_task_carries_zip_url() {
        let raw = r#"{
            "code": 0,
            "data": {"task_id": "x", "state": "done", "full_zip_url": "https://cdn/x.zip"}
        }"#;
        let envelope: Envelope<ExtractTask> = serde_json::from_str(raw).unwrap();
        let task = envelope.into_data().unwrap();
        assert_eq!(task.state, "done");
        assert_eq!(task.full_zip_url.as_deref(), Some("https://cdn/x.zip"));
    }
}
