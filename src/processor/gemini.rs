//! Inline adapter: shard PDFs embedded in a multimodal `generateContent`
//! request.
//!
//! The shard PDFs this service produces are two pages by default, so
//! inlining the raw bytes is well below the API's request-size ceiling and
//! avoids a round-trip through public storage. Retry lives in the worker
//! pool, not here: one call, one verdict.

use std::path::Path;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::OcrError;
use crate::prompts::{SYSTEM_PROMPT, USER_PROMPT};

use super::PdfProcessor;

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(120);

/// Gemini-backed [`PdfProcessor`].
pub struct GeminiProcessor {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiProcessor {
    pub fn new(api_key: &str, model: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            base_url: API_BASE.to_string(),
        }
    }
}

#[async_trait]
impl PdfProcessor for GeminiProcessor {
    async fn process_pdf(
        &self,
        cancel: &CancellationToken,
        pdf_path: &Path,
    ) -> Result<String, OcrError> {
        let bytes = tokio::fs::read(pdf_path)
            .await
            .map_err(|e| OcrError::io(pdf_path, e))?;
        debug!(pdf = %pdf_path.display(), bytes = bytes.len(), model = %self.model, "inline request");

        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let request = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .timeout(REQUEST_TIMEOUT)
            .json(&build_request(&bytes))
            .send();

        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(OcrError::Cancelled),
            r = request => r.map_err(|e| OcrError::backend(e.to_string()))?,
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OcrError::backend(format!("HTTP {status}: {body}")));
        }

        let parsed: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| OcrError::backend(format!("malformed response: {e}")))?;
        let text = parsed.text();
        if text.is_empty() {
            return Err(OcrError::backend("response contained no text"));
        }
        Ok(text)
    }
}

// ── Wire types ───────────────────────────────────────────────────────────

fn build_request(pdf_bytes: &[u8]) -> GenerateContentRequest<'static> {
    GenerateContentRequest {
        system_instruction: ContentPayload {
            role: None,
            parts: vec![Part::text(SYSTEM_PROMPT)],
        },
        contents: vec![ContentPayload {
            role: Some("user"),
            parts: vec![
                Part::inline_pdf(BASE64.encode(pdf_bytes)),
                Part::text(USER_PROMPT),
            ],
        }],
    }
}

#[derive(Serialize)]
struct GenerateContentRequest<'a> {
    #[serde(rename = "systemInstruction")]
    system_instruction: ContentPayload<'a>,
    contents: Vec<ContentPayload<'a>>,
}

#[derive(Serialize)]
struct ContentPayload<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    #[serde(rename = "inlineData", skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<&'a str>,
}

impl<'a> Part<'a> {
    fn text(text: &'a str) -> Self {
        Self {
            inline_data: None,
            text: Some(text),
        }
    }

    fn inline_pdf(data: String) -> Self {
        Self {
            inline_data: Some(InlineData {
                mime_type: "application/pdf",
                data,
            }),
            text: None,
        }
    }
}

#[derive(Serialize)]
struct InlineData<'a> {
    #[serde(rename = "mimeType")]
    mime_type: &'a str,
    data: String,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

impl GenerateContentResponse {
    /// Concatenated text of the first candidate.
    fn text(&self) -> String {
        self.candidates
            .first()
            .map(|c| {
                c.content
                    .parts
                    .iter()
                    .map(|p| p.text.as_str())
                    .collect::<String>()
            })
            .unwrap_or_default()
    }
}

#[derive(Deserialize, Default)]
struct Candidate {
    #[serde(default)]
    content: CandidateContent,
}

#[derive(Deserialize, Default)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<TextPart>,
}

#[derive(Deserialize, Default)]
struct TextPart {
    #[serde(default)]
    text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_matches_wire_format() {
        let body = serde_json::to_value(build_request(b"%PDF-fake")).unwrap();

        assert_eq!(
            body["systemInstruction"]["parts"][0]["text"],
            SYSTEM_PROMPT
        );
        assert!(body["systemInstruction"].get("role").is_none());

        let user = &body["contents"][0];
        assert_eq!(user["role"], "user");
        assert_eq!(
            user["parts"][0]["inlineData"]["mimeType"],
            "application/pdf"
        );
        assert_eq!(
            user["parts"][0]["inlineData"]["data"],
            BASE64.encode(b"%PDF-fake")
        );
        assert_eq!(user["parts"][1]["text"], USER_PROMPT);
    }

    #[test]
    fn response_text_joins_first_candidate_parts() {
        let raw = r##"{
            "candidates": [{
                "content": {"parts": [{"text": "# Title\n"}, {"text": "Body"}]}
            }]
        }"##;
        let parsed: GenerateContentResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.text(), "# Title\nBody");
    }

    #[test]
    fn empty_response_yields_empty_text() {
        let parsed: GenerateContentResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(parsed.text(), "");
    }
}
