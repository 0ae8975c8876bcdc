//! Shared fixtures for the integration tests: generated PDFs and a
//! scripted stand-in for the LLM backend.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use tokio_util::sync::CancellationToken;

use pdfmill::processor::PdfProcessor;
use pdfmill::OcrError;

// ── PDF fixtures ─────────────────────────────────────────────────────────

fn build_document(pages: usize) -> Document {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids: Vec<Object> = Vec::with_capacity(pages);
    for n in 1..=pages {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 24.into()]),
                Operation::new("Td", vec![72.into(), 720.into()]),
                Operation::new("Tj", vec![Object::string_literal(format!("Page {n}"))]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => pages as i64,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc
}

/// Write an n-page PDF fixture to `path`.
pub fn build_pdf(path: &Path, pages: usize) {
    build_document(pages).save(path).unwrap();
}

/// An n-page PDF fixture as raw bytes (for upload tests).
pub fn pdf_bytes(pages: usize) -> Vec<u8> {
    let mut buf = Vec::new();
    build_document(pages).save_to(&mut buf).unwrap();
    buf
}

// ── Scripted backend ─────────────────────────────────────────────────────

/// What one scripted call does.
pub struct Outcome {
    pub delay: Duration,
    pub result: Result<String, String>,
}

pub fn ok(markdown: &str) -> Outcome {
    Outcome {
        delay: Duration::ZERO,
        result: Ok(markdown.to_string()),
    }
}

pub fn ok_after(ms: u64, markdown: &str) -> Outcome {
    Outcome {
        delay: Duration::from_millis(ms),
        result: Ok(markdown.to_string()),
    }
}

pub fn fail(message: &str) -> Outcome {
    Outcome {
        delay: Duration::ZERO,
        result: Err(message.to_string()),
    }
}

/// Backend double scripted by the shard's first page, which is recovered
/// from the shard file name the splitter produced.
pub struct ScriptedProcessor {
    script: Box<dyn Fn(usize) -> Outcome + Send + Sync>,
}

impl ScriptedProcessor {
    pub fn new(script: impl Fn(usize) -> Outcome + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            script: Box::new(script),
        })
    }
}

#[async_trait]
impl PdfProcessor for ScriptedProcessor {
    async fn process_pdf(
        &self,
        _cancel: &CancellationToken,
        pdf_path: &Path,
    ) -> Result<String, OcrError> {
        let outcome = (self.script)(page_start_of(pdf_path));
        if outcome.delay > Duration::ZERO {
            tokio::time::sleep(outcome.delay).await;
        }
        outcome.result.map_err(OcrError::backend)
    }
}

/// First page covered by a shard PDF, from its `<stem>_<P>-<Q>.pdf` or
/// `<stem>_<P>.pdf` name.
pub fn page_start_of(path: &Path) -> usize {
    path.file_stem()
        .and_then(|s| s.to_str())
        .and_then(|stem| stem.rsplit('_').next())
        .and_then(|range| range.split('-').next())
        .and_then(|p| p.parse().ok())
        .unwrap_or(0)
}
