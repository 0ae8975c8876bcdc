//! LLM backend adapters.
//!
//! The engine is agnostic to which backend turns a shard PDF into Markdown;
//! everything it needs is the single [`PdfProcessor`] capability. Two
//! implementations exist: [`gemini::GeminiProcessor`] embeds the PDF bytes
//! in a multimodal request, [`mineru::MinerUProcessor`] publishes the shard
//! under this service's public URL and drives a remote extraction task to
//! completion.

pub mod archive;
pub mod gemini;
pub mod mineru;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::config::{LlmConfig, Provider};
use crate::error::OcrError;

/// The one capability the worker pool consumes.
#[async_trait]
pub trait PdfProcessor: Send + Sync {
    /// Turn the PDF at `pdf_path` into Markdown.
    ///
    /// Implementations must honour `cancel` at their await points; a
    /// cancelled call returns [`OcrError::Cancelled`].
    async fn process_pdf(
        &self,
        cancel: &CancellationToken,
        pdf_path: &Path,
    ) -> Result<String, OcrError>;
}

/// Build the processor selected by `cfg`.
///
/// `output_root` is the directory served under `/output`; the URL adapter
/// needs it to rewrite shard paths into public URLs.
pub fn from_config(cfg: &LlmConfig, output_root: &Path) -> Arc<dyn PdfProcessor> {
    match cfg.provider {
        Provider::Gemini => Arc::new(gemini::GeminiProcessor::new(&cfg.api_key, &cfg.model)),
        Provider::MinerU => Arc::new(mineru::MinerUProcessor::new(
            &cfg.base_url,
            &cfg.api_key,
            &cfg.public_url,
            output_root,
        )),
    }
}
