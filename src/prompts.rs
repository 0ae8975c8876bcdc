//! Prompts sent to the inline multimodal backend.
//!
//! Centralising the prompt here keeps the adapter free of prompt
//! engineering: changing transcription behaviour means editing exactly one
//! constant, and unit tests can assert on the request body without a live
//! backend.

/// System prompt for the inline adapter.
///
/// The backend sees one shard PDF at a time, so the prompt is scoped to
/// faithful transcription. Two rules matter most in production: the output
/// must be raw Markdown (downstream aggregation concatenates shard files
/// verbatim) and the text must stay in its source language.
pub const SYSTEM_PROMPT: &str = "\
You are a document transcription engine. Convert the attached PDF to clean, \
well-structured Markdown.

Rules:
1. Transcribe ALL text content faithfully, in reading order.
2. Keep the text in its original language. Do NOT translate.
3. Use Markdown headings, lists and GFM tables to mirror the document \
structure.
4. Render formulas as LaTeX: $inline$ and $$display$$.
5. Output ONLY the Markdown content. No commentary, no code fences around \
the whole document, no page markers.";

/// User-turn instruction accompanying the inline PDF part.
pub const USER_PROMPT: &str = "Convert this PDF to Markdown.";
