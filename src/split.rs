//! PDF splitting: page counting and shard extraction.
//!
//! The shard file names written here and the names derived by the task
//! manager come from the same [`shard_file_name`] function, so the two can
//! never drift apart. Everything in this module is blocking (lopdf parses
//! the whole document in memory); callers on the runtime wrap these in
//! `spawn_blocking`.

use std::path::{Path, PathBuf};

use lopdf::Document;
use tracing::debug;

use crate::error::OcrError;

/// File name of the shard covering pages `start..=end` of `stem.pdf`.
///
/// Multi-page shards are `<stem>_<start>-<end>.pdf`; a single-page shard
/// drops the range: `<stem>_<start>.pdf`.
pub fn shard_file_name(stem: &str, start: usize, end: usize) -> String {
    if start == end {
        format!("{stem}_{start}.pdf")
    } else {
        format!("{stem}_{start}-{end}.pdf")
    }
}

/// Number of pages in the document at `path`.
pub fn page_count(path: &Path) -> Result<usize, OcrError> {
    let doc = load(path)?;
    Ok(doc.get_pages().len())
}

/// Split `path` into shard PDFs of `span` pages each, written to `out_dir`.
///
/// Returns the shard paths in page order. The last shard may be shorter
/// than `span`.
pub fn split_document(path: &Path, out_dir: &Path, span: usize) -> Result<Vec<PathBuf>, OcrError> {
    if span == 0 {
        return Err(OcrError::InvalidConfig("split span must be at least 1".into()));
    }

    let doc = load(path)?;
    let total = doc.get_pages().len();
    if total == 0 {
        return Err(OcrError::EmptyDocument {
            path: path.to_path_buf(),
        });
    }

    std::fs::create_dir_all(out_dir).map_err(|e| OcrError::io(out_dir, e))?;
    let stem = file_stem(path);

    let mut shards = Vec::with_capacity(total.div_ceil(span));
    for index in 0..total.div_ceil(span) {
        let start = index * span + 1;
        let end = ((index + 1) * span).min(total);

        // Cheapest correct extraction with lopdf: clone the parsed document,
        // drop every page outside the range, prune unreferenced objects.
        let mut part = doc.clone();
        let outside: Vec<u32> = (1..=total as u32)
            .filter(|p| (*p as usize) < start || (*p as usize) > end)
            .collect();
        part.delete_pages(&outside);
        part.prune_objects();

        let shard_path = out_dir.join(shard_file_name(&stem, start, end));
        part.save(&shard_path).map_err(|e| OcrError::SplitFailed {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
        debug!(shard = %shard_path.display(), start, end, "wrote shard");
        shards.push(shard_path);
    }

    Ok(shards)
}

/// Source file stem used in shard names ("report" for "/x/report.pdf").
pub fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string())
}

fn load(path: &Path) -> Result<Document, OcrError> {
    if !path.exists() {
        return Err(OcrError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    Document::load(path).map_err(|e| OcrError::SplitFailed {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })
}
