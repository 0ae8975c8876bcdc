//! Error types for the pdfmill library.
//!
//! One crate-level [`OcrError`] covers everything that can abort an
//! operation. Shard-level failures are deliberately NOT represented here:
//! a shard that exhausts its retries is carried as a plain detail string in
//! its completion signal and surfaces as a marker line in the aggregated
//! output, never as an `Err` from the engine. Store failures have their own
//! [`crate::store::StoreError`] because callers need to tell "not found"
//! apart from a broken backend.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// All fatal errors returned by the pdfmill library.
#[derive(Debug, Error)]
pub enum OcrError {
    // ── Input / create errors ────────────────────────────────────────────

    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'")]
    FileNotFound { path: PathBuf },

    /// The document parsed but contains no pages.
    #[error("'{path}' has no pages")]
    EmptyDocument { path: PathBuf },

    /// The document exceeds the per-task page limit.
    #[error("'{path}' has {pages} pages, the limit is {limit}")]
    TooManyPages {
        path: PathBuf,
        pages: usize,
        limit: usize,
    },

    /// The splitter could not parse or rewrite the document.
    #[error("failed to split '{path}': {detail}")]
    SplitFailed { path: PathBuf, detail: String },

    // ── Task manager errors ──────────────────────────────────────────────

    /// No task with this id, in memory or in the record store.
    #[error("unknown task: {id}")]
    UnknownTask { id: String },

    /// The shard queue stayed full for the whole submit timeout.
    #[error("shard queue full: could not enqueue {shard_id} within {timeout:?}")]
    QueueFull { shard_id: String, timeout: Duration },

    /// Submit or start was called on a pool that is already shut down.
    #[error("worker pool is shut down")]
    PoolClosed,

    /// `wait` reached its deadline before the task finished.
    #[error("task {id} did not finish within {deadline:?}")]
    WaitTimeout { id: String, deadline: Duration },

    // ── Processor errors ─────────────────────────────────────────────────

    /// The LLM backend returned a non-retryable error or malformed response.
    #[error("LLM backend error: {message}")]
    Backend { message: String },

    /// The extraction API answered with a non-zero status code.
    #[error("extraction API error: code={code} msg={msg} trace_id={trace_id}")]
    RemoteApi {
        code: i64,
        msg: String,
        trace_id: String,
    },

    /// The remote extraction task ended in the `failed` state.
    #[error("remote extraction failed: {detail}")]
    RemoteTaskFailed { detail: String },

    /// A shard path handed to the URL adapter does not live under the
    /// public output root and therefore cannot be published.
    #[error("'{path}' is outside the public output root")]
    OutsidePublicRoot { path: PathBuf },

    /// Downloading the result archive failed.
    #[error("download of '{url}' failed: {reason}")]
    DownloadFailed { url: String, reason: String },

    /// The result archive is missing the entry we need.
    #[error("'{name}' not found in result archive")]
    MissingArchiveEntry { name: String },

    /// The result archive could not be opened or read.
    #[error("result archive unreadable: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// The operation was cancelled through the pool's cancellation token.
    #[error("operation cancelled")]
    Cancelled,

    // ── Ambient errors ───────────────────────────────────────────────────

    /// Filesystem failure, with the path that caused it.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Configuration could not be assembled from the environment.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl OcrError {
    /// Attach a path to an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Wrap a transport-level failure from the LLM backend.
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }
}
