//! TTL-bounded persistence for completed tasks.
//!
//! The engine is in-memory between restarts; the record store is what makes
//! a finished task's status and artifact findable after its parent has been
//! evicted from the index. Records are JSON under `task:<id>` keys with a
//! 5-hour default TTL. Two implementations: [`redis::RedisStore`] for
//! production and [`memory::MemoryStore`] for tests and Redis-less setups.

pub mod memory;
pub mod redis;

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::task::TaskStatus;

pub use self::memory::MemoryStore;
pub use self::redis::RedisStore;

/// Store key for a task id.
pub fn record_key(id: &str) -> String {
    format!("task:{id}")
}

/// Failures of the record store.
///
/// `NotFound` is part of the contract (callers branch on it); everything
/// else is a transport or encoding failure.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,

    #[error("encode record: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("store backend: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound)
    }
}

/// Persisted snapshot of a completed task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: String,
    pub status: TaskStatus,
    pub pdf_path: PathBuf,
    pub result_path: PathBuf,
    pub total_pages: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Key/value persistence for task records.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Fetch a record; `StoreError::NotFound` when absent or expired.
    async fn get(&self, id: &str) -> Result<TaskRecord, StoreError>;

    /// Write a record with a fresh TTL.
    async fn save(&self, record: &TaskRecord) -> Result<(), StoreError>;

    /// Rewrite an existing record with a new status (fresh TTL).
    async fn update_status(&self, id: &str, status: TaskStatus) -> Result<(), StoreError>;

    /// Remove a record. Removing an absent record is not an error.
    async fn delete(&self, id: &str) -> Result<(), StoreError>;
}
