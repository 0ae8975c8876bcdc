//! In-process record store with the same TTL semantics as Redis.
//!
//! Backs the test suite and the no-Redis deployment mode. Expiry is lazy:
//! a record past its deadline is dropped on the read that finds it.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::task::TaskStatus;

use super::{record_key, StoreError, TaskRecord, TaskStore};

pub struct MemoryStore {
    ttl: Duration,
    records: RwLock<HashMap<String, (TaskRecord, Instant)>>,
}

impl MemoryStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            records: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl TaskStore for MemoryStore {
    async fn get(&self, id: &str) -> Result<TaskRecord, StoreError> {
        let key = record_key(id);
        let mut records = self.records.write().await;
        match records.get(&key) {
            Some((_, deadline)) if *deadline <= Instant::now() => {
                records.remove(&key);
                Err(StoreError::NotFound)
            }
            Some((record, _)) => Ok(record.clone()),
            None => Err(StoreError::NotFound),
        }
    }

    async fn save(&self, record: &TaskRecord) -> Result<(), StoreError> {
        self.records.write().await.insert(
            record_key(&record.id),
            (record.clone(), Instant::now() + self.ttl),
        );
        Ok(())
    }

    async fn update_status(&self, id: &str, status: TaskStatus) -> Result<(), StoreError> {
        let mut record = self.get(id).await?;
        record.status = status;
        record.updated_at = Utc::now();
        self.save(&record).await
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.records.write().await.remove(&record_key(id));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn record(id: &str) -> TaskRecord {
        let now = Utc::now();
        TaskRecord {
            id: id.to_string(),
            status: TaskStatus::Completed,
            pdf_path: PathBuf::from("uploads/doc.pdf"),
            result_path: PathBuf::from(format!("output/{id}/result.md")),
            total_pages: 4,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn round_trips_records() {
        let store = MemoryStore::new(Duration::from_secs(60));
        store.save(&record("a")).await.unwrap();

        let loaded = store.get("a").await.unwrap();
        assert_eq!(loaded.id, "a");
        assert_eq!(loaded.status, TaskStatus::Completed);
        assert_eq!(loaded.result_path, PathBuf::from("output/a/result.md"));
    }

    #[tokio::test]
    async fn missing_records_are_not_found() {
        let store = MemoryStore::new(Duration::from_secs(60));
        let err = store.get("ghost").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn records_expire() {
        let store = MemoryStore::new(Duration::from_millis(20));
        store.save(&record("a")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(store.get("a").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn update_status_rewrites_in_place() {
        let store = MemoryStore::new(Duration::from_secs(60));
        let mut rec = record("a");
        rec.status = TaskStatus::Processing;
        store.save(&rec).await.unwrap();

        store.update_status("a", TaskStatus::Completed).await.unwrap();
        assert_eq!(store.get("a").await.unwrap().status, TaskStatus::Completed);

        let err = store
            .update_status("ghost", TaskStatus::Completed)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let store = MemoryStore::new(Duration::from_secs(60));
        store.save(&record("a")).await.unwrap();
        store.delete("a").await.unwrap();
        store.delete("a").await.unwrap();
        assert!(store.get("a").await.unwrap_err().is_not_found());
    }
}
