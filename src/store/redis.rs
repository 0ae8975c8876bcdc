//! Redis-backed record store.
//!
//! Records are JSON strings written with `SET ... EX`, so the TTL rides on
//! the key itself and nothing here needs a sweeper. The connection manager
//! reconnects on its own; a request hitting a dead connection surfaces as
//! `StoreError::Backend`.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::debug;

use crate::task::TaskStatus;

use super::{record_key, StoreError, TaskRecord, TaskStore};

pub struct RedisStore {
    conn: ConnectionManager,
    ttl: Duration,
}

impl RedisStore {
    /// Connect to `addr` (`host:port`).
    pub async fn connect(addr: &str, ttl: Duration) -> Result<Self, StoreError> {
        let client = redis::Client::open(format!("redis://{addr}")).map_err(backend)?;
        let conn = ConnectionManager::new(client).await.map_err(backend)?;
        debug!(addr, "connected to redis");
        Ok(Self { conn, ttl })
    }
}

#[async_trait]
impl TaskStore for RedisStore {
    async fn get(&self, id: &str) -> Result<TaskRecord, StoreError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(record_key(id)).await.map_err(backend)?;
        let raw = raw.ok_or(StoreError::NotFound)?;
        Ok(serde_json::from_str(&raw)?)
    }

    async fn save(&self, record: &TaskRecord) -> Result<(), StoreError> {
        let raw = serde_json::to_string(record)?;
        let mut conn = self.conn.clone();
        let _: () = conn
            .set_ex(record_key(&record.id), raw, self.ttl.as_secs())
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn update_status(&self, id: &str, status: TaskStatus) -> Result<(), StoreError> {
        let mut record = self.get(id).await?;
        record.status = status;
        record.updated_at = Utc::now();
        self.save(&record).await
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(record_key(id)).await.map_err(backend)?;
        Ok(())
    }
}

fn backend(e: redis::RedisError) -> StoreError {
    StoreError::Backend(e.to_string())
}
