//! SQLite registry of backend API keys.
//!
//! Lets an operator rotate Gemini keys without redeploying: keys live in a
//! small SQLite file, and the config layer picks the first enabled one when
//! `GEMINI_API_KEY` is not set. SQLite works best with a single writer, so
//! the connection sits behind a mutex; every call here is short.

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use rusqlite::Connection;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KeyStoreError {
    #[error("key already exists")]
    Exists,

    #[error("key not found")]
    NotFound,

    #[error("key is empty")]
    EmptyKey,

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error("create db file: {0}")]
    Io(#[from] std::io::Error),
}

/// One registered API key.
#[derive(Debug, Clone)]
pub struct ApiKey {
    pub id: i64,
    pub key: String,
    pub note: String,
    pub enabled: bool,
    /// Unix seconds, UTC.
    pub created_at: i64,
    pub updated_at: i64,
}

/// Hide most of a key for display: `AIza...x9fQ`.
pub fn mask_key(raw: &str) -> String {
    let key = raw.trim();
    if key.len() <= 8 {
        return key.to_string();
    }
    format!("{}...{}", &key[..4], &key[key.len() - 4..])
}

pub struct KeyStore {
    conn: Mutex<Connection>,
}

impl KeyStore {
    /// Open (or create) the database at `path` and run migrations.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, KeyStoreError> {
        let path = path.as_ref();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }

        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "busy_timeout", 5000)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS gemini_keys (
                 id INTEGER PRIMARY KEY AUTOINCREMENT,
                 key TEXT NOT NULL UNIQUE,
                 note TEXT,
                 enabled INTEGER NOT NULL DEFAULT 1,
                 created_at INTEGER NOT NULL,
                 updated_at INTEGER NOT NULL
             );
             CREATE INDEX IF NOT EXISTS idx_gemini_keys_enabled
                 ON gemini_keys(enabled);",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert a new key, enabled by default.
    pub fn add(&self, key: &str, note: &str) -> Result<ApiKey, KeyStoreError> {
        let key = key.trim();
        if key.is_empty() {
            return Err(KeyStoreError::EmptyKey);
        }
        let now = Utc::now().timestamp();

        let conn = self.lock();
        let result = conn.execute(
            "INSERT INTO gemini_keys (key, note, enabled, created_at, updated_at)
             VALUES (?1, ?2, 1, ?3, ?3)",
            rusqlite::params![key, note, now],
        );
        match result {
            Ok(_) => Ok(ApiKey {
                id: conn.last_insert_rowid(),
                key: key.to_string(),
                note: note.to_string(),
                enabled: true,
                created_at: now,
                updated_at: now,
            }),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(KeyStoreError::Exists)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Remove a key by id.
    pub fn delete(&self, id: i64) -> Result<(), KeyStoreError> {
        let rows = self
            .lock()
            .execute("DELETE FROM gemini_keys WHERE id = ?1", [id])?;
        if rows == 0 {
            return Err(KeyStoreError::NotFound);
        }
        Ok(())
    }

    /// Fetch a key by id.
    pub fn get(&self, id: i64) -> Result<ApiKey, KeyStoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, key, note, enabled, created_at, updated_at
             FROM gemini_keys WHERE id = ?1",
        )?;
        stmt.query_row([id], row_to_key).map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => KeyStoreError::NotFound,
            other => other.into(),
        })
    }

    /// All keys, oldest first.
    pub fn list(&self) -> Result<Vec<ApiKey>, KeyStoreError> {
        self.query_keys(
            "SELECT id, key, note, enabled, created_at, updated_at
             FROM gemini_keys ORDER BY id ASC",
        )
    }

    /// Enabled keys only, oldest first, at most `limit`.
    pub fn list_enabled(&self, limit: usize) -> Result<Vec<ApiKey>, KeyStoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, key, note, enabled, created_at, updated_at
             FROM gemini_keys WHERE enabled = 1 ORDER BY id ASC LIMIT ?1",
        )?;
        let rows = stmt.query_map([limit as i64], row_to_key)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Enable or disable a key.
    pub fn set_enabled(&self, id: i64, enabled: bool) -> Result<(), KeyStoreError> {
        let rows = self.lock().execute(
            "UPDATE gemini_keys SET enabled = ?1, updated_at = ?2 WHERE id = ?3",
            rusqlite::params![enabled as i64, Utc::now().timestamp(), id],
        )?;
        if rows == 0 {
            return Err(KeyStoreError::NotFound);
        }
        Ok(())
    }

    /// Number of enabled keys.
    pub fn count_enabled(&self) -> Result<i64, KeyStoreError> {
        let count = self.lock().query_row(
            "SELECT COUNT(1) FROM gemini_keys WHERE enabled = 1",
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn query_keys(&self, sql: &str) -> Result<Vec<ApiKey>, KeyStoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map([], row_to_key)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

fn row_to_key(row: &rusqlite::Row<'_>) -> rusqlite::Result<ApiKey> {
    Ok(ApiKey {
        id: row.get(0)?,
        key: row.get(1)?,
        note: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
        enabled: row.get::<_, i64>(3)? == 1,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}
