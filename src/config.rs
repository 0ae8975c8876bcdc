//! Configuration: backend selection from the environment and engine knobs.
//!
//! The engine itself is configured through [`EngineConfig`], a plain struct
//! with production defaults that tests override with struct-update syntax. The
//! LLM backend is chosen at startup from environment variables through
//! [`LlmConfig::from_env`]; the lookup is injected so the fallback chain can
//! be tested without mutating the process environment.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::OcrError;
use crate::keystore::KeyStore;

/// Default Gemini model when `GEMINI_MODEL` is unset.
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-3-flash-preview";

/// Default MinerU endpoint when `MINERU_BASE_URL` is unset.
pub const DEFAULT_MINERU_BASE_URL: &str = "https://mineru.net";

/// Default Redis address when `REDIS_ADDRESS` is unset.
pub const DEFAULT_REDIS_ADDRESS: &str = "localhost:6379";

/// Which LLM backend the service talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    /// Multimodal model that accepts the shard PDF inline.
    Gemini,
    /// Hosted extraction service that fetches the shard PDF by URL.
    MinerU,
}

/// Backend configuration resolved from the environment.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub provider: Provider,
    pub api_key: String,
    /// Extraction API endpoint (URL adapter only).
    pub base_url: String,
    /// Model identifier (inline adapter only).
    pub model: String,
    /// Public base URL of this service, used to expose shard PDFs to the
    /// extraction API (URL adapter only).
    pub public_url: String,
}

impl LlmConfig {
    /// Resolve the backend configuration from process environment variables.
    ///
    /// Recognised keys: `LLM_PROVIDER` (`gemini` | `mineru`, default
    /// `gemini`), `GEMINI_API_KEY`, `GEMINI_MODEL`, `GEMINI_KEYS_DB`,
    /// `MINERU_BASE_URL`, `MINERU_TOKEN`, `PUBLIC_URL`.
    pub fn from_env() -> Result<Self, OcrError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injected variable lookup.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, OcrError> {
        let provider = match get("LLM_PROVIDER").unwrap_or_default().trim().to_lowercase() {
            p if p.is_empty() || p == "gemini" => Provider::Gemini,
            p if p == "mineru" => Provider::MinerU,
            other => {
                return Err(OcrError::InvalidConfig(format!(
                    "unknown LLM_PROVIDER: {other}"
                )))
            }
        };

        let mut cfg = Self {
            provider,
            api_key: String::new(),
            base_url: String::new(),
            model: String::new(),
            public_url: get("PUBLIC_URL").unwrap_or_default(),
        };

        match provider {
            Provider::Gemini => {
                cfg.api_key = match get("GEMINI_API_KEY").filter(|k| !k.is_empty()) {
                    Some(key) => key,
                    None => gemini_key_from_registry(get("GEMINI_KEYS_DB"))?,
                };
                cfg.model = get("GEMINI_MODEL")
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string());
            }
            Provider::MinerU => {
                cfg.api_key = get("MINERU_TOKEN").filter(|t| !t.is_empty()).ok_or_else(|| {
                    OcrError::InvalidConfig("missing MINERU_TOKEN for provider=mineru".into())
                })?;
                cfg.base_url = get("MINERU_BASE_URL")
                    .filter(|u| !u.is_empty())
                    .unwrap_or_else(|| DEFAULT_MINERU_BASE_URL.to_string());
                if cfg.public_url.trim().is_empty() {
                    return Err(OcrError::InvalidConfig(
                        "missing PUBLIC_URL for provider=mineru".into(),
                    ));
                }
            }
        }

        Ok(cfg)
    }
}

/// Fall back to the first enabled key in the SQLite key registry.
fn gemini_key_from_registry(db_path: Option<String>) -> Result<String, OcrError> {
    let path = db_path.filter(|p| !p.trim().is_empty()).ok_or_else(|| {
        OcrError::InvalidConfig("missing GEMINI_API_KEY for provider=gemini".into())
    })?;
    let store = KeyStore::open(&path)
        .map_err(|e| OcrError::InvalidConfig(format!("key registry '{path}': {e}")))?;
    let keys = store
        .list_enabled(1)
        .map_err(|e| OcrError::InvalidConfig(format!("key registry '{path}': {e}")))?;
    keys.into_iter()
        .next()
        .map(|k| k.key)
        .ok_or_else(|| OcrError::InvalidConfig(format!("no enabled keys in '{path}'")))
}

/// Redis address for the record store, `host:port`.
pub fn redis_address() -> String {
    std::env::var("REDIS_ADDRESS")
        .ok()
        .filter(|a| !a.is_empty())
        .unwrap_or_else(|| DEFAULT_REDIS_ADDRESS.to_string())
}

/// Tunables for the orchestration engine.
///
/// Defaults match production; tests shrink the capacities and the backoff
/// base to exercise backpressure and retry without waiting on wall-clock
/// seconds.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Number of concurrent shard workers.
    pub worker_count: usize,
    /// Pages per shard.
    pub span: usize,
    /// Uploads at or above this page count are rejected.
    pub max_pages: usize,
    /// Capacity of the bounded shard queue.
    pub queue_capacity: usize,
    /// Capacity of the bounded completion-signal channel.
    pub result_capacity: usize,
    /// Retry attempts per shard before it is reported failed.
    pub max_retries: u32,
    /// Backoff base: a failed attempt `n` sleeps `base * 2^n`.
    pub retry_backoff: Duration,
    /// Longest single backoff sleep.
    pub retry_backoff_cap: Duration,
    /// Root directory for per-task work dirs.
    pub output_root: PathBuf,
    /// Time-to-live for persisted task records.
    pub record_ttl: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_count: 3,
            span: 2,
            max_pages: 30,
            queue_capacity: 100,
            result_capacity: 10,
            max_retries: 3,
            retry_backoff: Duration::from_secs(1),
            retry_backoff_cap: Duration::from_secs(30),
            output_root: PathBuf::from("output"),
            record_ttl: Duration::from_secs(5 * 60 * 60),
        }
    }
}
