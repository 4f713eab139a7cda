//! Response cache keyed by request fingerprints
//!
//! Maps a (query, model, recent-context) fingerprint to a previously
//! observed full response, with an optional time-to-live. Caching is
//! best-effort: storage failures are logged and treated as misses, never
//! surfaced to the caller.

use crate::error::{Result, TalariaError};
use crate::storage::Message;
use anyhow::Context;
use chrono::{Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use std::path::PathBuf;

/// Number of trailing context messages folded into the fingerprint
const FINGERPRINT_CONTEXT_MESSAGES: usize = 20;

/// Stored queries are truncated to this many characters. The stored query
/// is diagnostic only; the fingerprint alone is the lookup key.
const STORED_QUERY_MAX_CHARS: usize = 500;

/// SQLite-backed response cache
///
/// Shares a database file with [`crate::storage::SqliteStore`]; the cache
/// table is independent of the conversation tables and no transaction
/// spans both.
pub struct ResponseCache {
    db_path: PathBuf,
}

impl ResponseCache {
    /// Creates a cache backed by the given database file
    ///
    /// # Examples
    ///
    /// ```
    /// use talaria::cache::ResponseCache;
    ///
    /// let cache = ResponseCache::new_with_path("/tmp/talaria_test_cache.db").unwrap();
    /// ```
    pub fn new_with_path<P: Into<PathBuf>>(db_path: P) -> Result<Self> {
        let db_path = db_path.into();

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .context("Failed to create parent directory for database")
                .map_err(|e| TalariaError::Storage(e.to_string()))?;
        }

        let cache = Self { db_path };
        cache.init()?;
        Ok(cache)
    }

    fn init(&self) -> Result<()> {
        let conn = self.open()?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS response_cache (
                fingerprint TEXT PRIMARY KEY,
                query TEXT NOT NULL,
                response TEXT NOT NULL,
                model TEXT NOT NULL,
                created_at TEXT NOT NULL,
                expires_at TEXT
            )",
            [],
        )
        .context("Failed to create cache table")
        .map_err(|e| TalariaError::Storage(e.to_string()))?;
        Ok(())
    }

    fn open(&self) -> Result<Connection> {
        Connection::open(&self.db_path)
            .context("Failed to open database")
            .map_err(|e| TalariaError::Storage(e.to_string()).into())
    }

    /// Computes the fingerprint for a (query, model, context) triple
    ///
    /// The context contribution is the last 20 messages' role and content,
    /// serialized as canonical JSON (object keys sorted), so the hash is
    /// insensitive to field ordering but sensitive to message order and
    /// content.
    pub fn fingerprint(query: &str, model: &str, context: &[Message]) -> String {
        let tail_start = context.len().saturating_sub(FINGERPRINT_CONTEXT_MESSAGES);
        // serde_json maps sort keys, which keeps the serialization canonical.
        let serialized: Vec<serde_json::Value> = context[tail_start..]
            .iter()
            .map(|m| {
                serde_json::json!({
                    "role": m.role.as_str(),
                    "content": m.content,
                })
            })
            .collect();
        let context_json =
            serde_json::to_string(&serialized).unwrap_or_else(|_| String::from("[]"));

        let mut hasher = Sha256::new();
        hasher.update(query.as_bytes());
        hasher.update([0u8]);
        hasher.update(model.as_bytes());
        hasher.update([0u8]);
        hasher.update(context_json.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Looks up a cached response
    ///
    /// Returns the response when present and unexpired. An expired entry
    /// is purged on the way out. Any storage failure is logged and
    /// reported as a miss.
    pub fn lookup(&self, fingerprint: &str) -> Option<String> {
        match self.try_lookup(fingerprint) {
            Ok(hit) => hit,
            Err(e) => {
                tracing::warn!("Cache lookup failed, treating as miss: {}", e);
                None
            }
        }
    }

    /// Stores a response
    ///
    /// `ttl_days <= 0` means the entry never expires. The stored query is
    /// truncated for diagnostics. Failures are logged and swallowed.
    pub fn store(&self, fingerprint: &str, query: &str, response: &str, model: &str, ttl_days: i64) {
        if let Err(e) = self.try_store(fingerprint, query, response, model, ttl_days) {
            tracing::warn!("Cache store failed, response not cached: {}", e);
        }
    }

    fn try_lookup(&self, fingerprint: &str) -> Result<Option<String>> {
        let conn = self.open()?;

        let row = conn
            .query_row(
                "SELECT response, expires_at FROM response_cache WHERE fingerprint = ?",
                params![fingerprint],
                |row| {
                    let response: String = row.get(0)?;
                    let expires_at: Option<String> = row.get(1)?;
                    Ok((response, expires_at))
                },
            )
            .optional()
            .context("Failed to query cache")
            .map_err(|e| TalariaError::Storage(e.to_string()))?;

        let (response, expires_at) = match row {
            Some(r) => r,
            None => return Ok(None),
        };

        if let Some(expires_at) = expires_at {
            let expired = chrono::DateTime::parse_from_rfc3339(&expires_at)
                .map(|dt| dt.with_timezone(&Utc) <= Utc::now())
                .unwrap_or(true);
            if expired {
                conn.execute(
                    "DELETE FROM response_cache WHERE fingerprint = ?",
                    params![fingerprint],
                )
                .context("Failed to purge expired entry")
                .map_err(|e| TalariaError::Storage(e.to_string()))?;
                return Ok(None);
            }
        }

        Ok(Some(response))
    }

    fn try_store(
        &self,
        fingerprint: &str,
        query: &str,
        response: &str,
        model: &str,
        ttl_days: i64,
    ) -> Result<()> {
        let conn = self.open()?;

        let now = Utc::now();
        let expires_at = if ttl_days <= 0 {
            None
        } else {
            Some((now + Duration::days(ttl_days)).to_rfc3339())
        };
        let stored_query: String = query.chars().take(STORED_QUERY_MAX_CHARS).collect();

        conn.execute(
            "INSERT OR REPLACE INTO response_cache
             (fingerprint, query, response, model, created_at, expires_at)
             VALUES (?, ?, ?, ?, ?, ?)",
            params![
                fingerprint,
                stored_query,
                response,
                model,
                now.to_rfc3339(),
                expires_at
            ],
        )
        .context("Failed to insert cache entry")
        .map_err(|e| TalariaError::Storage(e.to_string()))?;

        Ok(())
    }
}
