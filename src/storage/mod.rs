//! Conversation storage for Talaria
//!
//! An append-only log of role-tagged messages per conversation, behind a
//! narrow [`ConversationStore`] trait so the relay does not depend on the
//! concrete backend. One backend is provided: SQLite in the user's data
//! directory.

use crate::error::{Result, TalariaError};
use anyhow::Context;
use chrono::{DateTime, Utc};
use directories::ProjectDirs;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::PathBuf;

pub mod types;
pub use types::{ConversationRecord, ConversationSummary, Message, Role, SearchMatch};

#[cfg(test)]
use mockall::automock;

/// Context window recorded for conversations created implicitly by `append`
const DEFAULT_CONTEXT_WINDOW: usize = 128_000;

/// Maximum title length derived from the first user message
const TITLE_MAX_CHARS: usize = 150;

/// Minimum contract every conversation backend must satisfy
///
/// The relay and the CLI talk to this trait only. `append` must be atomic
/// per call; ordering across concurrent writers to the same conversation
/// is not guaranteed.
#[cfg_attr(test, automock)]
pub trait ConversationStore: Send + Sync {
    /// Creates a new conversation and returns its id
    ///
    /// The id is derived from the creation time and unique for a
    /// single-operator process.
    fn create<'a>(
        &self,
        title: Option<&'a str>,
        model: &str,
        context_window: usize,
    ) -> Result<String>;

    /// Appends a message to a conversation
    ///
    /// Creates the conversation record on first append if absent,
    /// preserving the caller-supplied id. The title is set once, from the
    /// first user message, and never changed afterward.
    fn append(&self, conversation_id: &str, role: Role, content: &str, tokens: usize)
        -> Result<()>;

    /// Returns a conversation's messages in chronological order
    ///
    /// With a limit, the most recent `limit` messages are returned, still
    /// in chronological order.
    fn get_messages(&self, conversation_id: &str, limit: Option<usize>) -> Result<Vec<Message>>;

    /// Loads a full conversation record, or None when absent
    fn get_conversation(&self, conversation_id: &str) -> Result<Option<ConversationRecord>>;

    /// Lists conversation summaries, most recently updated first
    ///
    /// An optional search string filters by title.
    fn list<'a>(
        &self,
        limit: usize,
        offset: usize,
        search: Option<&'a str>,
    ) -> Result<Vec<ConversationSummary>>;

    /// Deletes a conversation and its messages. Idempotent.
    fn delete(&self, conversation_id: &str) -> Result<()>;

    /// Searches message content, returning one snippet per matching
    /// conversation, most recently updated first
    fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchMatch>>;
}

/// SQLite-backed conversation store
pub struct SqliteStore {
    db_path: PathBuf,
}

impl SqliteStore {
    /// Create a new store instance
    ///
    /// Initializes the database file in the user's data directory.
    pub fn new() -> Result<Self> {
        // Allow override of the history DB path via environment variable.
        // This makes it easy to point the binary at a test DB or alternate
        // file without changing the user's application data dir.
        if let Ok(override_path) = std::env::var("TALARIA_HISTORY_DB") {
            return Self::new_with_path(override_path);
        }

        let proj_dirs = ProjectDirs::from("io", "talaria-chat", "talaria")
            .ok_or_else(|| TalariaError::Storage("Could not determine data directory".into()))?;

        let data_dir = proj_dirs.data_dir();
        std::fs::create_dir_all(data_dir)
            .context("Failed to create data directory")
            .map_err(|e| TalariaError::Storage(e.to_string()))?;

        let db_path = data_dir.join("history.db");
        let storage = Self { db_path };

        storage.init()?;

        Ok(storage)
    }

    /// Create a new store that uses the specified database path
    ///
    /// Primarily useful for tests where the default application data
    /// directory is not desirable.
    ///
    /// # Examples
    ///
    /// ```
    /// use talaria::storage::SqliteStore;
    ///
    /// let store = SqliteStore::new_with_path("/tmp/talaria_test_history.db").unwrap();
    /// ```
    pub fn new_with_path<P: Into<PathBuf>>(db_path: P) -> Result<Self> {
        let db_path = db_path.into();

        // Ensure parent directory exists so opening the DB file succeeds.
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .context("Failed to create parent directory for database")
                .map_err(|e| TalariaError::Storage(e.to_string()))?;
        }

        let storage = Self { db_path };
        storage.init()?;
        Ok(storage)
    }

    /// Returns the path of the backing database file
    pub fn db_path(&self) -> &std::path::Path {
        &self.db_path
    }

    pub(crate) fn open(&self) -> Result<Connection> {
        Connection::open(&self.db_path)
            .context("Failed to open database")
            .map_err(|e| TalariaError::Storage(e.to_string()).into())
    }

    /// Initialize the database schema
    fn init(&self) -> Result<()> {
        let conn = self.open()?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS conversations (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                model TEXT NOT NULL,
                context_window INTEGER NOT NULL,
                token_count INTEGER NOT NULL DEFAULT 0
            );
            CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                conversation_id TEXT NOT NULL,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                tokens INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_messages_conversation
                ON messages (conversation_id, id);",
        )
        .context("Failed to create tables")
        .map_err(|e| TalariaError::Storage(e.to_string()))?;

        Ok(())
    }

    /// Generates a creation-time-derived conversation id
    ///
    /// Millisecond resolution keeps ids unique for a single operator.
    fn generate_id() -> String {
        Utc::now().format("%Y%m%d_%H%M%S_%3f").to_string()
    }
}

/// Derives a conversation title from the first user message
///
/// Truncated to 150 characters with an ellipsis marker when longer.
fn derive_title(content: &str) -> String {
    let mut title: String = content.chars().take(TITLE_MAX_CHARS).collect();
    if content.chars().count() > TITLE_MAX_CHARS {
        title.push_str("...");
    }
    title
}

/// Builds a short excerpt around the first occurrence of `needle`
fn snippet_around(content: &str, needle: &str) -> String {
    let lower = content.to_lowercase();
    let pos = lower.find(&needle.to_lowercase()).unwrap_or(0);
    // Walk back to a char boundary a little before the match.
    let mut start = pos.saturating_sub(40);
    while start > 0 && !content.is_char_boundary(start) {
        start -= 1;
    }
    let excerpt: String = content[start..].chars().take(120).collect();
    if start > 0 {
        format!("...{}", excerpt.trim_start())
    } else {
        excerpt
    }
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

impl ConversationStore for SqliteStore {
    fn create(&self, title: Option<&str>, model: &str, context_window: usize) -> Result<String> {
        let conn = self.open()?;
        let id = Self::generate_id();
        let now = Utc::now().to_rfc3339();

        conn.execute(
            "INSERT INTO conversations (id, title, created_at, updated_at, model, context_window, token_count)
             VALUES (?, ?, ?, ?, ?, ?, 0)",
            params![
                id,
                title.unwrap_or("New Conversation"),
                now,
                now,
                model,
                context_window as i64
            ],
        )
        .context("Failed to insert conversation")
        .map_err(|e| TalariaError::Storage(e.to_string()))?;

        Ok(id)
    }

    fn append(
        &self,
        conversation_id: &str,
        role: Role,
        content: &str,
        tokens: usize,
    ) -> Result<()> {
        let mut conn = self.open()?;
        let now = Utc::now().to_rfc3339();

        let tx = conn
            .transaction()
            .context("Failed to start transaction")
            .map_err(|e| TalariaError::Storage(e.to_string()))?;

        let exists: bool = tx
            .query_row(
                "SELECT 1 FROM conversations WHERE id = ?",
                params![conversation_id],
                |_| Ok(true),
            )
            .optional()
            .unwrap_or(Some(false))
            .unwrap_or(false);

        if !exists {
            // First append to an unknown id creates the record, preserving
            // the caller-supplied id.
            tx.execute(
                "INSERT INTO conversations (id, title, created_at, updated_at, model, context_window, token_count)
                 VALUES (?, ?, ?, ?, ?, ?, 0)",
                params![
                    conversation_id,
                    "New Conversation",
                    now,
                    now,
                    "unknown",
                    DEFAULT_CONTEXT_WINDOW as i64
                ],
            )
            .context("Failed to insert conversation")
            .map_err(|e| TalariaError::Storage(e.to_string()))?;
        }

        let message_count: i64 = tx
            .query_row(
                "SELECT COUNT(*) FROM messages WHERE conversation_id = ?",
                params![conversation_id],
                |row| row.get(0),
            )
            .context("Failed to count messages")
            .map_err(|e| TalariaError::Storage(e.to_string()))?;

        tx.execute(
            "INSERT INTO messages (conversation_id, role, content, timestamp, tokens)
             VALUES (?, ?, ?, ?, ?)",
            params![conversation_id, role.as_str(), content, now, tokens as i64],
        )
        .context("Failed to insert message")
        .map_err(|e| TalariaError::Storage(e.to_string()))?;

        // Title is set once, from the first user message.
        if message_count == 0 && role == Role::User {
            tx.execute(
                "UPDATE conversations SET title = ? WHERE id = ?",
                params![derive_title(content), conversation_id],
            )
            .context("Failed to update title")
            .map_err(|e| TalariaError::Storage(e.to_string()))?;
        }

        tx.execute(
            "UPDATE conversations SET updated_at = ?, token_count = token_count + ? WHERE id = ?",
            params![now, tokens as i64, conversation_id],
        )
        .context("Failed to update conversation")
        .map_err(|e| TalariaError::Storage(e.to_string()))?;

        tx.commit()
            .context("Failed to commit transaction")
            .map_err(|e| TalariaError::Storage(e.to_string()))?;

        Ok(())
    }

    fn get_messages(&self, conversation_id: &str, limit: Option<usize>) -> Result<Vec<Message>> {
        let conn = self.open()?;

        // With a limit, select the most recent rows and flip them back to
        // chronological order.
        let sql = match limit {
            Some(_) => {
                "SELECT role, content, timestamp, tokens FROM (
                     SELECT id, role, content, timestamp, tokens FROM messages
                     WHERE conversation_id = ? ORDER BY id DESC LIMIT ?
                 ) ORDER BY id ASC"
            }
            None => {
                "SELECT role, content, timestamp, tokens FROM messages
                 WHERE conversation_id = ? ORDER BY id ASC"
            }
        };

        let mut stmt = conn
            .prepare(sql)
            .context("Failed to prepare statement")
            .map_err(|e| TalariaError::Storage(e.to_string()))?;

        let map_row = |row: &rusqlite::Row<'_>| {
            let role: String = row.get(0)?;
            let content: String = row.get(1)?;
            let timestamp: String = row.get(2)?;
            let tokens: i64 = row.get(3)?;
            Ok(Message {
                role: Role::from_str_lossy(&role),
                content,
                timestamp: parse_timestamp(&timestamp),
                tokens: tokens.max(0) as usize,
            })
        };

        let rows = match limit {
            Some(n) => stmt.query_map(params![conversation_id, n as i64], map_row),
            None => stmt.query_map(params![conversation_id], map_row),
        }
        .context("Failed to query messages")
        .map_err(|e| TalariaError::Storage(e.to_string()))?;

        let mut messages = Vec::new();
        for m in rows.flatten() {
            messages.push(m);
        }

        Ok(messages)
    }

    fn get_conversation(&self, conversation_id: &str) -> Result<Option<ConversationRecord>> {
        let conn = self.open()?;

        let summary = conn
            .query_row(
                "SELECT c.id, c.title, c.created_at, c.updated_at, c.model, c.context_window,
                        c.token_count,
                        (SELECT COUNT(*) FROM messages m WHERE m.conversation_id = c.id)
                 FROM conversations c WHERE c.id = ?",
                params![conversation_id],
                |row| {
                    let created: String = row.get(2)?;
                    let updated: String = row.get(3)?;
                    Ok(ConversationSummary {
                        id: row.get(0)?,
                        title: row.get(1)?,
                        created_at: parse_timestamp(&created),
                        updated_at: parse_timestamp(&updated),
                        model: row.get(4)?,
                        context_window: row.get::<_, i64>(5)?.max(0) as usize,
                        token_count: row.get::<_, i64>(6)?.max(0) as usize,
                        message_count: row.get::<_, i64>(7)?.max(0) as usize,
                    })
                },
            )
            .optional()
            .context("Failed to query conversation")
            .map_err(|e| TalariaError::Storage(e.to_string()))?;

        match summary {
            Some(summary) => {
                let messages = self.get_messages(conversation_id, None)?;
                Ok(Some(ConversationRecord { summary, messages }))
            }
            None => Ok(None),
        }
    }

    fn list(
        &self,
        limit: usize,
        offset: usize,
        search: Option<&str>,
    ) -> Result<Vec<ConversationSummary>> {
        let conn = self.open()?;

        let base = "SELECT c.id, c.title, c.created_at, c.updated_at, c.model, c.context_window,
                           c.token_count,
                           (SELECT COUNT(*) FROM messages m WHERE m.conversation_id = c.id)
                    FROM conversations c";
        let sql = match search {
            Some(_) => format!(
                "{} WHERE c.title LIKE ? ORDER BY c.updated_at DESC LIMIT ? OFFSET ?",
                base
            ),
            None => format!("{} ORDER BY c.updated_at DESC LIMIT ? OFFSET ?", base),
        };

        let mut stmt = conn
            .prepare(&sql)
            .context("Failed to prepare statement")
            .map_err(|e| TalariaError::Storage(e.to_string()))?;

        let map_row = |row: &rusqlite::Row<'_>| {
            let created: String = row.get(2)?;
            let updated: String = row.get(3)?;
            Ok(ConversationSummary {
                id: row.get(0)?,
                title: row.get(1)?,
                created_at: parse_timestamp(&created),
                updated_at: parse_timestamp(&updated),
                model: row.get(4)?,
                context_window: row.get::<_, i64>(5)?.max(0) as usize,
                token_count: row.get::<_, i64>(6)?.max(0) as usize,
                message_count: row.get::<_, i64>(7)?.max(0) as usize,
            })
        };

        let rows = match search {
            Some(term) => stmt.query_map(
                params![format!("%{}%", term), limit as i64, offset as i64],
                map_row,
            ),
            None => stmt.query_map(params![limit as i64, offset as i64], map_row),
        }
        .context("Failed to query conversations")
        .map_err(|e| TalariaError::Storage(e.to_string()))?;

        let mut summaries = Vec::new();
        for s in rows.flatten() {
            summaries.push(s);
        }

        Ok(summaries)
    }

    fn delete(&self, conversation_id: &str) -> Result<()> {
        let mut conn = self.open()?;

        let tx = conn
            .transaction()
            .context("Failed to start transaction")
            .map_err(|e| TalariaError::Storage(e.to_string()))?;

        tx.execute(
            "DELETE FROM messages WHERE conversation_id = ?",
            params![conversation_id],
        )
        .context("Failed to delete messages")
        .map_err(|e| TalariaError::Storage(e.to_string()))?;

        tx.execute(
            "DELETE FROM conversations WHERE id = ?",
            params![conversation_id],
        )
        .context("Failed to delete conversation")
        .map_err(|e| TalariaError::Storage(e.to_string()))?;

        tx.commit()
            .context("Failed to commit transaction")
            .map_err(|e| TalariaError::Storage(e.to_string()))?;

        Ok(())
    }

    fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchMatch>> {
        let conn = self.open()?;

        // One row per matching conversation: the earliest matching message.
        let mut stmt = conn
            .prepare(
                "SELECT m.conversation_id, c.title, c.updated_at, m.content
                 FROM messages m
                 JOIN conversations c ON c.id = m.conversation_id
                 WHERE m.id IN (
                     SELECT MIN(id) FROM messages WHERE content LIKE ?1 GROUP BY conversation_id
                 )
                 ORDER BY c.updated_at DESC
                 LIMIT ?2",
            )
            .context("Failed to prepare statement")
            .map_err(|e| TalariaError::Storage(e.to_string()))?;

        let pattern = format!("%{}%", query);
        let rows = stmt
            .query_map(params![pattern, limit as i64], |row| {
                let updated: String = row.get(2)?;
                let content: String = row.get(3)?;
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    parse_timestamp(&updated),
                    content,
                ))
            })
            .context("Failed to query messages")
            .map_err(|e| TalariaError::Storage(e.to_string()))?;

        let mut matches = Vec::new();
        for (conversation_id, title, updated_at, content) in rows.flatten() {
            matches.push(SearchMatch {
                conversation_id,
                title,
                updated_at,
                snippet: snippet_around(&content, query),
            });
        }

        Ok(matches)
    }
}
