//! Persistent session store: chat transcript, credit usage and reasoning
//! durations, all keyed by conversation id.

use anyhow::{Context, Result};
use chrono::Local;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};

const DB_FILE: &str = "history.db";

/// A transcript row as stored.
#[derive(Debug, Clone)]
pub struct StoredMessage {
    pub role: String,
    pub content: String,
    pub is_reasoning: bool,
}

/// One past conversation, for the sidebar.
#[derive(Debug, Clone)]
pub struct ConversationSummary {
    pub conversation_id: String,
    pub started_at: String,
    /// First user message, truncated for display; falls back to the start
    /// timestamp when the conversation has no user message yet.
    pub title: String,
}

pub struct HistoryStore {
    conn: Arc<Mutex<Connection>>,
}

impl HistoryStore {
    /// Open (or create) the store at the platform data directory.
    pub fn open_default() -> Result<Self> {
        let dirs = directories::ProjectDirs::from("", "", "deepthink")
            .context("could not resolve a platform data directory")?;
        let dir = dirs.data_dir();
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating data directory {}", dir.display()))?;
        Self::open(dir.join(DB_FILE))
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)
            .with_context(|| format!("opening history database {}", path.display()))?;
        Self::init_schema(&conn)?;
        tracing::debug!(path = %path.display(), "history store opened");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS chat_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                conversation_id TEXT NOT NULL,
                is_reasoning BOOLEAN DEFAULT 0
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS api_usage (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                credits_used REAL NOT NULL,
                request_type TEXT NOT NULL,
                conversation_id TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS thinking_time (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                duration_seconds REAL NOT NULL,
                conversation_id TEXT NOT NULL
            )",
            [],
        )?;

        Ok(())
    }

    fn now() -> String {
        Local::now().format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
    }

    pub fn add_chat_message(
        &self,
        role: &str,
        content: &str,
        conversation_id: &str,
        is_reasoning: bool,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO chat_history (timestamp, role, content, conversation_id, is_reasoning)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![Self::now(), role, content, conversation_id, is_reasoning],
        )?;
        Ok(())
    }

    /// Transcript of one conversation, oldest first.
    pub fn get_chat_history(&self, conversation_id: &str) -> Result<Vec<StoredMessage>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT role, content, is_reasoning
             FROM chat_history
             WHERE conversation_id = ?1
             ORDER BY timestamp ASC, id ASC",
        )?;
        let rows = stmt.query_map(params![conversation_id], |row| {
            Ok(StoredMessage {
                role: row.get(0)?,
                content: row.get(1)?,
                is_reasoning: row.get(2)?,
            })
        })?;
        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }

    /// Past conversations, newest first, for the sidebar.
    pub fn list_conversations(&self) -> Result<Vec<ConversationSummary>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT conversation_id, MIN(timestamp)
             FROM chat_history
             GROUP BY conversation_id
             ORDER BY MIN(timestamp) DESC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut summaries = Vec::new();
        for row in rows {
            let (conversation_id, started_at) = row?;
            let first_user: Option<String> = conn
                .query_row(
                    "SELECT content FROM chat_history
                     WHERE conversation_id = ?1 AND role = 'user'
                     ORDER BY timestamp ASC, id ASC LIMIT 1",
                    params![conversation_id],
                    |row| row.get(0),
                )
                .optional()?;
            let title = match first_user {
                Some(content) => truncate_title(&content),
                None => started_at.clone(),
            };
            summaries.push(ConversationSummary {
                conversation_id,
                started_at,
                title,
            });
        }
        Ok(summaries)
    }

    pub fn add_api_usage(
        &self,
        credits_used: f64,
        request_type: &str,
        conversation_id: &str,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO api_usage (timestamp, credits_used, request_type, conversation_id)
             VALUES (?1, ?2, ?3, ?4)",
            params![Self::now(), credits_used, request_type, conversation_id],
        )?;
        Ok(())
    }

    /// Total credits recorded, optionally scoped to one conversation.
    pub fn total_credits_used(&self, conversation_id: Option<&str>) -> Result<f64> {
        let conn = self.conn.lock().unwrap();
        let total: Option<f64> = match conversation_id {
            Some(id) => conn.query_row(
                "SELECT SUM(credits_used) FROM api_usage WHERE conversation_id = ?1",
                params![id],
                |row| row.get(0),
            )?,
            None => {
                conn.query_row("SELECT SUM(credits_used) FROM api_usage", [], |row| {
                    row.get(0)
                })?
            }
        };
        Ok(total.unwrap_or(0.0))
    }

    pub fn add_thinking_time(&self, duration_seconds: f64, conversation_id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO thinking_time (timestamp, duration_seconds, conversation_id)
             VALUES (?1, ?2, ?3)",
            params![Self::now(), duration_seconds, conversation_id],
        )?;
        Ok(())
    }

    /// Total reasoning seconds recorded, optionally scoped to one
    /// conversation.
    pub fn total_thinking_time(&self, conversation_id: Option<&str>) -> Result<f64> {
        let conn = self.conn.lock().unwrap();
        let total: Option<f64> = match conversation_id {
            Some(id) => conn.query_row(
                "SELECT SUM(duration_seconds) FROM thinking_time WHERE conversation_id = ?1",
                params![id],
                |row| row.get(0),
            )?,
            None => conn.query_row("SELECT SUM(duration_seconds) FROM thinking_time", [], |row| {
                row.get(0)
            })?,
        };
        Ok(total.unwrap_or(0.0))
    }
}

fn truncate_title(content: &str) -> String {
    const MAX: usize = 40;
    let line = content.lines().next().unwrap_or("");
    if line.chars().count() <= MAX {
        line.to_string()
    } else {
        let cut: String = line.chars().take(MAX).collect();
        format!("{cut}…")
    }
}
