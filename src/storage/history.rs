//! SQLite-backed chat history
//!
//! Finished chat states are stored as JSON blobs keyed by chat id so the
//! CLI can list, resume and delete earlier conversations.

use super::types::StoredChat;
use crate::chat::{ChatState, Role};
use crate::error::{ParleyError, Result};
use anyhow::Context;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::PathBuf;

/// Environment variable overriding the history database location
pub const HISTORY_DB_ENV: &str = "PARLEY_HISTORY_DB";

const TITLE_MAX_CHARS: usize = 60;

/// Length of a full chat id (ULID)
const CHAT_ID_LEN: usize = 26;

/// Chat history stored in a SQLite database
#[derive(Debug, Clone)]
pub struct ChatHistory {
    db_path: PathBuf,
}

impl ChatHistory {
    /// Open the history at the configured location
    ///
    /// `PARLEY_HISTORY_DB` wins over `configured`; with neither set the
    /// database lives under the platform data directory.
    pub fn open_default(configured: Option<&str>) -> Result<Self> {
        if let Ok(override_path) = std::env::var(HISTORY_DB_ENV) {
            return Self::new_with_path(override_path);
        }
        match configured {
            Some(path) => Self::new_with_path(path),
            None => Self::new_with_path(super::default_data_dir()?.join("history.db")),
        }
    }

    /// Open (or create) the history database at `db_path`
    pub fn new_with_path<P: Into<PathBuf>>(db_path: P) -> Result<Self> {
        let db_path = db_path.into();

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .context("Failed to create parent directory for database")
                .map_err(|e| ParleyError::Storage(e.to_string()))?;
        }

        let history = Self { db_path };
        history.init()?;
        Ok(history)
    }

    fn connect(&self) -> Result<Connection> {
        Ok(Connection::open(&self.db_path)
            .context("Failed to open database")
            .map_err(|e| ParleyError::Storage(e.to_string()))?)
    }

    fn init(&self) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS chats (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                model TEXT,
                message_count INTEGER NOT NULL,
                state JSON NOT NULL
            )",
            [],
        )
        .context("Failed to create tables")
        .map_err(|e| ParleyError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Insert or replace a chat, keeping its original `created_at`
    pub fn save_chat(&self, state: &ChatState, model: Option<&str>) -> Result<()> {
        let mut conn = self.connect()?;
        let state_json = serde_json::to_string(state)
            .context("Failed to serialize chat state")
            .map_err(|e| ParleyError::Storage(e.to_string()))?;
        let now = Utc::now().to_rfc3339();
        let title = chat_title(state);

        let tx = conn
            .transaction()
            .context("Failed to start transaction")
            .map_err(|e| ParleyError::Storage(e.to_string()))?;

        tx.execute(
            "INSERT INTO chats (id, title, created_at, updated_at, model, message_count, state)
            VALUES (?1, ?2, ?3, ?3, ?4, ?5, ?6)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                updated_at = excluded.updated_at,
                model = excluded.model,
                message_count = excluded.message_count,
                state = excluded.state",
            params![
                state.chat_id(),
                title,
                now,
                model,
                state.messages().len() as i64,
                state_json
            ],
        )
        .context("Failed to save chat")
        .map_err(|e| ParleyError::Storage(e.to_string()))?;

        tx.commit()
            .context("Failed to commit transaction")
            .map_err(|e| ParleyError::Storage(e.to_string()))?;

        tracing::debug!("Saved chat {} ({} messages)", state.chat_id(), state.messages().len());
        Ok(())
    }

    /// Load a chat by full id or by unambiguous id prefix
    pub fn load_chat(&self, id: &str) -> Result<Option<ChatState>> {
        let conn = self.connect()?;
        let (query, param) = id_query("SELECT state FROM chats", id);

        let result: Option<String> = conn
            .query_row(&query, params![param], |row| row.get(0))
            .optional()
            .context("Failed to query chat")
            .map_err(|e| ParleyError::Storage(e.to_string()))?;

        match result {
            Some(json) => {
                let state = serde_json::from_str(&json)
                    .context("Failed to deserialize chat state")
                    .map_err(|e| ParleyError::Storage(e.to_string()))?;
                Ok(Some(state))
            }
            None => Ok(None),
        }
    }

    /// List stored chats, most recently updated first
    pub fn list_chats(&self) -> Result<Vec<StoredChat>> {
        let conn = self.connect()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, title, created_at, updated_at, model, message_count
                FROM chats
                ORDER BY updated_at DESC",
            )
            .context("Failed to prepare statement")
            .map_err(|e| ParleyError::Storage(e.to_string()))?;

        let rows = stmt
            .query_map([], |row| {
                let created_at: String = row.get(2)?;
                let updated_at: String = row.get(3)?;
                let message_count: i64 = row.get(5)?;
                Ok(StoredChat {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    created_at: parse_timestamp(&created_at),
                    updated_at: parse_timestamp(&updated_at),
                    model: row.get(4)?,
                    message_count: message_count.max(0) as usize,
                })
            })
            .context("Failed to query chats")
            .map_err(|e| ParleyError::Storage(e.to_string()))?;

        Ok(rows.flatten().collect())
    }

    /// Delete a chat by full id or id prefix; returns the number removed
    pub fn delete_chat(&self, id: &str) -> Result<usize> {
        let conn = self.connect()?;
        let (query, param) = id_query("DELETE FROM chats", id);
        let removed = conn
            .execute(&query, params![param])
            .context("Failed to delete chat")
            .map_err(|e| ParleyError::Storage(e.to_string()))?;
        Ok(removed)
    }
}

fn id_query(prefix: &str, id: &str) -> (String, String) {
    if id.len() == CHAT_ID_LEN {
        (format!("{} WHERE id = ?", prefix), id.to_string())
    } else {
        (format!("{} WHERE id LIKE ?", prefix), format!("{}%", id))
    }
}

fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn chat_title(state: &ChatState) -> String {
    let first = state
        .messages()
        .iter()
        .find(|m| m.role == Role::User)
        .map(|m| m.content.trim())
        .unwrap_or("");
    if first.is_empty() {
        return "(empty chat)".to_string();
    }
    let mut title: String = first.chars().take(TITLE_MAX_CHARS).collect();
    if first.chars().count() > TITLE_MAX_CHARS {
        title.push('…');
    }
    title
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::ChatMessage;
    use tempfile::{tempdir, TempDir};

    fn create_test_history() -> (ChatHistory, TempDir) {
        let dir = tempdir().expect("failed to create tempdir");
        let history =
            ChatHistory::new_with_path(dir.path().join("history.db")).expect("open history");
        (history, dir)
    }

    fn sample_state() -> ChatState {
        ChatState::new()
            .with_message(ChatMessage::user("What's the weather in Lisbon?"))
            .with_message(ChatMessage::assistant("Sunny, 24°C."))
    }

    #[test]
    fn test_save_and_load_chat() {
        let (history, _dir) = create_test_history();
        let state = sample_state();

        history.save_chat(&state, Some("gpt-4o")).unwrap();
        let loaded = history.load_chat(state.chat_id()).unwrap().unwrap();

        assert_eq!(loaded, state);
    }

    #[test]
    fn test_load_chat_by_prefix() {
        let (history, _dir) = create_test_history();
        let state = sample_state();
        history.save_chat(&state, None).unwrap();

        let prefix = &state.chat_id()[..10];
        let loaded = history.load_chat(prefix).unwrap();
        assert!(loaded.is_some());
    }

    #[test]
    fn test_save_chat_updates_existing_row() {
        let (history, _dir) = create_test_history();
        let state = sample_state();
        history.save_chat(&state, Some("a")).unwrap();

        let next = state.with_message(ChatMessage::user("And tomorrow?"));
        history.save_chat(&next, Some("b")).unwrap();

        let chats = history.list_chats().unwrap();
        assert_eq!(chats.len(), 1);
        assert_eq!(chats[0].message_count, 3);
        assert_eq!(chats[0].model.as_deref(), Some("b"));
        assert_eq!(chats[0].title, "What's the weather in Lisbon?");
    }

    #[test]
    fn test_delete_chat() {
        let (history, _dir) = create_test_history();
        let state = sample_state();
        history.save_chat(&state, None).unwrap();

        assert_eq!(history.delete_chat(state.chat_id()).unwrap(), 1);
        assert!(history.load_chat(state.chat_id()).unwrap().is_none());
        assert!(history.list_chats().unwrap().is_empty());
    }

    #[test]
    fn test_chat_title_truncates_long_messages() {
        let long = "x".repeat(100);
        let state = ChatState::new().with_message(ChatMessage::user(long));
        let title = chat_title(&state);
        assert_eq!(title.chars().count(), TITLE_MAX_CHARS + 1);
        assert!(title.ends_with('…'));
    }
}
