use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Summary of a stored chat
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredChat {
    /// Chat identifier (the `ChatState::chat_id`)
    pub id: String,
    /// First user message, shortened
    pub title: String,
    /// When the chat was first saved
    pub created_at: DateTime<Utc>,
    /// When the chat was last saved
    pub updated_at: DateTime<Utc>,
    /// Model used for the most recent turn
    pub model: Option<String>,
    /// Number of messages in the chat
    pub message_count: usize,
}
