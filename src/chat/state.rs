//! Versioned conversation state
//!
//! A [`ChatState`] is never edited in place. Every append returns a new
//! version; the orchestrator hands the next version back to its caller, who
//! decides what to keep.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Author of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    /// Wire name used by every provider API
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One message in a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Unique message id
    pub id: String,
    pub role: Role,
    pub content: String,
    /// Optional participant name forwarded to the model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// RFC 3339 creation time
    pub created_at: String,
}

impl ChatMessage {
    /// Build a message with a fresh id and the current time
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: new_message_id(),
            role,
            content: content.into(),
            name: None,
            created_at: Utc::now().to_rfc3339(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Generate a fresh, sortable, unique id
pub fn new_message_id() -> String {
    Ulid::new().to_string()
}

/// Conversation state: a chat id plus its ordered, append-only messages
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatState {
    chat_id: String,
    messages: Vec<ChatMessage>,
}

impl ChatState {
    /// Start a new chat: fresh id, no messages
    pub fn new() -> Self {
        Self {
            chat_id: new_message_id(),
            messages: Vec::new(),
        }
    }

    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Return the next version with `message` appended
    #[must_use]
    pub fn with_message(&self, message: ChatMessage) -> Self {
        let mut messages = Vec::with_capacity(self.messages.len() + 1);
        messages.extend(self.messages.iter().cloned());
        messages.push(message);
        Self {
            chat_id: self.chat_id.clone(),
            messages,
        }
    }

    /// True when `id` is already used by a message in this chat
    pub fn contains_id(&self, id: &str) -> bool {
        self.messages.iter().any(|m| m.id == id)
    }
}

impl Default for ChatState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_chat_is_empty_with_ulid_id() {
        let state = ChatState::new();
        assert!(state.is_empty());
        assert_eq!(state.chat_id().len(), 26);
    }

    #[test]
    fn test_new_chats_get_distinct_ids() {
        assert_ne!(ChatState::new().chat_id(), ChatState::new().chat_id());
    }

    #[test]
    fn test_with_message_leaves_previous_version_untouched() {
        let v1 = ChatState::new();
        let v2 = v1.with_message(ChatMessage::user("hi"));
        let v3 = v2.with_message(ChatMessage::assistant("hello"));

        assert_eq!(v1.len(), 0);
        assert_eq!(v2.len(), 1);
        assert_eq!(v3.len(), 2);
        assert_eq!(v3.chat_id(), v1.chat_id());
        assert_eq!(v3.messages()[1].role, Role::Assistant);
    }

    #[test]
    fn test_message_ids_are_unique() {
        let a = ChatMessage::user("a");
        let b = ChatMessage::user("a");
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_role_serializes_lowercase() {
        let json = serde_json::to_string(&Role::Assistant).unwrap();
        assert_eq!(json, "\"assistant\"");
    }

    #[test]
    fn test_state_serde_roundtrip_preserves_name() {
        let state =
            ChatState::new().with_message(ChatMessage::user("hi").with_name("alice"));
        let json = serde_json::to_string(&state).unwrap();
        let back: ChatState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
        assert_eq!(back.messages()[0].name.as_deref(), Some("alice"));
    }
}
