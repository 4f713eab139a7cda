use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Role of a conversation message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System framing message
    System,
    /// Message authored by the operator
    User,
    /// Message produced by the model
    Assistant,
}

impl Role {
    /// Returns the wire/storage representation of the role
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    /// Parses a role from its storage representation
    ///
    /// Unknown strings map to `User` so a damaged row never aborts a
    /// conversation load.
    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "system" => Role::System,
            "assistant" => Role::Assistant,
            _ => Role::User,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single role-tagged message within a conversation
///
/// Messages are immutable once appended and owned by their parent
/// conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Role of the message sender
    pub role: Role,
    /// Message text
    pub content: String,
    /// When the message was appended
    pub timestamp: DateTime<Utc>,
    /// Estimated token count recorded at append time
    pub tokens: usize,
}

impl Message {
    /// Creates a message stamped with the current time
    pub fn new(role: Role, content: impl Into<String>, tokens: usize) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
            tokens,
        }
    }
}

/// Summary metadata for a stored conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSummary {
    /// Unique identifier for the conversation
    pub id: String,
    /// User-friendly title derived from the first user message
    pub title: String,
    /// When the conversation was created
    pub created_at: DateTime<Utc>,
    /// When the conversation was last updated
    pub updated_at: DateTime<Utc>,
    /// The model used in the conversation
    pub model: String,
    /// Context window recorded for the conversation, in tokens
    pub context_window: usize,
    /// Number of messages in the conversation
    pub message_count: usize,
    /// Running sum of per-message token estimates
    pub token_count: usize,
}

/// A full conversation record: summary metadata plus its message log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationRecord {
    /// Summary metadata
    #[serde(flatten)]
    pub summary: ConversationSummary,
    /// Ordered message log
    pub messages: Vec<Message>,
}

/// A single search hit: the matching conversation and one snippet
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchMatch {
    /// Identifier of the matching conversation
    pub conversation_id: String,
    /// Title of the matching conversation
    pub title: String,
    /// When the conversation was last updated
    pub updated_at: DateTime<Utc>,
    /// Excerpt of the first matching message
    pub snippet: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_round_trip() {
        for role in [Role::System, Role::User, Role::Assistant] {
            assert_eq!(Role::from_str_lossy(role.as_str()), role);
        }
    }

    #[test]
    fn test_role_lossy_fallback() {
        assert_eq!(Role::from_str_lossy("tool"), Role::User);
        assert_eq!(Role::from_str_lossy(""), Role::User);
    }

    #[test]
    fn test_role_serde_lowercase() {
        let json = serde_json::to_string(&Role::Assistant).unwrap();
        assert_eq!(json, "\"assistant\"");
        let back: Role = serde_json::from_str("\"system\"").unwrap();
        assert_eq!(back, Role::System);
    }

    #[test]
    fn test_message_new_stamps_fields() {
        let msg = Message::new(Role::User, "hello", 2);
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.content, "hello");
        assert_eq!(msg.tokens, 2);
    }

    #[test]
    fn test_message_serialization_round_trip() {
        let msg = Message::new(Role::Assistant, "response text", 3);
        let json = serde_json::to_string(&msg).unwrap();
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(back.role, Role::Assistant);
        assert_eq!(back.content, "response text");
        assert_eq!(back.tokens, 3);
    }

    #[test]
    fn test_conversation_record_flattens_summary() {
        let record = ConversationRecord {
            summary: ConversationSummary {
                id: "20240101_000000_000".to_string(),
                title: "Test".to_string(),
                created_at: Utc::now(),
                updated_at: Utc::now(),
                model: "deepseek-chat".to_string(),
                context_window: 128_000,
                message_count: 0,
                token_count: 0,
            },
            messages: Vec::new(),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["id"], "20240101_000000_000");
        assert!(json["messages"].as_array().unwrap().is_empty());
    }
}
