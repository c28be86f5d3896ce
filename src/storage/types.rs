use crate::ids::{MessageId, RemoteConversationId, SessionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata for a stored chat session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Unique identifier for the session
    pub id: SessionId,
    /// User-facing display name
    pub name: String,
    /// When the session was created
    pub created_at: DateTime<Utc>,
    /// When the session was last touched
    pub updated_at: DateTime<Utc>,
    /// Number of messages persisted under the session
    pub message_count: usize,
    /// Truncated preview of the most recent message
    pub last_message: Option<String>,
    /// Conversation identity used when talking to the remote service
    pub remote_conversation_id: Option<RemoteConversationId>,
}

/// A single chat message, as held in the transcript and in the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Unique identifier for the message
    pub id: MessageId,
    /// Message text
    pub content: String,
    /// Whether the user wrote this message
    pub is_user: bool,
    /// Creation time, used for ordering within a session
    pub timestamp: DateTime<Utc>,
    /// True only while the content is still growing
    #[serde(default)]
    pub is_streaming: bool,
    /// True if the stream that produced this message failed
    #[serde(default)]
    pub error: bool,
}

impl Message {
    /// Create a user message stamped with the current time
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(content, true)
    }

    /// Create a finished assistant message stamped with the current time
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(content, false)
    }

    /// Create an empty assistant message that is still streaming
    pub fn streaming_placeholder() -> Self {
        Self {
            is_streaming: true,
            ..Self::new(String::new(), false)
        }
    }

    fn new(content: impl Into<String>, is_user: bool) -> Self {
        Self {
            id: MessageId::generate(),
            content: content.into(),
            is_user,
            timestamp: Utc::now(),
            is_streaming: false,
            error: false,
        }
    }
}

/// Message row as written to the `messages` tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct MessageRecord {
    pub session_id: SessionId,
    #[serde(flatten)]
    pub message: Message,
}

/// A session together with all of its messages, oldest first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSession {
    /// Session metadata
    pub session: Session,
    /// Messages ordered by timestamp ascending
    pub messages: Vec<Message>,
}
