//! Conversation records and the inputs that create or change them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::errors::{StoreError, StoreResult};
use crate::core::ids::ConversationId;
use crate::core::owner::Owner;

/// Title given to conversations created without one.
pub const DEFAULT_TITLE: &str = "New Conversation";

/// A message embedded in a conversation. Its position is its order.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Sender marker, e.g. `user` or `assistant`.
    pub role: String,
    /// Message text.
    pub content: String,
}

impl Message {
    /// Create a message.
    #[must_use]
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

/// A stored conversation.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    /// Immutable id assigned at creation.
    pub id: ConversationId,
    /// Single owner, serialized as `userId` or `guestId`.
    #[serde(flatten)]
    pub owner: Owner,
    /// Display title.
    pub title: String,
    /// Messages in insertion order.
    pub messages: Vec<Message>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last mutation time.
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a conversation.
#[derive(Clone, Debug)]
pub struct NewConversation {
    /// Owner of the new conversation.
    pub owner: Owner,
    /// Initial messages; must not be empty.
    pub messages: Vec<Message>,
    /// Optional title; blank falls back to [`DEFAULT_TITLE`].
    pub title: Option<String>,
}

impl NewConversation {
    /// Create the input for a conversation with the default title.
    #[must_use]
    pub const fn new(owner: Owner, messages: Vec<Message>) -> Self {
        Self {
            owner,
            messages,
            title: None,
        }
    }

    /// Set an explicit title.
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Check creation invariants.
    ///
    /// # Errors
    /// Returns a validation error if there are no messages.
    pub fn validate(&self) -> StoreResult<()> {
        if self.messages.is_empty() {
            return Err(StoreError::validation(
                "a conversation must start with at least one message",
            ));
        }
        Ok(())
    }

    /// Effective title after applying the default.
    #[must_use]
    pub fn effective_title(&self) -> String {
        normalize_title(self.title.as_deref())
    }
}

/// Changes applied by an append-and-retitle operation.
#[derive(Clone, Debug, Default)]
pub struct ConversationUpdate {
    /// Messages appended after the existing ones, in order.
    pub messages: Option<Vec<Message>>,
    /// Replacement title.
    pub title: Option<String>,
}

impl ConversationUpdate {
    /// Update that appends messages.
    #[must_use]
    pub fn append(messages: Vec<Message>) -> Self {
        Self {
            messages: Some(messages),
            title: None,
        }
    }

    /// Update that replaces the title.
    #[must_use]
    pub fn retitle(title: impl Into<String>) -> Self {
        Self {
            messages: None,
            title: Some(title.into()),
        }
    }

    /// Effective replacement title, if any.
    #[must_use]
    pub fn effective_title(&self) -> Option<String> {
        self.title.as_deref().map(|title| normalize_title(Some(title)))
    }
}

fn normalize_title(title: Option<&str>) -> String {
    match title.map(str::trim) {
        Some(title) if !title.is_empty() => title.to_string(),
        _ => DEFAULT_TITLE.to_string(),
    }
}
