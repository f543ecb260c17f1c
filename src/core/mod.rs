//! Core types: configuration, errors, ids, owners, and the stored records.

pub mod config;
pub mod conversation;
pub mod errors;
pub mod identity;
pub mod ids;
pub mod owner;
pub mod preference;

pub use config::{AppConfig, ListingConfig, ServerConfig, StorageConfig};
pub use conversation::{Conversation, ConversationUpdate, DEFAULT_TITLE, Message, NewConversation};
pub use errors::{DeadlineExceeded, StoreError, StoreResult};
pub use identity::{ResolvedIdentity, resolve};
pub use ids::{ConversationId, PreferenceId};
pub use owner::{Owner, OwnerFilter, OwnerKind};
pub use preference::{
    AiResponseStyle, FontSize, MAX_CUSTOM_PROMPT_CHARS, Preference, PreferencePatch,
    PreferenceUpdate, Theme,
};
