//! Persistent storage for conversations and preferences.

pub mod conversation_store;
pub mod database;
pub mod identity_store;
pub mod preference_store;

use std::future::Future;
use std::pin::Pin;

pub use conversation_store::{ConversationStore, SqliteConversationStore};
pub use database::{open_database, open_in_memory, with_deadline};
pub use identity_store::{IdentityStore, SqliteIdentityStore, WipeReport};
pub use preference_store::{PreferenceStore, SqlitePreferenceStore};

/// Boxed future type for store operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
