//! Application state shared across all request handlers.

use std::sync::Arc;

use tokio_rusqlite::Connection;

use crate::core::config::AppConfig;
use crate::core::errors::StoreResult;
use crate::storage::{
    ConversationStore, IdentityStore, PreferenceStore, SqliteConversationStore,
    SqliteIdentityStore, SqlitePreferenceStore, open_database, open_in_memory,
};

/// Shared application state.
pub struct AppState {
    /// Loaded configuration.
    pub config: AppConfig,
    /// Conversation storage.
    pub conversations: Arc<dyn ConversationStore>,
    /// Preference storage.
    pub preferences: Arc<dyn PreferenceStore>,
    /// Whole-identity wipes across both tables.
    pub identities: Arc<dyn IdentityStore>,
}

impl AppState {
    /// Open the configured database file and build every store on it.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or initialized.
    pub async fn new(config: AppConfig) -> StoreResult<Arc<Self>> {
        let conn = open_database(&config.storage).await?;
        Self::with_connection(config, conn).await
    }

    /// Build every store on a private in-memory database.
    ///
    /// # Errors
    /// Returns an error if the database cannot be initialized.
    pub async fn in_memory(config: AppConfig) -> StoreResult<Arc<Self>> {
        let conn = open_in_memory().await?;
        Self::with_connection(config, conn).await
    }

    /// Build every store on an existing connection.
    ///
    /// # Errors
    /// Returns an error if a table cannot be created.
    pub async fn with_connection(config: AppConfig, conn: Arc<Connection>) -> StoreResult<Arc<Self>> {
        let conversations =
            SqliteConversationStore::new(Arc::clone(&conn), &config.storage.conversation_table)
                .await?;
        let preferences =
            SqlitePreferenceStore::new(Arc::clone(&conn), &config.storage.preference_table)
                .await?;
        let identities = SqliteIdentityStore::new(
            conn,
            config.storage.conversation_table.clone(),
            config.storage.preference_table.clone(),
        );

        Ok(Self::from_stores(
            config,
            Arc::new(conversations),
            Arc::new(preferences),
            Arc::new(identities),
        ))
    }

    /// Wrap already-built stores.
    #[must_use]
    pub fn from_stores(
        config: AppConfig,
        conversations: Arc<dyn ConversationStore>,
        preferences: Arc<dyn PreferenceStore>,
        identities: Arc<dyn IdentityStore>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            conversations,
            preferences,
            identities,
        })
    }
}
