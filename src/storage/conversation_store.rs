//! SQLite-backed conversation store.
//!
//! Messages live in a JSON array column. Appends run inside `SQLite` with
//! `json_insert`, so concurrent appends to one conversation never lose a
//! message: each lands after whatever was committed before it.
//!
//! Every mutation also takes the next value of a per-table `revision`
//! sequence, which orders rows whose `updated_at` fall in the same millisecond.

use std::sync::Arc;

use rusqlite::types::Value;
use rusqlite::{OptionalExtension, TransactionBehavior};
use tokio_rusqlite::Connection;
use tracing::{debug, info};

use crate::core::conversation::{Conversation, ConversationUpdate, Message, NewConversation};
use crate::core::errors::{StoreError, StoreResult};
use crate::core::ids::ConversationId;
use crate::core::owner::{Owner, OwnerFilter, OwnerKind};
use crate::storage::StoreFuture;
use crate::storage::database::{
    check_deadline, current_deadline, from_millis, now_millis, owner_clause,
};

/// Columns selected for a full conversation row.
const COLUMNS: &str = "id, owner_kind, owner_id, title, messages, created_at, updated_at";

/// Trait for conversation storage.
pub trait ConversationStore: Send + Sync {
    /// Create a conversation from its first messages.
    ///
    /// # Errors
    /// Returns a validation error if there are no messages, or a backend error.
    fn create(&self, input: NewConversation) -> StoreFuture<'_, StoreResult<Conversation>>;

    /// Get a conversation by id.
    ///
    /// # Errors
    /// Returns a not-found error if no such conversation exists.
    fn get(&self, id: ConversationId) -> StoreFuture<'_, StoreResult<Conversation>>;

    /// Append messages and/or replace the title, always refreshing `updated_at`.
    ///
    /// # Errors
    /// Returns a not-found error if no such conversation exists.
    fn append_and_retitle(
        &self,
        id: ConversationId,
        update: ConversationUpdate,
    ) -> StoreFuture<'_, StoreResult<Conversation>>;

    /// Permanently delete a conversation.
    ///
    /// # Errors
    /// Returns a not-found error if no such conversation existed.
    fn delete(&self, id: ConversationId) -> StoreFuture<'_, StoreResult<()>>;

    /// List conversations owned by any owner in the filter, most recently
    /// updated first, at most `limit` of them.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn list(
        &self,
        filter: &OwnerFilter,
        limit: usize,
    ) -> StoreFuture<'_, StoreResult<Vec<Conversation>>>;

    /// Delete every conversation owned by any owner in the filter.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn delete_by_owner(&self, filter: &OwnerFilter) -> StoreFuture<'_, StoreResult<u64>>;
}

/// `SQLite` implementation of the conversation store.
pub struct SqliteConversationStore {
    conn: Arc<Connection>,
    table: String,
}

impl SqliteConversationStore {
    /// Table name for conversations.
    pub const DEFAULT_TABLE: &'static str = "conversations";

    /// Initialize the store and create the table if it doesn't exist.
    ///
    /// `table` must be a plain SQL identifier (checked by
    /// [`crate::core::config::AppConfig::validate`]).
    ///
    /// # Errors
    /// Returns an error if database operations fail.
    pub async fn new(conn: Arc<Connection>, table: &str) -> StoreResult<Self> {
        let table = table.to_string();
        let table_name = table.clone();

        conn.call(move |conn| {
            conn.execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {table_name} (
                    id TEXT PRIMARY KEY,
                    owner_kind TEXT NOT NULL CHECK (owner_kind IN ('user', 'guest')),
                    owner_id TEXT NOT NULL CHECK (length(owner_id) > 0),
                    title TEXT NOT NULL,
                    messages TEXT NOT NULL
                        CHECK (json_valid(messages) AND json_array_length(messages) > 0),
                    created_at INTEGER NOT NULL,
                    updated_at INTEGER NOT NULL,
                    revision INTEGER NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_{table_name}_owner_updated
                    ON {table_name} (owner_kind, owner_id, updated_at DESC, revision DESC);
                CREATE INDEX IF NOT EXISTS idx_{table_name}_revision
                    ON {table_name} (revision);"
            ))?;
            Ok(())
        })
        .await?;

        Ok(Self { conn, table })
    }

    /// Initialize the store with [`Self::DEFAULT_TABLE`].
    ///
    /// # Errors
    /// Returns an error if database operations fail.
    pub async fn with_default_table(conn: Arc<Connection>) -> StoreResult<Self> {
        Self::new(conn, Self::DEFAULT_TABLE).await
    }
}

impl ConversationStore for SqliteConversationStore {
    fn create(&self, input: NewConversation) -> StoreFuture<'_, StoreResult<Conversation>> {
        Box::pin(async move {
            input.validate()?;

            let id = ConversationId::new();
            let title = input.effective_title();
            let messages_json = serde_json::to_string(&input.messages)?;

            let table = self.table.clone();
            let id_str = id.to_string();
            let owner_kind = input.owner.kind().as_str();
            let owner_id = input.owner.id().to_string();
            let inserted_title = title.clone();
            let deadline = current_deadline();

            let now_ms = self
                .conn
                .call(move |conn| {
                    check_deadline(deadline)?;
                    let now_ms = now_millis();
                    conn.execute(
                        &format!(
                            "INSERT INTO {table} ({COLUMNS}, revision)
                             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6,
                                     (SELECT COALESCE(MAX(revision), 0) + 1 FROM {table}))"
                        ),
                        rusqlite::params![
                            id_str,
                            owner_kind,
                            owner_id,
                            inserted_title,
                            messages_json,
                            now_ms
                        ],
                    )?;
                    Ok(now_ms)
                })
                .await?;

            let now = from_millis(now_ms)?;
            let conversation = Conversation {
                id,
                owner: input.owner,
                title,
                messages: input.messages,
                created_at: now,
                updated_at: now,
            };

            info!(
                "Created conversation {} for {} with {} message(s)",
                conversation.id,
                conversation.owner,
                conversation.messages.len()
            );
            Ok(conversation)
        })
    }

    fn get(&self, id: ConversationId) -> StoreFuture<'_, StoreResult<Conversation>> {
        Box::pin(async move {
            let table = self.table.clone();
            let id_str = id.to_string();
            let row = self
                .conn
                .call(move |conn| {
                    let row = conn
                        .query_row(
                            &format!("SELECT {COLUMNS} FROM {table} WHERE id = ?1"),
                            [&id_str],
                            ConversationRow::from_row,
                        )
                        .optional()?;
                    Ok(row)
                })
                .await?;

            debug!("Loaded conversation {id}");
            row.ok_or_else(|| not_found(id))?.into_conversation()
        })
    }

    fn append_and_retitle(
        &self,
        id: ConversationId,
        update: ConversationUpdate,
    ) -> StoreFuture<'_, StoreResult<Conversation>> {
        Box::pin(async move {
            let title = update.effective_title();
            let appended = update
                .messages
                .unwrap_or_default()
                .iter()
                .map(serde_json::to_string)
                .collect::<Result<Vec<_>, _>>()?;
            let appended_count = appended.len();

            let table = self.table.clone();
            let id_str = id.to_string();
            let deadline = current_deadline();

            let row = self
                .conn
                .call(move |conn| {
                    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                    check_deadline(deadline)?;

                    let changed = tx.execute(
                        &format!(
                            "UPDATE {table}
                             SET title = COALESCE(?1, title),
                                 updated_at = MAX(?2, updated_at + 1),
                                 revision = (SELECT MAX(revision) + 1 FROM {table})
                             WHERE id = ?3"
                        ),
                        rusqlite::params![title, now_millis(), id_str],
                    )?;
                    if changed == 0 {
                        return Ok(None);
                    }

                    {
                        let mut stmt = tx.prepare(&format!(
                            "UPDATE {table}
                             SET messages = json_insert(messages, '$[#]', json(?1))
                             WHERE id = ?2"
                        ))?;
                        for message in &appended {
                            stmt.execute(rusqlite::params![message, id_str])?;
                        }
                    }

                    let row = tx.query_row(
                        &format!("SELECT {COLUMNS} FROM {table} WHERE id = ?1"),
                        [&id_str],
                        ConversationRow::from_row,
                    )?;
                    check_deadline(deadline)?;
                    tx.commit()?;
                    Ok(Some(row))
                })
                .await?;

            let conversation = row.ok_or_else(|| not_found(id))?.into_conversation()?;
            debug!(
                "Appended {appended_count} message(s) to conversation {id}, now {}",
                conversation.messages.len()
            );
            Ok(conversation)
        })
    }

    fn delete(&self, id: ConversationId) -> StoreFuture<'_, StoreResult<()>> {
        Box::pin(async move {
            let table = self.table.clone();
            let id_str = id.to_string();
            let deadline = current_deadline();
            let changed = self
                .conn
                .call(move |conn| {
                    check_deadline(deadline)?;
                    Ok(conn.execute(
                        &format!("DELETE FROM {table} WHERE id = ?1"),
                        rusqlite::params![id_str],
                    )?)
                })
                .await?;

            if changed == 0 {
                return Err(not_found(id));
            }
            info!("Deleted conversation {id}");
            Ok(())
        })
    }

    fn list(
        &self,
        filter: &OwnerFilter,
        limit: usize,
    ) -> StoreFuture<'_, StoreResult<Vec<Conversation>>> {
        let filter = filter.clone();
        Box::pin(async move {
            let limit = i64::try_from(limit)
                .map_err(|_| StoreError::validation("limit exceeds i64"))?;
            let table = self.table.clone();
            let (clause, mut params) = owner_clause(&filter);
            let limit_index = params.len() + 1;
            params.push(Value::Integer(limit));

            let rows = self
                .conn
                .call(move |conn| {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {COLUMNS}
                         FROM {table}
                         WHERE {clause}
                         ORDER BY updated_at DESC, revision DESC
                         LIMIT ?{limit_index}"
                    ))?;
                    let rows = stmt
                        .query_map(rusqlite::params_from_iter(params), ConversationRow::from_row)?
                        .collect::<Result<Vec<_>, _>>()?;
                    Ok(rows)
                })
                .await?;

            debug!("Listed {} conversation(s) for {:?}", rows.len(), filter.owners());
            rows.into_iter()
                .map(ConversationRow::into_conversation)
                .collect()
        })
    }

    fn delete_by_owner(&self, filter: &OwnerFilter) -> StoreFuture<'_, StoreResult<u64>> {
        let filter = filter.clone();
        Box::pin(async move {
            let table = self.table.clone();
            let (clause, params) = owner_clause(&filter);
            let deadline = current_deadline();
            let deleted = self
                .conn
                .call(move |conn| {
                    check_deadline(deadline)?;
                    Ok(conn.execute(
                        &format!("DELETE FROM {table} WHERE {clause}"),
                        rusqlite::params_from_iter(params),
                    )?)
                })
                .await?;

            info!("Deleted {deleted} conversation(s) for {:?}", filter.owners());
            Ok(deleted as u64)
        })
    }
}

fn not_found(id: ConversationId) -> StoreError {
    StoreError::not_found(format!("conversation {id}"))
}

/// Raw conversation row as read from `SQLite`.
struct ConversationRow {
    id: String,
    owner_kind: String,
    owner_id: String,
    title: String,
    messages: String,
    created_at: i64,
    updated_at: i64,
}

impl ConversationRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            owner_kind: row.get(1)?,
            owner_id: row.get(2)?,
            title: row.get(3)?,
            messages: row.get(4)?,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
        })
    }

    fn into_conversation(self) -> StoreResult<Conversation> {
        let id = self
            .id
            .parse::<ConversationId>()
            .map_err(|err| StoreError::Corrupt(format!("conversation id {:?}: {err}", self.id)))?;
        let kind = self
            .owner_kind
            .parse::<OwnerKind>()
            .map_err(|err| StoreError::Corrupt(format!("conversation {id}: {err}")))?;
        let owner = Owner::from_parts(kind, self.owner_id)
            .map_err(|err| StoreError::Corrupt(format!("conversation {id}: {err}")))?;
        let messages: Vec<Message> = serde_json::from_str(&self.messages)?;

        Ok(Conversation {
            id,
            owner,
            title: self.title,
            messages,
            created_at: from_millis(self.created_at)?,
            updated_at: from_millis(self.updated_at)?,
        })
    }
}
