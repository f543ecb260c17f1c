//! SQLite-backed preference store.

use std::sync::Arc;

use chrono::Utc;
use rusqlite::OptionalExtension;
use tokio_rusqlite::Connection;
use tracing::{debug, info};

use crate::core::errors::{StoreError, StoreResult};
use crate::core::ids::PreferenceId;
use crate::core::owner::{Owner, OwnerKind};
use crate::core::preference::{Preference, PreferenceUpdate};
use crate::storage::StoreFuture;
use crate::storage::database::{check_deadline, current_deadline, from_millis, now_millis};

/// Columns selected for a full preference row.
const COLUMNS: &str = "id, owner_kind, owner_id, theme, font_size, ai_response_style, language, \
                       notifications_enabled, sound_enabled, custom_prompt, created_at, updated_at";

/// Trait for preference storage.
pub trait PreferenceStore: Send + Sync {
    /// Get the stored preference document of an owner.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn get(&self, owner: &Owner) -> StoreFuture<'_, StoreResult<Option<Preference>>>;

    /// Validate a partial write and merge it into the owner's document,
    /// creating the document with defaults first if there is none.
    ///
    /// # Errors
    /// Returns a validation error for an invalid field, or a backend error.
    fn upsert(
        &self,
        owner: &Owner,
        update: PreferenceUpdate,
    ) -> StoreFuture<'_, StoreResult<Preference>>;

    /// Delete the owner's document. Returns whether one existed.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn delete(&self, owner: &Owner) -> StoreFuture<'_, StoreResult<bool>>;

    /// Get the stored document, or an unpersisted default one.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn get_or_default(&self, owner: &Owner) -> StoreFuture<'_, StoreResult<Preference>> {
        let owner = owner.clone();
        Box::pin(async move {
            match self.get(&owner).await? {
                Some(preference) => Ok(preference),
                None => Ok(Preference::defaults_for(owner, Utc::now())),
            }
        })
    }
}

/// `SQLite` implementation of the preference store.
pub struct SqlitePreferenceStore {
    conn: Arc<Connection>,
    table: String,
}

impl SqlitePreferenceStore {
    /// Table name for preferences.
    pub const DEFAULT_TABLE: &'static str = "userpreferences";

    /// Initialize the store and create the table if it doesn't exist.
    ///
    /// The `(owner_kind, owner_id)` unique constraint is what keeps one
    /// document per user id and one per guest id.
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
                    theme TEXT NOT NULL,
                    font_size TEXT NOT NULL,
                    ai_response_style TEXT NOT NULL,
                    language TEXT NOT NULL,
                    notifications_enabled INTEGER NOT NULL,
                    sound_enabled INTEGER NOT NULL,
                    custom_prompt TEXT NOT NULL,
                    created_at INTEGER NOT NULL,
                    updated_at INTEGER NOT NULL,
                    UNIQUE (owner_kind, owner_id)
                )"
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

impl PreferenceStore for SqlitePreferenceStore {
    fn get(&self, owner: &Owner) -> StoreFuture<'_, StoreResult<Option<Preference>>> {
        let owner = owner.clone();
        Box::pin(async move {
            let table = self.table.clone();
            let owner_kind = owner.kind().as_str();
            let owner_id = owner.id().to_string();
            let row = self
                .conn
                .call(move |conn| {
                    let row = conn
                        .query_row(
                            &format!(
                                "SELECT {COLUMNS} FROM {table}
                                 WHERE owner_kind = ?1 AND owner_id = ?2"
                            ),
                            rusqlite::params![owner_kind, owner_id],
                            PreferenceRow::from_row,
                        )
                        .optional()?;
                    Ok(row)
                })
                .await?;

            debug!("Loaded preferences for {owner}: found={}", row.is_some());
            row.map(PreferenceRow::into_preference).transpose()
        })
    }

    fn upsert(
        &self,
        owner: &Owner,
        update: PreferenceUpdate,
    ) -> StoreFuture<'_, StoreResult<Preference>> {
        let owner = owner.clone();
        Box::pin(async move {
            let patch = update.validate()?;
            let now_ms = now_millis();

            // Values used only when this write creates the document.
            let mut inserted = Preference::defaults_for(owner.clone(), from_millis(now_ms)?);
            patch.apply_to(&mut inserted);

            let table = self.table.clone();
            let id_str = PreferenceId::new().to_string();
            let owner_kind = owner.kind().as_str();
            let owner_id = owner.id().to_string();
            let deadline = current_deadline();

            let row = self
                .conn
                .call(move |conn| {
                    check_deadline(deadline)?;
                    let row = conn.query_row(
                        &format!(
                            "INSERT INTO {table} ({COLUMNS})
                             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)
                             ON CONFLICT (owner_kind, owner_id) DO UPDATE SET
                                 theme = COALESCE(?12, theme),
                                 font_size = COALESCE(?13, font_size),
                                 ai_response_style = COALESCE(?14, ai_response_style),
                                 language = COALESCE(?15, language),
                                 notifications_enabled = COALESCE(?16, notifications_enabled),
                                 sound_enabled = COALESCE(?17, sound_enabled),
                                 custom_prompt = COALESCE(?18, custom_prompt),
                                 updated_at = MAX(?11, updated_at + 1)
                             RETURNING {COLUMNS}"
                        ),
                        rusqlite::params![
                            id_str,
                            owner_kind,
                            owner_id,
                            inserted.theme.as_str(),
                            inserted.font_size.as_str(),
                            inserted.ai_response_style.as_str(),
                            inserted.language,
                            inserted.notifications_enabled,
                            inserted.sound_enabled,
                            inserted.custom_prompt,
                            now_ms,
                            patch.theme.map(|theme| theme.as_str()),
                            patch.font_size.map(|size| size.as_str()),
                            patch.ai_response_style.map(|style| style.as_str()),
                            patch.language,
                            patch.notifications_enabled,
                            patch.sound_enabled,
                            patch.custom_prompt,
                        ],
                        PreferenceRow::from_row,
                    )?;
                    Ok(row)
                })
                .await?;

            let preference = row.into_preference()?;
            info!("Saved preferences for {owner}");
            Ok(preference)
        })
    }

    fn delete(&self, owner: &Owner) -> StoreFuture<'_, StoreResult<bool>> {
        let owner = owner.clone();
        Box::pin(async move {
            let table = self.table.clone();
            let owner_kind = owner.kind().as_str();
            let owner_id = owner.id().to_string();
            let deadline = current_deadline();
            let changed = self
                .conn
                .call(move |conn| {
                    check_deadline(deadline)?;
                    Ok(conn.execute(
                        &format!("DELETE FROM {table} WHERE owner_kind = ?1 AND owner_id = ?2"),
                        rusqlite::params![owner_kind, owner_id],
                    )?)
                })
                .await?;

            if changed > 0 {
                info!("Deleted preferences for {owner}");
            }
            Ok(changed > 0)
        })
    }
}

/// Raw preference row as read from `SQLite`.
struct PreferenceRow {
    id: String,
    owner_kind: String,
    owner_id: String,
    theme: String,
    font_size: String,
    ai_response_style: String,
    language: String,
    notifications_enabled: bool,
    sound_enabled: bool,
    custom_prompt: String,
    created_at: i64,
    updated_at: i64,
}

impl PreferenceRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            owner_kind: row.get(1)?,
            owner_id: row.get(2)?,
            theme: row.get(3)?,
            font_size: row.get(4)?,
            ai_response_style: row.get(5)?,
            language: row.get(6)?,
            notifications_enabled: row.get(7)?,
            sound_enabled: row.get(8)?,
            custom_prompt: row.get(9)?,
            created_at: row.get(10)?,
            updated_at: row.get(11)?,
        })
    }

    fn into_preference(self) -> StoreResult<Preference> {
        let id = self
            .id
            .parse::<PreferenceId>()
            .map_err(|err| StoreError::Corrupt(format!("preference id {:?}: {err}", self.id)))?;
        let corrupt = |err: StoreError| StoreError::Corrupt(format!("preference {id}: {err}"));

        let kind = self.owner_kind.parse::<OwnerKind>().map_err(corrupt)?;
        Ok(Preference {
            id: Some(id),
            owner: Owner::from_parts(kind, self.owner_id).map_err(corrupt)?,
            theme: self.theme.parse().map_err(corrupt)?,
            font_size: self.font_size.parse().map_err(corrupt)?,
            ai_response_style: self.ai_response_style.parse().map_err(corrupt)?,
            language: self.language,
            notifications_enabled: self.notifications_enabled,
            sound_enabled: self.sound_enabled,
            custom_prompt: self.custom_prompt,
            created_at: from_millis(self.created_at)?,
            updated_at: from_millis(self.updated_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;
    use crate::core::preference::{AiResponseStyle, FontSize, Theme};
    use crate::storage::database::{open_in_memory, with_deadline};

    async fn store() -> SqlitePreferenceStore {
        let conn = open_in_memory().await.unwrap();
        SqlitePreferenceStore::with_default_table(conn).await.unwrap()
    }

    fn theme(value: &str) -> PreferenceUpdate {
        PreferenceUpdate {
            theme: Some(value.to_string()),
            ..PreferenceUpdate::default()
        }
    }

    async fn count_rows(store: &SqlitePreferenceStore) -> i64 {
        let table = store.table.clone();
        store
            .conn
            .call(move |conn| {
                Ok(conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
                    row.get(0)
                })?)
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_get_or_default_when_absent() {
        let store = store().await;
        let owner = Owner::guest("g1").unwrap();
        let pref = store.get_or_default(&owner).await.unwrap();
        assert!(!pref.is_persisted());
        assert_eq!(pref.owner, owner);
        assert_eq!(pref.theme, Theme::System);
        assert_eq!(count_rows(&store).await, 0);
    }

    #[tokio::test]
    async fn test_invalid_theme_rejected_and_nothing_written() {
        let store = store().await;
        let owner = Owner::user("u1").unwrap();
        let result = store.upsert(&owner, theme("neon")).await;
        assert!(matches!(result, Err(StoreError::Validation(_))));
        assert_eq!(count_rows(&store).await, 0);
    }

    #[tokio::test]
    async fn test_every_valid_theme_accepted() {
        let store = store().await;
        let owner = Owner::user("u1").unwrap();
        for value in Theme::ALL {
            let saved = store.upsert(&owner, theme(value.as_str())).await.unwrap();
            assert_eq!(saved.theme, *value);
        }
    }

    #[tokio::test]
    async fn test_second_upsert_merges_into_one_document() {
        let store = store().await;
        let owner = Owner::user("u1").unwrap();

        let first = store.upsert(&owner, theme("dark")).await.unwrap();
        let second = store
            .upsert(
                &owner,
                PreferenceUpdate {
                    font_size: Some("large".to_string()),
                    ..PreferenceUpdate::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(count_rows(&store).await, 1);
        assert_eq!(second.id, first.id);
        assert_eq!(second.created_at, first.created_at);
        assert!(second.updated_at > first.updated_at);

        let loaded = store.get_or_default(&owner).await.unwrap();
        assert!(loaded.is_persisted());
        assert_eq!(loaded.theme, Theme::Dark);
        assert_eq!(loaded.font_size, FontSize::Large);
        assert_eq!(loaded.ai_response_style, AiResponseStyle::Supportive);
        assert_eq!(loaded.language, "en");
        assert!(loaded.notifications_enabled);
        assert!(loaded.sound_enabled);
    }

    #[tokio::test]
    async fn test_latest_write_wins_per_field() {
        let store = store().await;
        let owner = Owner::guest("g1").unwrap();
        store.upsert(&owner, theme("dark")).await.unwrap();
        store.upsert(&owner, theme("light")).await.unwrap();
        let saved = store
            .upsert(
                &owner,
                PreferenceUpdate {
                    notifications_enabled: Some(false),
                    custom_prompt: Some("Be gentle.".to_string()),
                    language: Some("fr".to_string()),
                    ..PreferenceUpdate::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(saved.theme, Theme::Light);
        assert!(!saved.notifications_enabled);
        assert!(saved.sound_enabled);
        assert_eq!(saved.custom_prompt, "Be gentle.");
        assert_eq!(saved.language, "fr");
    }

    #[tokio::test]
    async fn test_empty_update_precreates_defaults() {
        let store = store().await;
        let owner = Owner::guest("g1").unwrap();
        let saved = store
            .upsert(&owner, PreferenceUpdate::default())
            .await
            .unwrap();
        assert!(saved.is_persisted());
        assert_eq!(saved.font_size, FontSize::Medium);
        assert_eq!(count_rows(&store).await, 1);
    }

    #[tokio::test]
    async fn test_user_and_guest_with_same_id_are_separate() {
        let store = store().await;
        let user = Owner::user("same").unwrap();
        let guest = Owner::guest("same").unwrap();
        store.upsert(&user, theme("dark")).await.unwrap();
        store.upsert(&guest, theme("light")).await.unwrap();

        assert_eq!(count_rows(&store).await, 2);
        assert_eq!(store.get_or_default(&user).await.unwrap().theme, Theme::Dark);
        assert_eq!(store.get_or_default(&guest).await.unwrap().theme, Theme::Light);
    }

    #[tokio::test]
    async fn test_concurrent_first_writes_create_one_document() {
        let store = Arc::new(store().await);
        let owner = Owner::user("u1").unwrap();

        let writes = (0..10).map(|i| {
            let store = Arc::clone(&store);
            let owner = owner.clone();
            let value = if i % 2 == 0 { "dark" } else { "light" };
            async move { store.upsert(&owner, theme(value)).await }
        });
        let results = futures::future::join_all(writes).await;

        let ids: Vec<_> = results.into_iter().map(|r| r.unwrap().id).collect();
        assert!(ids.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(count_rows(&store).await, 1);
    }

    #[tokio::test]
    async fn test_delete() {
        let store = store().await;
        let owner = Owner::guest("g1").unwrap();
        assert!(!store.delete(&owner).await.unwrap());

        store.upsert(&owner, theme("dark")).await.unwrap();
        assert!(store.delete(&owner).await.unwrap());
        assert!(store.get(&owner).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_deadline_writes_nothing() {
        let store = store().await;
        let owner = Owner::user("u1").unwrap();
        let saved = store.upsert(&owner, theme("dark")).await.unwrap();

        let expired = Instant::now();
        let late = with_deadline(expired, store.upsert(&owner, theme("light"))).await;
        assert!(matches!(late, Err(StoreError::DeadlineExceeded(_))));
        let late_delete = with_deadline(expired, store.delete(&owner)).await;
        assert!(matches!(late_delete, Err(StoreError::DeadlineExceeded(_))));

        let loaded = store.get(&owner).await.unwrap().unwrap();
        assert_eq!(loaded.theme, Theme::Dark);
        assert_eq!(loaded.updated_at, saved.updated_at);
    }
}
