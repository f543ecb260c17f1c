//! Whole-identity data wipes.
//!
//! A wipe removes conversations and preferences in one immediate
//! transaction, so it either takes everything or nothing.

use std::sync::Arc;

use rusqlite::TransactionBehavior;
use tokio_rusqlite::Connection;
use tracing::info;

use crate::core::errors::StoreResult;
use crate::core::owner::OwnerFilter;
use crate::storage::StoreFuture;
use crate::storage::database::{check_deadline, current_deadline, owner_clause};

/// Rows removed by a wipe.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct WipeReport {
    /// Conversations removed.
    pub conversations: u64,
    /// Preference documents removed.
    pub preferences: u64,
}

/// Trait for operations spanning every record of an identity.
pub trait IdentityStore: Send + Sync {
    /// Delete every conversation and preference document owned by any owner
    /// in the filter.
    ///
    /// # Errors
    /// Returns an error if storage access fails, in which case nothing is deleted.
    fn wipe(&self, filter: &OwnerFilter) -> StoreFuture<'_, StoreResult<WipeReport>>;
}

/// `SQLite` implementation over the conversation and preference tables.
pub struct SqliteIdentityStore {
    conn: Arc<Connection>,
    conversation_table: String,
    preference_table: String,
}

impl SqliteIdentityStore {
    /// Wipe across existing tables, normally the ones created by
    /// [`crate::storage::SqliteConversationStore`] and
    /// [`crate::storage::SqlitePreferenceStore`] on the same connection.
    #[must_use]
    pub const fn new(
        conn: Arc<Connection>,
        conversation_table: String,
        preference_table: String,
    ) -> Self {
        Self {
            conn,
            conversation_table,
            preference_table,
        }
    }
}

impl IdentityStore for SqliteIdentityStore {
    fn wipe(&self, filter: &OwnerFilter) -> StoreFuture<'_, StoreResult<WipeReport>> {
        let filter = filter.clone();
        Box::pin(async move {
            let conversation_table = self.conversation_table.clone();
            let preference_table = self.preference_table.clone();
            let (clause, params) = owner_clause(&filter);
            let deadline = current_deadline();

            let report = self
                .conn
                .call(move |conn| {
                    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                    check_deadline(deadline)?;

                    let removed_conversations = tx.execute(
                        &format!("DELETE FROM {conversation_table} WHERE {clause}"),
                        rusqlite::params_from_iter(params.iter()),
                    )?;
                    let removed_preferences = tx.execute(
                        &format!("DELETE FROM {preference_table} WHERE {clause}"),
                        rusqlite::params_from_iter(params.iter()),
                    )?;

                    check_deadline(deadline)?;
                    tx.commit()?;
                    Ok(WipeReport {
                        conversations: removed_conversations as u64,
                        preferences: removed_preferences as u64,
                    })
                })
                .await?;

            info!(
                "Wiped {:?}: {} conversation(s), {} preference document(s)",
                filter.owners(),
                report.conversations,
                report.preferences
            );
            Ok(report)
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;
    use crate::core::conversation::{Message, NewConversation};
    use crate::core::errors::StoreError;
    use crate::core::owner::Owner;
    use crate::core::preference::PreferenceUpdate;
    use crate::storage::database::{open_in_memory, with_deadline};
    use crate::storage::{
        ConversationStore, PreferenceStore, SqliteConversationStore, SqlitePreferenceStore,
    };

    struct Fixture {
        conn: Arc<Connection>,
        conversations: SqliteConversationStore,
        preferences: SqlitePreferenceStore,
    }

    async fn fixture() -> Fixture {
        let conn = open_in_memory().await.unwrap();
        let conversations = SqliteConversationStore::with_default_table(Arc::clone(&conn))
            .await
            .unwrap();
        let preferences = SqlitePreferenceStore::with_default_table(Arc::clone(&conn))
            .await
            .unwrap();
        Fixture {
            conn,
            conversations,
            preferences,
        }
    }

    fn wiper(fixture: &Fixture, preference_table: &str) -> SqliteIdentityStore {
        SqliteIdentityStore::new(
            Arc::clone(&fixture.conn),
            SqliteConversationStore::DEFAULT_TABLE.to_string(),
            preference_table.to_string(),
        )
    }

    async fn seed(fixture: &Fixture) {
        for owner in [
            Owner::guest("g1").unwrap(),
            Owner::user("u1").unwrap(),
            Owner::user("u2").unwrap(),
        ] {
            fixture
                .conversations
                .create(NewConversation::new(owner.clone(), vec![Message::new("user", "hi")]))
                .await
                .unwrap();
            fixture
                .preferences
                .upsert(&owner, PreferenceUpdate::default())
                .await
                .unwrap();
        }
    }

    fn both() -> OwnerFilter {
        OwnerFilter::either(Owner::user("u1").unwrap(), Owner::guest("g1").unwrap())
    }

    async fn surviving_conversations(fixture: &Fixture) -> usize {
        let everyone = OwnerFilter::either(Owner::user("u2").unwrap(), Owner::guest("g1").unwrap());
        fixture.conversations.list(&everyone, 100).await.unwrap().len()
            + fixture
                .conversations
                .list(&Owner::user("u1").unwrap().into(), 100)
                .await
                .unwrap()
                .len()
    }

    #[tokio::test]
    async fn test_wipe_removes_both_kinds_of_record() {
        let fixture = fixture().await;
        seed(&fixture).await;

        let report = wiper(&fixture, SqlitePreferenceStore::DEFAULT_TABLE)
            .wipe(&both())
            .await
            .unwrap();
        assert_eq!(
            report,
            WipeReport {
                conversations: 2,
                preferences: 2
            }
        );

        assert_eq!(surviving_conversations(&fixture).await, 1);
        let u2 = Owner::user("u2").unwrap();
        assert!(fixture.preferences.get(&u2).await.unwrap().is_some());
        let g1 = Owner::guest("g1").unwrap();
        assert!(fixture.preferences.get(&g1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_wipe_of_unknown_identity_reports_zero() {
        let fixture = fixture().await;
        seed(&fixture).await;

        let report = wiper(&fixture, SqlitePreferenceStore::DEFAULT_TABLE)
            .wipe(&Owner::guest("nobody").unwrap().into())
            .await
            .unwrap();
        assert_eq!(report, WipeReport::default());
        assert_eq!(surviving_conversations(&fixture).await, 3);
    }

    #[tokio::test]
    async fn test_failure_after_first_delete_rolls_back() {
        let fixture = fixture().await;
        seed(&fixture).await;

        // Conversations delete fine, then the preference delete fails.
        let result = wiper(&fixture, "no_such_table").wipe(&both()).await;
        assert!(result.unwrap_err().is_backend());

        assert_eq!(surviving_conversations(&fixture).await, 3);
        let g1 = Owner::guest("g1").unwrap();
        assert!(fixture.preferences.get(&g1).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_expired_deadline_wipes_nothing() {
        let fixture = fixture().await;
        seed(&fixture).await;

        let wiper = wiper(&fixture, SqlitePreferenceStore::DEFAULT_TABLE);
        let result = with_deadline(Instant::now(), wiper.wipe(&both())).await;
        assert!(matches!(result, Err(StoreError::DeadlineExceeded(_))));
        assert_eq!(surviving_conversations(&fixture).await, 3);
    }
}
