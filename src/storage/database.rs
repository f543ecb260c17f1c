//! Opening the shared `SQLite` connection and timestamp helpers.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::types::Value;
use tokio_rusqlite::Connection;

use crate::core::config::StorageConfig;
use crate::core::errors::{DeadlineExceeded, StoreError, StoreResult};
use crate::core::owner::OwnerFilter;

/// How long a writer waits on a locked database before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Open the database file named by the storage config.
///
/// # Errors
/// Returns an error if the database cannot be opened or configured.
pub async fn open_database(config: &StorageConfig) -> StoreResult<Arc<Connection>> {
    if let Some(parent) = config
        .sqlite_path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
    {
        std::fs::create_dir_all(parent)?;
    }

    let conn = Connection::open(&config.sqlite_path).await?;
    conn.call(|conn| {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        tracing::debug!("sqlite journal mode: {mode}");
        Ok(())
    })
    .await?;

    tracing::info!("Opened database at {}", config.sqlite_path.display());
    Ok(Arc::new(conn))
}

/// Open a private in-memory database.
///
/// # Errors
/// Returns an error if `SQLite` cannot allocate the database.
pub async fn open_in_memory() -> StoreResult<Arc<Connection>> {
    Ok(Arc::new(Connection::open_in_memory().await?))
}

/// Current time in milliseconds since the Unix epoch.
#[must_use]
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Decode a stored millisecond timestamp.
///
/// # Errors
/// Returns an error if the value is out of chrono's range.
pub fn from_millis(ms: i64) -> StoreResult<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| StoreError::Corrupt(format!("timestamp out of range: {ms}")))
}

tokio::task_local! {
    static DEADLINE: Instant;
}

/// Run `operation` under a deadline. Writes it issues refuse to commit once
/// the deadline has passed, even if they reach the connection thread late.
pub async fn with_deadline<F: Future>(deadline: Instant, operation: F) -> F::Output {
    DEADLINE.scope(deadline, operation).await
}

/// Deadline of the enclosing [`with_deadline`] scope, if any.
#[must_use]
pub fn current_deadline() -> Option<Instant> {
    DEADLINE.try_with(|deadline| *deadline).ok()
}

/// Called on the connection thread before anything is made durable.
///
/// # Errors
/// Returns [`DeadlineExceeded`] once `deadline` has passed.
pub fn check_deadline(deadline: Option<Instant>) -> tokio_rusqlite::Result<()> {
    match deadline {
        Some(deadline) if Instant::now() >= deadline => {
            Err(tokio_rusqlite::Error::Other(Box::new(DeadlineExceeded)))
        }
        _ => Ok(()),
    }
}

/// `WHERE` clause matching any owner in the filter, with its positional parameters.
pub(crate) fn owner_clause(filter: &OwnerFilter) -> (String, Vec<Value>) {
    let mut params = Vec::with_capacity(filter.owners().len() * 2);
    let clause = filter
        .owners()
        .iter()
        .map(|owner| {
            params.push(Value::Text(owner.kind().as_str().to_string()));
            params.push(Value::Text(owner.id().to_string()));
            format!(
                "(owner_kind = ?{} AND owner_id = ?{})",
                params.len() - 1,
                params.len()
            )
        })
        .collect::<Vec<_>>()
        .join(" OR ");
    (format!("({clause})"), params)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_millis_roundtrip() {
        let now = now_millis();
        assert_eq!(from_millis(now).unwrap().timestamp_millis(), now);
    }

    #[test]
    fn test_out_of_range_is_corrupt() {
        assert!(matches!(from_millis(i64::MAX), Err(StoreError::Corrupt(_))));
    }

    #[tokio::test]
    async fn test_deadline_scope() {
        assert!(current_deadline().is_none());
        assert!(check_deadline(None).is_ok());

        let past = Instant::now();
        let seen = with_deadline(past, async { current_deadline() }).await;
        assert_eq!(seen, Some(past));
        assert!(check_deadline(seen).is_err());

        let future = Instant::now() + Duration::from_secs(60);
        assert!(check_deadline(Some(future)).is_ok());
    }

    #[test]
    fn test_owner_clause_numbers_params() {
        use crate::core::owner::Owner;

        let filter = OwnerFilter::either(
            Owner::user("u1").unwrap(),
            Owner::guest("g1").unwrap(),
        );
        let (clause, params) = owner_clause(&filter);
        assert_eq!(
            clause,
            "((owner_kind = ?1 AND owner_id = ?2) OR (owner_kind = ?3 AND owner_id = ?4))"
        );
        assert_eq!(params.len(), 4);
    }

    #[tokio::test]
    async fn test_open_in_memory() {
        let conn = open_in_memory().await.unwrap();
        let one: i64 = conn
            .call(|conn| Ok(conn.query_row("SELECT 1", [], |row| row.get(0))?))
            .await
            .unwrap();
        assert_eq!(one, 1);
    }
}
