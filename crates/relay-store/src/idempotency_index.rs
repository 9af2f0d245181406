//! `IdempotencyIndex`: the at-most-once processing guard in front of the
//! Worker's delivery loop (§4.8), mirroring
//! `worker/src/infrastructure/idempotency.py`'s `InMemoryIdempotencyService`
//! but backed by SQLite so the lock is visible across Worker replicas
//! sharing one database file, plus a pure in-memory variant for a
//! single-replica deployment (documented trade-off, not a fallback of last
//! resort).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use relay_types::{IdempotencyKey, IdempotencyRecord, IdempotencyStatus, LockOutcome, RelayError};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::sync::Mutex as StdMutex;
use tokio::sync::Mutex;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS idempotency_records (
    key TEXT PRIMARY KEY,
    status TEXT NOT NULL,
    created_at TEXT NOT NULL,
    completed_at TEXT,
    result TEXT,
    error TEXT
);
CREATE INDEX IF NOT EXISTS idx_idempotency_status ON idempotency_records(status);
";

fn to_rfc3339(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339()
}

fn from_rfc3339(raw: &str) -> Result<DateTime<Utc>, RelayError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|error| RelayError::invariant(format!("corrupt timestamp '{raw}': {error}")))
}

fn sql_error(context: &str, error: rusqlite::Error) -> RelayError {
    RelayError::transient(format!("{context}: {error}"))
}

/// At-most-once processing guard keyed by `IdempotencyKey` (§4.8).
#[async_trait]
pub trait IdempotencyIndex: Send + Sync {
    /// Atomically inspects the record for `key` and, if no other worker
    /// currently owns it, acquires a fresh `Processing` lock — the same
    /// three-way decision as the source's `check_and_lock`.
    async fn check_and_lock(
        &self,
        key: &IdempotencyKey,
        now: DateTime<Utc>,
        stale_after_seconds: i64,
    ) -> Result<LockOutcome, RelayError>;

    async fn mark_completed(
        &self,
        key: &IdempotencyKey,
        result: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), RelayError>;

    async fn mark_failed(
        &self,
        key: &IdempotencyKey,
        error: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), RelayError>;

    /// Releases a `Processing` lock back to empty without recording an
    /// outcome — used when the Worker crashes mid-delivery and a
    /// supervisor wants another attempt sooner than the staleness window.
    async fn release_lock(&self, key: &IdempotencyKey) -> Result<(), RelayError>;

    /// Deletes records older than the 24h retention window (§4.8), run
    /// periodically by the Worker's maintenance sweep.
    async fn sweep_expired(&self, now: DateTime<Utc>, ttl_seconds: i64) -> Result<usize, RelayError>;
}

pub struct SqliteIdempotencyIndex {
    connection: Mutex<Connection>,
}

impl SqliteIdempotencyIndex {
    pub fn open_in_memory() -> Result<Self, RelayError> {
        let connection =
            Connection::open_in_memory().map_err(|error| sql_error("failed to open in-memory db", error))?;
        connection
            .execute_batch(SCHEMA)
            .map_err(|error| sql_error("failed to apply schema", error))?;
        Ok(Self {
            connection: Mutex::new(connection),
        })
    }

    pub fn open(path: &std::path::Path) -> Result<Self, RelayError> {
        let connection = Connection::open(path)
            .map_err(|error| sql_error(&format!("failed to open {}", path.display()), error))?;
        connection
            .execute_batch(SCHEMA)
            .map_err(|error| sql_error("failed to apply schema", error))?;
        Ok(Self {
            connection: Mutex::new(connection),
        })
    }

    fn read_record(
        connection: &Connection,
        key: &IdempotencyKey,
    ) -> Result<Option<IdempotencyRecord>, RelayError> {
        connection
            .query_row(
                "SELECT status, created_at, completed_at, result, error \
                 FROM idempotency_records WHERE key = ?1",
                params![key.as_str()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, Option<String>>(4)?,
                    ))
                },
            )
            .optional()
            .map_err(|error| sql_error("failed to query idempotency record", error))?
            .map(|(status, created_at, completed_at, result, error)| {
                Ok(IdempotencyRecord {
                    key: key.clone(),
                    status: IdempotencyStatus::parse(&status)
                        .ok_or_else(|| RelayError::invariant(format!("unknown idempotency status '{status}'")))?,
                    created_at: from_rfc3339(&created_at)?,
                    completed_at: completed_at.map(|raw| from_rfc3339(&raw)).transpose()?,
                    result,
                    error,
                })
            })
            .transpose()
    }

    fn write_terminal(
        connection: &Connection,
        key: &IdempotencyKey,
        status: IdempotencyStatus,
        result: Option<String>,
        error: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), RelayError> {
        connection
            .execute(
                "UPDATE idempotency_records SET status = ?1, completed_at = ?2, result = ?3, \
                 error = ?4 WHERE key = ?5",
                params![status.as_str(), to_rfc3339(now), result, error, key.as_str()],
            )
            .map_err(|error| sql_error("failed to write terminal idempotency record", error))?;
        Ok(())
    }
}

#[async_trait]
impl IdempotencyIndex for SqliteIdempotencyIndex {
    async fn check_and_lock(
        &self,
        key: &IdempotencyKey,
        now: DateTime<Utc>,
        stale_after_seconds: i64,
    ) -> Result<LockOutcome, RelayError> {
        let connection = self.connection.lock().await;
        let existing = Self::read_record(&connection, key)?;
        match existing {
            Some(record) if record.status == IdempotencyStatus::Completed => {
                Ok(LockOutcome::AlreadyCompleted)
            }
            Some(record)
                if record.status == IdempotencyStatus::Processing && !record.is_stale(now, stale_after_seconds) =>
            {
                Ok(LockOutcome::InProgressElsewhere)
            }
            Some(_) => {
                connection
                    .execute(
                        "UPDATE idempotency_records SET status = 'processing', created_at = ?1, \
                         completed_at = NULL, result = NULL, error = NULL WHERE key = ?2",
                        params![to_rfc3339(now), key.as_str()],
                    )
                    .map_err(|error| sql_error("failed to re-acquire idempotency lock", error))?;
                Ok(LockOutcome::Acquired)
            }
            None => {
                connection
                    .execute(
                        "INSERT INTO idempotency_records (key, status, created_at) \
                         VALUES (?1, 'processing', ?2)",
                        params![key.as_str(), to_rfc3339(now)],
                    )
                    .map_err(|error| sql_error("failed to insert idempotency lock", error))?;
                Ok(LockOutcome::Acquired)
            }
        }
    }

    async fn mark_completed(
        &self,
        key: &IdempotencyKey,
        result: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), RelayError> {
        let connection = self.connection.lock().await;
        Self::write_terminal(&connection, key, IdempotencyStatus::Completed, result, None, now)
    }

    async fn mark_failed(
        &self,
        key: &IdempotencyKey,
        error: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), RelayError> {
        let connection = self.connection.lock().await;
        Self::write_terminal(&connection, key, IdempotencyStatus::Failed, None, error, now)
    }

    async fn release_lock(&self, key: &IdempotencyKey) -> Result<(), RelayError> {
        let connection = self.connection.lock().await;
        connection
            .execute(
                "DELETE FROM idempotency_records WHERE key = ?1 AND status = 'processing'",
                params![key.as_str()],
            )
            .map_err(|error| sql_error("failed to release idempotency lock", error))?;
        Ok(())
    }

    async fn sweep_expired(&self, now: DateTime<Utc>, ttl_seconds: i64) -> Result<usize, RelayError> {
        let expiry = now - chrono::Duration::seconds(ttl_seconds);
        let connection = self.connection.lock().await;
        let affected = connection
            .execute(
                "DELETE FROM idempotency_records WHERE created_at <= ?1",
                params![to_rfc3339(expiry)],
            )
            .map_err(|error| sql_error("failed to sweep expired idempotency records", error))?;
        Ok(affected)
    }
}

/// Single-replica variant: a plain in-memory map behind a std mutex, used
/// by a daemon run with `--process-role all-in-one` where every role lives
/// in the same process and cross-replica visibility is moot. Documented
/// trade-off: restarting the process loses every in-flight lock, same as
/// the source's `InMemoryIdempotencyService`.
pub struct InMemoryIdempotencyIndex {
    records: StdMutex<HashMap<String, IdempotencyRecord>>,
}

impl InMemoryIdempotencyIndex {
    pub fn new() -> Self {
        Self {
            records: StdMutex::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryIdempotencyIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdempotencyIndex for InMemoryIdempotencyIndex {
    async fn check_and_lock(
        &self,
        key: &IdempotencyKey,
        now: DateTime<Utc>,
        stale_after_seconds: i64,
    ) -> Result<LockOutcome, RelayError> {
        let mut records = self.records.lock().expect("idempotency map poisoned");
        match records.get(key.as_str()) {
            Some(record) if record.status == IdempotencyStatus::Completed => Ok(LockOutcome::AlreadyCompleted),
            Some(record)
                if record.status == IdempotencyStatus::Processing && !record.is_stale(now, stale_after_seconds) =>
            {
                Ok(LockOutcome::InProgressElsewhere)
            }
            _ => {
                records.insert(key.as_str().to_string(), IdempotencyRecord::new_processing(key.clone(), now));
                Ok(LockOutcome::Acquired)
            }
        }
    }

    async fn mark_completed(
        &self,
        key: &IdempotencyKey,
        result: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), RelayError> {
        let mut records = self.records.lock().expect("idempotency map poisoned");
        if let Some(record) = records.get_mut(key.as_str()) {
            record.status = IdempotencyStatus::Completed;
            record.completed_at = Some(now);
            record.result = result;
            record.error = None;
        }
        Ok(())
    }

    async fn mark_failed(
        &self,
        key: &IdempotencyKey,
        error: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), RelayError> {
        let mut records = self.records.lock().expect("idempotency map poisoned");
        if let Some(record) = records.get_mut(key.as_str()) {
            record.status = IdempotencyStatus::Failed;
            record.completed_at = Some(now);
            record.error = error;
            record.result = None;
        }
        Ok(())
    }

    async fn release_lock(&self, key: &IdempotencyKey) -> Result<(), RelayError> {
        let mut records = self.records.lock().expect("idempotency map poisoned");
        if matches!(records.get(key.as_str()), Some(record) if record.status == IdempotencyStatus::Processing) {
            records.remove(key.as_str());
        }
        Ok(())
    }

    async fn sweep_expired(&self, now: DateTime<Utc>, ttl_seconds: i64) -> Result<usize, RelayError> {
        let mut records = self.records.lock().expect("idempotency map poisoned");
        let before = records.len();
        records.retain(|_, record| (now - record.created_at).num_seconds() < ttl_seconds);
        Ok(before - records.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_types::ChannelKind;
    use uuid::Uuid;

    fn sample_key() -> IdempotencyKey {
        IdempotencyKey::compute(Uuid::nil(), &[ChannelKind::Email])
    }

    async fn exercise<I: IdempotencyIndex>(index: I) {
        let now = Utc::now();
        let key = sample_key();
        assert_eq!(index.check_and_lock(&key, now, 300).await.unwrap(), LockOutcome::Acquired);
        assert_eq!(
            index.check_and_lock(&key, now, 300).await.unwrap(),
            LockOutcome::InProgressElsewhere
        );
        index.mark_completed(&key, Some("ok".into()), now).await.unwrap();
        assert_eq!(
            index.check_and_lock(&key, now, 300).await.unwrap(),
            LockOutcome::AlreadyCompleted
        );
    }

    #[tokio::test]
    async fn unit_sqlite_index_enforces_lock_then_completion() {
        exercise(SqliteIdempotencyIndex::open_in_memory().unwrap()).await;
    }

    #[tokio::test]
    async fn unit_in_memory_index_enforces_lock_then_completion() {
        exercise(InMemoryIdempotencyIndex::new()).await;
    }

    #[tokio::test]
    async fn functional_stale_processing_lock_is_reacquirable() {
        let index = SqliteIdempotencyIndex::open_in_memory().unwrap();
        let key = sample_key();
        let start = Utc::now();
        index.check_and_lock(&key, start, 300).await.unwrap();
        let later = start + chrono::Duration::seconds(301);
        assert_eq!(index.check_and_lock(&key, later, 300).await.unwrap(), LockOutcome::Acquired);
    }

    #[tokio::test]
    async fn regression_failed_outcome_does_not_block_retry() {
        let index = SqliteIdempotencyIndex::open_in_memory().unwrap();
        let key = sample_key();
        let now = Utc::now();
        index.check_and_lock(&key, now, 300).await.unwrap();
        index.mark_failed(&key, Some("boom".into()), now).await.unwrap();
        assert_eq!(index.check_and_lock(&key, now, 300).await.unwrap(), LockOutcome::Acquired);
    }

    #[tokio::test]
    async fn functional_sweep_expired_removes_old_records() {
        let index = SqliteIdempotencyIndex::open_in_memory().unwrap();
        let key = sample_key();
        let start = Utc::now();
        index.check_and_lock(&key, start, 300).await.unwrap();
        index.mark_completed(&key, None, start).await.unwrap();
        let much_later = start + chrono::Duration::hours(25);
        let removed = index.sweep_expired(much_later, 24 * 3600).await.unwrap();
        assert_eq!(removed, 1);
    }
}
