//! Transactional repository for messages and per-channel delivery rows
//! (§4.2), backed by SQLite via `rusqlite` — the "transactional
//! KV-or-relational store" the contract asks for. Schema mirrors
//! `original_source/api/src/infrastructure/persistence/models.py`.
//!
//! SQLite has no row-level `SELECT … FOR UPDATE SKIP LOCKED`, so
//! non-overlapping `claim_due` is implemented the way the spec's
//! §4.2 permits: a conditional `UPDATE … WHERE status = 'scheduled'`
//! inside one transaction, equivalent to a per-row compare-and-swap. A
//! single writer connection behind a `tokio::sync::Mutex` serializes
//! transactions within a process; SQLite's own file locking (with a busy
//! timeout) serializes across processes sharing one database file.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use relay_types::{
    state_machine, ChannelKind, Delivery, DeliveryStatus, Message, MessageContent, MessageStatus,
    RelayError,
};
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::Mutex;
use uuid::Uuid;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS messages (
    id TEXT PRIMARY KEY,
    owner_id TEXT NOT NULL,
    content_text TEXT NOT NULL,
    content_media_ref TEXT,
    target_channels TEXT NOT NULL,
    scheduled_at TEXT NOT NULL,
    status TEXT NOT NULL,
    recipient_ref TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    processing_claimed_at TEXT
);
CREATE INDEX IF NOT EXISTS idx_messages_status_scheduled ON messages(status, scheduled_at);
CREATE INDEX IF NOT EXISTS idx_messages_owner ON messages(owner_id);

CREATE TABLE IF NOT EXISTS channel_deliveries (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    message_id TEXT NOT NULL REFERENCES messages(id),
    channel TEXT NOT NULL,
    status TEXT NOT NULL,
    delivered_at TEXT,
    error TEXT,
    external_ref TEXT,
    UNIQUE(message_id, channel)
);
CREATE INDEX IF NOT EXISTS idx_deliveries_message_status ON channel_deliveries(message_id, status);
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

/// Transactional repository contract (§4.2). Implementers other than
/// `SqliteMessageStore` (e.g. a test double) can satisfy the same trait.
#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn save(&self, message: &Message) -> Result<(), RelayError>;

    async fn get(&self, id: Uuid) -> Result<Option<Message>, RelayError>;

    /// Selects due `Scheduled` messages, atomically transitions them to
    /// `Processing`, and returns their id and channels for the caller to
    /// publish an event per row.
    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<(Uuid, Vec<ChannelKind>)>, RelayError>;

    /// Reclaims rows stuck in `Processing` past `stale_after_seconds` —
    /// the Dispatcher's next-sweep re-drive for a claim whose event publish
    /// never succeeded (§9 Open Question, resolved in favor of re-drive).
    async fn reclaim_stale_processing(
        &self,
        now: DateTime<Utc>,
        stale_after_seconds: i64,
        limit: usize,
    ) -> Result<Vec<(Uuid, Vec<ChannelKind>)>, RelayError>;

    /// Writes a terminal delivery outcome and re-derives the aggregate
    /// `Message.status`. A no-op (not an error) if the target delivery is
    /// already terminal (I3, P8).
    #[allow(clippy::too_many_arguments)]
    async fn mark_delivery(
        &self,
        id: Uuid,
        channel: ChannelKind,
        outcome: DeliveryStatus,
        external_ref: Option<String>,
        error: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), RelayError>;
}

pub struct SqliteMessageStore {
    connection: Mutex<Connection>,
}

impl SqliteMessageStore {
    pub fn open(path: &Path) -> Result<Self, RelayError> {
        let connection = Connection::open(path)
            .map_err(|error| sql_error(&format!("failed to open {}", path.display()), error))?;
        Self::from_connection(connection)
    }

    pub fn open_in_memory() -> Result<Self, RelayError> {
        let connection =
            Connection::open_in_memory().map_err(|error| sql_error("failed to open in-memory db", error))?;
        Self::from_connection(connection)
    }

    fn from_connection(connection: Connection) -> Result<Self, RelayError> {
        connection
            .execute_batch(SCHEMA)
            .map_err(|error| sql_error("failed to apply schema", error))?;
        Ok(Self {
            connection: Mutex::new(connection),
        })
    }

    fn row_to_message(
        connection: &Connection,
        id: &str,
        owner_id: String,
        content_text: String,
        content_media_ref: Option<String>,
        target_channels_json: String,
        scheduled_at: String,
        status: String,
        recipient_ref: String,
        created_at: String,
        updated_at: String,
    ) -> Result<Message, RelayError> {
        let target_channels: Vec<ChannelKind> = serde_json::from_str::<Vec<String>>(&target_channels_json)
            .map_err(|error| RelayError::invariant(format!("corrupt target_channels: {error}")))?
            .iter()
            .map(|raw| {
                ChannelKind::parse(raw)
                    .ok_or_else(|| RelayError::invariant(format!("unknown channel '{raw}'")))
            })
            .collect::<Result<_, _>>()?;

        let mut delivery_by_channel = std::collections::HashMap::new();
        {
            let mut statement = connection
                .prepare(
                    "SELECT channel, status, delivered_at, error, external_ref \
                     FROM channel_deliveries WHERE message_id = ?1",
                )
                .map_err(|error| sql_error("failed to prepare delivery query", error))?;
            let rows = statement
                .query_map(params![id], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, Option<String>>(4)?,
                    ))
                })
                .map_err(|error| sql_error("failed to query deliveries", error))?;
            for row in rows {
                let (channel, status, delivered_at, error, external_ref) =
                    row.map_err(|error| sql_error("failed to read delivery row", error))?;
                let channel = ChannelKind::parse(&channel)
                    .ok_or_else(|| RelayError::invariant(format!("unknown channel '{channel}'")))?;
                let status = DeliveryStatus::parse(&status)
                    .ok_or_else(|| RelayError::invariant(format!("unknown delivery status '{status}'")))?;
                let delivered_at = delivered_at.map(|raw| from_rfc3339(&raw)).transpose()?;
                delivery_by_channel.insert(
                    channel,
                    Delivery {
                        channel,
                        status,
                        external_ref,
                        error,
                        delivered_at,
                    },
                );
            }
        }
        let deliveries = target_channels
            .iter()
            .map(|channel| {
                delivery_by_channel.remove(channel).ok_or_else(|| {
                    RelayError::invariant(format!("missing delivery row for channel '{channel}'"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Message {
            id: Uuid::parse_str(id)
                .map_err(|error| RelayError::invariant(format!("corrupt message id: {error}")))?,
            owner_id,
            content: MessageContent::new(content_text, content_media_ref)?,
            target_channels,
            scheduled_at: from_rfc3339(&scheduled_at)?,
            status: MessageStatus::parse(&status)
                .ok_or_else(|| RelayError::invariant(format!("unknown message status '{status}'")))?,
            recipient_ref,
            deliveries,
            created_at: from_rfc3339(&created_at)?,
            updated_at: from_rfc3339(&updated_at)?,
        })
    }

    fn claim_rows(
        connection: &mut Connection,
        candidates: Vec<(String, String)>,
        now: DateTime<Utc>,
        from_status: &str,
    ) -> Result<Vec<(Uuid, Vec<ChannelKind>)>, RelayError> {
        let tx = connection
            .transaction()
            .map_err(|error| sql_error("failed to start claim transaction", error))?;
        let mut claimed = Vec::new();
        for (id, channels_json) in candidates {
            let affected = tx
                .execute(
                    "UPDATE messages SET status = 'processing', processing_claimed_at = ?1, \
                     updated_at = ?1 WHERE id = ?2 AND status = ?3",
                    params![to_rfc3339(now), id, from_status],
                )
                .map_err(|error| sql_error("failed to claim row", error))?;
            if affected == 1 {
                let channels: Vec<ChannelKind> = serde_json::from_str::<Vec<String>>(&channels_json)
                    .map_err(|error| RelayError::invariant(format!("corrupt target_channels: {error}")))?
                    .iter()
                    .map(|raw| {
                        ChannelKind::parse(raw)
                            .ok_or_else(|| RelayError::invariant(format!("unknown channel '{raw}'")))
                    })
                    .collect::<Result<_, _>>()?;
                let id = Uuid::parse_str(&id)
                    .map_err(|error| RelayError::invariant(format!("corrupt message id: {error}")))?;
                claimed.push((id, channels));
            }
        }
        tx.commit()
            .map_err(|error| sql_error("failed to commit claim transaction", error))?;
        Ok(claimed)
    }
}

#[async_trait]
impl MessageStore for SqliteMessageStore {
    async fn save(&self, message: &Message) -> Result<(), RelayError> {
        let mut connection = self.connection.lock().await;
        let tx = connection
            .transaction()
            .map_err(|error| sql_error("failed to start save transaction", error))?;
        let id = message.id.to_string();
        let existing: Option<i64> = tx
            .query_row("SELECT 1 FROM messages WHERE id = ?1", params![id], |row| row.get(0))
            .optional()
            .map_err(|error| sql_error("failed to check existing message", error))?;

        let target_channels_json = serde_json::to_string(
            &message
                .target_channels
                .iter()
                .map(|channel| channel.as_str())
                .collect::<Vec<_>>(),
        )
        .expect("channel list serializes");

        if existing.is_some() {
            tx.execute(
                "UPDATE messages SET status = ?1, updated_at = ?2 WHERE id = ?3",
                params![message.status.as_str(), to_rfc3339(message.updated_at), id],
            )
            .map_err(|error| sql_error("failed to update message", error))?;
            for delivery in &message.deliveries {
                tx.execute(
                    "UPDATE channel_deliveries SET status = ?1, delivered_at = ?2, error = ?3, \
                     external_ref = ?4 WHERE message_id = ?5 AND channel = ?6 \
                     AND status NOT IN ('delivered', 'failed')",
                    params![
                        delivery.status.as_str(),
                        delivery.delivered_at.map(to_rfc3339),
                        delivery.error,
                        delivery.external_ref,
                        id,
                        delivery.channel.as_str(),
                    ],
                )
                .map_err(|error| sql_error("failed to update delivery", error))?;
            }
        } else {
            tx.execute(
                "INSERT INTO messages (id, owner_id, content_text, content_media_ref, \
                 target_channels, scheduled_at, status, recipient_ref, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    id,
                    message.owner_id,
                    message.content.text,
                    message.content.media_ref,
                    target_channels_json,
                    to_rfc3339(message.scheduled_at),
                    message.status.as_str(),
                    message.recipient_ref,
                    to_rfc3339(message.created_at),
                    to_rfc3339(message.updated_at),
                ],
            )
            .map_err(|error| sql_error("failed to insert message", error))?;
            for delivery in &message.deliveries {
                tx.execute(
                    "INSERT INTO channel_deliveries (message_id, channel, status, delivered_at, \
                     error, external_ref) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        id,
                        delivery.channel.as_str(),
                        delivery.status.as_str(),
                        delivery.delivered_at.map(to_rfc3339),
                        delivery.error,
                        delivery.external_ref,
                    ],
                )
                .map_err(|error| sql_error("failed to insert delivery", error))?;
            }
        }
        tx.commit()
            .map_err(|error| sql_error("failed to commit save transaction", error))?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Message>, RelayError> {
        let connection = self.connection.lock().await;
        let id_str = id.to_string();
        let row = connection
            .query_row(
                "SELECT owner_id, content_text, content_media_ref, target_channels, \
                 scheduled_at, status, recipient_ref, created_at, updated_at \
                 FROM messages WHERE id = ?1",
                params![id_str],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, String>(6)?,
                        row.get::<_, String>(7)?,
                        row.get::<_, String>(8)?,
                    ))
                },
            )
            .optional()
            .map_err(|error| sql_error("failed to query message", error))?;
        let Some((
            owner_id,
            content_text,
            content_media_ref,
            target_channels_json,
            scheduled_at,
            status,
            recipient_ref,
            created_at,
            updated_at,
        )) = row
        else {
            return Ok(None);
        };
        Self::row_to_message(
            &connection,
            &id_str,
            owner_id,
            content_text,
            content_media_ref,
            target_channels_json,
            scheduled_at,
            status,
            recipient_ref,
            created_at,
            updated_at,
        )
        .map(Some)
    }

    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<(Uuid, Vec<ChannelKind>)>, RelayError> {
        let mut connection = self.connection.lock().await;
        let candidates: Vec<(String, String)> = {
            let mut statement = connection
                .prepare(
                    "SELECT id, target_channels FROM messages \
                     WHERE status = 'scheduled' AND scheduled_at <= ?1 \
                     ORDER BY scheduled_at ASC LIMIT ?2",
                )
                .map_err(|error| sql_error("failed to prepare claim_due query", error))?;
            let rows = statement
                .query_map(params![to_rfc3339(now), limit as i64], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })
                .map_err(|error| sql_error("failed to query claim_due candidates", error))?;
            rows.collect::<Result<_, _>>()
                .map_err(|error| sql_error("failed to read claim_due candidates", error))?
        };
        Self::claim_rows(&mut connection, candidates, now, "scheduled")
    }

    async fn reclaim_stale_processing(
        &self,
        now: DateTime<Utc>,
        stale_after_seconds: i64,
        limit: usize,
    ) -> Result<Vec<(Uuid, Vec<ChannelKind>)>, RelayError> {
        let stale_before = now - chrono::Duration::seconds(stale_after_seconds);
        let mut connection = self.connection.lock().await;
        let candidates: Vec<(String, String)> = {
            let mut statement = connection
                .prepare(
                    "SELECT id, target_channels FROM messages \
                     WHERE status = 'processing' AND processing_claimed_at <= ?1 \
                     ORDER BY processing_claimed_at ASC LIMIT ?2",
                )
                .map_err(|error| sql_error("failed to prepare reclaim query", error))?;
            let rows = statement
                .query_map(params![to_rfc3339(stale_before), limit as i64], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })
                .map_err(|error| sql_error("failed to query reclaim candidates", error))?;
            rows.collect::<Result<_, _>>()
                .map_err(|error| sql_error("failed to read reclaim candidates", error))?
        };
        // Re-stamp `processing_claimed_at` so a subsequent sweep doesn't
        // immediately reclaim the same row again.
        Self::claim_rows(&mut connection, candidates, now, "processing")
    }

    async fn mark_delivery(
        &self,
        id: Uuid,
        channel: ChannelKind,
        outcome: DeliveryStatus,
        external_ref: Option<String>,
        error: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), RelayError> {
        if !outcome.is_terminal() {
            return Err(RelayError::invariant(
                "mark_delivery requires a terminal outcome",
            ));
        }
        let mut connection = self.connection.lock().await;
        let tx = connection
            .transaction()
            .map_err(|error| sql_error("failed to start mark_delivery transaction", error))?;
        let id_str = id.to_string();
        let delivered_at = (outcome == DeliveryStatus::Delivered).then_some(to_rfc3339(now));
        let affected = tx
            .execute(
                "UPDATE channel_deliveries SET status = ?1, delivered_at = ?2, error = ?3, \
                 external_ref = ?4 WHERE message_id = ?5 AND channel = ?6 AND status = 'pending'",
                params![
                    outcome.as_str(),
                    delivered_at,
                    error,
                    external_ref,
                    id_str,
                    channel.as_str(),
                ],
            )
            .map_err(|error| sql_error("failed to update delivery", error))?;
        if affected == 0 {
            // Already terminal: idempotent no-op (I3, P8).
            tx.commit()
                .map_err(|error| sql_error("failed to commit no-op mark_delivery", error))?;
            return Ok(());
        }

        let statuses: Vec<DeliveryStatus> = {
            let mut statement = tx
                .prepare("SELECT status FROM channel_deliveries WHERE message_id = ?1")
                .map_err(|error| sql_error("failed to prepare status scan", error))?;
            let rows = statement
                .query_map(params![id_str], |row| row.get::<_, String>(0))
                .map_err(|error| sql_error("failed to query delivery statuses", error))?;
            rows.collect::<Result<Vec<String>, _>>()
                .map_err(|error| sql_error("failed to read delivery statuses", error))?
                .into_iter()
                .map(|raw| {
                    DeliveryStatus::parse(&raw)
                        .ok_or_else(|| RelayError::invariant(format!("unknown delivery status '{raw}'")))
                })
                .collect::<Result<_, _>>()?
        };
        let derived = state_machine::derive_message_status(statuses.into_iter());
        tx.execute(
            "UPDATE messages SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![derived.as_str(), to_rfc3339(now), id_str],
        )
        .map_err(|error| sql_error("failed to update aggregate status", error))?;
        tx.commit()
            .map_err(|error| sql_error("failed to commit mark_delivery transaction", error))?;
        Ok(())
    }
}

/// Exercises a fixed Unix epoch-based instant for deterministic fixtures.
pub fn epoch_seconds(seconds: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(seconds, 0).single().expect("valid timestamp")
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_types::MessageContent;

    fn sample_message(id: Uuid, scheduled_at: DateTime<Utc>) -> Message {
        let now = epoch_seconds(1_700_000_000);
        Message::new(
            id,
            "owner-1",
            MessageContent::new("hello", None).unwrap(),
            vec![ChannelKind::Email, ChannelKind::Sms],
            scheduled_at,
            "owner@example.com",
            now,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn unit_save_then_get_round_trips(
    ) {
        let store = SqliteMessageStore::open_in_memory().unwrap();
        let id = Uuid::new_v4();
        let mut message = sample_message(id, epoch_seconds(1_700_000_000));
        message.schedule(epoch_seconds(1_700_000_000)).unwrap();
        store.save(&message).await.unwrap();
        let fetched = store.get(id).await.unwrap().unwrap();
        assert_eq!(fetched.id, message.id);
        assert_eq!(fetched.target_channels, message.target_channels);
        assert_eq!(fetched.deliveries.len(), 2);
        assert_eq!(fetched.status, MessageStatus::Scheduled);
    }

    #[tokio::test]
    async fn unit_get_missing_returns_none() {
        let store = SqliteMessageStore::open_in_memory().unwrap();
        assert!(store.get(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn functional_claim_due_selects_only_due_scheduled_rows() {
        let store = SqliteMessageStore::open_in_memory().unwrap();
        let due_id = Uuid::new_v4();
        let future_id = Uuid::new_v4();
        let mut due = sample_message(due_id, epoch_seconds(1_700_000_000));
        due.schedule(epoch_seconds(1_700_000_000)).unwrap();
        let mut future = sample_message(future_id, epoch_seconds(1_700_001_000));
        future.schedule(epoch_seconds(1_700_000_000)).unwrap();
        store.save(&due).await.unwrap();
        store.save(&future).await.unwrap();

        let claimed = store.claim_due(epoch_seconds(1_700_000_500), 10).await.unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].0, due_id);

        let reloaded = store.get(due_id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, MessageStatus::Processing);
    }

    #[tokio::test]
    async fn regression_claim_due_never_reclaims_already_processing_row() {
        let store = SqliteMessageStore::open_in_memory().unwrap();
        let id = Uuid::new_v4();
        let mut message = sample_message(id, epoch_seconds(1_700_000_000));
        message.schedule(epoch_seconds(1_700_000_000)).unwrap();
        store.save(&message).await.unwrap();
        let first = store.claim_due(epoch_seconds(1_700_000_500), 10).await.unwrap();
        assert_eq!(first.len(), 1);
        let second = store.claim_due(epoch_seconds(1_700_000_600), 10).await.unwrap();
        assert!(second.is_empty());
    }

    #[tokio::test]
    async fn functional_mark_delivery_derives_partially_delivered() {
        let store = SqliteMessageStore::open_in_memory().unwrap();
        let id = Uuid::new_v4();
        let mut message = sample_message(id, epoch_seconds(1_700_000_000));
        message.schedule(epoch_seconds(1_700_000_000)).unwrap();
        store.save(&message).await.unwrap();
        store.claim_due(epoch_seconds(1_700_000_500), 10).await.unwrap();

        store
            .mark_delivery(
                id,
                ChannelKind::Email,
                DeliveryStatus::Delivered,
                Some("ext-1".into()),
                None,
                epoch_seconds(1_700_000_600),
            )
            .await
            .unwrap();
        store
            .mark_delivery(
                id,
                ChannelKind::Sms,
                DeliveryStatus::Failed,
                None,
                Some("carrier rejected".into()),
                epoch_seconds(1_700_000_601),
            )
            .await
            .unwrap();

        let reloaded = store.get(id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, MessageStatus::PartiallyDelivered);
    }

    #[tokio::test]
    async fn regression_mark_delivery_is_idempotent_after_terminal() {
        let store = SqliteMessageStore::open_in_memory().unwrap();
        let id = Uuid::new_v4();
        let mut message = sample_message(id, epoch_seconds(1_700_000_000));
        message.schedule(epoch_seconds(1_700_000_000)).unwrap();
        store.save(&message).await.unwrap();
        store.claim_due(epoch_seconds(1_700_000_500), 10).await.unwrap();
        store
            .mark_delivery(
                id,
                ChannelKind::Email,
                DeliveryStatus::Delivered,
                Some("ext-1".into()),
                None,
                epoch_seconds(1_700_000_600),
            )
            .await
            .unwrap();
        store
            .mark_delivery(
                id,
                ChannelKind::Email,
                DeliveryStatus::Failed,
                None,
                Some("should not apply".into()),
                epoch_seconds(1_700_000_700),
            )
            .await
            .unwrap();
        let reloaded = store.get(id).await.unwrap().unwrap();
        let email = reloaded
            .deliveries
            .iter()
            .find(|d| d.channel == ChannelKind::Email)
            .unwrap();
        assert_eq!(email.status, DeliveryStatus::Delivered);
        assert_eq!(email.external_ref.as_deref(), Some("ext-1"));
    }

    #[tokio::test]
    async fn functional_reclaim_stale_processing_returns_stuck_rows() {
        let store = SqliteMessageStore::open_in_memory().unwrap();
        let id = Uuid::new_v4();
        let mut message = sample_message(id, epoch_seconds(1_700_000_000));
        message.schedule(epoch_seconds(1_700_000_000)).unwrap();
        store.save(&message).await.unwrap();
        store.claim_due(epoch_seconds(1_700_000_500), 10).await.unwrap();

        let too_soon = store
            .reclaim_stale_processing(epoch_seconds(1_700_000_600), 300, 10)
            .await
            .unwrap();
        assert!(too_soon.is_empty());

        let stale = store
            .reclaim_stale_processing(epoch_seconds(1_700_000_900), 300, 10)
            .await
            .unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].0, id);
    }
}
