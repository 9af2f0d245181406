//! Delivery Worker (§4.8): one consumer task per `EventLog` shard, each
//! processing records sequentially within its shard while delegating
//! per-channel fan-out to `ChannelRouter`'s own bounded concurrency.
//! Correlation-id restoration, the idempotency check-and-lock gate, and
//! the per-channel outcome write-back follow the original's
//! `worker/src/consumer.py` processing loop step for step.

use std::sync::Arc;

use chrono::Utc;
use relay_channels::{ChannelRouter, PublishRequest};
use relay_core::correlation::{with_correlation_id, CorrelationId};
use relay_eventlog::{EventEnvelope, EventLog, EVENT_TYPE_MESSAGE_SCHEDULED};
use relay_store::{IdempotencyIndex, MessageStore};
use relay_types::{ChannelKind, DeliveryStatus, IdempotencyKey, LockOutcome, RelayError};
use uuid::Uuid;

/// §4.8 step 3's staleness threshold for a `Processing` idempotency record.
pub const DEFAULT_IDEMPOTENCY_STALE_SECONDS: i64 = 300;
pub const DEFAULT_POLL_BATCH: usize = 32;

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub idempotency_stale_seconds: i64,
    pub poll_batch: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            idempotency_stale_seconds: DEFAULT_IDEMPOTENCY_STALE_SECONDS,
            poll_batch: DEFAULT_POLL_BATCH,
        }
    }
}

/// Outcome of processing a single event record, returned for observability
/// and tests; never surfaced to the event log itself (§4.3's record is a
/// trigger, not a work ticket the Worker acknowledges back upstream).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// A `Completed` idempotency record already existed; this record was a
    /// duplicate delivery of an already-processed event.
    Duplicate,
    /// Another worker currently owns this key's non-stale `Processing` lock.
    Contended,
    /// The referenced message no longer exists in the store.
    MessageMissing,
    /// Every channel in the message's target set was delivered.
    Delivered,
    /// At least one channel failed; at least one other delivered.
    PartiallyDelivered,
    /// Every channel failed.
    Failed,
}

fn parse_payload(payload: &serde_json::Value) -> Result<(Uuid, Vec<ChannelKind>), RelayError> {
    let message_id = payload
        .get("message_id")
        .and_then(|value| value.as_str())
        .and_then(|value| Uuid::parse_str(value).ok())
        .ok_or_else(|| RelayError::invariant("event payload missing a valid message_id"))?;
    let channels = payload
        .get("channels")
        .and_then(|value| value.as_array())
        .ok_or_else(|| RelayError::invariant("event payload missing a channels array"))?
        .iter()
        .map(|value| {
            value
                .as_str()
                .and_then(ChannelKind::parse)
                .ok_or_else(|| RelayError::invariant(format!("unrecognized channel in payload: {value}")))
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok((message_id, channels))
}

/// Consumes `EventLog` records and drives message delivery. Generic over
/// its four collaborators so tests can substitute in-memory fakes for all
/// of them.
pub struct Worker<S, I, L, R> {
    store: Arc<S>,
    idempotency: Arc<I>,
    event_log: Arc<L>,
    router: Arc<R>,
    config: WorkerConfig,
}

impl<S, I, L, R> Worker<S, I, L, R>
where
    S: MessageStore,
    I: IdempotencyIndex,
    L: EventLog,
    R: ChannelRouter,
{
    pub fn new(store: Arc<S>, idempotency: Arc<I>, event_log: Arc<L>, router: Arc<R>, config: WorkerConfig) -> Self {
        Self {
            store,
            idempotency,
            event_log,
            router,
            config,
        }
    }

    /// Runs one consumer per `EventLog` partition until `shutdown` reports
    /// `true`. Each partition consumer advances its own cursor and never
    /// touches another partition's records, so ordering within a partition
    /// is preserved.
    pub async fn run(&self, shutdown: tokio::sync::watch::Receiver<bool>) {
        let partitions = self.event_log.partition_count();
        let consumers = (0..partitions).map(|partition| {
            let mut shutdown = shutdown.clone();
            async move {
                let mut cursor: u64 = 0;
                loop {
                    if *shutdown.borrow() {
                        return;
                    }
                    let records = match self.event_log.poll(partition, cursor, self.config.poll_batch).await {
                        Ok(records) => records,
                        Err(error) => {
                            tracing::error!(partition, error = %error, "worker poll failed");
                            Vec::new()
                        }
                    };
                    if records.is_empty() {
                        tokio::select! {
                            changed = shutdown.changed() => {
                                if changed.is_err() || *shutdown.borrow() {
                                    return;
                                }
                            }
                            _ = self.event_log.wait_for_records(partition) => {}
                        }
                        continue;
                    }
                    for (position, envelope) in records {
                        cursor = position + 1;
                        if envelope.event_type != EVENT_TYPE_MESSAGE_SCHEDULED {
                            continue;
                        }
                        match self.process_record(envelope).await {
                            Ok(outcome) => tracing::debug!(partition, position, outcome = ?outcome, "worker processed record"),
                            Err(error) => tracing::error!(partition, position, error = %error, "worker failed to process record"),
                        }
                    }
                }
            }
        });
        futures_util::future::join_all(consumers).await;
    }

    /// Processes one `message.scheduled` record end to end (§4.8 steps 1-8),
    /// with the event's correlation id restored as the ambient id for every
    /// log line and store call made along the way.
    pub async fn process_record(&self, envelope: EventEnvelope) -> Result<RecordOutcome, RelayError> {
        let correlation_id = CorrelationId::new(envelope.correlation_id.clone());
        with_correlation_id(correlation_id, self.process_payload(envelope.payload)).await
    }

    async fn process_payload(&self, payload: serde_json::Value) -> Result<RecordOutcome, RelayError> {
        let (message_id, channels) = parse_payload(&payload)?;
        let key = IdempotencyKey::compute(message_id, &channels);
        let now = Utc::now();

        match self
            .idempotency
            .check_and_lock(&key, now, self.config.idempotency_stale_seconds)
            .await?
        {
            LockOutcome::AlreadyCompleted => return Ok(RecordOutcome::Duplicate),
            LockOutcome::InProgressElsewhere => return Ok(RecordOutcome::Contended),
            LockOutcome::Acquired => {}
        }

        let Some(message) = self.store.get(message_id).await? else {
            self.idempotency
                .mark_failed(&key, Some("message not found".to_string()), now)
                .await?;
            return Ok(RecordOutcome::MessageMissing);
        };

        // The Dispatcher's `claim_due` already transitioned this message to
        // `Processing` atomically at claim time (§4.2); nothing further is
        // needed here to satisfy step 5's "idempotent transition".

        let result = self
            .router
            .route(PublishRequest {
                content: &message.content,
                channels: &message.target_channels,
                recipient_ref: &message.recipient_ref,
            })
            .await;

        let mut delivered_count = 0usize;
        let mut failed_count = 0usize;
        let mut failures = Vec::new();
        for outcome in &result.outcomes {
            let now = Utc::now();
            if outcome.is_delivered() {
                delivered_count += 1;
                self.store
                    .mark_delivery(message.id, outcome.channel, DeliveryStatus::Delivered, outcome.external_ref.clone(), None, now)
                    .await?;
            } else {
                failed_count += 1;
                let error = outcome.error.clone().unwrap_or_else(|| "unknown error".to_string());
                failures.push(format!("{}: {error}", outcome.channel.as_str()));
                self.store
                    .mark_delivery(message.id, outcome.channel, DeliveryStatus::Failed, None, Some(error), now)
                    .await?;
            }
        }

        let now = Utc::now();
        if failed_count == 0 {
            self.idempotency
                .mark_completed(&key, Some(format!("{delivered_count} channel(s) delivered")), now)
                .await?;
            Ok(RecordOutcome::Delivered)
        } else if delivered_count == 0 {
            self.idempotency
                .mark_failed(&key, Some(failures.join("; ")), now)
                .await?;
            Ok(RecordOutcome::Failed)
        } else {
            self.idempotency
                .mark_completed(&key, Some(format!("{delivered_count} delivered, {failed_count} failed")), now)
                .await?;
            Ok(RecordOutcome::PartiallyDelivered)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use relay_channels::{ChannelOutcome, PublishResult};
    use relay_eventlog::InProcessEventLog;
    use relay_store::{InMemoryIdempotencyIndex, SqliteMessageStore};
    use relay_types::{Message, MessageContent};

    struct StubRouter {
        fail_channels: Vec<ChannelKind>,
    }

    #[async_trait]
    impl ChannelRouter for StubRouter {
        async fn route(&self, request: PublishRequest<'_>) -> PublishResult {
            let outcomes = request
                .channels
                .iter()
                .map(|channel| {
                    if self.fail_channels.contains(channel) {
                        ChannelOutcome::failed(*channel, "boom")
                    } else {
                        ChannelOutcome::delivered(*channel, Some("ext-1".to_string()))
                    }
                })
                .collect();
            PublishResult { outcomes }
        }
    }

    async fn seed_message(store: &SqliteMessageStore, channels: Vec<ChannelKind>) -> Uuid {
        let now = Utc::now();
        let id = Uuid::new_v4();
        let mut message = Message::new(
            id,
            "owner-1",
            MessageContent::new("hello", None).unwrap(),
            channels,
            now,
            "owner@example.com",
            now,
        )
        .unwrap();
        message.schedule(now).unwrap();
        message.mark_claimed(now).unwrap();
        store.save(&message).await.unwrap();
        id
    }

    fn scheduled_event(message_id: Uuid, channels: &[ChannelKind]) -> EventEnvelope {
        EventEnvelope::message_scheduled(message_id, channels, "corr-test")
    }

    #[tokio::test]
    async fn functional_process_record_delivers_all_channels() {
        let store = Arc::new(SqliteMessageStore::open_in_memory().unwrap());
        let idempotency = Arc::new(InMemoryIdempotencyIndex::new());
        let event_log = Arc::new(InProcessEventLog::new(1, 16));
        let router = Arc::new(StubRouter { fail_channels: vec![] });

        let channels = vec![ChannelKind::Email, ChannelKind::Sms];
        let message_id = seed_message(&store, channels.clone()).await;
        let worker = Worker::new(store.clone(), idempotency, event_log, router, WorkerConfig::default());

        let outcome = worker
            .process_record(scheduled_event(message_id, &channels))
            .await
            .unwrap();
        assert_eq!(outcome, RecordOutcome::Delivered);

        let reloaded = store.get(message_id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, relay_types::MessageStatus::Delivered);
    }

    #[tokio::test]
    async fn functional_process_record_marks_partially_delivered_on_mixed_outcome() {
        let store = Arc::new(SqliteMessageStore::open_in_memory().unwrap());
        let idempotency = Arc::new(InMemoryIdempotencyIndex::new());
        let event_log = Arc::new(InProcessEventLog::new(1, 16));
        let router = Arc::new(StubRouter {
            fail_channels: vec![ChannelKind::Sms],
        });

        let channels = vec![ChannelKind::Email, ChannelKind::Sms];
        let message_id = seed_message(&store, channels.clone()).await;
        let worker = Worker::new(store.clone(), idempotency, event_log, router, WorkerConfig::default());

        let outcome = worker
            .process_record(scheduled_event(message_id, &channels))
            .await
            .unwrap();
        assert_eq!(outcome, RecordOutcome::PartiallyDelivered);

        let reloaded = store.get(message_id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, relay_types::MessageStatus::PartiallyDelivered);
    }

    #[tokio::test]
    async fn regression_process_record_is_idempotent_against_a_duplicate_event() {
        let store = Arc::new(SqliteMessageStore::open_in_memory().unwrap());
        let idempotency = Arc::new(InMemoryIdempotencyIndex::new());
        let event_log = Arc::new(InProcessEventLog::new(1, 16));
        let router = Arc::new(StubRouter { fail_channels: vec![] });

        let channels = vec![ChannelKind::Email];
        let message_id = seed_message(&store, channels.clone()).await;
        let worker = Worker::new(store.clone(), idempotency, event_log, router, WorkerConfig::default());

        let first = worker.process_record(scheduled_event(message_id, &channels)).await.unwrap();
        let second = worker.process_record(scheduled_event(message_id, &channels)).await.unwrap();
        assert_eq!(first, RecordOutcome::Delivered);
        assert_eq!(second, RecordOutcome::Duplicate);
    }

    #[tokio::test]
    async fn regression_process_record_reports_message_missing() {
        let store = Arc::new(SqliteMessageStore::open_in_memory().unwrap());
        let idempotency = Arc::new(InMemoryIdempotencyIndex::new());
        let event_log = Arc::new(InProcessEventLog::new(1, 16));
        let router = Arc::new(StubRouter { fail_channels: vec![] });
        let worker = Worker::new(store, idempotency, event_log, router, WorkerConfig::default());

        let outcome = worker
            .process_record(scheduled_event(Uuid::new_v4(), &[ChannelKind::Email]))
            .await
            .unwrap();
        assert_eq!(outcome, RecordOutcome::MessageMissing);
    }
}
