//! Ordered, partitioned, at-least-once event transport (§4.3).
//!
//! `InProcessEventLog` models the original's Kinesis shard/iterator
//! semantics (`worker/src/consumer.py`: one task per shard, a
//! `ShardIterator` position, `NextShardIterator` advance) without an
//! external broker: a fixed partition count, a hash from `partition_key`
//! to partition, and a per-partition bounded ring buffer that gives a
//! reconnecting consumer replay from its last checkpointed position. A
//! production deployment swaps this crate's implementation for a managed
//! log (Kinesis/Kafka/SQS) behind the same `EventLog` trait.

use std::collections::VecDeque;

use async_trait::async_trait;
use relay_types::RelayError;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, Notify};

pub const DEFAULT_SHARD_COUNT: usize = 4;
pub const DEFAULT_SHARD_BUFFER_CAPACITY: usize = 4096;

pub const EVENT_TYPE_MESSAGE_SCHEDULED: &str = "message.scheduled";
pub const EVENT_TYPE_CERTIFICATION_SUBMITTED: &str = "certification.submitted";

/// Wire record (§6.2). `payload` is left as a JSON value so the Dispatcher
/// only needs to agree on shape with the Worker, not a shared Rust type —
/// mirroring the event's documented role as a trigger, not a payload of
/// record (the Worker re-reads authoritative state from `MessageStore`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EventEnvelope {
    pub event_type: String,
    pub payload: serde_json::Value,
    pub correlation_id: String,
}

impl EventEnvelope {
    pub fn message_scheduled(
        message_id: uuid::Uuid,
        channels: &[relay_types::ChannelKind],
        correlation_id: impl Into<String>,
    ) -> Self {
        Self {
            event_type: EVENT_TYPE_MESSAGE_SCHEDULED.to_string(),
            payload: serde_json::json!({
                "message_id": message_id,
                "channels": channels.iter().map(|c| c.as_str()).collect::<Vec<_>>(),
            }),
            correlation_id: correlation_id.into(),
        }
    }
}

/// Ordered, partitioned, at-least-once event log contract.
#[async_trait]
pub trait EventLog: Send + Sync {
    fn partition_count(&self) -> usize;

    /// Deterministic partition assignment for a partition key; all events
    /// sharing a key (a message id) land on the same partition and are
    /// therefore strictly ordered relative to each other.
    fn partition_for(&self, partition_key: &str) -> usize;

    /// Appends `event` to the partition selected by `partition_key`,
    /// returning its durable position within that partition.
    async fn publish(&self, partition_key: &str, event: EventEnvelope) -> Result<u64, RelayError>;

    /// Returns up to `max_records` records at or after `from_position` on
    /// `partition`, in order. An empty result means "caught up", not EOF.
    async fn poll(
        &self,
        partition: usize,
        from_position: u64,
        max_records: usize,
    ) -> Result<Vec<(u64, EventEnvelope)>, RelayError>;

    /// Resolves once new records may be available on `partition`, or after
    /// an implementation-defined timeout — whichever comes first. Consumers
    /// use this to avoid busy-polling an idle partition.
    async fn wait_for_records(&self, partition: usize);
}

struct PartitionState {
    next_position: u64,
    buffer_start: u64,
    records: VecDeque<(u64, EventEnvelope)>,
}

impl PartitionState {
    fn new() -> Self {
        Self {
            next_position: 0,
            buffer_start: 0,
            records: VecDeque::new(),
        }
    }
}

struct Partition {
    state: Mutex<PartitionState>,
    notify: Notify,
    buffer_capacity: usize,
}

/// In-process partitioned log. Suitable for a single-process deployment or
/// tests; not durable across process restarts.
pub struct InProcessEventLog {
    partitions: Vec<Partition>,
}

impl InProcessEventLog {
    pub fn new(partition_count: usize, buffer_capacity_per_partition: usize) -> Self {
        assert!(partition_count > 0, "partition_count must be positive");
        let partitions = (0..partition_count)
            .map(|_| Partition {
                state: Mutex::new(PartitionState::new()),
                notify: Notify::new(),
                buffer_capacity: buffer_capacity_per_partition,
            })
            .collect();
        Self { partitions }
    }
}

impl Default for InProcessEventLog {
    fn default() -> Self {
        Self::new(DEFAULT_SHARD_COUNT, DEFAULT_SHARD_BUFFER_CAPACITY)
    }
}

fn hash_partition_key(partition_key: &str, partition_count: usize) -> usize {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    partition_key.hash(&mut hasher);
    (hasher.finish() as usize) % partition_count
}

#[async_trait]
impl EventLog for InProcessEventLog {
    fn partition_count(&self) -> usize {
        self.partitions.len()
    }

    fn partition_for(&self, partition_key: &str) -> usize {
        hash_partition_key(partition_key, self.partitions.len())
    }

    async fn publish(&self, partition_key: &str, event: EventEnvelope) -> Result<u64, RelayError> {
        let partition_index = self.partition_for(partition_key);
        let partition = &self.partitions[partition_index];
        let position = {
            let mut state = partition.state.lock().await;
            let position = state.next_position;
            state.next_position += 1;
            state.records.push_back((position, event));
            while state.records.len() > partition.buffer_capacity {
                state.records.pop_front();
                state.buffer_start += 1;
            }
            position
        };
        partition.notify.notify_waiters();
        Ok(position)
    }

    async fn poll(
        &self,
        partition: usize,
        from_position: u64,
        max_records: usize,
    ) -> Result<Vec<(u64, EventEnvelope)>, RelayError> {
        let partition_state = self
            .partitions
            .get(partition)
            .ok_or_else(|| RelayError::invariant(format!("no such partition '{partition}'")))?;
        let state = partition_state.state.lock().await;
        let effective_from = from_position.max(state.buffer_start);
        let skip = (effective_from.saturating_sub(state.buffer_start)) as usize;
        Ok(state
            .records
            .iter()
            .skip(skip)
            .take(max_records)
            .cloned()
            .collect())
    }

    async fn wait_for_records(&self, partition: usize) {
        let Some(partition_state) = self.partitions.get(partition) else {
            return;
        };
        let notified = partition_state.notify.notified();
        tokio::select! {
            _ = notified => {}
            _ = tokio::time::sleep(std::time::Duration::from_millis(500)) => {}
        }
    }
}
