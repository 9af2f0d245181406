use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::channel::ChannelKind;

/// Content-addressed idempotency key: `sha256(message_id ++ ":" ++
/// sorted(channels).join(","))`, exactly `InMemoryIdempotencyService
/// .generate_key` in the source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    pub fn compute(message_id: Uuid, channels: &[ChannelKind]) -> Self {
        let mut sorted: Vec<&'static str> = channels.iter().map(|channel| channel.as_str()).collect();
        sorted.sort_unstable();
        let input = format!("{message_id}:{}", sorted.join(","));
        let digest = Sha256::digest(input.as_bytes());
        Self(format!("{digest:x}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdempotencyStatus {
    Processing,
    Completed,
    Failed,
}

impl IdempotencyStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            IdempotencyStatus::Processing => "processing",
            IdempotencyStatus::Completed => "completed",
            IdempotencyStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "processing" => Some(IdempotencyStatus::Processing),
            "completed" => Some(IdempotencyStatus::Completed),
            "failed" => Some(IdempotencyStatus::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdempotencyRecord {
    pub key: IdempotencyKey,
    pub status: IdempotencyStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub result: Option<String>,
    pub error: Option<String>,
}

impl IdempotencyRecord {
    pub fn new_processing(key: IdempotencyKey, now: DateTime<Utc>) -> Self {
        Self {
            key,
            status: IdempotencyStatus::Processing,
            created_at: now,
            completed_at: None,
            result: None,
            error: None,
        }
    }

    pub fn is_stale(&self, now: DateTime<Utc>, stale_after_seconds: i64) -> bool {
        self.status == IdempotencyStatus::Processing
            && (now - self.created_at).num_seconds() >= stale_after_seconds
    }
}

/// Decision produced by `check_and_lock` (§4.8 step 3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockOutcome {
    /// A `Completed` record exists: skip processing, ack as a duplicate.
    AlreadyCompleted,
    /// A non-stale `Processing` record exists: another worker owns this key.
    InProgressElsewhere,
    /// No usable record existed (absent, stale `Processing`, or `Failed`):
    /// the caller now holds a fresh `Processing` lock.
    Acquired,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_key_is_order_independent_over_channels() {
        let id = Uuid::nil();
        let a = IdempotencyKey::compute(id, &[ChannelKind::Email, ChannelKind::Sms]);
        let b = IdempotencyKey::compute(id, &[ChannelKind::Sms, ChannelKind::Email]);
        assert_eq!(a, b);
    }

    #[test]
    fn unit_key_differs_by_channel_set() {
        let id = Uuid::nil();
        let a = IdempotencyKey::compute(id, &[ChannelKind::Email]);
        let b = IdempotencyKey::compute(id, &[ChannelKind::Email, ChannelKind::Sms]);
        assert_ne!(a, b);
    }

    #[test]
    fn unit_is_stale_respects_threshold() {
        let now = Utc::now();
        let record = IdempotencyRecord::new_processing(
            IdempotencyKey::compute(Uuid::nil(), &[ChannelKind::Email]),
            now - chrono::Duration::seconds(301),
        );
        assert!(record.is_stale(now, 300));
        let fresh = IdempotencyRecord::new_processing(
            IdempotencyKey::compute(Uuid::nil(), &[ChannelKind::Email]),
            now,
        );
        assert!(!fresh.is_stale(now, 300));
    }
}
