use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::channel::ChannelKind;
use crate::error::RelayError;
use crate::state_machine;

pub const MAX_CONTENT_TEXT_CHARS: usize = 4096;

/// Immutable value object validated at construction. Mirrors the source's
/// `MessageContent.__post_init__` guard clauses: non-empty trimmed text up
/// to 4096 chars, and an https/s3 media reference when present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageContent {
    pub text: String,
    pub media_ref: Option<String>,
}

impl MessageContent {
    pub fn new(text: impl Into<String>, media_ref: Option<String>) -> Result<Self, RelayError> {
        let text = text.into();
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(RelayError::validation(
                "content.text",
                "message text cannot be empty",
            ));
        }
        if text.chars().count() > MAX_CONTENT_TEXT_CHARS {
            return Err(RelayError::validation(
                "content.text",
                format!("message text cannot exceed {MAX_CONTENT_TEXT_CHARS} characters"),
            ));
        }
        if let Some(media_ref) = &media_ref {
            if !(media_ref.starts_with("https://") || media_ref.starts_with("s3://")) {
                return Err(RelayError::validation(
                    "content.media_ref",
                    "media reference must use the https or s3 scheme",
                ));
            }
        }
        Ok(Self {
            text: trimmed.to_string(),
            media_ref,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Draft,
    Scheduled,
    Processing,
    Delivered,
    PartiallyDelivered,
    Failed,
}

impl MessageStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageStatus::Draft => "draft",
            MessageStatus::Scheduled => "scheduled",
            MessageStatus::Processing => "processing",
            MessageStatus::Delivered => "delivered",
            MessageStatus::PartiallyDelivered => "partially_delivered",
            MessageStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "draft" => Some(MessageStatus::Draft),
            "scheduled" => Some(MessageStatus::Scheduled),
            "processing" => Some(MessageStatus::Processing),
            "delivered" => Some(MessageStatus::Delivered),
            "partially_delivered" => Some(MessageStatus::PartiallyDelivered),
            "failed" => Some(MessageStatus::Failed),
            _ => None,
        }
    }

    /// Terminal statuses are not revisited by the Worker.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            MessageStatus::Delivered | MessageStatus::PartiallyDelivered | MessageStatus::Failed
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    Delivered,
    Failed,
}

impl DeliveryStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "pending",
            DeliveryStatus::Delivered => "delivered",
            DeliveryStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(DeliveryStatus::Pending),
            "delivered" => Some(DeliveryStatus::Delivered),
            "failed" => Some(DeliveryStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, DeliveryStatus::Delivered | DeliveryStatus::Failed)
    }
}

/// Child record of a Message: the attempt history for one (message, channel)
/// pair. I3: once terminal, `status`/`external_ref`/`error` never change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delivery {
    pub channel: ChannelKind,
    pub status: DeliveryStatus,
    pub external_ref: Option<String>,
    pub error: Option<String>,
    pub delivered_at: Option<DateTime<Utc>>,
}

impl Delivery {
    fn pending(channel: ChannelKind) -> Self {
        Self {
            channel,
            status: DeliveryStatus::Pending,
            external_ref: None,
            error: None,
            delivered_at: None,
        }
    }
}

/// Aggregate root: a scheduled multi-channel publication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub owner_id: String,
    pub content: MessageContent,
    pub target_channels: Vec<ChannelKind>,
    pub scheduled_at: DateTime<Utc>,
    pub status: MessageStatus,
    pub recipient_ref: String,
    pub deliveries: Vec<Delivery>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Message {
    /// Constructs a new `Draft` message with one `Pending` delivery per
    /// distinct target channel (I1), rejecting duplicate channels and an
    /// empty channel set.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: Uuid,
        owner_id: impl Into<String>,
        content: MessageContent,
        target_channels: Vec<ChannelKind>,
        scheduled_at: DateTime<Utc>,
        recipient_ref: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<Self, RelayError> {
        let owner_id = owner_id.into();
        if owner_id.trim().is_empty() {
            return Err(RelayError::validation("owner_id", "owner_id cannot be empty"));
        }
        let recipient_ref = recipient_ref.into();
        if recipient_ref.trim().is_empty() {
            return Err(RelayError::validation(
                "recipient_ref",
                "recipient_ref cannot be empty",
            ));
        }
        if target_channels.is_empty() {
            return Err(RelayError::validation(
                "target_channels",
                "at least one target channel is required",
            ));
        }
        let mut seen = std::collections::HashSet::new();
        for channel in &target_channels {
            if !seen.insert(*channel) {
                return Err(RelayError::validation(
                    "target_channels",
                    format!("duplicate channel '{channel}' in target_channels"),
                ));
            }
        }
        let deliveries = target_channels.iter().copied().map(Delivery::pending).collect();
        Ok(Self {
            id,
            owner_id,
            content,
            target_channels,
            scheduled_at,
            status: MessageStatus::Draft,
            recipient_ref,
            deliveries,
            created_at: now,
            updated_at: now,
        })
    }

    /// `Draft -> Scheduled` (§4.9). I5: every delivery starts `Pending`.
    pub fn schedule(&mut self, now: DateTime<Utc>) -> Result<(), RelayError> {
        self.status = state_machine::schedule(self.status)?;
        self.updated_at = now;
        Ok(())
    }

    /// `Scheduled -> Processing` on a successful Dispatcher claim.
    pub fn mark_claimed(&mut self, now: DateTime<Utc>) -> Result<(), RelayError> {
        self.status = state_machine::claim(self.status)?;
        self.updated_at = now;
        Ok(())
    }

    /// Applies a terminal outcome to the named channel's delivery and
    /// re-derives the aggregate `status` (§4.9). Idempotent against replays:
    /// once the target delivery is terminal, a repeat call is a no-op
    /// rather than an error, since I3 forbids overwriting it and the Worker
    /// relies on that to stay inert on duplicate events (P8).
    pub fn apply_delivery_outcome(
        &mut self,
        channel: ChannelKind,
        outcome: DeliveryStatus,
        external_ref: Option<String>,
        error: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), RelayError> {
        if !outcome.is_terminal() {
            return Err(RelayError::invariant(
                "apply_delivery_outcome requires a terminal outcome",
            ));
        }
        let delivery = self
            .deliveries
            .iter_mut()
            .find(|delivery| delivery.channel == channel)
            .ok_or_else(|| {
                RelayError::invariant(format!("no delivery row for channel '{channel}'"))
            })?;
        if delivery.status.is_terminal() {
            return Ok(());
        }
        delivery.status = state_machine::apply_delivery_transition(delivery.status, outcome)?;
        delivery.external_ref = external_ref;
        delivery.error = error;
        delivery.delivered_at = (outcome == DeliveryStatus::Delivered).then_some(now);

        self.status = state_machine::derive_message_status(
            self.deliveries.iter().map(|delivery| delivery.status),
        );
        self.updated_at = now;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_id() -> Uuid {
        Uuid::parse_str("00000000-0000-0000-0000-000000000001").unwrap()
    }

    #[test]
    fn unit_content_rejects_empty_text() {
        let error = MessageContent::new("   ", None).unwrap_err();
        assert_eq!(error.category(), "validation");
    }

    #[test]
    fn unit_content_rejects_oversized_text() {
        let text = "x".repeat(MAX_CONTENT_TEXT_CHARS + 1);
        assert!(MessageContent::new(text, None).is_err());
    }

    #[test]
    fn unit_content_rejects_non_https_s3_media_ref() {
        let error = MessageContent::new("hi", Some("ftp://example.com/a.png".into())).unwrap_err();
        assert_eq!(error.category(), "validation");
    }

    #[test]
    fn unit_content_accepts_s3_media_ref() {
        MessageContent::new("hi", Some("s3://bucket/key.png".into())).unwrap();
    }

    #[test]
    fn unit_message_new_rejects_duplicate_channels() {
        let now = Utc::now();
        let content = MessageContent::new("hi", None).unwrap();
        let result = Message::new(
            sample_id(),
            "owner-1",
            content,
            vec![ChannelKind::Email, ChannelKind::Email],
            now,
            "owner@example.com",
            now,
        );
        assert!(result.is_err());
    }

    #[test]
    fn unit_message_new_seeds_one_pending_delivery_per_channel() {
        let now = Utc::now();
        let content = MessageContent::new("hi", None).unwrap();
        let message = Message::new(
            sample_id(),
            "owner-1",
            content,
            vec![ChannelKind::Email, ChannelKind::Sms],
            now,
            "owner@example.com",
            now,
        )
        .unwrap();
        assert_eq!(message.deliveries.len(), 2);
        assert!(message
            .deliveries
            .iter()
            .all(|delivery| delivery.status == DeliveryStatus::Pending));
        assert_eq!(message.status, MessageStatus::Draft);
    }

    #[test]
    fn functional_apply_delivery_outcome_is_idempotent_after_terminal() {
        let now = Utc::now();
        let content = MessageContent::new("hi", None).unwrap();
        let mut message = Message::new(
            sample_id(),
            "owner-1",
            content,
            vec![ChannelKind::Email],
            now,
            "owner@example.com",
            now,
        )
        .unwrap();
        message.schedule(now).unwrap();
        message.mark_claimed(now).unwrap();
        message
            .apply_delivery_outcome(ChannelKind::Email, DeliveryStatus::Delivered, Some("ext-1".into()), None, now)
            .unwrap();
        assert_eq!(message.status, MessageStatus::Delivered);

        let later = now + chrono::Duration::seconds(5);
        message
            .apply_delivery_outcome(
                ChannelKind::Email,
                DeliveryStatus::Failed,
                None,
                Some("late retry".into()),
                later,
            )
            .unwrap();
        let delivery = &message.deliveries[0];
        assert_eq!(delivery.status, DeliveryStatus::Delivered);
        assert_eq!(delivery.external_ref.as_deref(), Some("ext-1"));
        assert_eq!(message.updated_at, now);
    }

    #[test]
    fn regression_schedule_rejects_non_draft_origin() {
        let now = Utc::now();
        let content = MessageContent::new("hi", None).unwrap();
        let mut message = Message::new(
            sample_id(),
            "owner-1",
            content,
            vec![ChannelKind::Email],
            now,
            "owner@example.com",
            now,
        )
        .unwrap();
        message.schedule(now).unwrap();
        assert!(message.schedule(now).is_err());
    }
}
