//! `CommandService` (§4.1): the three operations the external HTTP
//! collaborator calls — `schedule`, `get`, `list_channel_kinds`. Grounded in
//! `original_source/api/src/application/commands/schedule_message.py`'s
//! construct-then-persist-then-publish sequence and
//! `api/src/application/queries/get_message.py`'s ownership check.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use relay_core::correlation::current_correlation_id;
use relay_eventlog::{EventEnvelope, EventLog};
use relay_store::MessageStore;
use relay_types::{ChannelKind, Message, MessageContent, RelayError};
use uuid::Uuid;

/// Input to `CommandService::schedule` (§4.1's enumerated constraints are
/// all enforced by `MessageContent::new`/`Message::new`; this type carries
/// no validation logic of its own).
#[derive(Debug, Clone)]
pub struct ScheduleRequest {
    pub owner_id: String,
    pub text: String,
    pub media_ref: Option<String>,
    pub channels: Vec<ChannelKind>,
    pub scheduled_at: DateTime<Utc>,
    pub recipient_ref: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelKindInfo {
    pub kind: ChannelKind,
    pub description: &'static str,
    pub requires_recipient_ref: bool,
    pub requires_media_ref: bool,
}

/// Exposes the delivery core's external command surface over an injected
/// `MessageStore`/`EventLog` pair. Stateless beyond those two collaborators.
pub struct CommandService<S, L> {
    store: Arc<S>,
    event_log: Arc<L>,
}

impl<S, L> CommandService<S, L>
where
    S: MessageStore,
    L: EventLog,
{
    pub fn new(store: Arc<S>, event_log: Arc<L>) -> Self {
        Self { store, event_log }
    }

    /// §4.1 `Schedule`: construct as `Draft`, transition to `Scheduled`,
    /// persist, then publish a trigger event. A publish failure here is not
    /// surfaced to the caller — the message is already durably `Scheduled`,
    /// so the Dispatcher's next sweep re-publishes it (§4.4 step 3,
    /// resolved in favor of re-drive over a compensating rollback).
    pub async fn schedule(&self, request: ScheduleRequest, now: DateTime<Utc>) -> Result<Uuid, RelayError> {
        let content = MessageContent::new(request.text, request.media_ref)?;
        let id = Uuid::new_v4();
        let mut message = Message::new(
            id,
            request.owner_id,
            content,
            request.channels,
            request.scheduled_at,
            request.recipient_ref,
            now,
        )?;
        message.schedule(now)?;
        self.store.save(&message).await?;

        let correlation_id = current_correlation_id().unwrap_or_else(|| id.to_string());
        let event = EventEnvelope::message_scheduled(message.id, &message.target_channels, correlation_id);
        if let Err(error) = self.event_log.publish(&message.id.to_string(), event).await {
            tracing::warn!(
                message_id = %message.id,
                error = %error,
                "failed to publish schedule event; dispatcher sweep will re-drive"
            );
        }

        Ok(id)
    }

    /// §4.1 `Get`: IDOR-safe by construction — a caller who does not own
    /// the message is indistinguishable from a caller who asked for an id
    /// that doesn't exist.
    pub async fn get(&self, id: Uuid, caller_owner_id: &str) -> Result<Option<Message>, RelayError> {
        let Some(message) = self.store.get(id).await? else {
            return Ok(None);
        };
        if message.owner_id != caller_owner_id {
            return Ok(None);
        }
        Ok(Some(message))
    }

    /// §4.1 `ListChannelKinds`: static metadata, no store access.
    pub fn list_channel_kinds(&self) -> Vec<ChannelKindInfo> {
        ChannelKind::ALL
            .into_iter()
            .map(|kind| ChannelKindInfo {
                kind,
                description: kind.description(),
                requires_recipient_ref: kind.requires_recipient_ref(),
                requires_media_ref: kind.requires_media_ref(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_eventlog::InProcessEventLog;
    use relay_store::SqliteMessageStore;
    use relay_types::MessageStatus;

    fn service() -> CommandService<SqliteMessageStore, InProcessEventLog> {
        CommandService::new(
            Arc::new(SqliteMessageStore::open_in_memory().unwrap()),
            Arc::new(InProcessEventLog::new(2, 16)),
        )
    }

    fn sample_request() -> ScheduleRequest {
        ScheduleRequest {
            owner_id: "owner-1".to_string(),
            text: "hello world".to_string(),
            media_ref: None,
            channels: vec![ChannelKind::Email],
            scheduled_at: Utc::now(),
            recipient_ref: "owner@example.com".to_string(),
        }
    }

    #[tokio::test]
    async fn functional_schedule_persists_and_publishes() {
        let service = service();
        let id = service.schedule(sample_request(), Utc::now()).await.unwrap();
        let message = service.get(id, "owner-1").await.unwrap().unwrap();
        assert_eq!(message.status, MessageStatus::Scheduled);
    }

    #[tokio::test]
    async fn regression_get_hides_existence_from_non_owner() {
        let service = service();
        let id = service.schedule(sample_request(), Utc::now()).await.unwrap();
        let result = service.get(id, "someone-else").await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn unit_get_missing_id_is_none() {
        let service = service();
        let result = service.get(Uuid::new_v4(), "owner-1").await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn regression_schedule_rejects_empty_text() {
        let service = service();
        let mut request = sample_request();
        request.text = "   ".to_string();
        let error = service.schedule(request, Utc::now()).await.unwrap_err();
        assert_eq!(error.category(), "validation");
    }

    #[test]
    fn unit_list_channel_kinds_covers_every_variant() {
        let service = service();
        let kinds = service.list_channel_kinds();
        assert_eq!(kinds.len(), ChannelKind::ALL.len());
    }
}
