//! `ChannelAdapter` contract (§4.5): one outbound transport per `ChannelKind`.
//! Every adapter receives already-sanitized content from `ContentGuardrail`
//! and is responsible only for shaping and sending the provider request.

use async_trait::async_trait;
use relay_types::{ChannelKind, MessageContent, RelayError};

/// Successful delivery outcome: the provider's own identifier for the
/// created message/post, when it returns one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReceipt {
    pub external_ref: Option<String>,
}

impl DeliveryReceipt {
    pub fn new(external_ref: Option<String>) -> Self {
        Self { external_ref }
    }
}

#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    fn kind(&self) -> ChannelKind;

    /// Sends `content` to `recipient_ref` (interpretation is adapter-specific:
    /// an E.164 phone number, an email address, or ignored entirely for
    /// page/feed-style channels). Returns `RelayError::ChannelTransport` on
    /// any provider or network failure; the caller classifies that as a
    /// terminal `Failed` delivery (§4.9 — no adapter-level retries).
    async fn send(
        &self,
        recipient_ref: &str,
        content: &MessageContent,
    ) -> Result<DeliveryReceipt, RelayError>;
}

pub(crate) fn transport_error(kind: ChannelKind, detail: impl Into<String>) -> RelayError {
    RelayError::channel_transport(kind, detail)
}
