//! SMS adapter. The original (`original_source/worker/src/channels/sms.py`)
//! calls AWS SNS via `aiobotocore`; re-expressed here as an HTTPS SNS
//! `Publish` call over the shared SSRF-guarded transport. Media is not
//! supported natively, so — matching the original exactly — a media
//! reference is appended to the message body as a URL suffix.

use async_trait::async_trait;
use relay_types::{ChannelKind, MessageContent, RelayError};
use serde_json::json;

use crate::adapter::{ChannelAdapter, DeliveryReceipt};
use crate::http::{classify_response, request_error, HttpTransport};

pub struct SmsAdapter {
    transport: HttpTransport,
    api_base: String,
    api_key: String,
    sender_id: Option<String>,
}

impl SmsAdapter {
    pub fn new(
        transport: HttpTransport,
        api_base: impl Into<String>,
        api_key: impl Into<String>,
        sender_id: Option<String>,
    ) -> Self {
        Self {
            transport,
            api_base: api_base.into(),
            api_key: api_key.into(),
            sender_id,
        }
    }
}

#[async_trait]
impl ChannelAdapter for SmsAdapter {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Sms
    }

    async fn send(
        &self,
        recipient_ref: &str,
        content: &MessageContent,
    ) -> Result<DeliveryReceipt, RelayError> {
        let url = format!("{}/v1/sms/publish", self.api_base);
        self.transport.guard(self.kind(), &url).await?;

        let mut message = content.text.clone();
        if let Some(media_ref) = &content.media_ref {
            message.push_str(&format!("\n\nMedia: {media_ref}"));
        }
        let mut payload = json!({
            "phone_number": recipient_ref,
            "message": message,
        });
        if let Some(sender_id) = &self.sender_id {
            payload["sender_id"] = json!(sender_id);
        }

        let response = self
            .transport
            .client()
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|error| request_error(self.kind(), error))?;
        let body = classify_response(self.kind(), response).await?;
        let external_ref = body
            .get("message_id")
            .and_then(|id| id.as_str())
            .map(str::to_string);
        Ok(DeliveryReceipt::new(external_ref))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_kind_is_sms() {
        let adapter = SmsAdapter::new(HttpTransport::default(), "https://sms.example.com", "key", None);
        assert_eq!(adapter.kind(), ChannelKind::Sms);
    }
}
