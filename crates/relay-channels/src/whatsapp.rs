//! WhatsApp Business API adapter. Grounded on
//! `original_source/worker/src/channels/whatsapp.py`: text or image+caption,
//! Graph API `POST /{phone_number_id}/messages`.

use async_trait::async_trait;
use relay_types::{ChannelKind, MessageContent, RelayError};
use serde_json::json;

use crate::adapter::{ChannelAdapter, DeliveryReceipt};
use crate::http::{classify_response, request_error, HttpTransport};

pub struct WhatsAppAdapter {
    transport: HttpTransport,
    api_base: String,
    access_token: String,
    phone_number_id: String,
}

impl WhatsAppAdapter {
    pub fn new(
        transport: HttpTransport,
        api_base: impl Into<String>,
        access_token: impl Into<String>,
        phone_number_id: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            api_base: api_base.into(),
            access_token: access_token.into(),
            phone_number_id: phone_number_id.into(),
        }
    }
}

#[async_trait]
impl ChannelAdapter for WhatsAppAdapter {
    fn kind(&self) -> ChannelKind {
        ChannelKind::WhatsApp
    }

    async fn send(
        &self,
        recipient_ref: &str,
        content: &MessageContent,
    ) -> Result<DeliveryReceipt, RelayError> {
        let url = format!("{}/{}/messages", self.api_base, self.phone_number_id);
        self.transport.guard(self.kind(), &url).await?;

        let payload = match &content.media_ref {
            Some(media_ref) => json!({
                "messaging_product": "whatsapp",
                "to": recipient_ref,
                "type": "image",
                "image": {"link": media_ref, "caption": content.text},
            }),
            None => json!({
                "messaging_product": "whatsapp",
                "to": recipient_ref,
                "type": "text",
                "text": {"body": content.text},
            }),
        };

        let response = self
            .transport
            .client()
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(&payload)
            .send()
            .await
            .map_err(|error| request_error(self.kind(), error))?;
        let body = classify_response(self.kind(), response).await?;
        let external_ref = body
            .get("messages")
            .and_then(|messages| messages.get(0))
            .and_then(|first| first.get("id"))
            .and_then(|id| id.as_str())
            .map(str::to_string);
        Ok(DeliveryReceipt::new(external_ref))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_kind_is_whatsapp() {
        let adapter = WhatsAppAdapter::new(
            HttpTransport::default(),
            "https://graph.facebook.com/v20.0",
            "token",
            "12345",
        );
        assert_eq!(adapter.kind(), ChannelKind::WhatsApp);
    }
}
