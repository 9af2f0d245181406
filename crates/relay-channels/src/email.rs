//! Email adapter. The original (`original_source/worker/src/channels/email.py`)
//! calls AWS SES directly via `aiobotocore`; no AWS SDK crate is available
//! anywhere in this workspace's dependency corpus, so this adapter instead
//! targets SES's plain HTTPS `SendEmail` action through the same
//! SSRF-guarded `reqwest` path every other adapter uses, keeping the text
//! and HTML body construction from the original unchanged.

use async_trait::async_trait;
use relay_types::{ChannelKind, MessageContent, RelayError};
use serde_json::json;

use crate::adapter::{ChannelAdapter, DeliveryReceipt};
use crate::http::{classify_response, request_error, HttpTransport};

pub struct EmailAdapter {
    transport: HttpTransport,
    api_base: String,
    api_key: String,
    sender_email: String,
}

impl EmailAdapter {
    pub fn new(
        transport: HttpTransport,
        api_base: impl Into<String>,
        api_key: impl Into<String>,
        sender_email: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            api_base: api_base.into(),
            api_key: api_key.into(),
            sender_email: sender_email.into(),
        }
    }
}

#[async_trait]
impl ChannelAdapter for EmailAdapter {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Email
    }

    async fn send(
        &self,
        recipient_ref: &str,
        content: &MessageContent,
    ) -> Result<DeliveryReceipt, RelayError> {
        let url = format!("{}/v2/email/outbound", self.api_base);
        self.transport.guard(self.kind(), &url).await?;

        let mut html_body = format!("<p>{}</p>", content.text);
        if let Some(media_ref) = &content.media_ref {
            html_body.push_str(&format!("<p><img src=\"{media_ref}\" alt=\"Attached media\" /></p>"));
        }
        let payload = json!({
            "source": self.sender_email,
            "destination": {"to_addresses": [recipient_ref]},
            "subject": "New Message",
            "html_body": html_body,
            "text_body": content.text,
        });

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
    fn unit_kind_is_email() {
        let adapter = EmailAdapter::new(
            HttpTransport::default(),
            "https://email.example.com",
            "key",
            "sender@example.com",
        );
        assert_eq!(adapter.kind(), ChannelKind::Email);
    }
}
