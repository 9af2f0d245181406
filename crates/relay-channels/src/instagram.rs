//! Instagram Graph API gateway. Grounded on
//! `original_source/worker/src/channels/instagram.py`: a post requires a
//! media reference (I — no text-only posts), delivered as a two-step
//! container-then-publish call.

use async_trait::async_trait;
use relay_types::{ChannelKind, MessageContent, RelayError};

use crate::adapter::{transport_error, ChannelAdapter, DeliveryReceipt};
use crate::http::{classify_response, request_error, HttpTransport};

pub struct InstagramAdapter {
    transport: HttpTransport,
    api_base: String,
    access_token: String,
    account_id: String,
}

impl InstagramAdapter {
    pub fn new(
        transport: HttpTransport,
        api_base: impl Into<String>,
        access_token: impl Into<String>,
        account_id: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            api_base: api_base.into(),
            access_token: access_token.into(),
            account_id: account_id.into(),
        }
    }
}

#[async_trait]
impl ChannelAdapter for InstagramAdapter {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Instagram
    }

    async fn send(
        &self,
        _recipient_ref: &str,
        content: &MessageContent,
    ) -> Result<DeliveryReceipt, RelayError> {
        let Some(media_ref) = &content.media_ref else {
            return Err(transport_error(
                self.kind(),
                "Instagram posts require a media reference",
            ));
        };

        let container_url = format!("{}/{}/media", self.api_base, self.account_id);
        self.transport.guard(self.kind(), &container_url).await?;
        let container_form = vec![
            ("image_url", media_ref.as_str()),
            ("caption", content.text.as_str()),
            ("access_token", self.access_token.as_str()),
        ];
        let container_response = self
            .transport
            .client()
            .post(&container_url)
            .form(&container_form)
            .send()
            .await
            .map_err(|error| request_error(self.kind(), error))?;
        let container_body = classify_response(self.kind(), container_response).await?;
        let container_id = container_body
            .get("id")
            .and_then(|id| id.as_str())
            .ok_or_else(|| transport_error(self.kind(), "media container response missing 'id'"))?
            .to_string();

        let publish_url = format!("{}/{}/media_publish", self.api_base, self.account_id);
        self.transport.guard(self.kind(), &publish_url).await?;
        let publish_form = vec![
            ("creation_id", container_id.as_str()),
            ("access_token", self.access_token.as_str()),
        ];
        let publish_response = self
            .transport
            .client()
            .post(&publish_url)
            .form(&publish_form)
            .send()
            .await
            .map_err(|error| request_error(self.kind(), error))?;
        let publish_body = classify_response(self.kind(), publish_response).await?;
        let external_ref = publish_body
            .get("id")
            .and_then(|id| id.as_str())
            .map(str::to_string);
        Ok(DeliveryReceipt::new(external_ref))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_kind_is_instagram() {
        let adapter = InstagramAdapter::new(
            HttpTransport::default(),
            "https://graph.facebook.com/v20.0",
            "token",
            "account-1",
        );
        assert_eq!(adapter.kind(), ChannelKind::Instagram);
    }

    #[tokio::test]
    async fn regression_send_without_media_ref_is_rejected() {
        let adapter = InstagramAdapter::new(
            HttpTransport::default(),
            "https://graph.facebook.com/v20.0",
            "token",
            "account-1",
        );
        let content = MessageContent::new("no image here", None).unwrap();
        let error = adapter.send("unused", &content).await.unwrap_err();
        assert_eq!(error.category(), "channel_transport");
    }
}
