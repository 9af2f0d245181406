//! LinkedIn UGC Posts API gateway. Grounded on
//! `original_source/worker/src/channels/linkedin.py`: organization-authored
//! share, optional image article when a media reference is present.

use async_trait::async_trait;
use relay_types::{ChannelKind, MessageContent, RelayError};
use serde_json::json;

use crate::adapter::{ChannelAdapter, DeliveryReceipt};
use crate::http::{classify_response, request_error, HttpTransport};

pub struct LinkedInAdapter {
    transport: HttpTransport,
    api_base: String,
    access_token: String,
    organization_id: String,
}

impl LinkedInAdapter {
    pub fn new(
        transport: HttpTransport,
        api_base: impl Into<String>,
        access_token: impl Into<String>,
        organization_id: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            api_base: api_base.into(),
            access_token: access_token.into(),
            organization_id: organization_id.into(),
        }
    }
}

#[async_trait]
impl ChannelAdapter for LinkedInAdapter {
    fn kind(&self) -> ChannelKind {
        ChannelKind::LinkedIn
    }

    async fn send(
        &self,
        _recipient_ref: &str,
        content: &MessageContent,
    ) -> Result<DeliveryReceipt, RelayError> {
        let url = format!("{}/ugcPosts", self.api_base);
        self.transport.guard(self.kind(), &url).await?;

        let mut specific_content = json!({
            "shareCommentary": {"text": content.text},
            "shareMediaCategory": "NONE",
        });
        if let Some(media_ref) = &content.media_ref {
            specific_content["shareMediaCategory"] = json!("IMAGE");
            specific_content["media"] = json!([{"status": "READY", "originalUrl": media_ref}]);
        }
        let payload = json!({
            "author": format!("urn:li:organization:{}", self.organization_id),
            "lifecycleState": "PUBLISHED",
            "specificContent": {"com.linkedin.ugc.ShareContent": specific_content},
            "visibility": {"com.linkedin.ugc.MemberNetworkVisibility": "PUBLIC"},
        });

        let response = self
            .transport
            .client()
            .post(&url)
            .bearer_auth(&self.access_token)
            .header("X-Restli-Protocol-Version", "2.0.0")
            .json(&payload)
            .send()
            .await
            .map_err(|error| request_error(self.kind(), error))?;
        let body = classify_response(self.kind(), response).await?;
        let external_ref = body.get("id").and_then(|id| id.as_str()).map(str::to_string);
        Ok(DeliveryReceipt::new(external_ref))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_kind_is_linkedin() {
        let adapter = LinkedInAdapter::new(
            HttpTransport::default(),
            "https://api.linkedin.com/v2",
            "token",
            "org-1",
        );
        assert_eq!(adapter.kind(), ChannelKind::LinkedIn);
    }
}
