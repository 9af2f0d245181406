//! Composition helpers: build the channel adapter set and router from a
//! loaded [`DaemonConfig`]. Kept separate from `main.rs` so the CLI's
//! subcommand handlers stay readable.

use std::sync::Arc;

use async_trait::async_trait;
use relay_channels::{
    AiAugmentedChannelRouter, ChannelAdapter, ChannelRouter, DirectChannelRouter, EmailAdapter, FacebookAdapter,
    HttpTransport, InstagramAdapter, LinkedInAdapter, PassthroughTransformer, PublishRequest, PublishResult,
    SmsAdapter, WhatsAppAdapter,
};
use relay_guardrail::ContentGuardrail;

use crate::config::DaemonConfig;

/// Wraps whichever `ChannelRouter` variant `use_ai_router` selected behind a
/// single concrete type, so `relay-worker`'s `Worker<S, I, L, R>` stays
/// generic over a `Sized` router rather than needing a `?Sized` bound just
/// to host this binary's runtime choice between the two variants.
pub enum RouterHandle {
    Direct(DirectChannelRouter),
    AiAugmented(AiAugmentedChannelRouter),
}

#[async_trait]
impl ChannelRouter for RouterHandle {
    async fn route(&self, request: PublishRequest<'_>) -> PublishResult {
        match self {
            RouterHandle::Direct(router) => router.route(request).await,
            RouterHandle::AiAugmented(router) => router.route(request).await,
        }
    }
}

/// Builds one adapter per channel kind from provider credentials. Channels
/// with no credentials configured still get an adapter — a send attempt
/// against an unconfigured provider surfaces as a `ChannelTransport` error
/// from the provider itself rather than a silently missing channel.
pub fn build_adapters(config: &DaemonConfig) -> Vec<Arc<dyn ChannelAdapter>> {
    let transport = HttpTransport::new(relay_channels::http::DEFAULT_HTTP_TIMEOUT_MS, config.ssrf);
    let providers = &config.providers;
    vec![
        Arc::new(WhatsAppAdapter::new(
            transport.clone(),
            providers.whatsapp_api_base.clone(),
            providers.whatsapp_access_token.clone(),
            providers.whatsapp_phone_number_id.clone(),
        )),
        Arc::new(FacebookAdapter::new(
            transport.clone(),
            providers.facebook_api_base.clone(),
            providers.facebook_access_token.clone(),
            providers.facebook_page_id.clone(),
        )),
        Arc::new(InstagramAdapter::new(
            transport.clone(),
            providers.instagram_api_base.clone(),
            providers.instagram_access_token.clone(),
            providers.instagram_account_id.clone(),
        )),
        Arc::new(LinkedInAdapter::new(
            transport.clone(),
            providers.linkedin_api_base.clone(),
            providers.linkedin_access_token.clone(),
            providers.linkedin_organization_urn.clone(),
        )),
        Arc::new(EmailAdapter::new(
            transport.clone(),
            providers.email_api_base.clone(),
            providers.email_api_key.clone(),
            providers.email_sender_address.clone(),
        )),
        Arc::new(SmsAdapter::new(
            transport,
            providers.sms_api_base.clone(),
            providers.sms_api_key.clone(),
            providers.sms_sender_id.clone(),
        )),
    ]
}

/// Selects Direct vs AI-augmented per `use_ai_router` (§6.4).
pub fn build_router(config: &DaemonConfig) -> Arc<dyn ChannelRouter> {
    let adapters = build_adapters(config);
    if config.use_ai_router {
        Arc::new(AiAugmentedChannelRouter::new(
            adapters,
            Arc::new(PassthroughTransformer),
            ContentGuardrail::new(config.guardrail_strict_mode),
        ))
    } else {
        Arc::new(DirectChannelRouter::new(adapters))
    }
}
