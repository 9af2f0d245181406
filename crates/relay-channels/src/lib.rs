//! Channel transport layer: one `ChannelAdapter` per `ChannelKind` (§4.5)
//! plus the `ChannelRouter` that fans a publish request out across them
//! (§4.6). HTTP-calling adapters share `relay-runtime`'s `SsrfGuard` through
//! `http::HttpTransport`.

pub mod adapter;
pub mod email;
pub mod facebook;
pub mod http;
pub mod instagram;
pub mod linkedin;
pub mod router;
pub mod sms;
pub mod whatsapp;

pub use adapter::{ChannelAdapter, DeliveryReceipt};
pub use email::EmailAdapter;
pub use facebook::FacebookAdapter;
pub use http::HttpTransport;
pub use instagram::InstagramAdapter;
pub use linkedin::LinkedInAdapter;
pub use router::{
    AiAugmentedChannelRouter, ChannelOutcome, ChannelRouter, ContentTransformer, DirectChannelRouter,
    PassthroughTransformer, PublishRequest, PublishResult,
};
pub use sms::SmsAdapter;
pub use whatsapp::WhatsAppAdapter;
