//! Shared domain types for the omnichannel delivery core: the `Message`/
//! `Delivery` aggregate, `ChannelKind`, the closed `RelayError` taxonomy, the
//! pure status state machine, and idempotency primitives. Every other crate
//! in the workspace depends on this one; it has no I/O of its own.

pub mod channel;
pub mod error;
pub mod idempotency;
pub mod message;
pub mod state_machine;

pub use channel::ChannelKind;
pub use error::RelayError;
pub use idempotency::{IdempotencyKey, IdempotencyRecord, IdempotencyStatus, LockOutcome};
pub use message::{Delivery, DeliveryStatus, Message, MessageContent, MessageStatus};
