use thiserror::Error;

use crate::ChannelKind;

/// Closed error taxonomy shared by every process role in the delivery core.
///
/// Categories are independent of any storage or transport's native error
/// type; adapters and repositories map into this set at their boundary so
/// the rest of the pipeline only ever matches on these variants.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RelayError {
    #[error("validation failed for field '{field}': {reason}")]
    Validation { field: String, reason: String },

    #[error("caller is not authorized for this resource")]
    Authorization,

    #[error("transient failure: {0}")]
    Transient(String),

    #[error("content rejected by guardrail: {reason}")]
    GuardrailBlocked { reason: String },

    #[error("channel '{channel:?}' transport failure: {detail}")]
    ChannelTransport { channel: ChannelKind, detail: String },

    #[error("internal invariant violated: {0}")]
    Invariant(String),
}

impl RelayError {
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn transient(reason: impl Into<String>) -> Self {
        Self::Transient(reason.into())
    }

    pub fn invariant(reason: impl Into<String>) -> Self {
        Self::Invariant(reason.into())
    }

    pub fn channel_transport(channel: ChannelKind, detail: impl Into<String>) -> Self {
        Self::ChannelTransport {
            channel,
            detail: detail.into(),
        }
    }

    /// Categorical reason code surfaced in a `Delivery.error` string.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation",
            Self::Authorization => "authorization",
            Self::Transient(_) => "transient",
            Self::GuardrailBlocked { .. } => "guardrail_blocked",
            Self::ChannelTransport { .. } => "channel_transport",
            Self::Invariant(_) => "invariant",
        }
    }
}
