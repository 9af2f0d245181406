//! Ambient per-request correlation identifier.
//!
//! Mirrors the contextvar-based correlation id carried through the original
//! system's logging middleware: a value set once at the edge of a unit of
//! work (an intake command, a worker record) and implicitly available to
//! every `tracing` call beneath it without being threaded through every
//! function signature.

use std::fmt;

use tokio::task_local;

task_local! {
    static CORRELATION_ID: String;
}

/// Opaque wrapper so a correlation id always round-trips through logging
/// without accidentally being confused for a plain `String` elsewhere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelationId(String);

impl CorrelationId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Generates a correlation id from a millisecond timestamp and a
    /// caller-supplied nonce, avoiding a dependency on a UUID crate for the
    /// common case where callers already have a unique handle (a message id,
    /// an event sequence number).
    pub fn generate(now_unix_ms: u64, nonce: u64) -> Self {
        Self(format!("corr-{now_unix_ms:x}-{nonce:x}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Runs `body` with `id` bound as the ambient correlation id for its
/// duration, restoring the previous (absent) binding once `body` returns.
pub async fn with_correlation_id<F, T>(id: CorrelationId, body: F) -> T
where
    F: std::future::Future<Output = T>,
{
    CORRELATION_ID.scope(id.0, body).await
}

/// Returns the ambient correlation id, or `None` outside a
/// [`with_correlation_id`] scope.
pub fn current_correlation_id() -> Option<String> {
    CORRELATION_ID.try_with(|id| id.clone()).ok()
}
