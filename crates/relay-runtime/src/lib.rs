//! Outbound runtime guardrails shared by every HTTP-calling channel adapter.

pub mod ssrf_guard;

pub use ssrf_guard::{SsrfGuard, SsrfProtectionConfig, SsrfViolation};
