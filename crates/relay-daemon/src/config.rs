//! Environment-variable-backed configuration (§6.4), following the same
//! `std::env::var` + `.filter()` + default pattern as `relay-core`'s
//! `LogRotationPolicy::from_env`. Mirrors the original's per-role
//! `pydantic_settings.Settings` classes (`worker/src/config.py`,
//! `scheduler/src/config.py`) but flattened into one struct since this
//! binary hosts every role behind subcommands rather than separate
//! services.

use std::path::PathBuf;

use relay_runtime::SsrfProtectionConfig;

fn env_string(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn env_opt_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.trim().is_empty())
}

fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|raw| raw.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_i64(name: &str, default: i64) -> i64 {
    std::env::var(name)
        .ok()
        .and_then(|raw| raw.trim().parse::<i64>().ok())
        .unwrap_or(default)
}

fn env_usize(name: &str, default: usize) -> usize {
    std::env::var(name)
        .ok()
        .and_then(|raw| raw.trim().parse::<usize>().ok())
        .unwrap_or(default)
}

fn env_bool(name: &str, default: bool) -> bool {
    std::env::var(name)
        .ok()
        .and_then(|raw| match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            _ => None,
        })
        .unwrap_or(default)
}

/// Scheduling and idempotency tuning shared by the Dispatcher and Worker
/// subcommands (§6.4's table).
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub db_path: PathBuf,
    pub poll_interval_seconds: u64,
    pub batch_size: usize,
    pub idempotency_ttl_seconds: i64,
    pub idempotency_stale_seconds: i64,
    pub guardrail_strict_mode: bool,
    pub use_ai_router: bool,
    pub shutdown_grace_seconds: u64,
    pub ssrf: SsrfProtectionConfig,
    pub providers: ProviderCredentials,
    /// Optional path for the Dispatcher's local heartbeat file. Unset by
    /// default; operators relying on `tracing` output alone never pay for it.
    pub dispatcher_heartbeat_path: Option<PathBuf>,
}

/// Per-channel provider credentials (§6.4's "process-role-specific provider
/// credentials" addendum), each surfaced as an adapter constructor
/// parameter rather than a global per the original's `worker/src/config.py`
/// `meta_access_token`/`linkedin_access_token`/`ses_sender_email`/
/// `sns_sender_id` fields.
#[derive(Debug, Clone)]
pub struct ProviderCredentials {
    pub whatsapp_api_base: String,
    pub whatsapp_access_token: String,
    pub whatsapp_phone_number_id: String,
    pub facebook_api_base: String,
    pub facebook_access_token: String,
    pub facebook_page_id: String,
    pub instagram_api_base: String,
    pub instagram_access_token: String,
    pub instagram_account_id: String,
    pub linkedin_api_base: String,
    pub linkedin_access_token: String,
    pub linkedin_organization_urn: String,
    pub email_api_base: String,
    pub email_api_key: String,
    pub email_sender_address: String,
    pub sms_api_base: String,
    pub sms_api_key: String,
    pub sms_sender_id: Option<String>,
}

impl DaemonConfig {
    pub fn from_env() -> Self {
        Self {
            db_path: PathBuf::from(env_string("RELAY_DB_PATH", "relay.db")),
            poll_interval_seconds: env_u64("RELAY_POLL_INTERVAL_SECONDS", 60),
            batch_size: env_usize("RELAY_BATCH_SIZE", 100),
            idempotency_ttl_seconds: env_i64("RELAY_IDEMPOTENCY_TTL_SECONDS", 86_400),
            idempotency_stale_seconds: env_i64("RELAY_IDEMPOTENCY_STALE_SECONDS", 300),
            guardrail_strict_mode: env_bool("RELAY_GUARDRAIL_STRICT_MODE", false),
            use_ai_router: env_bool("RELAY_USE_AI_ROUTER", false),
            shutdown_grace_seconds: env_u64("RELAY_SHUTDOWN_GRACE_SECONDS", 10),
            ssrf: SsrfProtectionConfig {
                enabled: env_bool("RELAY_SSRF_PROTECTION_ENABLED", true),
                allow_http: env_bool("RELAY_SSRF_ALLOW_HTTP", false),
                allow_private_network: env_bool("RELAY_SSRF_ALLOW_PRIVATE_NETWORK", false),
            },
            providers: ProviderCredentials {
                whatsapp_api_base: env_string("RELAY_WHATSAPP_API_BASE", "https://graph.facebook.com/v19.0"),
                whatsapp_access_token: env_string("RELAY_WHATSAPP_ACCESS_TOKEN", ""),
                whatsapp_phone_number_id: env_string("RELAY_WHATSAPP_PHONE_NUMBER_ID", ""),
                facebook_api_base: env_string("RELAY_FACEBOOK_API_BASE", "https://graph.facebook.com/v19.0"),
                facebook_access_token: env_string("RELAY_FACEBOOK_ACCESS_TOKEN", ""),
                facebook_page_id: env_string("RELAY_FACEBOOK_PAGE_ID", ""),
                instagram_api_base: env_string("RELAY_INSTAGRAM_API_BASE", "https://graph.facebook.com/v19.0"),
                instagram_access_token: env_string("RELAY_INSTAGRAM_ACCESS_TOKEN", ""),
                instagram_account_id: env_string("RELAY_INSTAGRAM_ACCOUNT_ID", ""),
                linkedin_api_base: env_string("RELAY_LINKEDIN_API_BASE", "https://api.linkedin.com/v2"),
                linkedin_access_token: env_string("RELAY_LINKEDIN_ACCESS_TOKEN", ""),
                linkedin_organization_urn: env_string("RELAY_LINKEDIN_ORGANIZATION_URN", ""),
                email_api_base: env_string("RELAY_EMAIL_API_BASE", "https://email.example.com"),
                email_api_key: env_string("RELAY_EMAIL_API_KEY", ""),
                email_sender_address: env_string("RELAY_EMAIL_SENDER_ADDRESS", ""),
                sms_api_base: env_string("RELAY_SMS_API_BASE", "https://sms.example.com"),
                sms_api_key: env_string("RELAY_SMS_API_KEY", ""),
                sms_sender_id: env_opt_string("RELAY_SMS_SENDER_ID"),
            },
            dispatcher_heartbeat_path: env_opt_string("RELAY_DISPATCHER_HEARTBEAT_PATH").map(PathBuf::from),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_env_bool_accepts_common_truthy_and_falsy_spellings() {
        std::env::set_var("RELAY_DAEMON_TEST_BOOL", "yes");
        assert!(env_bool("RELAY_DAEMON_TEST_BOOL", false));
        std::env::set_var("RELAY_DAEMON_TEST_BOOL", "off");
        assert!(!env_bool("RELAY_DAEMON_TEST_BOOL", true));
        std::env::remove_var("RELAY_DAEMON_TEST_BOOL");
        assert!(env_bool("RELAY_DAEMON_TEST_BOOL", true));
    }

    #[test]
    fn unit_from_env_falls_back_to_documented_defaults() {
        let config = DaemonConfig::from_env();
        assert_eq!(config.poll_interval_seconds, 60);
        assert_eq!(config.batch_size, 100);
        assert_eq!(config.idempotency_ttl_seconds, 86_400);
        assert_eq!(config.idempotency_stale_seconds, 300);
    }
}
