//! Shared SSRF-guarded HTTP request helper used by every provider-backed
//! adapter, carried over from the teacher's outbound dispatcher pattern:
//! build one `reqwest::Client` with a fixed timeout and no automatic
//! redirect following, validate the destination URL through `SsrfGuard`
//! immediately before every send (not just once at construction, since a
//! redirect or a caller-supplied URL could otherwise slip past it), and
//! classify the result into the closed `RelayError` taxonomy.

use std::time::Duration;

use relay_runtime::{SsrfGuard, SsrfProtectionConfig};
use relay_types::{ChannelKind, RelayError};
use reqwest::redirect::Policy;

use crate::adapter::transport_error;

pub const DEFAULT_HTTP_TIMEOUT_MS: u64 = 10_000;

/// Bundles the pieces every HTTP-calling adapter needs so each adapter
/// constructor stays a one-liner.
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    ssrf_guard: SsrfGuard,
}

impl HttpTransport {
    pub fn new(timeout_ms: u64, ssrf: SsrfProtectionConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .redirect(Policy::none())
            .build()
            .expect("reqwest client configuration is always valid");
        Self {
            client,
            ssrf_guard: SsrfGuard::new(ssrf),
        }
    }

    pub async fn guard(&self, kind: ChannelKind, url: &str) -> Result<(), RelayError> {
        self.ssrf_guard
            .parse_and_validate_url(url)
            .await
            .map(|_| ())
            .map_err(|violation| transport_error(kind, violation.to_string()))
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new(DEFAULT_HTTP_TIMEOUT_MS, SsrfProtectionConfig::default())
    }
}

/// Classifies a non-2xx/network `reqwest` failure into a `ChannelTransport`
/// error, mirroring each adapter's `httpx.HTTPStatusError`/generic-exception
/// split in the original.
pub async fn classify_response(
    kind: ChannelKind,
    response: reqwest::Response,
) -> Result<serde_json::Value, RelayError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(transport_error(
            kind,
            format!("provider API error: {} {}", status.as_u16(), body),
        ));
    }
    response
        .json::<serde_json::Value>()
        .await
        .map_err(|error| transport_error(kind, format!("invalid provider response body: {error}")))
}

pub fn request_error(kind: ChannelKind, error: reqwest::Error) -> RelayError {
    transport_error(kind, error.to_string())
}
