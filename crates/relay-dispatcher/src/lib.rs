//! Time-triggered Dispatcher (§4.4): a sweep loop that claims due
//! `Scheduled` messages from `MessageStore` and publishes a trigger event
//! per claim onto `EventLog`. Structure — `tokio::select!` over
//! `sleep(poll_interval)` and a shutdown signal, a per-sweep report struct,
//! `tracing::info!` only when the report is non-trivial — is carried over
//! from the teacher's event-scheduler poll loop
//! (`EventSchedulerRuntime::run`/`poll_once`).

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use relay_core::atomic_io::write_text_atomic;
use relay_core::correlation::CorrelationId;
use relay_core::log_rotation::{append_line_with_rotation, LogRotationPolicy};
use relay_core::time_utils::current_unix_timestamp_ms;
use relay_eventlog::{EventEnvelope, EventLog};
use relay_store::MessageStore;
use relay_types::RelayError;

/// Default staleness threshold for reclaiming rows stuck in `Processing`
/// after a claim whose event publish never completed (§9 Open Question:
/// resolved as next-sweep re-drive rather than a compensating rollback).
pub const DEFAULT_CLAIM_STALE_SECONDS: i64 = 300;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_CLAIM_BATCH_LIMIT: usize = 100;
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub poll_interval: Duration,
    pub claim_batch_limit: usize,
    pub claim_stale_seconds: i64,
    /// Optional path for a local operator-visible heartbeat file, written
    /// atomically after every sweep (mirrors the teacher's
    /// `heartbeat_runtime.rs` state file, minus its self-repair machinery).
    /// `None` disables it; most deployments rely on `tracing` output instead.
    pub heartbeat_path: Option<PathBuf>,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            claim_batch_limit: DEFAULT_CLAIM_BATCH_LIMIT,
            claim_stale_seconds: DEFAULT_CLAIM_STALE_SECONDS,
            heartbeat_path: None,
        }
    }
}

fn heartbeat_events_log_path(state_path: &std::path::Path) -> PathBuf {
    match state_path.extension() {
        Some(_) => state_path.with_extension("events.jsonl"),
        None => state_path.with_file_name(format!(
            "{}.events.jsonl",
            state_path.file_name().and_then(|name| name.to_str()).unwrap_or("dispatcher")
        )),
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub claimed: usize,
    pub reclaimed: usize,
    pub published: usize,
    pub publish_failed: usize,
}

impl SweepReport {
    fn is_trivial(&self) -> bool {
        *self == SweepReport::default()
    }
}

/// Claims due messages and publishes one trigger event per claim. Generic
/// over `MessageStore`/`EventLog` so a test can supply in-memory fakes.
pub struct Dispatcher<S, L> {
    store: Arc<S>,
    event_log: Arc<L>,
    config: DispatcherConfig,
    nonce: std::sync::atomic::AtomicU64,
}

impl<S, L> Dispatcher<S, L>
where
    S: MessageStore,
    L: EventLog,
{
    pub fn new(store: Arc<S>, event_log: Arc<L>, config: DispatcherConfig) -> Self {
        Self {
            store,
            event_log,
            config,
            nonce: std::sync::atomic::AtomicU64::new(0),
        }
    }

    /// Runs the sweep loop until `shutdown` reports `true`. An in-flight
    /// sweep always finishes before the loop exits; no new sweep starts
    /// once shutdown is observed.
    pub async fn run(&self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                return;
            }
            match self.sweep_once(Utc::now()).await {
                Ok(report) if !report.is_trivial() => {
                    tracing::info!(
                        claimed = report.claimed,
                        reclaimed = report.reclaimed,
                        published = report.published,
                        publish_failed = report.publish_failed,
                        "dispatcher sweep"
                    );
                    self.write_heartbeat(&report);
                }
                Ok(report) => self.write_heartbeat(&report),
                Err(error) => {
                    tracing::error!(error = %error, "dispatcher sweep failed");
                }
            }

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        return;
                    }
                }
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }
    }

    /// One claim-then-publish cycle, exposed directly for tests.
    pub async fn sweep_once(&self, now: chrono::DateTime<Utc>) -> Result<SweepReport, RelayError> {
        let mut report = SweepReport::default();

        let due = self
            .store
            .claim_due(now, self.config.claim_batch_limit)
            .await?;
        report.claimed = due.len();

        let stale = self
            .store
            .reclaim_stale_processing(now, self.config.claim_stale_seconds, self.config.claim_batch_limit)
            .await?;
        report.reclaimed = stale.len();

        for (message_id, channels) in due.into_iter().chain(stale) {
            let nonce = self.nonce.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            let correlation_id = CorrelationId::generate(current_unix_timestamp_ms(), nonce);
            let event = EventEnvelope::message_scheduled(message_id, &channels, correlation_id.as_str());
            match self.event_log.publish(&message_id.to_string(), event).await {
                Ok(_) => report.published += 1,
                Err(error) => {
                    report.publish_failed += 1;
                    tracing::warn!(
                        message_id = %message_id,
                        error = %error,
                        "failed to publish dispatcher event; row will be re-driven on staleness"
                    );
                }
            }
        }

        Ok(report)
    }

    /// Best-effort heartbeat write: a disabled or failing heartbeat must
    /// never affect sweep correctness, so errors are logged, not propagated.
    fn write_heartbeat(&self, report: &SweepReport) {
        let Some(state_path) = &self.config.heartbeat_path else {
            return;
        };

        let body = serde_json::json!({
            "last_swept_at_ms": current_unix_timestamp_ms(),
            "claimed": report.claimed,
            "reclaimed": report.reclaimed,
            "published": report.published,
            "publish_failed": report.publish_failed,
        });
        if let Err(error) = write_text_atomic(state_path, &body.to_string()) {
            tracing::warn!(error = %error, path = %state_path.display(), "failed to write dispatcher heartbeat file");
        }

        if !report.is_trivial() {
            let events_path = heartbeat_events_log_path(state_path);
            if let Err(error) =
                append_line_with_rotation(&events_path, &body.to_string(), LogRotationPolicy::from_env())
            {
                tracing::warn!(error = %error, path = %events_path.display(), "failed to append dispatcher heartbeat event");
            }
        }
    }
}
