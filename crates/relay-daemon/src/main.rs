//! Composition root for the omnichannel delivery core (§6.4/§6.5). Hosts
//! all three process roles (§5) behind one binary's subcommands: `schedule`/
//! `get`/`list-channels` drive `relay-command`'s `CommandService` directly
//! (the Intake role, absent a separate HTTP edge crate in this workspace),
//! `dispatcher` runs `relay-dispatcher`'s sweep loop, `worker` runs
//! `relay-worker`'s per-shard consumer loop.

mod config;
mod wiring;

use std::sync::Arc;

use clap::{Parser, Subcommand};
use relay_command::{CommandService, ScheduleRequest};
use relay_core::correlation::{with_correlation_id, CorrelationId};
use relay_dispatcher::{Dispatcher, DispatcherConfig};
use relay_eventlog::InProcessEventLog;
use relay_store::{SqliteIdempotencyIndex, SqliteMessageStore};
use relay_types::ChannelKind;
use relay_worker::{Worker, WorkerConfig};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use config::DaemonConfig;

#[derive(Debug, Parser)]
#[command(name = "relay-daemon", about = "Omnichannel delivery core process roles", version)]
struct Cli {
    #[command(subcommand)]
    role: RoleCommand,
}

#[derive(Debug, Subcommand)]
enum RoleCommand {
    /// Schedules a message for delivery (CommandService::schedule).
    Schedule {
        #[arg(long)]
        owner_id: String,
        #[arg(long)]
        text: String,
        #[arg(long)]
        media_ref: Option<String>,
        #[arg(long = "channel", value_delimiter = ',', required = true)]
        channels: Vec<String>,
        #[arg(long)]
        recipient_ref: String,
        /// RFC3339 timestamp; defaults to now if omitted.
        #[arg(long)]
        scheduled_at: Option<String>,
    },
    /// Fetches a message by id, IDOR-safe against `owner_id` (CommandService::get).
    Get {
        #[arg(long)]
        id: Uuid,
        #[arg(long)]
        owner_id: String,
    },
    /// Lists supported channel kinds with descriptive metadata.
    ListChannels,
    /// Runs the Dispatcher sweep loop until interrupted.
    Dispatcher,
    /// Runs the Worker consumer loop until interrupted.
    Worker,
}

fn init_tracing() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

/// Exit codes per §6.5: 0 clean, 1 unrecoverable startup failure, 2 invalid
/// configuration, 130 interrupted.
const EXIT_OK: i32 = 0;
const EXIT_STARTUP_FAILURE: i32 = 1;
const EXIT_INVALID_CONFIG: i32 = 2;
const EXIT_INTERRUPTED: i32 = 130;

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();
    let config = DaemonConfig::from_env();

    let code = match run(cli, config).await {
        Ok(()) => EXIT_OK,
        Err(error) => {
            tracing::error!(error = %error, "relay-daemon exiting with failure");
            match error.downcast_ref::<ConfigError>() {
                Some(_) => EXIT_INVALID_CONFIG,
                None => EXIT_STARTUP_FAILURE,
            }
        }
    };
    std::process::exit(code);
}

#[derive(Debug, thiserror::Error)]
#[error("invalid configuration: {0}")]
struct ConfigError(String);

async fn run(cli: Cli, config: DaemonConfig) -> anyhow::Result<()> {
    match cli.role {
        RoleCommand::Schedule {
            owner_id,
            text,
            media_ref,
            channels,
            recipient_ref,
            scheduled_at,
        } => run_schedule(&config, owner_id, text, media_ref, channels, recipient_ref, scheduled_at).await,
        RoleCommand::Get { id, owner_id } => run_get(&config, id, owner_id).await,
        RoleCommand::ListChannels => run_list_channels(&config),
        RoleCommand::Dispatcher => run_dispatcher(config).await,
        RoleCommand::Worker => run_worker(config).await,
    }
}

fn open_store(config: &DaemonConfig) -> anyhow::Result<Arc<SqliteMessageStore>> {
    Ok(Arc::new(SqliteMessageStore::open(&config.db_path)?))
}

fn open_idempotency(config: &DaemonConfig) -> anyhow::Result<Arc<SqliteIdempotencyIndex>> {
    Ok(Arc::new(SqliteIdempotencyIndex::open(&config.db_path)?))
}

fn parse_channels(raw: &[String]) -> anyhow::Result<Vec<ChannelKind>> {
    raw.iter()
        .map(|value| {
            ChannelKind::parse(value).ok_or_else(|| ConfigError(format!("unrecognized channel '{value}'")).into())
        })
        .collect()
}

#[allow(clippy::too_many_arguments)]
async fn run_schedule(
    config: &DaemonConfig,
    owner_id: String,
    text: String,
    media_ref: Option<String>,
    channels: Vec<String>,
    recipient_ref: String,
    scheduled_at: Option<String>,
) -> anyhow::Result<()> {
    let channels = parse_channels(&channels)?;
    let scheduled_at = match scheduled_at {
        Some(raw) => chrono::DateTime::parse_from_rfc3339(&raw)
            .map(|value| value.with_timezone(&chrono::Utc))
            .map_err(|error| ConfigError(format!("invalid --scheduled-at: {error}")))?,
        None => chrono::Utc::now(),
    };

    let store = open_store(config)?;
    let event_log = Arc::new(InProcessEventLog::default());
    let service = CommandService::new(store, event_log);
    let request = ScheduleRequest {
        owner_id,
        text,
        media_ref,
        channels,
        scheduled_at,
        recipient_ref,
    };
    let correlation_id = CorrelationId::generate(relay_core::time_utils::current_unix_timestamp_ms(), 0);
    let id = with_correlation_id(correlation_id, service.schedule(request, chrono::Utc::now())).await?;
    println!("{id}");
    Ok(())
}

async fn run_get(config: &DaemonConfig, id: Uuid, owner_id: String) -> anyhow::Result<()> {
    let store = open_store(config)?;
    let event_log = Arc::new(InProcessEventLog::default());
    let service = CommandService::new(store, event_log);
    match service.get(id, &owner_id).await? {
        Some(message) => println!("{}", serde_json::to_string_pretty(&message)?),
        None => println!("not_found"),
    }
    Ok(())
}

fn run_list_channels(config: &DaemonConfig) -> anyhow::Result<()> {
    let store = open_store(config)?;
    let event_log = Arc::new(InProcessEventLog::default());
    let service = CommandService::new(store, event_log);
    for info in service.list_channel_kinds() {
        println!("{}\t{}", info.kind.as_str(), info.description);
    }
    Ok(())
}

async fn run_dispatcher(config: DaemonConfig) -> anyhow::Result<()> {
    let store = open_store(&config)?;
    let event_log = Arc::new(InProcessEventLog::default());
    let dispatcher = Dispatcher::new(
        store,
        event_log,
        DispatcherConfig {
            poll_interval: std::time::Duration::from_secs(config.poll_interval_seconds),
            claim_batch_limit: config.batch_size,
            claim_stale_seconds: config.idempotency_stale_seconds,
            heartbeat_path: config.dispatcher_heartbeat_path.clone(),
        },
    );
    run_until_shutdown(config.shutdown_grace_seconds, |shutdown| async move {
        dispatcher.run(shutdown).await;
    })
    .await
}

async fn run_worker(config: DaemonConfig) -> anyhow::Result<()> {
    let store = open_store(&config)?;
    let idempotency = open_idempotency(&config)?;
    let event_log = Arc::new(InProcessEventLog::default());
    let router = wiring::build_router(&config);
    let worker = Worker::new(
        store,
        idempotency,
        event_log,
        router,
        WorkerConfig {
            idempotency_stale_seconds: config.idempotency_stale_seconds,
            ..WorkerConfig::default()
        },
    );
    run_until_shutdown(config.shutdown_grace_seconds, |shutdown| async move {
        worker.run(shutdown).await;
    })
    .await
}

/// Runs `body` until Ctrl-C, then lets it observe `shutdown` and waits up to
/// `grace_seconds` for it to return before reporting an interrupted exit.
async fn run_until_shutdown<F, Fut>(grace_seconds: u64, body: F) -> anyhow::Result<()>
where
    F: FnOnce(tokio::sync::watch::Receiver<bool>) -> Fut,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    let (tx, rx) = tokio::sync::watch::channel(false);
    let handle = tokio::spawn(body(rx));

    tokio::signal::ctrl_c().await.ok();
    tracing::info!("shutdown signal received, waiting for in-flight work to finish");
    let _ = tx.send(true);

    match tokio::time::timeout(std::time::Duration::from_secs(grace_seconds), handle).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(join_error)) => Err(anyhow::anyhow!("worker task panicked: {join_error}")),
        Err(_) => {
            tracing::warn!("grace period elapsed before in-flight work finished");
            std::process::exit(EXIT_INTERRUPTED);
        }
    }
}

