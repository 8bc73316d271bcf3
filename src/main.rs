#![forbid(unsafe_code)]

//! `mention-relay`: Slack mention relay binary.
//!
//! Depending on `--role`, runs the Slack listener and HTTP intake that
//! enqueue mentions, the worker that drains the queue through the intent
//! pipeline, or both.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use futures_util::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use mention_relay::config::GlobalConfig;
use mention_relay::dispatch::notion::NotionClient;
use mention_relay::dispatch::{ReplyDispatcher, TaskDispatcher};
use mention_relay::persistence::{db, retention};
use mention_relay::pipeline::llm::build_llm;
use mention_relay::pipeline::IntentPipeline;
use mention_relay::queue::{self, ReceiveOptions};
use mention_relay::relay::consumer::{spawn_consumer, MentionConsumer};
use mention_relay::relay::producer::MentionProducer;
use mention_relay::role::Role;
use mention_relay::slack::client::SlackService;
use mention_relay::slack::ChatPoster;
use mention_relay::{http, AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "mention-relay", about = "Slack mention relay", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Which loops this process runs.
    #[arg(long, value_enum, default_value_t = Role::All)]
    role: Role,

    /// Create the queue and its dead-letter queue before starting.
    #[arg(long)]
    provision_queues: bool,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!(role = ?args.role, "mention-relay bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let mut config = GlobalConfig::load_from_path(&args.config)?;
    config.validate_for_role(args.role)?;
    config.load_credentials(args.role).await?;
    let config = Arc::new(config);
    info!("configuration loaded");

    // ── Queue and Slack clients ─────────────────────────
    let (queue, urls) = queue::build_queue(&config.queue, args.provision_queues).await?;
    info!(primary = %urls.primary, dead_letter = ?urls.dead_letter, "queue ready");

    let slack = Arc::new(SlackService::new(&config.slack)?);
    let chat: Arc<dyn ChatPoster> = Arc::clone(&slack) as Arc<dyn ChatPoster>;

    let ct = CancellationToken::new();
    let mut handles = Vec::new();

    // ── Listener: Socket Mode + HTTP intake ─────────────
    if args.role.runs_listener() {
        let mut producer = MentionProducer::new(
            Arc::clone(&queue),
            Arc::clone(&chat),
            urls.primary.clone(),
            config.queue.delay(),
        );
        if config.slack.acknowledge {
            producer = producer.with_acknowledgement(config.slack.acknowledgement_text.clone());
        }
        let producer = Arc::new(producer);

        handles.push(slack.spawn_socket_mode(Arc::clone(&producer), ct.clone()));

        if config.http_port != 0 {
            let http_ct = ct.clone();
            let port = config.http_port;
            handles.push(tokio::spawn(async move {
                if let Err(err) = http::serve_http(producer, port, http_ct).await {
                    error!(%err, "http intake failed");
                }
            }));
        }
        info!("listener started");
    }

    // ── Worker: consumer + retention ────────────────────
    if args.role.runs_worker() {
        let db = Arc::new(db::connect(&config.database_path).await?);
        info!("database connected");

        handles.push(retention::spawn_retention_task(
            Arc::clone(&db),
            config.retention_days,
            ct.clone(),
        ));

        let pipeline = Arc::new(IntentPipeline::new(build_llm(&config.llm)?));
        let mut consumer = MentionConsumer::new(
            queue,
            urls,
            ReceiveOptions::from_config(&config.queue),
            db,
            pipeline,
            ReplyDispatcher::new(chat),
        )
        .with_reply_in_thread(config.slack.reply_in_thread);
        if config.notion.enabled {
            let notion = NotionClient::new(&config.notion)?;
            consumer = consumer.with_tasks(TaskDispatcher::new(Arc::new(notion)));
        }

        handles.push(spawn_consumer(Arc::new(consumer), ct.clone()));
        info!("worker started");
    }

    // ── Wait for shutdown signal ────────────────────────
    shutdown_signal().await;
    info!("shutdown signal received");
    ct.cancel();

    for joined in join_all(handles).await {
        if let Err(err) = joined {
            error!(%err, "background task panicked");
        }
    }
    info!("mention-relay shut down");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
