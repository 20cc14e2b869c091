//! # Energy Stasher
//!
//! Stashes an account's spare TRON energy on a second address for scheduled
//! windows and reclaims it afterwards.
//!
//! Usage:
//!   stasher                                        # Run poll loop + Telegram bot
//!   stasher status                                 # Print tasks and settings
//!   stasher schedule --at "2026-05-01 14:00" --minutes 30
//!   stasher tick                                   # Run a single poll tick

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use stasher_channels::dialog::{TIME_FORMAT, format_offset, is_tx_hash, parse_window};
use stasher_channels::{Operator, TelegramClient, run_operator};
use stasher_core::StasherConfig;
use stasher_scheduler::dispatch::targets_from_config;
use stasher_scheduler::{
    DelegationScheduler, DelegationTask, GrantDetector, PollLoop, SettingsStore, TaskStore,
    run_poll_loop,
};
use stasher_tron::{TronGateway, TronScanFeed};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "stasher",
    version,
    about = "⚡ Energy Stasher: scheduled TRON energy delegation"
)]
struct Cli {
    /// Config file (default ~/.stasher/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the poll loop and the Telegram operator bot
    Run,
    /// Print stored tasks and settings
    Status,
    /// Add a delegation window without the bot
    Schedule {
        /// Local time, `YYYY-MM-DD HH:MM`
        #[arg(long)]
        at: String,
        /// Hold duration in minutes
        #[arg(long)]
        minutes: i64,
        /// Source transaction hash this window belongs to
        #[arg(long)]
        source: Option<String>,
    },
    /// Run one poll tick and exit
    Tick,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "stasher=debug,stasher_core=debug,stasher_scheduler=debug,stasher_tron=debug,stasher_channels=debug"
    } else {
        "stasher=info,stasher_core=info,stasher_scheduler=info,stasher_tron=info,stasher_channels=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    let mut config = match &cli.config {
        Some(path) => StasherConfig::load_from(path),
        None => StasherConfig::load(),
    }
    .context("loading config")?;
    config.apply_env();

    let data_dir = config.data_dir();
    let store = Arc::new(TaskStore::new(&data_dir));
    let settings = Arc::new(SettingsStore::new(&data_dir));

    match cli.command.unwrap_or(Command::Run) {
        Command::Status => status(&config, &store, &settings).await,
        Command::Schedule { at, minutes, source } => {
            schedule(&config, &store, &at, minutes, source).await
        }
        Command::Tick => {
            config.validate()?;
            let mut poll = build_poll_loop(&config, store, settings)?;
            let notifications = poll.tick().await;
            for n in &notifications {
                println!("{} {}", n.title, n.body);
            }
            println!("✅ Tick complete ({} notification(s))", notifications.len());
            Ok(())
        }
        Command::Run => run(config, store, settings).await,
    }
}

fn build_poll_loop(
    config: &StasherConfig,
    store: Arc<TaskStore>,
    settings: Arc<SettingsStore>,
) -> Result<PollLoop> {
    let offset = config.scheduler.offset()?;
    let gateway = Arc::new(TronGateway::from_config(config)?);
    let feed = Arc::new(TronScanFeed::new(&config.tron)?);
    let scheduler = DelegationScheduler::from_config(config, gateway);
    let detector = GrantDetector::from_config(config, feed, offset);
    Ok(PollLoop::new(store, settings, scheduler, detector, offset))
}

async fn run(config: StasherConfig, store: Arc<TaskStore>, settings: Arc<SettingsStore>) -> Result<()> {
    config.validate()?;
    let offset = config.scheduler.offset()?;

    println!("⚡ Energy Stasher v{}", env!("CARGO_PKG_VERSION"));
    println!("   Owner:        {}", config.account.owner_address);
    println!("   Stash target: {}", config.account.target_address);
    println!("   Time zone:    UTC{}", format_offset(&offset));
    println!("   Data:         {}", config.data_dir().display());
    println!(
        "   Monitoring:   {}",
        if settings.load().await.monitoring_enabled { "on" } else { "off" }
    );
    println!();

    let poll = build_poll_loop(&config, store.clone(), settings.clone())?;
    let targets = targets_from_config(&config);
    let poll_handle = tokio::spawn(run_poll_loop(poll, targets, config.scheduler.poll_interval_secs));

    let operator_handle = if config.telegram.enabled {
        let gateway = Arc::new(TronGateway::from_config(&config)?);
        let operator = Operator::new(&config, store, settings, gateway)?;
        let client = TelegramClient::new(config.telegram.bot_token.clone());
        tracing::info!("📱 Telegram operator bot started");
        Some(tokio::spawn(run_operator(client, operator, config.telegram.poll_interval_secs)))
    } else {
        tracing::info!("📱 Telegram disabled, running scheduler only");
        None
    };
    let operator_exit = async move {
        match operator_handle {
            Some(handle) => handle.await,
            None => std::future::pending().await,
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("👋 Shutting down");
            Ok(())
        }
        res = poll_handle => {
            anyhow::bail!("Poll loop exited: {res:?}")
        }
        res = operator_exit => {
            anyhow::bail!("Telegram operator exited: {res:?}")
        }
    }
}

async fn status(config: &StasherConfig, store: &TaskStore, settings: &SettingsStore) -> Result<()> {
    let offset = config.scheduler.offset()?;
    let tasks = store.snapshot().await;
    let settings = settings.load().await;

    println!("📂 {}", store.file().display());
    println!(
        "🔍 Monitoring: {}",
        if settings.monitoring_enabled { "on" } else { "off" }
    );
    if tasks.is_empty() {
        println!("No tasks.");
        return Ok(());
    }
    println!();
    println!("{:<38} {:<17} {:<17} {:<10} SOURCE", "ID", "DELEGATE", "RETURN", "STATE");
    for task in &tasks {
        println!(
            "{:<38} {:<17} {:<17} {:<10} {}",
            task.id,
            task.schedule_time.with_timezone(&offset).format(TIME_FORMAT),
            task.return_time.with_timezone(&offset).format(TIME_FORMAT),
            format!("{:?}", task.state()),
            task.source_tx_id.as_deref().unwrap_or("-"),
        );
    }
    Ok(())
}

async fn schedule(
    config: &StasherConfig,
    store: &TaskStore,
    at: &str,
    minutes: i64,
    source: Option<String>,
) -> Result<()> {
    let offset = config.scheduler.offset()?;
    let now = chrono::Utc::now().with_timezone(&offset);
    let (schedule_time, return_time) =
        parse_window(at, minutes, &offset, now).map_err(|e| anyhow::anyhow!(e))?;

    let mut task = DelegationTask::new(schedule_time, return_time);
    if let Some(hash) = source {
        if !is_tx_hash(&hash) {
            anyhow::bail!("--source must be a 64-character hex transaction hash");
        }
        task = task.from_source(hash.to_lowercase());
    }
    let id = task.id.clone();
    let added = store
        .mutate(|tasks| {
            if task.source_tx_id.is_some() && tasks.iter().any(|t| t.source_tx_id == task.source_tx_id) {
                return (false, false);
            }
            tasks.push(task);
            (true, true)
        })
        .await?;

    if added {
        println!("✅ Scheduled {id}: {at} for {minutes} min (UTC{})", format_offset(&offset));
    } else {
        println!("⚠️  A task for that source transaction already exists.");
    }
    Ok(())
}
