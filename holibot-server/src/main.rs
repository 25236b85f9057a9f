use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use holibot_core::cache::{BoundedTimedCache, NotificationCache, DEFAULT_CACHE_CAPACITY};
use holibot_core::config::{ConfigStore, FileConfigSource};
use holibot_core::lifecycle::Lifecycle;
use holibot_core::platforms::discord::DiscordPlatform;
use holibot_core::platforms::{MessageChannel, PlatformIntegration};
use holibot_core::repositories::{JsonSentLedger, SentLedger};
use holibot_core::tasks::{
    spawn_holiday_notifier_task, spawn_retraction_sweeper_task, HolidayNotifier,
    RetractionSweeper,
};
use holibot_core::{Clock, SystemClock};

const TOKEN_VAR: &str = "DISCORD_BOT_TOKEN";

#[derive(Parser, Debug, Clone)]
#[command(name = "holibot")]
#[command(author, version, about = "Holibot - posts holiday greetings to a Discord channel and cleans them up")]
struct Args {
    /// Path to the holiday config JSON. Created with defaults if missing.
    #[arg(long, default_value = "holiday_config.json")]
    config: PathBuf,

    /// Where sent-but-not-yet-deleted messages are remembered across restarts.
    #[arg(long, default_value = "holibot_sent.json")]
    ledger: PathBuf,

    /// Run without the on-disk ledger.
    #[arg(long, default_value = "false")]
    no_ledger: bool,

    /// Seconds between holiday checks.
    #[arg(long, default_value_t = 300)]
    poll_secs: u64,

    /// Seconds between deletion sweeps.
    #[arg(long, default_value_t = 3600)]
    sweep_secs: u64,

    /// Minimum seconds between config file checks.
    #[arg(long, default_value_t = 300)]
    reload_debounce_secs: u64,

    #[arg(long, default_value_t = DEFAULT_CACHE_CAPACITY)]
    cache_capacity: usize,

    /// Milliseconds to wait between deletes within one sweep.
    #[arg(long, default_value_t = 1000)]
    delete_spacing_ms: u64,
}

fn init_tracing() -> anyhow::Result<()> {
    let filter = EnvFilter::from_default_env()
        .add_directive("holibot=info".parse().unwrap_or_default())
        .add_directive("holibot_core=info".parse().unwrap_or_default());
    let sub = fmt().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(sub).context("Failed to set global subscriber")?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing()?;
    let args = Args::parse();
    info!(
        "Holibot starting. config={}, ledger={}, poll={}s, sweep={}s",
        args.config.display(),
        if args.no_ledger { "off".to_string() } else { args.ledger.display().to_string() },
        args.poll_secs,
        args.sweep_secs
    );

    if let Err(e) = run(args).await {
        error!("Holibot error: {:?}", e);
        return Err(e);
    }
    info!("Main finished. Goodbye!");
    Ok(())
}

async fn run(args: Args) -> anyhow::Result<()> {
    let token = match std::env::var(TOKEN_VAR) {
        Ok(t) if !t.trim().is_empty() => t,
        _ => {
            error!("{TOKEN_VAR} is not set; nothing to do.");
            return Ok(());
        }
    };

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let config = Arc::new(ConfigStore::open(
        FileConfigSource::new(&args.config),
        clock.clone(),
        Duration::from_secs(args.reload_debounce_secs),
    ));
    let cache: Arc<NotificationCache> =
        Arc::new(BoundedTimedCache::new(args.cache_capacity, clock.clone())?);
    let ledger: Option<Arc<dyn SentLedger>> = if args.no_ledger {
        None
    } else {
        Some(Arc::new(JsonSentLedger::open(&args.ledger)))
    };

    let lifecycle = Arc::new(Lifecycle::new());
    let mut discord = DiscordPlatform::new(token, lifecycle.clone());
    discord.connect().await?;
    let channel: Arc<dyn MessageChannel> = Arc::new(discord.messenger());

    let mut notifier = HolidayNotifier::new(
        config.clone(),
        cache.clone(),
        channel.clone(),
        clock,
        Duration::from_secs(args.poll_secs),
    );
    let mut sweeper = RetractionSweeper::new(
        config,
        cache,
        channel,
        Duration::from_secs(args.sweep_secs),
    )
    .with_delete_spacing(Duration::from_millis(args.delete_spacing_ms));
    if let Some(ledger) = ledger {
        notifier = notifier.with_ledger(ledger.clone());
        sweeper = sweeper.with_ledger(ledger);
    }

    let notifier = Arc::new(notifier);
    notifier.restore().await;

    let notify_handle = spawn_holiday_notifier_task(notifier, lifecycle.clone());
    let sweep_handle = spawn_retraction_sweeper_task(Arc::new(sweeper), lifecycle.clone());

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    info!("Ctrl-C received; shutting down.");
    lifecycle.shutdown();

    for (name, handle) in [("notifier", notify_handle), ("sweeper", sweep_handle)] {
        if let Err(e) = handle.await {
            warn!("{name} task ended abnormally: {e}");
        }
    }
    discord.disconnect().await?;
    Ok(())
}
