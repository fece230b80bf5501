use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use vitalwatch::alert::{AlertDispatcher, LogSink};
use vitalwatch::config::MonitorConfig;
use vitalwatch::poller::{run_apply_loop, PollScheduler};
use vitalwatch::registry::MonitorRegistry;
use vitalwatch::settings;
use vitalwatch::store::{spawn_flush_worker, VitalsLog};

#[derive(Parser, Debug)]
#[command(name = "vitalwatch")]
#[command(about = "Monitoring engine for remote pulse-oximeter sensors")]
struct Args {
    /// Path to an optional TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Path of the persisted vitals log (overrides config)
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Path of the saved patient roster (overrides config)
    #[arg(long)]
    roster_file: Option<PathBuf>,

    /// Poll interval in seconds (overrides config)
    #[arg(long)]
    poll_interval: Option<u64>,

    /// Flush interval in seconds (overrides config)
    #[arg(long)]
    flush_interval: Option<u64>,

    /// Add a patient as name=address (repeatable); saved to the roster on
    /// shutdown
    #[arg(short, long = "add", value_name = "NAME=ADDRESS")]
    add: Vec<String>,

    /// Print the persisted log grouped by patient name and exit
    #[arg(long, conflicts_with = "clear_log")]
    report: bool,

    /// Empty the persisted log and exit
    #[arg(long)]
    clear_log: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let mut config = MonitorConfig::load(args.config.as_deref())
        .context("failed to load configuration")?;
    if let Some(path) = args.log_file {
        config.log_file = path;
    }
    if let Some(path) = args.roster_file {
        config.roster_file = path;
    }
    if let Some(secs) = args.poll_interval {
        config.poll_interval_secs = secs;
    }
    if let Some(secs) = args.flush_interval {
        config.flush_interval_secs = secs;
    }

    if args.report {
        return report(&config);
    }
    if args.clear_log {
        let mut log = VitalsLog::open(&config.log_file)?;
        log.clear()?;
        println!("Cleared vitals log: {}", config.log_file.display());
        return Ok(());
    }

    let seed = parse_seed_patients(&args.add)?;
    run_monitor(config, seed).await
}

/// Print the log grouped by patient name (most recent names first).
fn report(config: &MonitorConfig) -> Result<()> {
    let log = VitalsLog::open(&config.log_file)
        .with_context(|| format!("failed to open {}", config.log_file.display()))?;
    let history = log.query_by_name();
    println!("{}", serde_json::to_string_pretty(&history)?);
    Ok(())
}

fn parse_seed_patients(pairs: &[String]) -> Result<Vec<(String, String)>> {
    pairs
        .iter()
        .map(|raw| {
            raw.split_once('=')
                .map(|(name, address)| (name.trim().to_string(), address.trim().to_string()))
                .with_context(|| format!("--add expects name=address, got '{raw}'"))
        })
        .collect()
}

async fn run_monitor(config: MonitorConfig, seed: Vec<(String, String)>) -> Result<()> {
    let registry = Arc::new(MonitorRegistry::new());

    // Restore the saved roster, then any --add patients on top.
    let roster = settings::load_roster(&config.roster_file)
        .with_context(|| format!("failed to load {}", config.roster_file.display()))?;
    for (name, address) in roster {
        registry.add_committed(&name, &address);
    }
    for (name, address) in seed {
        registry.add_committed(&name, &address);
    }

    if registry.is_empty() {
        warn!("no patients configured; add some with --add name=address");
    } else {
        info!(patients = registry.len(), "monitoring started");
    }

    // Per-mutation notifications, logged for diagnosis. A presentation
    // layer would subscribe here instead.
    let mut events = registry.subscribe();
    let events_task = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            debug!(?event, "monitor event");
        }
    });

    let log = VitalsLog::open(&config.log_file)
        .with_context(|| format!("failed to open {}", config.log_file.display()))?;
    let flush = spawn_flush_worker(registry.clone(), log, config.flush_interval());

    let (alert_tx, dispatcher) = AlertDispatcher::channel(Box::new(LogSink), 64);
    let dispatcher_task = tokio::spawn(dispatcher.run());

    let (scheduler, outcomes) =
        PollScheduler::new(registry.clone(), config.poll_interval(), config.poll_timeout())
            .context("failed to build HTTP client")?;
    let scheduler_task = tokio::spawn(scheduler.run());
    let apply_task = tokio::spawn(run_apply_loop(registry.clone(), outcomes, alert_tx));

    tokio::signal::ctrl_c().await?;
    info!("shutting down");

    scheduler_task.abort();
    apply_task.abort();
    dispatcher_task.abort();
    events_task.abort();
    flush.stop().await;

    settings::save_roster(&config.roster_file, &registry.roster())
        .with_context(|| format!("failed to save {}", config.roster_file.display()))?;
    info!(path = %config.roster_file.display(), "roster saved");

    Ok(())
}
