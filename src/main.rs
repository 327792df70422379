use anyhow::{Context, Result};
use clap::Parser;
use feedarr::config::Config;
use feedarr::feed::{FeedWatcher, HttpFeedSource};
use feedarr::ingest::IngestionPipeline;
use feedarr::reconcile::{Reconcile, ReconciliationEngine};
use feedarr::scrape::LinkScraper;
use feedarr::services::{
    DisabledNotifier, DownloadQueue, MediaCatalog, Notifier, NtfyNotifier, QbitClient,
    RadarrClient,
};
use std::path::PathBuf;
use std::sync::Arc;

/// Browser-like UA; some release forums refuse requests without one.
const USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// Get the config directory path (~/.config/feedarr/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("feedarr"))
}

#[derive(Parser, Debug)]
#[command(
    name = "feedarr",
    about = "Queue feed releases in qBittorrent and reconcile them against Radarr"
)]
struct Args {
    /// Config file (default: ~/.config/feedarr/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Poll the feed once and exit
    #[arg(long)]
    once: bool,

    /// Run a single reconciliation pass and exit
    #[arg(long, conflicts_with = "once")]
    reconcile_only: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let config_path = match args.config {
        Some(path) => path,
        None => get_config_dir()?.join("config.toml"),
    };
    let mut config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;
    config.apply_env(|key| std::env::var(key).ok());
    config.validate().context("Invalid configuration")?;
    tracing::debug!(config = ?config, "Effective configuration");

    let client = reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .build()
        .context("Failed to build HTTP client")?;

    let queue: Arc<dyn DownloadQueue> =
        Arc::new(QbitClient::new(client.clone(), config.qbit_settings()));
    let catalog: Arc<dyn MediaCatalog> =
        Arc::new(RadarrClient::new(client.clone(), config.radarr_settings()));
    let notifier: Arc<dyn Notifier> = if config.ntfy.enabled {
        Arc::new(NtfyNotifier::new(
            client.clone(),
            config.ntfy.server.clone(),
            config.ntfy.topic.clone(),
        ))
    } else {
        Arc::new(DisabledNotifier)
    };

    let engine = Arc::new(ReconciliationEngine::new(
        Arc::clone(&queue),
        catalog,
        Arc::clone(&notifier),
        config.reconcile_settings()?,
    ));

    if args.reconcile_only {
        let report = engine.reconcile().await;
        println!(
            "Reconciled: {} deleted, {} started, {} skipped",
            report.size_deleted + report.duplicates_deleted + report.catalog_deleted,
            report.started,
            report.skipped
        );
        return Ok(());
    }

    let scraper = LinkScraper::new(
        client.clone(),
        config.scrape.attachment_pattern.clone(),
        config.retry_policy(),
    );
    let settings = config.ingest_settings();
    let scratch_dir = settings.scratch_dir.clone();
    let pipeline = IngestionPipeline::new(client.clone(), scraper, queue, engine, settings)
        .with_context(|| {
            format!(
                "Failed to create scratch directory '{}': check directory permissions",
                scratch_dir.display()
            )
        })?;

    let source = Arc::new(HttpFeedSource::new(client, config.feed.url.clone()));
    let watcher = Arc::new(FeedWatcher::new(
        source,
        Arc::new(pipeline),
        notifier,
        config.snapshot_path(),
    ));
    tracing::info!(last_seen = %watcher.last_seen(), "Feed watcher initialized");

    if args.once {
        let outcome = watcher.poll().await;
        tracing::info!(outcome = ?outcome, "Single poll finished");
        return Ok(());
    }

    let interval = config.check_interval();
    tracing::info!(
        url = %config.feed.url,
        interval_minutes = config.feed.check_interval_minutes,
        "Starting feed watcher"
    );

    tokio::select! {
        _ = watcher.run(interval) => {}
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for shutdown signal")?;
            tracing::info!("Shutdown requested");
        }
    }

    println!("Goodbye!");
    Ok(())
}
