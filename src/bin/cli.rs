//! listing-stream CLI
//!
//! Local execution entry point.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use listing_stream::{
    error::Result,
    models::{Config, LogRecord},
    pipeline::{Ingestor, RunOutcome, WatermarkClient},
    services::{ListingExtractor, ListingFetcher},
    storage::{ListingStore, LocalStorage, MemoryStore, bounded},
};

/// listing-stream - emit only listings that are new since the last run
#[derive(Parser, Debug)]
#[command(
    name = "listing-stream",
    version,
    about = "Scrape a listings page into a bounded log and print what is new"
)]
struct Cli {
    /// Path to storage directory holding config and persisted state
    #[arg(short, long, default_value = "storage")]
    storage_dir: PathBuf,

    /// Path to config file (default: {storage_dir}/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch, append new listings and print the delta (default)
    Run {
        /// Use a throwaway in-memory store instead of the storage directory
        #[arg(long)]
        dry_run: bool,
    },

    /// Write the default configuration file
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },

    /// Validate the configuration file
    Validate,

    /// Show watermark and log state
    Info,

    /// Print the newest records of the log
    Tail {
        /// Number of records to print
        #[arg(short = 'n', long, default_value_t = 10)]
        count: usize,
    },
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// One record as a flat JSON object.
fn record_json(record: &LogRecord) -> Result<String> {
    let mut object = serde_json::Map::new();
    object.insert("id".into(), record.id.to_string().into());
    for (key, value) in &record.fields {
        object.insert(key.clone(), value.clone().into());
    }
    Ok(serde_json::to_string(&object)?)
}

fn print_records(records: &[LogRecord]) -> Result<()> {
    for record in records {
        println!("{}", record_json(record)?);
    }
    Ok(())
}

/// Write the default config file.
fn init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        log::warn!(
            "Config already exists at {}. Use --force to overwrite.",
            path.display()
        );
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, Config::default().to_toml()?)?;
    log::info!("Default configuration written to {}", path.display());
    Ok(())
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| cli.storage_dir.join("config.toml"));
    let open_storage = |config: &Config| {
        LocalStorage::with_trim_slack(&cli.storage_dir, config.stream.trim_slack)
    };

    match cli.command.unwrap_or(Command::Run { dry_run: false }) {
        Command::Run { dry_run } => {
            let config = Config::load_or_default(&config_path);
            config.validate()?;

            let store: Arc<dyn ListingStore> = if dry_run {
                log::info!("Dry run: using an empty in-memory store");
                Arc::new(MemoryStore::with_trim_slack(config.stream.trim_slack))
            } else {
                Arc::new(open_storage(&config))
            };

            let ingestor = Ingestor::from_config(store, &config)?;
            let fetcher = ListingFetcher::from_config(&config)?;
            let extractor = ListingExtractor::new(&config.selectors)?;

            let report = ingestor.run(&fetcher, &extractor).await?;
            match &report.outcome {
                RunOutcome::NothingNew => {
                    log::info!("Nothing new (watermark {})", report.stats.new_watermark);
                    println!("nothing new");
                }
                RunOutcome::Delta(records) => print_records(records)?,
            }
            log::info!("Run stats: {}", serde_json::to_string(&report.stats)?);
        }

        Command::Init { force } => init_config(&config_path, force)?,

        Command::Validate => {
            let config = Config::load_or_default(&config_path);
            log::info!("Validating configuration...");
            config.validate()?;
            log::info!("  ✓ Configuration is valid");
            log::info!("  Search URL: {}", config.source.search_url);
            log::info!("  Pages: {}", config.source.pages);
            log::info!("  Stream: {}", config.stream.stream_key);
            log::info!("  Capacity: {}", config.stream.capacity);
            log::info!("  Time zone: {}", config.time.zone()?);
        }

        Command::Info => {
            let config = Config::load_or_default(&config_path);
            let storage = open_storage(&config);
            let timeout = config.stream.store_timeout();
            let watermark = WatermarkClient::new(&storage, &config.stream.watermark_key, timeout)
                .load()
                .await?;
            let stream = config.stream.stream_key.as_str();
            let len = bounded(timeout, "len", storage.len(stream)).await?;
            let newest = bounded(timeout, "tail read", storage.tail(stream, 1)).await?;

            log::info!("Storage: {}", storage.root().display());
            log::info!("Watermark ({}): {}", config.stream.watermark_key, watermark);
            log::info!(
                "Log ({}): {} records, capacity {}",
                stream,
                len,
                config.stream.capacity
            );
            match newest.first() {
                Some(record) => log::info!("Newest record: {}", record.id),
                None => log::info!("Log is empty"),
            }
        }

        Command::Tail { count } => {
            let config = Config::load_or_default(&config_path);
            let storage = open_storage(&config);
            let mut records = bounded(
                config.stream.store_timeout(),
                "tail read",
                storage.tail(&config.stream.stream_key, count),
            )
            .await?;
            records.reverse();
            print_records(&records)?;
        }
    }

    Ok(())
}
