mod config;
mod error;
mod exiftool;
mod geocode;
mod mapping;
mod pipeline;

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "photo-geocoder",
    version,
    about = "Reverse geocoder for photos — resolve embedded GPS coordinates to place names and write them back as MWG metadata tags"
)]
struct Cli {
    /// File patterns to reverse geocode (globs are expanded by the tool)
    #[arg(value_name = "PATTERN")]
    patterns: Vec<String>,

    /// Path to config file (default: config.json next to binary)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Initialize a default config.json and exit
    #[arg(long)]
    init: bool,

    /// Preview changes without writing to files
    #[arg(long)]
    dry_run: bool,

    /// Output per-file results as JSON
    #[arg(long)]
    json: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    // Handle --init
    if cli.init {
        let config = config::Config::default();
        let path = cli.config.as_deref();
        config.save(path)?;
        let save_path = match path {
            Some(p) => p.to_path_buf(),
            None => config::Config::config_path()?,
        };
        println!("Default config written to {}", save_path.display());
        return Ok(());
    }

    // Load config
    let mut config = config::Config::load(cli.config.as_deref())?;

    // Override dry_run from CLI flag
    if cli.dry_run {
        config.batch.dry_run = true;
    }

    // Validate inputs
    if cli.patterns.is_empty() {
        anyhow::bail!("No file patterns specified. Use --help for usage.");
    }

    if config.batch.dry_run {
        log::info!("DRY RUN — no files will be modified");
    }

    let summary = pipeline::run_batch(&cli.patterns, &config).await?;

    // JSON output
    if cli.json {
        let json_results: Vec<serde_json::Value> = summary
            .reports
            .iter()
            .map(|r| {
                serde_json::json!({
                    "path": r.path.display().to_string(),
                    "outcome": r.outcome.to_string(),
                })
            })
            .collect();

        println!("{}", serde_json::to_string_pretty(&json_results)?);
    }

    // Summary — individual failures are logged, not raised; the process
    // exits cleanly after every file has been attempted
    log::info!(
        "Done: {} written, {} skipped, {} failed out of {} file(s)",
        summary.written(),
        summary.skipped(),
        summary.failed(),
        summary.total()
    );

    Ok(())
}
