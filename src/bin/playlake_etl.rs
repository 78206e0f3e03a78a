//! playlake-etl: Build the song play star schema from raw song and log data
//!
//! Usage:
//!   # Run the mode named in ./etl.toml
//!   playlake-etl
//!
//!   # Run against the object store section of another config
//!   playlake-etl --config prod.toml --mode remote
//!
//!   # Override locations for a one-off local run
//!   playlake-etl --input-song-data data/song_data --input-log-data data/log_data --output-data out
//!
//! Logging is controlled with RUST_LOG (default: info).

// Use MiMalloc allocator for better performance (recommended by simd-json)
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use anyhow::{Context, Result};
use clap::Parser;
use playlake::config::DEFAULT_CONFIG_FILE;
use playlake::{EtlConfig, Locations, RunMode};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "playlake-etl")]
#[command(about = "Build the song play star schema as partitioned Parquet", long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(long, short = 'c', value_name = "PATH", default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Run mode; defaults to the `mode` key of the config file
    #[arg(long, value_enum)]
    mode: Option<RunMode>,

    /// Song catalog location (directory, glob or s3a:// URI)
    #[arg(long, value_name = "LOC")]
    input_song_data: Option<String>,

    /// Event log location (directory, glob or s3a:// URI)
    #[arg(long, value_name = "LOC")]
    input_log_data: Option<String>,

    /// Output root for the five datasets
    #[arg(long, value_name = "LOC")]
    output_data: Option<String>,
}

impl Args {
    fn has_overrides(&self) -> bool {
        self.input_song_data.is_some() || self.input_log_data.is_some() || self.output_data.is_some()
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;
    let mode = args.mode.unwrap_or(config.mode);

    let summary = playlake::run(&config, mode).context("ETL run failed")?;
    for dataset in summary.datasets() {
        info!(
            "{}: {} rows, {} partitions, {} files",
            dataset.destination, dataset.rows, dataset.partitions, dataset.files
        );
    }
    info!(
        "{} of {} songplays matched a catalog song",
        summary.matched_songplays, summary.songplays.rows
    );

    Ok(())
}

/// Load the config file and apply command line overrides
///
/// A missing config file is fine as long as all three locations are given
/// on the command line.
fn load_config(args: &Args) -> Result<EtlConfig> {
    let mut config = if args.config.exists() || !args.has_overrides() {
        EtlConfig::from_file(&args.config)?
    } else {
        EtlConfig::default()
    };
    let mode = args.mode.unwrap_or(config.mode);

    if args.has_overrides() {
        let current = config.locations(mode).ok();
        let pick = |flag: &Option<String>, from_file: Option<&String>, name: &str| {
            flag.clone()
                .or_else(|| from_file.cloned())
                .with_context(|| format!("--{} is required when [{}] is not configured", name, mode))
        };
        let locations = Locations {
            input_song_data: pick(
                &args.input_song_data,
                current.as_ref().map(|l| &l.input_song_data),
                "input-song-data",
            )?,
            input_log_data: pick(
                &args.input_log_data,
                current.as_ref().map(|l| &l.input_log_data),
                "input-log-data",
            )?,
            output_data: pick(
                &args.output_data,
                current.as_ref().map(|l| &l.output_data),
                "output-data",
            )?,
        };
        config.set_locations(mode, locations);
    }

    info!("Configuration: {:?}", config);
    Ok(config)
}
