use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;

use flight_sync_rs::{PlaybackSession, SampleCache, SessionConfig};

#[derive(Parser, Debug)]
#[command(name = "flight_sync")]
#[command(about = "Flight telemetry / video clock synchronization", long_about = None)]
struct Args {
    /// Merged telemetry CSV (must contain a `timestamp` column)
    #[arg(long, default_value = "merged_data.csv")]
    data: PathBuf,

    /// Correspondence map JSON; a missing file falls back to --offset
    #[arg(long, default_value = "youtube_timestamps.json")]
    mapping: PathBuf,

    /// Session config JSON (markers, offset, limits)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory for the decoded-row cache (disabled when omitted)
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Video start offset in seconds, overrides the config file
    #[arg(long)]
    offset: Option<f64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Row count, columns, time range, bounds and mapping status
    Summary,
    /// Nearest row position for a data-clock timestamp
    Find {
        #[arg(allow_negative_numbers = true)]
        timestamp: f64,
    },
    /// Derived record at a row position
    Row { index: usize },
    /// Data clock → playback clock
    ToPlayback {
        #[arg(allow_negative_numbers = true)]
        timestamp: f64,
    },
    /// Playback clock → data clock
    ToData {
        #[arg(allow_negative_numbers = true)]
        time: f64,
    },
    /// Derived record shown at a playback instant
    AtPlayback {
        #[arg(allow_negative_numbers = true)]
        time: f64,
    },
    /// Positions for a row range, or the complete path
    Path {
        #[arg(long)]
        start: Option<usize>,
        #[arg(long)]
        end: Option<usize>,
    },
    /// Yaw/pitch/roll series in input order
    Attitude {
        /// Worker threads for extraction (1 = sequential)
        #[arg(long, default_value = "1")]
        shards: usize,
    },
    /// Row for a configured marker
    Jump { marker: u32 },
    /// Cache maintenance
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand, Debug)]
enum CacheAction {
    /// Delete cache entries older than the given age
    Prune {
        #[arg(long, default_value = "30")]
        max_age_days: u32,
    },
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn load_config(args: &Args) -> Result<SessionConfig> {
    let mut config = match &args.config {
        Some(path) => SessionConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => SessionConfig::default(),
    };
    if let Some(offset) = args.offset {
        config.start_offset_seconds = offset;
    }
    Ok(config)
}

fn open_cache(args: &Args) -> Result<Option<SampleCache>> {
    args.cache_dir
        .clone()
        .map(SampleCache::new)
        .transpose()
        .context("opening sample cache")
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    if let Command::Cache {
        action: CacheAction::Prune { max_age_days },
    } = &args.command
    {
        let cache = open_cache(&args)?
            .ok_or_else(|| anyhow::anyhow!("cache prune needs --cache-dir"))?;
        let removed = cache.prune_older_than(*max_age_days)?;
        return print_json(&serde_json::json!({ "removed": removed }));
    }

    let config = load_config(&args)?;
    let cache = open_cache(&args)?;
    let session = PlaybackSession::open(&args.data, Some(&args.mapping), config, cache.as_ref())
        .with_context(|| format!("opening {}", args.data.display()))?;

    match &args.command {
        Command::Summary => print_json(&session.summary()),
        Command::Find { timestamp } => {
            print_json(&session.index().find_index_for_timestamp(*timestamp))
        }
        Command::Row { index } => print_json(&session.index().data_at_index(*index)),
        Command::ToPlayback { timestamp } => print_json(&session.playback_time_for(*timestamp)),
        Command::ToData { time } => print_json(&session.data_time_for(*time)),
        Command::AtPlayback { time } => print_json(&session.data_for_playback_time(*time)),
        Command::Path { start, end } => match (start, end) {
            (None, None) => print_json(&session.complete_path()),
            _ => {
                let start = start.unwrap_or(0);
                let end = end.unwrap_or(session.index().len().saturating_sub(1));
                print_json(&session.path_range(start, end))
            }
        },
        Command::Attitude { shards } => {
            print_json(&session.index().attitude_data_sharded(*shards))
        }
        Command::Jump { marker } => print_json(&session.jump_to_marker(*marker)?),
        Command::Cache { .. } => Ok(()),
    }
}
