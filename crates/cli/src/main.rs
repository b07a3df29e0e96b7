use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Parser, ValueHint};
use oracle_core::{Height, OracleConfig};
use oracle_ingestion::{BlockCache, DirectorySource};
use oracle_pipeline::{CancelToken, Pipeline, RunBounds};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Estimate the BTC/USD rate from round-amount payments in raw blocks.
///
/// Without a date, height range or block count, analyses yesterday (UTC).
#[derive(Parser, Debug)]
#[command(name = "utxo-oracle", author, version, about)]
struct Args {
    /// Directory of raw block files named `<height>.hex` or `<height>.bin`
    #[arg(long, value_hint = ValueHint::DirPath)]
    blocks_dir: PathBuf,

    /// JSON configuration file; missing sections take defaults
    #[arg(long, value_hint = ValueHint::FilePath)]
    config: Option<PathBuf>,

    /// First height to analyse
    #[arg(long)]
    start_height: Option<u64>,

    /// Last height to analyse
    #[arg(long)]
    end_height: Option<u64>,

    /// Only analyse blocks mined on this UTC day (YYYY-MM-DD)
    #[arg(long, conflicts_with = "all_blocks")]
    date: Option<NaiveDate>,

    /// Analyse the most recent N blocks in the directory
    #[arg(
        long,
        value_parser = clap::value_parser!(u64).range(1..),
        conflicts_with_all = ["start_height", "end_height", "date", "all_blocks"]
    )]
    recent_blocks: Option<u64>,

    /// Analyse every block in the directory
    #[arg(long)]
    all_blocks: bool,

    /// Worker threads (overrides the config file; 0 = available parallelism)
    #[arg(long)]
    workers: Option<usize>,

    /// Where to write the result record
    #[arg(long, default_value = "oracle_result.json", value_hint = ValueHint::FilePath)]
    output: PathBuf,
}

/// Run bounds for `args`, given the heights present in the block directory.
fn resolve_bounds(args: &Args, available: &[Height], today: NaiveDate) -> RunBounds {
    if let Some(count) = args.recent_blocks {
        return RunBounds::recent(available, count as usize);
    }

    let ranged = args.start_height.is_some() || args.end_height.is_some();
    let utc_day = match args.date {
        Some(date) => Some(date),
        None if !ranged && !args.all_blocks => today.pred_opt(),
        None => None,
    };
    RunBounds {
        start_height: args.start_height,
        end_height: args.end_height,
        utc_day,
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => OracleConfig::from_json_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => OracleConfig::default(),
    };
    if let Some(workers) = args.workers {
        config.run.workers = workers;
    }

    let mut source = DirectorySource::open(&args.blocks_dir)
        .with_context(|| format!("opening block directory {}", args.blocks_dir.display()))?;
    let available: Vec<Height> = source.heights().collect();
    let bounds = resolve_bounds(&args, &available, Utc::now().date_naive());
    if let Some(start) = bounds.start_height {
        source = source.starting_at(start);
    }

    let cancel = CancelToken::new();
    cancel
        .cancel_on_interrupt()
        .context("installing Ctrl-C handler")?;

    let mut cache = BlockCache::new(config.run.cache_capacity);
    let pipeline = Pipeline::new(config).context("invalid configuration")?;
    let output = pipeline.run(source, &bounds, &cancel, Some(&mut cache))?;

    let record = output.record();
    record
        .write_to_file(&args.output)
        .with_context(|| format!("writing {}", args.output.display()))?;
    info!(
        blocks = record.heights.len(),
        decode_failures = record.decode_failures,
        output = %args.output.display(),
        "result written"
    );
    if record.cancelled {
        warn!("run was interrupted; the record covers a prefix of the requested blocks");
    }

    match output.consensus.price {
        Some(price) => println!("{price:.2}"),
        None => println!("no consensus price"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["utxo-oracle", "--blocks-dir", "blocks"];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).unwrap()
    }

    fn day(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, m, d).unwrap()
    }

    const AVAILABLE: [Height; 5] = [840_000, 840_001, 840_002, 840_003, 840_004];

    #[test]
    fn test_defaults_to_yesterday() {
        let bounds = resolve_bounds(&args(&[]), &AVAILABLE, day(3, 1));
        assert_eq!(bounds, RunBounds::day(day(2, 29)));
    }

    #[test]
    fn test_recent_blocks() {
        let bounds = resolve_bounds(&args(&["--recent-blocks", "2"]), &AVAILABLE, day(3, 1));
        assert_eq!(bounds, RunBounds::unbounded().with_start(840_003));
    }

    #[test]
    fn test_explicit_bounds_win() {
        let bounds = resolve_bounds(&args(&["--date", "2024-01-02"]), &AVAILABLE, day(3, 1));
        assert_eq!(bounds, RunBounds::day(day(1, 2)));

        let bounds = resolve_bounds(&args(&["--start-height", "840001"]), &AVAILABLE, day(3, 1));
        assert_eq!(bounds, RunBounds::unbounded().with_start(840_001));

        let bounds = resolve_bounds(&args(&["--all-blocks"]), &AVAILABLE, day(3, 1));
        assert_eq!(bounds, RunBounds::unbounded());
    }

    #[test]
    fn test_conflicting_modes_rejected() {
        let parse = |extra: &[&str]| {
            let mut argv = vec!["utxo-oracle", "--blocks-dir", "blocks"];
            argv.extend_from_slice(extra);
            Args::try_parse_from(argv)
        };
        assert!(parse(&["--recent-blocks", "3", "--date", "2024-01-02"]).is_err());
        assert!(parse(&["--recent-blocks", "0"]).is_err());
        assert!(parse(&["--all-blocks", "--date", "2024-01-02"]).is_err());
    }
}
