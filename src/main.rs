//! Command-line partitioning of an eddy-covariance site table.
//!
//! # Usage
//!
//! ```bash
//! fluxpart site.csv --config fluxpart.toml \
//!   --output partitioned.csv \
//!   --reference-rates r10.csv \
//!   --model-bank model_bank.json
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use fluxpart::config::Config;
use fluxpart::io::{read_observations, write_model_bank, write_partitioned_fluxes, write_reference_rates};
use std::path::PathBuf;

/// Partition net ecosystem exchange into respiration (TER) and gross primary productivity (GPP)
#[derive(Parser, Debug)]
#[command(name = "fluxpart")]
#[command(version, about)]
struct Args {
    /// Input CSV with timestamp, temperature, radiation and NEE columns
    input: PathBuf,

    /// TOML configuration; defaults are used when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output CSV of the partitioned fluxes
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output CSV of the daily reference rates
    #[arg(long)]
    reference_rates: Option<PathBuf>,

    /// Output JSON of the per-date fit outcomes
    #[arg(long)]
    model_bank: Option<PathBuf>,

    /// Fit dates on a single thread
    #[arg(long)]
    sequential: bool,

    /// Log every per-date outcome
    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,

    /// Only log warnings and errors
    #[arg(short, long)]
    quiet: bool,
}

impl Args {
    fn log_level(&self) -> log::LevelFilter {
        if self.verbose {
            log::LevelFilter::Debug
        } else if self.quiet {
            log::LevelFilter::Warn
        } else {
            log::LevelFilter::Info
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    env_logger::Builder::new()
        .filter_level(args.log_level())
        .parse_default_env()
        .init();

    let mut config = match &args.config {
        Some(path) => Config::from_toml_file(path)?,
        None => Config::default(),
    };
    if args.sequential {
        config.parameters.parallel = false;
    }

    let series = read_observations(&args.input, &config)?;
    let report = fluxpart::run(&series, &config).context("partitioning failed")?;

    let summary = &report.summary;
    println!(
        "Temperature sensitivity E0: median {:.2} K, sd {}, from {} of {} dates",
        summary.median,
        summary
            .standard_deviation
            .map_or("n/a".to_string(), |sd| format!("{:.2} K", sd)),
        summary.n_accepted,
        summary.n_dates
    );
    println!(
        "Reference rate fits accepted on {:.1}% of {} dates",
        100.0 * report.acceptance_fraction(),
        report.model_bank.len()
    );

    if let Some(path) = &args.output {
        write_partitioned_fluxes(path, &report.fluxes)?;
    }
    if let Some(path) = &args.reference_rates {
        write_reference_rates(path, &report.reference_rates)?;
    }
    if let Some(path) = &args.model_bank {
        write_model_bank(path, &report.model_bank)?;
    }
    Ok(())
}
