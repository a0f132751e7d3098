#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Command-line orchestrator for the collision data pipeline.
//!
//! Each pipeline stage (ingest, clean, verify, gold, report) is a
//! subcommand; `run` chains them all. Uses `indicatif-log-bridge` (via
//! [`nyc_collisions_cli_utils::init_logger`]) so that log lines and
//! progress bars never fight for the terminal.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};

use nyc_collisions_clean::{CleanConfig, DataCleaner};
use nyc_collisions_cli_utils::{IndicatifProgress, MultiProgress};
use nyc_collisions_gold::{AggregationEngine, GoldConfig};
use nyc_collisions_ingest::{IngestConfig, Ingestor};
use nyc_collisions_report::{ChartRenderer, ReportConfig};
use nyc_collisions_source::{COLLISIONS_API_URL, PageFetcher, SourceConfig};
use nyc_collisions_store::{StoreConfig, StoreGateway};

#[derive(Parser)]
#[command(name = "nyc-collisions", about = "NYC vehicle collision data pipeline")]
struct Cli {
    /// Directory holding the store's database file.
    #[arg(long, default_value = "data", global = true)]
    data_dir: PathBuf,

    /// Database name within the data directory.
    #[arg(long, default_value = "nyc_collisions", global = true)]
    database: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch raw collision records from NYC Open Data into the raw collection.
    Ingest(IngestArgs),
    /// Clean the raw collection into the deduplicated clean collection.
    Clean(CleanArgs),
    /// Compare raw and clean collection counts.
    Verify,
    /// Compute the gold-layer aggregations from the clean collection.
    Gold(GoldArgs),
    /// Render PNG charts from the gold collections.
    Report(ReportArgs),
    /// Run the full pipeline: ingest, clean, verify, gold, report.
    Run(RunArgs),
    /// Drop every collection and remove rendered charts.
    Reset(ReportArgs),
}

#[derive(clap::Args)]
struct IngestArgs {
    /// Stop once this many records have been stored.
    #[arg(long, default_value_t = 100_000)]
    target: u64,

    /// Records requested per API page.
    #[arg(long, default_value_t = 50_000)]
    page_size: u64,

    /// Seconds to pause between page fetches.
    #[arg(long, default_value_t = 1)]
    page_delay_secs: u64,

    /// Upstream API URL.
    #[arg(long, default_value = COLLISIONS_API_URL)]
    api_url: String,
}

#[derive(clap::Args)]
struct CleanArgs {
    /// Raw documents processed per batch.
    #[arg(long, default_value_t = 10_000)]
    batch_size: u64,
}

#[derive(clap::Args)]
struct GoldArgs {
    /// Vehicle types kept in the vehicle analysis.
    #[arg(long, default_value_t = 10)]
    top_vehicles: usize,
}

impl GoldArgs {
    fn to_config(&self) -> GoldConfig {
        GoldConfig {
            top_vehicles_limit: self.top_vehicles,
            ..GoldConfig::default()
        }
    }
}

#[derive(clap::Args, Clone)]
struct ReportArgs {
    /// Directory the chart PNGs are written into.
    #[arg(long, default_value = "plots")]
    output_dir: PathBuf,
}

#[derive(clap::Args)]
struct RunArgs {
    #[command(flatten)]
    ingest: IngestArgs,

    #[command(flatten)]
    clean: CleanArgs,

    #[command(flatten)]
    gold: GoldArgs,

    #[command(flatten)]
    report: ReportArgs,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let multi = nyc_collisions_cli_utils::init_logger();

    let store_config = StoreConfig {
        data_dir: cli.data_dir,
        database: cli.database,
        in_memory: false,
    };

    match cli.command {
        Command::Ingest(args) => ingest(&multi, &store_config, &args)?,
        Command::Clean(args) => clean(&multi, &store_config, &args)?,
        Command::Verify => verify(&store_config)?,
        Command::Gold(args) => gold(&multi, &store_config, &args)?,
        Command::Report(args) => report(&store_config, &args)?,
        Command::Run(args) => {
            ingest(&multi, &store_config, &args.ingest)?;
            clean(&multi, &store_config, &args.clean)?;
            verify(&store_config)?;
            gold(&multi, &store_config, &args.gold)?;
            report(&store_config, &args.report)?;
            log::info!("Pipeline complete");
        }
        Command::Reset(args) => reset(&store_config, &args)?,
    }

    Ok(())
}

fn ingest(
    multi: &MultiProgress,
    store_config: &StoreConfig,
    args: &IngestArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let fetcher = PageFetcher::new(SourceConfig {
        api_url: args.api_url.clone(),
        page_size: args.page_size,
    });
    let config = IngestConfig {
        target_docs: args.target,
        page_delay: Duration::from_secs(args.page_delay_secs),
    };

    let mut ingestor = Ingestor::new(StoreGateway::new(store_config.clone()), fetcher, config);
    let progress = IndicatifProgress::records_bar(multi, "Ingesting collision records");
    let outcome = ingestor.run(&progress)?;

    log::info!(
        "Ingested {} of {} fetched records over {} pages ({} total stored)",
        outcome.inserted,
        outcome.fetched,
        outcome.pages,
        outcome.final_count
    );
    Ok(())
}

fn clean(
    multi: &MultiProgress,
    store_config: &StoreConfig,
    args: &CleanArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut cleaner = DataCleaner::new(
        StoreGateway::new(store_config.clone()),
        CleanConfig {
            batch_size: args.batch_size,
        },
    );
    let progress = IndicatifProgress::records_bar(multi, "Cleaning collision records");
    let outcome = cleaner.clean(&progress)?;

    log::info!(
        "Cleaned {} of {} raw records: {} inserted, {} duplicates, {} dropped, {} failed batches",
        outcome.cleaned,
        outcome.total_raw,
        outcome.inserted,
        outcome.duplicates,
        outcome.dropped,
        outcome.failed_batches
    );
    Ok(())
}

fn verify(store_config: &StoreConfig) -> Result<(), Box<dyn std::error::Error>> {
    let mut cleaner = DataCleaner::new(
        StoreGateway::new(store_config.clone()),
        CleanConfig::default(),
    );
    let report = cleaner.verify()?;
    log::info!(
        "Verified: {} raw, {} clean, difference {}",
        report.raw_count,
        report.clean_count,
        report.difference
    );
    Ok(())
}

fn gold(
    multi: &MultiProgress,
    store_config: &StoreConfig,
    args: &GoldArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut engine =
        AggregationEngine::new(StoreGateway::new(store_config.clone()), args.to_config());
    let progress = IndicatifProgress::records_bar(multi, "Computing gold aggregations");
    let summary = engine.run_all(&progress)?;

    log::info!(
        "Gold layer: {} hourly, {} borough, {} vehicle rows from {} clean records",
        summary.hourly_rows,
        summary.borough_rows,
        summary.vehicle_rows,
        summary.clean_count
    );
    Ok(())
}

fn report(
    store_config: &StoreConfig,
    args: &ReportArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut renderer = ChartRenderer::new(
        StoreGateway::new(store_config.clone()),
        ReportConfig {
            output_dir: args.output_dir.clone(),
            ..ReportConfig::default()
        },
    );
    let written = renderer.render_all()?;
    log::info!("Rendered {} charts", written.len());
    Ok(())
}

fn reset(
    store_config: &StoreConfig,
    args: &ReportArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    if args.output_dir.exists() {
        match std::fs::remove_dir_all(&args.output_dir) {
            Ok(()) => log::info!("Removed directory: {}", args.output_dir.display()),
            Err(e) => log::error!(
                "Error removing directory {}: {e}",
                args.output_dir.display()
            ),
        }
    }

    let mut gateway = StoreGateway::new(store_config.clone());
    let complete = gateway.reset_all()?;
    gateway.close();
    if !complete {
        log::warn!("Some collections could not be dropped");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn gold_args_keep_default_batch_size() {
        let cli = Cli::parse_from(["nyc-collisions", "gold", "--top-vehicles", "5"]);
        let Command::Gold(args) = cli.command else {
            panic!("expected the gold subcommand");
        };

        let config = args.to_config();
        assert_eq!(config.top_vehicles_limit, 5);
        assert_eq!(config.batch_size, GoldConfig::default().batch_size);
    }
}
