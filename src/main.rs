mod catalog;
mod config;
mod orbit;
mod sources;

use std::process::ExitCode;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;

use crate::catalog::{Query, Reconciler, SatelliteRecord};
use crate::config::Config;
use crate::orbit::{find_passes, geodetic_position, propagate};

#[derive(Parser)]
#[command(name = "satintel")]
#[command(about = "Satellite catalog reconciliation and pass prediction")]
struct Cli {
    /// Path to a YAML config file; defaults apply when omitted.
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve a satellite across all configured sources
    Resolve {
        /// NORAD catalog number or satellite name
        query: String,
    },
    /// Search sources for satellites matching a name fragment
    Search { term: String },
    /// Compute a satellite's position at a point in time
    Position {
        query: String,
        /// RFC 3339 timestamp; defaults to now
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },
    /// Predict visible passes over the configured ground station
    Passes {
        query: String,
        /// Search window starting now, e.g. "24h" or "3days"
        #[arg(long, default_value = "24h")]
        duration: humantime::Duration,
        /// Minimum peak elevation in degrees
        #[arg(long, default_value_t = 10.0)]
        min_elevation: f64,
    },
}

#[derive(Serialize)]
struct PositionReport<'a> {
    norad_id: u32,
    name: Option<&'a str>,
    at: DateTime<Utc>,
    state: orbit::StateVector,
    geodetic: orbit::GeodeticPosition,
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let config = match Config::load(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading config: {e}");
            return ExitCode::FAILURE;
        }
    };

    let result = match cli.command {
        Commands::Resolve { query } => resolve(&config, &query).await,
        Commands::Search { term } => search(&config, &term).await,
        Commands::Position { query, at } => position(&config, &query, at).await,
        Commands::Passes {
            query,
            duration,
            min_elevation,
        } => passes(&config, &query, duration.into(), min_elevation).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn reconciler(config: &Config) -> Result<Reconciler, Box<dyn std::error::Error>> {
    let sources = config.build_sources()?;
    Ok(Reconciler::new(sources, config.reconciler_config()))
}

async fn resolve_record(
    config: &Config,
    query: &str,
) -> Result<std::sync::Arc<SatelliteRecord>, Box<dyn std::error::Error>> {
    let query: Query = query.parse()?;
    let reconciler = reconciler(config)?;
    Ok(reconciler.resolve(&query).await?)
}

async fn resolve(config: &Config, query: &str) -> Result<(), Box<dyn std::error::Error>> {
    let record = resolve_record(config, query).await?;
    println!("{}", serde_json::to_string_pretty(&*record)?);
    Ok(())
}

async fn search(config: &Config, term: &str) -> Result<(), Box<dyn std::error::Error>> {
    let reconciler = reconciler(config)?;
    let hits = reconciler.search(term).await?;
    println!("{}", serde_json::to_string_pretty(&hits)?);
    Ok(())
}

async fn position(
    config: &Config,
    query: &str,
    at: Option<DateTime<Utc>>,
) -> Result<(), Box<dyn std::error::Error>> {
    let record = resolve_record(config, query).await?;
    let at = at.unwrap_or_else(Utc::now);
    let state = propagate(&record.elements, at)?;
    let geodetic = geodetic_position(&state, at);
    let report = PositionReport {
        norad_id: record.norad_id,
        name: record.name.as_deref(),
        at,
        state,
        geodetic,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn passes(
    config: &Config,
    query: &str,
    duration: std::time::Duration,
    min_elevation: f64,
) -> Result<(), Box<dyn std::error::Error>> {
    let station = config.ground_station()?;
    let record = resolve_record(config, query).await?;
    let start = Utc::now();
    let end = start + ChronoDuration::from_std(duration)?;
    let windows = find_passes(&record.elements, &station, start, end, min_elevation)?;
    if windows.is_empty() {
        log::info!(
            "no passes above {min_elevation} deg in the next {}",
            humantime::format_duration(duration)
        );
    }
    println!("{}", serde_json::to_string_pretty(&windows)?);
    Ok(())
}
