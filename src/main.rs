use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

use itv_stations::{
    configured_regions, list_localities, list_provinces, logging, open_database, run_regions,
    search_stations, store_status, wipe_store, IngestConfig, RegionCode, StationFilter,
    StationType,
};

#[derive(Parser)]
#[command(name = "itv-stations")]
#[command(about = "Load regional ITV station datasets into a validated SQLite store")]
#[command(version)]
struct Cli {
    /// TOML config file (database, sources, duplicate policy)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Database path, overrides the config file
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the extractors (all configured regions by default, concurrently)
    Load {
        /// Regions to load, comma-separated: gal, cv, cat
        #[arg(long, value_delimiter = ',', value_parser = parse_region)]
        region: Vec<RegionCode>,

        /// Print the run reports as JSON
        #[arg(long)]
        json: bool,
    },
    /// Search stored stations
    Search {
        #[arg(long)]
        locality: Option<String>,
        #[arg(long)]
        postal_code: Option<String>,
        #[arg(long)]
        province: Option<String>,
        /// fixed, mobile or other
        #[arg(long = "type", value_parser = parse_station_type)]
        station_type: Option<StationType>,
        #[arg(long)]
        json: bool,
    },
    /// List provinces, or the localities of one province
    Provinces {
        #[arg(long)]
        province: Option<String>,
    },
    /// Counts of stored stations, provinces and localities
    Status {
        #[arg(long)]
        json: bool,
    },
    /// Delete every stored station, locality and province
    Wipe {
        /// Required, the wipe cannot be undone
        #[arg(long)]
        yes: bool,
    },
}

fn parse_region(value: &str) -> Result<RegionCode, String> {
    match RegionCode::from_code(value) {
        Some(region) if RegionCode::EXTRACTED.contains(&region) => Ok(region),
        _ => Err(format!("unknown region '{}' (expected gal, cv or cat)", value)),
    }
}

fn parse_station_type(value: &str) -> Result<StationType, String> {
    match value.trim().to_lowercase().as_str() {
        "fixed" => Ok(StationType::Fixed),
        "mobile" => Ok(StationType::Mobile),
        "other" => Ok(StationType::Other),
        _ => Err(format!("unknown station type '{}'", value)),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_logging(cli.json_logs);

    let mut config = IngestConfig::load_or_default(cli.config.as_deref())?;
    if let Some(database) = cli.database {
        config.database = database;
    }

    match cli.command {
        Commands::Load { region, json } => run_load(&config, region, json),
        Commands::Search { locality, postal_code, province, station_type, json } => {
            let filter = StationFilter { locality, postal_code, province, station_type };
            run_search(&config, &filter, json)
        }
        Commands::Provinces { province } => run_provinces(&config, province.as_deref()),
        Commands::Status { json } => run_status(&config, json),
        Commands::Wipe { yes } => run_wipe(&config, yes),
    }
}

fn run_load(config: &IngestConfig, regions: Vec<RegionCode>, json: bool) -> Result<()> {
    let regions = if regions.is_empty() { configured_regions(config) } else { regions };
    if regions.is_empty() {
        bail!("No source files configured; add a [sources] table to the config file");
    }

    info!(regions = ?regions, database = %config.database.display(), "loading");
    let reports = run_regions(config, &regions)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        println!("\n📊 Load results");
        println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        for report in &reports {
            let icon = if report.success { "✅" } else { "❌" };
            println!("{} {}", icon, report.summary());
        }
    }

    let failed = reports.iter().filter(|r| !r.success).count();
    if failed > 0 {
        bail!("{} of {} extractor runs failed", failed, reports.len());
    }

    Ok(())
}

fn run_search(config: &IngestConfig, filter: &StationFilter, json: bool) -> Result<()> {
    let conn = open_database(&config.database, config.busy_timeout())?;
    let stations = search_stations(&conn, filter)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stations)?);
        return Ok(());
    }

    println!("🔍 {} stations found", stations.len());
    for station in &stations {
        println!(
            "  {} [{}] {}, {} {}",
            station.name, station.station_type, station.locality, station.province, station.postal_code
        );
    }

    Ok(())
}

fn run_provinces(config: &IngestConfig, province: Option<&str>) -> Result<()> {
    let conn = open_database(&config.database, config.busy_timeout())?;

    match province {
        Some(name) => {
            let localities = list_localities(&conn, name)?;
            println!("🏘️  {} localities in {}", localities.len(), name);
            for locality in &localities {
                println!("  {}", locality.name);
            }
        }
        None => {
            for (_, name) in list_provinces(&conn)? {
                println!("  {}", name);
            }
        }
    }

    Ok(())
}

fn run_status(config: &IngestConfig, json: bool) -> Result<()> {
    let conn = open_database(&config.database, config.busy_timeout())?;
    let status = store_status(&conn)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!("🗄️  {}", config.database.display());
    println!("✓ Stations: {}", status.total_stations);
    for (station_type, count) in &status.stations_per_type {
        println!("    {}: {}", station_type, count);
    }
    println!("✓ Provinces: {}", status.total_provinces);
    println!("✓ Localities: {}", status.total_localities);

    Ok(())
}

fn run_wipe(config: &IngestConfig, yes: bool) -> Result<()> {
    if !yes {
        bail!("Refusing to wipe {} without --yes", config.database.display());
    }

    let mut conn = open_database(&config.database, config.busy_timeout())?;
    let removed = wipe_store(&mut conn)?;
    println!("🧹 Removed {} stations", removed);

    Ok(())
}
