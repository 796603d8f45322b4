// 🚚 Extractor runs
// One run = parse one source file, validate every record, store the accepted
// ones inside a single transaction. Several regions may run at once, each on
// its own connection; SQLite serializes their write transactions.

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{Connection, TransactionBehavior};
use std::fmt::Display;
use std::path::Path;
use std::thread;
use tracing::{error, info_span};
use uuid::Uuid;

use crate::config::IngestConfig;
use crate::db::open_database;
use crate::error::ExtractError;
use crate::parser::{get_parser, SourceParser};
use crate::pipeline::{PipelineSettings, ValidationPipeline};
use crate::report::{RunCounters, RunLog, RunReport};
use crate::tables::RegionCode;

// ============================================================================
// SINGLE RUN
// ============================================================================

/// Run one extractor against an open store.
///
/// Never returns an error: a fatal problem (unreadable or malformed source,
/// storage failure outside a record) rolls the run back and is reported with
/// `success = false` and zeroed counters.
pub fn run_extractor(
    conn: &mut Connection,
    parser: &dyn SourceParser,
    path: &Path,
    settings: &PipelineSettings,
) -> RunReport {
    let run_id = Uuid::new_v4();
    let region = parser.region();
    let started_at = Utc::now();
    let source = path.display().to_string();

    let span = info_span!("extractor_run", region = %region, run_id = %run_id);
    let _enter = span.enter();

    let mut log = RunLog::new();
    log.info(format!(
        "Starting {} extractor (parser v{}) on {}",
        region.name(),
        parser.version(),
        source
    ));

    match execute(conn, parser, path, settings, &mut log) {
        Ok(counters) => RunReport::completed(run_id, region, source, started_at, counters, log),
        Err(e) => {
            error!(error = %e, "extractor run aborted");
            log.info(format!("Run aborted, nothing was stored: {}", e));
            RunReport::failed(run_id, region, source, started_at, e.to_string(), log)
        }
    }
}

fn execute(
    conn: &mut Connection,
    parser: &dyn SourceParser,
    path: &Path,
    settings: &PipelineSettings,
    log: &mut RunLog,
) -> Result<RunCounters, ExtractError> {
    let records = parser.parse(path)?;
    log.info(format!("Parsed {} records from {}", records.len(), path.display()));

    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .context("Failed to start run transaction")?;

    let pipeline = ValidationPipeline::new(parser.region(), settings);
    let counters = pipeline.run(&records, &*tx, log);

    tx.commit().context("Failed to commit run")?;

    Ok(counters)
}

// ============================================================================
// MULTI-REGION LOAD
// ============================================================================

/// Run the given regions concurrently, one thread and one connection each.
/// Reports come back in the order of `regions`.
pub fn run_regions(config: &IngestConfig, regions: &[RegionCode]) -> Result<Vec<RunReport>> {
    let settings = config.pipeline_settings()?;

    // Create the schema once, before runs race for it
    open_database(&config.database, config.busy_timeout())?;

    let settings = &settings;
    let reports: Vec<RunReport> = thread::scope(|scope| {
        let handles: Vec<_> = regions
            .iter()
            .map(|&region| (region, scope.spawn(move || run_region(config, region, settings))))
            .collect();

        handles
            .into_iter()
            .map(|(region, handle)| {
                handle
                    .join()
                    .unwrap_or_else(|_| setup_failure(region, "-", "extractor thread panicked"))
            })
            .collect()
    });

    Ok(reports)
}

/// Regions of `config` that have a source file
pub fn configured_regions(config: &IngestConfig) -> Vec<RegionCode> {
    RegionCode::EXTRACTED
        .into_iter()
        .filter(|r| config.source_for(*r).is_some())
        .collect()
}

fn run_region(config: &IngestConfig, region: RegionCode, settings: &PipelineSettings) -> RunReport {
    let Some(path) = config.source_for(region) else {
        return setup_failure(region, "-", format!("no source file configured for {}", region));
    };
    let source = path.display().to_string();

    let parser = match get_parser(region) {
        Ok(p) => p,
        Err(e) => return setup_failure(region, &source, e),
    };

    let mut conn = match open_database(&config.database, config.busy_timeout()) {
        Ok(c) => c,
        Err(e) => return setup_failure(region, &source, format!("{:#}", e)),
    };

    run_extractor(&mut conn, parser.as_ref(), path, settings)
}

/// Report for a run that never got as far as its source file
fn setup_failure(region: RegionCode, source: &str, error: impl Display) -> RunReport {
    let run_id = Uuid::new_v4();
    let error = error.to_string();

    let mut log = RunLog::new();
    log.warn(format!("{} extractor not started: {}", region.name(), error));

    RunReport::failed(run_id, region, source.to_string(), Utc::now(), error, log)
}

// ============================================================================
// TESTS
// ============================================================================
