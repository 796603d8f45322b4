// 📊 Run counters, textual log and the per-run report handed to callers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::pipeline::RejectReason;
use crate::tables::RegionCode;

// ============================================================================
// COUNTERS
// ============================================================================

/// One counter per discard reason. Every discard lands in exactly one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscardReasons {
    pub missing_geo_fields: usize,
    pub duplicate_name: usize,
    pub invalid_province: usize,
    pub invalid_postal_code: usize,
    pub invalid_coordinates: usize,
    pub processing_error: usize,
}

impl DiscardReasons {
    pub fn record(&mut self, reason: RejectReason) {
        let counter = match reason {
            RejectReason::MissingGeoFields => &mut self.missing_geo_fields,
            RejectReason::DuplicateName => &mut self.duplicate_name,
            RejectReason::InvalidProvince => &mut self.invalid_province,
            RejectReason::InvalidPostalCode => &mut self.invalid_postal_code,
            RejectReason::InvalidCoordinates => &mut self.invalid_coordinates,
            RejectReason::ProcessingError => &mut self.processing_error,
        };
        *counter += 1;
    }

    pub fn get(&self, reason: RejectReason) -> usize {
        match reason {
            RejectReason::MissingGeoFields => self.missing_geo_fields,
            RejectReason::DuplicateName => self.duplicate_name,
            RejectReason::InvalidProvince => self.invalid_province,
            RejectReason::InvalidPostalCode => self.invalid_postal_code,
            RejectReason::InvalidCoordinates => self.invalid_coordinates,
            RejectReason::ProcessingError => self.processing_error,
        }
    }

    pub fn total(&self) -> usize {
        RejectReason::ALL.iter().map(|r| self.get(*r)).sum()
    }
}

/// Counters for one extractor run. A fresh set per run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounters {
    pub processed: usize,
    pub inserted: usize,
    pub discarded: usize,
    pub discard_reasons: DiscardReasons,
    /// Postal codes cleared on mobile/other stations, accepted or not
    pub modified_postal_code: usize,
}

impl RunCounters {
    pub fn record_inserted(&mut self) {
        self.processed += 1;
        self.inserted += 1;
    }

    pub fn record_discarded(&mut self, reason: RejectReason) {
        self.processed += 1;
        self.discarded += 1;
        self.discard_reasons.record(reason);
    }

    pub fn record_postal_code_cleared(&mut self) {
        self.modified_postal_code += 1;
    }

    /// Discards are partitioned by reason and every record is either
    /// inserted or discarded
    pub fn is_consistent(&self) -> bool {
        self.discarded == self.discard_reasons.total()
            && self.processed == self.inserted + self.discarded
    }
}

// ============================================================================
// RUN LOG
// ============================================================================

/// Human-readable log of a run, returned to the caller. Every line is also
/// emitted as a tracing event.
#[derive(Debug, Clone, Default)]
pub struct RunLog {
    buffer: String,
}

impl RunLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn info(&mut self, line: impl Into<String>) {
        let line = line.into();
        info!("{}", line);
        self.push(line);
    }

    pub fn debug(&mut self, line: impl Into<String>) {
        let line = line.into();
        debug!("{}", line);
        self.push(line);
    }

    pub fn warn(&mut self, line: impl Into<String>) {
        let line = line.into();
        warn!("{}", line);
        self.push(line);
    }

    pub fn as_str(&self) -> &str {
        &self.buffer
    }

    pub fn into_text(self) -> String {
        self.buffer
    }

    fn push(&mut self, line: String) {
        self.buffer.push_str(&line);
        self.buffer.push('\n');
    }
}

// ============================================================================
// RUN REPORT
// ============================================================================

/// What a caller (CLI, API) gets back from one extractor run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub region: RegionCode,
    pub source: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub success: bool,
    pub processed: usize,
    pub inserted: usize,
    pub discarded: usize,
    pub discard_reasons: DiscardReasons,
    pub modified_postal_code: usize,
    pub log: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunReport {
    pub fn completed(
        run_id: Uuid,
        region: RegionCode,
        source: String,
        started_at: DateTime<Utc>,
        counters: RunCounters,
        log: RunLog,
    ) -> Self {
        RunReport {
            run_id,
            region,
            source,
            started_at,
            finished_at: Utc::now(),
            success: true,
            processed: counters.processed,
            inserted: counters.inserted,
            discarded: counters.discarded,
            discard_reasons: counters.discard_reasons,
            modified_postal_code: counters.modified_postal_code,
            log: log.into_text(),
            error: None,
        }
    }

    /// Fatal run: nothing was committed, so every counter is zero
    pub fn failed(
        run_id: Uuid,
        region: RegionCode,
        source: String,
        started_at: DateTime<Utc>,
        error: String,
        log: RunLog,
    ) -> Self {
        RunReport {
            run_id,
            region,
            source,
            started_at,
            finished_at: Utc::now(),
            success: false,
            processed: 0,
            inserted: 0,
            discarded: 0,
            discard_reasons: DiscardReasons::default(),
            modified_postal_code: 0,
            log: log.into_text(),
            error: Some(error),
        }
    }

    pub fn summary(&self) -> String {
        match &self.error {
            Some(e) => format!("{}: failed ({})", self.region, e),
            None => format!(
                "{}: {} processed, {} inserted, {} discarded, {} postal codes cleared",
                self.region,
                self.processed,
                self.inserted,
                self.discarded,
                self.modified_postal_code
            ),
        }
    }
}

/// Closing block of a run log, one line per counter
pub fn summary_lines(region: RegionCode, counters: &RunCounters) -> Vec<String> {
    let reasons = &counters.discard_reasons;
    vec![
        format!("------- Summary {} -------", region.name()),
        format!("Inserted: {}", counters.inserted),
        format!("Discarded: {}", counters.discarded),
        format!("  missing province/locality: {}", reasons.missing_geo_fields),
        format!("  missing or duplicate name: {}", reasons.duplicate_name),
        format!("  unsupported province: {}", reasons.invalid_province),
        format!("  invalid postal code: {}", reasons.invalid_postal_code),
        format!("  invalid coordinates: {}", reasons.invalid_coordinates),
        format!("  processing errors: {}", reasons.processing_error),
        format!(
            "Modified: {} postal codes cleared on non-fixed stations",
            counters.modified_postal_code
        ),
    ]
}

// ============================================================================
// TESTS
// ============================================================================
