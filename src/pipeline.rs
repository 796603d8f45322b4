// ✅ Validation Pipeline
// Decides insert vs. discard for every intermediate record of one run and
// writes the accepted ones through the storage port.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::db::{NormalizedStation, StationStore, StationType};
use crate::parser::{clean, IntermediateRecord};
use crate::report::{summary_lines, RunCounters, RunLog};
use crate::tables::{RegionCode, ValidationTables};
use crate::validation::{
    DuplicateChecker, DuplicatePolicy, GeoValidator, NameNormalizer, PostalCodeValidator,
};

// ============================================================================
// OUTCOMES
// ============================================================================

/// Why a record was discarded. Exactly one per discard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// Province or locality text missing
    MissingGeoFields,
    /// Name missing, or already stored
    DuplicateName,
    InvalidProvince,
    InvalidPostalCode,
    InvalidCoordinates,
    /// Storage fault while writing an otherwise valid record
    ProcessingError,
}

impl RejectReason {
    pub const ALL: [RejectReason; 6] = [
        RejectReason::MissingGeoFields,
        RejectReason::DuplicateName,
        RejectReason::InvalidProvince,
        RejectReason::InvalidPostalCode,
        RejectReason::InvalidCoordinates,
        RejectReason::ProcessingError,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::MissingGeoFields => "missing_geo_fields",
            RejectReason::DuplicateName => "duplicate_name",
            RejectReason::InvalidProvince => "invalid_province",
            RejectReason::InvalidPostalCode => "invalid_postal_code",
            RejectReason::InvalidCoordinates => "invalid_coordinates",
            RejectReason::ProcessingError => "processing_error",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ValidationOutcome {
    Accepted(NormalizedStation),
    Rejected(RejectReason),
}

impl ValidationOutcome {
    pub fn reason(&self) -> Option<RejectReason> {
        match self {
            ValidationOutcome::Accepted(_) => None,
            ValidationOutcome::Rejected(reason) => Some(*reason),
        }
    }
}

/// Result of evaluating one record.
///
/// `postal_code_cleared` is set whenever a mobile/other record reached the
/// postal code check, whatever happens after it.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub outcome: ValidationOutcome,
    pub postal_code_cleared: bool,
}

impl Evaluation {
    fn rejected(reason: RejectReason, postal_code_cleared: bool) -> Self {
        Evaluation {
            outcome: ValidationOutcome::Rejected(reason),
            postal_code_cleared,
        }
    }
}

// ============================================================================
// SETTINGS
// ============================================================================

/// Shared, immutable inputs of every pipeline: lookup tables and the
/// duplicate lookup failure policy
#[derive(Debug, Clone, Default)]
pub struct PipelineSettings {
    pub tables: Arc<ValidationTables>,
    pub duplicate_policy: DuplicatePolicy,
}

impl PipelineSettings {
    pub fn new(tables: ValidationTables, duplicate_policy: DuplicatePolicy) -> Self {
        PipelineSettings {
            tables: Arc::new(tables),
            duplicate_policy,
        }
    }
}

// ============================================================================
// PIPELINE
// ============================================================================

/// Validation rules bound to one region.
///
/// Holds no state between records; counters live in the caller's
/// `RunCounters`, one fresh set per run.
pub struct ValidationPipeline {
    region: RegionCode,
    names: NameNormalizer,
    postal_codes: PostalCodeValidator,
    geo: GeoValidator,
    duplicate_policy: DuplicatePolicy,
}

impl ValidationPipeline {
    pub fn new(region: RegionCode, settings: &PipelineSettings) -> Self {
        ValidationPipeline {
            region,
            names: NameNormalizer::new(Arc::clone(&settings.tables)),
            postal_codes: PostalCodeValidator::new(Arc::clone(&settings.tables)),
            geo: GeoValidator::new(Arc::clone(&settings.tables)),
            duplicate_policy: settings.duplicate_policy,
        }
    }

    /// Run the checks on one record, in order, stopping at the first failure:
    /// geo fields, name, province, postal code, coordinates.
    pub fn evaluate<S: StationStore + ?Sized>(
        &self,
        record: &IntermediateRecord,
        duplicates: &DuplicateChecker<'_, S>,
    ) -> Evaluation {
        // 1. Province and locality text
        let (Some(province_raw), Some(locality)) = (
            clean(record.province_raw.as_deref()),
            clean(record.locality_raw.as_deref()),
        ) else {
            return Evaluation::rejected(RejectReason::MissingGeoFields, false);
        };

        // 2. Name present and not stored yet
        let Some(name) = clean(record.station_name_raw.as_deref()) else {
            return Evaluation::rejected(RejectReason::DuplicateName, false);
        };
        if duplicates.is_duplicate(&name) {
            return Evaluation::rejected(RejectReason::DuplicateName, false);
        }

        // 3. Province in the supported set
        let province = match self.names.normalize(Some(&province_raw)) {
            Some(p) if self.names.is_supported(Some(&p)) => p,
            _ => return Evaluation::rejected(RejectReason::InvalidProvince, false),
        };

        // 4. Postal code: required for fixed stations, cleared otherwise
        let station_type = StationType::from_marker(record.station_type_raw.as_deref());
        let (postal_code, postal_code_cleared) = if station_type.requires_postal_code() {
            let formatted = self
                .postal_codes
                .validate_and_format(record.postal_code_raw.as_deref(), Some(self.region));
            if formatted.is_empty() {
                return Evaluation::rejected(RejectReason::InvalidPostalCode, false);
            }
            (formatted, false)
        } else {
            (String::new(), true)
        };

        // 5. Coordinates inside the region's box
        let latitude_raw = record.latitude_raw.as_deref();
        let longitude_raw = record.longitude_raw.as_deref();
        if !self
            .geo
            .has_valid_coordinates(latitude_raw, longitude_raw, Some(self.region))
        {
            return Evaluation::rejected(RejectReason::InvalidCoordinates, postal_code_cleared);
        }
        let Some((latitude, longitude)) = GeoValidator::parse_pair(latitude_raw, longitude_raw)
        else {
            return Evaluation::rejected(RejectReason::InvalidCoordinates, postal_code_cleared);
        };

        Evaluation {
            outcome: ValidationOutcome::Accepted(NormalizedStation {
                name,
                station_type,
                province,
                locality,
                address: clean(record.address_raw.as_deref()),
                postal_code,
                latitude,
                longitude,
                description: clean(record.description_raw.as_deref()),
                schedule: clean(record.schedule_raw.as_deref()),
                contact: clean(record.contact_raw.as_deref()),
                url: clean(record.url_raw.as_deref()),
            }),
            postal_code_cleared,
        }
    }

    /// Evaluate every record in order and store the accepted ones.
    ///
    /// Per-record storage faults are counted as `processing_error` and the
    /// run continues; nothing here aborts the caller's transaction.
    pub fn run<S: StationStore + ?Sized>(
        &self,
        records: &[IntermediateRecord],
        store: &S,
        log: &mut RunLog,
    ) -> RunCounters {
        let duplicates = DuplicateChecker::new(store, self.duplicate_policy);
        let mut counters = RunCounters::default();

        log.info(format!(
            "Validating {} records for {}",
            records.len(),
            self.region.name()
        ));

        for record in records {
            let label = record.station_name_raw.as_deref().unwrap_or("<unnamed>");
            let evaluation = self.evaluate(record, &duplicates);

            if evaluation.postal_code_cleared {
                counters.record_postal_code_cleared();
            }

            match evaluation.outcome {
                ValidationOutcome::Rejected(reason) => {
                    counters.record_discarded(reason);
                    log.warn(format!(
                        "Line {}: discarded '{}' ({})",
                        record.source_line,
                        label,
                        describe(reason, record)
                    ));
                }
                ValidationOutcome::Accepted(station) => match store_station(store, &station) {
                    Ok(()) => {
                        counters.record_inserted();
                        log.debug(format!(
                            "Line {}: inserted '{}' ({}, {})",
                            record.source_line, station.name, station.locality, station.province
                        ));
                    }
                    Err(e) => {
                        counters.record_discarded(RejectReason::ProcessingError);
                        log.warn(format!(
                            "Line {}: discarded '{}' (processing error: {:#})",
                            record.source_line, label, e
                        ));
                    }
                },
            }
        }

        for line in summary_lines(self.region, &counters) {
            log.info(line);
        }

        counters
    }
}

/// Province, then locality, then the station row
fn store_station<S: StationStore + ?Sized>(store: &S, station: &NormalizedStation) -> Result<()> {
    let province_id = store.get_or_create_province(&station.province)?;
    let locality_id = store.get_or_create_locality(&station.locality, province_id)?;
    store.insert_station(station, locality_id)
}

/// Log wording for a discard; `duplicate_name` covers two causes
fn describe(reason: RejectReason, record: &IntermediateRecord) -> String {
    match reason {
        RejectReason::MissingGeoFields => "missing province or locality".to_string(),
        RejectReason::DuplicateName if clean(record.station_name_raw.as_deref()).is_none() => {
            "missing station name".to_string()
        }
        RejectReason::DuplicateName => "station name already stored".to_string(),
        RejectReason::InvalidProvince => format!(
            "unsupported province '{}'",
            record.province_raw.as_deref().unwrap_or_default()
        ),
        RejectReason::InvalidPostalCode => format!(
            "invalid postal code '{}'",
            record.postal_code_raw.as_deref().unwrap_or_default()
        ),
        RejectReason::InvalidCoordinates => format!(
            "invalid coordinates ({}, {})",
            record.latitude_raw.as_deref().unwrap_or("-"),
            record.longitude_raw.as_deref().unwrap_or("-")
        ),
        RejectReason::ProcessingError => "processing error".to_string(),
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{count_stations, search_stations, setup_database, StationFilter};
    use anyhow::anyhow;
    use rusqlite::Connection;

    fn memory_store() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        conn
    }

    fn elche_record() -> IntermediateRecord {
        IntermediateRecord {
            station_name_raw: Some("EST-01".to_string()),
            province_raw: Some("Alacant".to_string()),
            locality_raw: Some("Elche".to_string()),
            station_type_raw: Some("Estación Fija".to_string()),
            address_raw: Some("Ptda. Algoda 1".to_string()),
            postal_code_raw: Some("3201".to_string()),
            latitude_raw: Some("38.26".to_string()),
            longitude_raw: Some("-0.70".to_string()),
            source_line: 1,
            ..Default::default()
        }
    }

    fn cv_pipeline() -> ValidationPipeline {
        ValidationPipeline::new(RegionCode::Cv, &PipelineSettings::default())
    }

    fn evaluate(record: &IntermediateRecord, conn: &Connection) -> Evaluation {
        let checker = DuplicateChecker::new(conn, DuplicatePolicy::FailOpen);
        cv_pipeline().evaluate(record, &checker)
    }

    /// Lookups work, every write fails
    struct ReadOnlyStore;

    impl StationStore for ReadOnlyStore {
        fn get_or_create_province(&self, _name: &str) -> Result<i64> {
            Err(anyhow!("attempt to write a readonly database"))
        }
        fn get_or_create_locality(&self, _name: &str, _province_id: i64) -> Result<i64> {
            Err(anyhow!("attempt to write a readonly database"))
        }
        fn insert_station(&self, _station: &NormalizedStation, _locality_id: i64) -> Result<()> {
            Err(anyhow!("attempt to write a readonly database"))
        }
        fn station_name_exists(&self, _name: &str) -> Result<bool> {
            Ok(false)
        }
    }

    #[test]
    fn test_fixed_station_accepted_and_normalized() {
        let conn = memory_store();
        let evaluation = evaluate(&elche_record(), &conn);

        let ValidationOutcome::Accepted(station) = evaluation.outcome else {
            panic!("expected acceptance");
        };
        assert_eq!(station.province, "Alicante");
        assert_eq!(station.postal_code, "03201");
        assert_eq!(station.station_type, StationType::Fixed);
        assert_eq!(station.latitude, 38.26);
        assert!(!evaluation.postal_code_cleared);
    }

    #[test]
    fn test_mobile_station_postal_code_cleared() {
        let conn = memory_store();
        let record = IntermediateRecord {
            station_type_raw: Some("Estación Móvil".to_string()),
            ..elche_record()
        };

        let evaluation = evaluate(&record, &conn);
        assert!(evaluation.postal_code_cleared);
        let ValidationOutcome::Accepted(station) = evaluation.outcome else {
            panic!("expected acceptance");
        };
        assert_eq!(station.postal_code, "");
        assert_eq!(station.station_type, StationType::Mobile);
    }

    #[test]
    fn test_unsupported_province_rejected() {
        let conn = memory_store();
        let record = IntermediateRecord {
            province_raw: Some("Madrid".to_string()),
            ..elche_record()
        };

        let evaluation = evaluate(&record, &conn);
        assert_eq!(evaluation.outcome.reason(), Some(RejectReason::InvalidProvince));
    }

    #[test]
    fn test_substituted_table_canonical_name_is_stored() {
        let conn = memory_store();
        let tables = ValidationTables::reference().with_alias("A Estrada", "Pontevedra Norte");
        let settings = PipelineSettings::new(tables, DuplicatePolicy::FailOpen);
        let pipeline = ValidationPipeline::new(RegionCode::Gal, &settings);

        let record = IntermediateRecord {
            station_name_raw: Some("ITV A Estrada".to_string()),
            province_raw: Some("a estrada".to_string()),
            locality_raw: Some("A Estrada".to_string()),
            station_type_raw: Some("Estación fija".to_string()),
            postal_code_raw: Some("36680".to_string()),
            latitude_raw: Some("42.69".to_string()),
            longitude_raw: Some("-8.49".to_string()),
            source_line: 2,
            ..Default::default()
        };

        let mut log = RunLog::new();
        let counters = pipeline.run(&[record], &conn, &mut log);

        assert_eq!(counters.inserted, 1);
        assert_eq!(counters.discard_reasons.invalid_province, 0);
        let stored = search_stations(&conn, &StationFilter::default()).unwrap();
        assert_eq!(stored[0].province, "Pontevedra Norte");
    }

    #[test]
    fn test_first_failing_check_wins() {
        let conn = memory_store();
        // Missing locality, bad province, bad postal code and bad coordinates
        let record = IntermediateRecord {
            locality_raw: Some("   ".to_string()),
            province_raw: Some("Madrid".to_string()),
            postal_code_raw: Some("123".to_string()),
            latitude_raw: Some("0".to_string()),
            ..elche_record()
        };
        assert_eq!(
            evaluate(&record, &conn).outcome.reason(),
            Some(RejectReason::MissingGeoFields)
        );

        let record = IntermediateRecord {
            postal_code_raw: Some("28001".to_string()),
            latitude_raw: Some("0".to_string()),
            ..elche_record()
        };
        assert_eq!(
            evaluate(&record, &conn).outcome.reason(),
            Some(RejectReason::InvalidPostalCode)
        );
    }

    #[test]
    fn test_missing_name_counts_as_duplicate_name() {
        let conn = memory_store();
        let record = IntermediateRecord {
            station_name_raw: None,
            ..elche_record()
        };

        assert_eq!(
            evaluate(&record, &conn).outcome.reason(),
            Some(RejectReason::DuplicateName)
        );
        assert_eq!(describe(RejectReason::DuplicateName, &record), "missing station name");
    }

    #[test]
    fn test_mobile_with_bad_coordinates_still_counts_modified() {
        let conn = memory_store();
        let record = IntermediateRecord {
            station_type_raw: Some("Estación Móvil".to_string()),
            // lat/lon swapped
            latitude_raw: Some("-0.70".to_string()),
            longitude_raw: Some("38.26".to_string()),
            ..elche_record()
        };

        let mut log = RunLog::new();
        let counters = cv_pipeline().run(&[record], &conn, &mut log);

        assert_eq!(counters.discard_reasons.invalid_coordinates, 1);
        assert_eq!(counters.modified_postal_code, 1);
        assert_eq!(counters.inserted, 0);
        assert!(counters.is_consistent());
    }

    #[test]
    fn test_run_inserts_and_rejects_in_batch_duplicates() {
        let conn = memory_store();
        let records = vec![elche_record(), elche_record()];

        let mut log = RunLog::new();
        let counters = cv_pipeline().run(&records, &conn, &mut log);

        assert_eq!(counters.processed, 2);
        assert_eq!(counters.inserted, 1);
        assert_eq!(counters.discard_reasons.duplicate_name, 1);
        assert!(counters.is_consistent());
        assert_eq!(count_stations(&conn).unwrap(), 1);

        let stored = search_stations(&conn, &StationFilter::default()).unwrap();
        assert_eq!(stored[0].province, "Alicante");
        assert_eq!(stored[0].postal_code, "03201");
        assert!(log.as_str().contains("station name already stored"));
    }

    #[test]
    fn test_storage_fault_is_processing_error() {
        let mut log = RunLog::new();
        let counters = cv_pipeline().run(&[elche_record()], &ReadOnlyStore, &mut log);

        assert_eq!(counters.inserted, 0);
        assert_eq!(counters.discard_reasons.processing_error, 1);
        assert!(counters.is_consistent());
        assert!(log.as_str().contains("processing error"));
    }

    #[test]
    fn test_reject_reason_names() {
        let names: Vec<&str> = RejectReason::ALL.iter().map(|r| r.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "missing_geo_fields",
                "duplicate_name",
                "invalid_province",
                "invalid_postal_code",
                "invalid_coordinates",
                "processing_error",
            ]
        );
        assert_eq!(
            serde_json::to_string(&RejectReason::InvalidCoordinates).unwrap(),
            "\"invalid_coordinates\""
        );
    }
}
