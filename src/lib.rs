// ITV Stations - Core Library
// Validation pipeline, regional parsers and station store, shared by the CLI
// and tests

pub mod config;
pub mod db;
pub mod error;
pub mod extractor;
pub mod logging;
pub mod parser;
pub mod pipeline;
pub mod report;
pub mod tables;
pub mod validation;

// Re-export commonly used types
pub use config::{IngestConfig, SourcePaths};
pub use db::{
    open_database, setup_database, search_stations, list_provinces, list_localities,
    count_stations, store_status, wipe_store,
    NormalizedStation, StoredStation, StationFilter, StationStore, StationType, StoreStatus,
    Locality,
};
pub use error::ExtractError;
pub use extractor::{configured_regions, run_extractor, run_regions};
pub use parser::{
    detect_region, get_parser, IntermediateRecord, SourceParser,
    CatXmlParser, CvJsonParser, GalCsvParser,
};
pub use pipeline::{
    Evaluation, PipelineSettings, RejectReason, ValidationOutcome, ValidationPipeline,
};
pub use report::{DiscardReasons, RunCounters, RunLog, RunReport};
pub use tables::{BoundingBox, RegionCode, ValidationTables};
pub use validation::{
    DuplicateChecker, DuplicatePolicy, GeoValidator, NameNormalizer, PostalCodeValidator,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
