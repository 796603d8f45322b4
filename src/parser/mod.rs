// 🏗️ Source Parsers
// One parser per regional source format. Parsers only extract fields into
// an IntermediateRecord; every decision is left to the validation pipeline.

pub mod cat;
pub mod cv;
pub mod gal;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::ExtractError;
use crate::tables::RegionCode;

pub use cat::CatXmlParser;
pub use cv::CvJsonParser;
pub use gal::GalCsvParser;

// ============================================================================
// CORE TYPES
// ============================================================================

/// Source-agnostic shape every parser produces, before any validation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntermediateRecord {
    pub station_name_raw: Option<String>,
    pub province_raw: Option<String>,
    pub locality_raw: Option<String>,
    pub station_type_raw: Option<String>,
    pub address_raw: Option<String>,
    pub postal_code_raw: Option<String>,
    pub latitude_raw: Option<String>,
    pub longitude_raw: Option<String>,
    pub description_raw: Option<String>,
    pub schedule_raw: Option<String>,
    pub contact_raw: Option<String>,
    pub url_raw: Option<String>,

    /// Position in the source file, for log messages
    pub source_line: usize,
}

// ============================================================================
// PARSER TRAIT
// ============================================================================

pub trait SourceParser: Send + Sync {
    /// Read and parse a whole source file.
    ///
    /// An unreadable file or structurally broken content is fatal for the
    /// run; individual odd fields are passed through as-is (or as `None`).
    fn parse(&self, file_path: &Path) -> Result<Vec<IntermediateRecord>, ExtractError>;

    fn region(&self) -> RegionCode;

    /// Parser version (logged with each run)
    fn version(&self) -> &str {
        "1.0.0"
    }
}

// ============================================================================
// FACTORY FUNCTIONS
// ============================================================================

/// Guess the region of a source file from its extension or name
pub fn detect_region(file_path: &Path) -> Result<RegionCode> {
    let filename = file_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("")
        .to_lowercase();

    let extension = file_path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    match extension.as_str() {
        "csv" => return Ok(RegionCode::Gal),
        "json" => return Ok(RegionCode::Cv),
        "xml" => return Ok(RegionCode::Cat),
        _ => {}
    }

    if filename.contains("gal") || filename.contains("estacions") {
        return Ok(RegionCode::Gal);
    }
    if filename.contains("cat") {
        return Ok(RegionCode::Cat);
    }
    if filename.contains("cv") || filename.contains("valencia") {
        return Ok(RegionCode::Cv);
    }

    Err(anyhow!("Could not detect region from filename: {}", filename))
}

pub fn get_parser(region: RegionCode) -> Result<Box<dyn SourceParser>, ExtractError> {
    match region {
        RegionCode::Gal => Ok(Box::new(GalCsvParser::new())),
        RegionCode::Cv => Ok(Box::new(CvJsonParser::new())),
        RegionCode::Cat => Ok(Box::new(CatXmlParser::new())),
        RegionCode::Esp => Err(ExtractError::UnsupportedRegion(region.to_string())),
    }
}

// ============================================================================
// SHARED HELPERS
// ============================================================================

/// Read a source file as text: UTF-8 when valid, Latin-1 otherwise
pub(crate) fn read_source(file_path: &Path) -> Result<String, ExtractError> {
    let bytes = fs::read(file_path).map_err(|source| ExtractError::SourceUnreadable {
        path: file_path.to_path_buf(),
        source,
    })?;

    let text = match String::from_utf8(bytes) {
        Ok(text) => text,
        // Latin-1 maps each byte to the code point of the same value
        Err(e) => e.into_bytes().iter().map(|&b| b as char).collect(),
    };

    Ok(text.trim_start_matches('\u{feff}').to_string())
}

/// Trimmed text, `None` when absent or blank
pub(crate) fn clean(text: Option<&str>) -> Option<String> {
    text.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

// ============================================================================
// TESTS
// ============================================================================
