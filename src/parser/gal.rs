// Galicia: semicolon-delimited CSV, Galician column names.
// Coordinates come as one "lat, lon" column, each half either decimal or
// degrees + decimal minutes ("42° 52.69").

use csv::ReaderBuilder;
use regex::Regex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::OnceLock;

use super::{clean, read_source, IntermediateRecord, SourceParser};
use crate::error::ExtractError;
use crate::tables::RegionCode;

const COL_NAME: &str = "NOME DA ESTACIÓN";
const COL_PROVINCE: &str = "PROVINCIA";
const COL_LOCALITY: &str = "CONCELLO";
const COL_ADDRESS: &str = "ENDEREZO";
const COL_POSTAL_CODE: &str = "CÓDIGO POSTAL";
const COL_SCHEDULE: &str = "HORARIO";
const COL_PHONE: &str = "TELÉFONO";
const COL_EMAIL: &str = "CORREO ELECTRÓNICO";
const COL_URL: &str = "SOLICITUDE DE CITA PREVIA";
const COL_COORDINATES: &str = "COORDENADAS GMAPS";

/// Every Galician station in the source is a fixed one
const STATION_TYPE: &str = "Estación fija";

pub struct GalCsvParser;

impl GalCsvParser {
    pub fn new() -> Self {
        GalCsvParser
    }
}

impl Default for GalCsvParser {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceParser for GalCsvParser {
    fn parse(&self, file_path: &Path) -> Result<Vec<IntermediateRecord>, ExtractError> {
        let text = read_source(file_path)?;

        let mut reader = ReaderBuilder::new()
            .delimiter(b';')
            .has_headers(true)
            .flexible(true)
            .from_reader(text.as_bytes());

        let headers: HashMap<String, usize> = reader
            .headers()
            .map_err(|e| ExtractError::malformed(file_path, e))?
            .iter()
            .enumerate()
            .map(|(i, h)| (h.trim().to_string(), i))
            .collect();

        if !headers.contains_key(COL_NAME) {
            return Err(ExtractError::malformed(
                file_path,
                format!("missing column '{}'", COL_NAME),
            ));
        }

        let mut records = Vec::new();

        for (line_num, result) in reader.records().enumerate() {
            let row = result.map_err(|e| {
                ExtractError::malformed(file_path, format!("line {}: {}", line_num + 2, e))
            })?;

            let field = |column: &str| clean(headers.get(column).and_then(|&i| row.get(i)));

            let (latitude_raw, longitude_raw) = field(COL_COORDINATES)
                .and_then(|c| split_coordinates(&c))
                .unzip();

            records.push(IntermediateRecord {
                station_name_raw: field(COL_NAME),
                province_raw: field(COL_PROVINCE),
                locality_raw: field(COL_LOCALITY),
                station_type_raw: Some(STATION_TYPE.to_string()),
                address_raw: field(COL_ADDRESS),
                postal_code_raw: field(COL_POSTAL_CODE),
                latitude_raw,
                longitude_raw,
                description_raw: None,
                schedule_raw: field(COL_SCHEDULE),
                contact_raw: contact(field(COL_PHONE), field(COL_EMAIL)),
                url_raw: field(COL_URL),
                // 1-indexed, plus the header row
                source_line: line_num + 2,
            });
        }

        Ok(records)
    }

    fn region(&self) -> RegionCode {
        RegionCode::Gal
    }
}

/// "lat, lon" → both halves as decimal-degree text. Anything other than
/// exactly two convertible parts yields `None`.
fn split_coordinates(text: &str) -> Option<(String, String)> {
    let parts: Vec<&str> = text.split(',').collect();
    if parts.len() != 2 {
        return None;
    }

    let lat = to_decimal(parts[0])?;
    let lon = to_decimal(parts[1])?;
    Some((lat.to_string(), lon.to_string()))
}

/// Decimal degrees from "42.345678" or "42° 20.74" style text, rounded to
/// 6 decimal places in the second case
pub fn to_decimal(text: &str) -> Option<f64> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if let Ok(value) = text.parse::<f64>() {
        return Some(value);
    }

    static DMS: OnceLock<Option<Regex>> = OnceLock::new();
    let pattern = DMS
        .get_or_init(|| Regex::new(r"(-?\d+)[°º\s]+(\d+\.?\d*)").ok())
        .as_ref()?;

    let caps = pattern.captures(text)?;
    let degrees_text = caps.get(1)?.as_str();
    let degrees: f64 = degrees_text.parse().ok()?;
    let minutes: f64 = caps.get(2)?.as_str().parse().ok()?;

    // "-0° 30" must stay negative
    let decimal = if degrees_text.starts_with('-') {
        degrees - minutes / 60.0
    } else {
        degrees + minutes / 60.0
    };

    Some((decimal * 1_000_000.0).round() / 1_000_000.0)
}

fn contact(phone: Option<String>, email: Option<String>) -> Option<String> {
    let parts: Vec<String> = [
        phone.map(|t| format!("Tel: {}", t)),
        email.map(|e| format!("Email: {}", e)),
    ]
    .into_iter()
    .flatten()
    .collect();

    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" | "))
    }
}
