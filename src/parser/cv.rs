// Comunitat Valenciana: JSON array of objects with Spanish keys.
// Exports are sometimes Latin-1; postal codes may be numbers.

use serde_json::Value;
use std::path::Path;

use super::{clean, read_source, IntermediateRecord, SourceParser};
use crate::error::ExtractError;
use crate::tables::RegionCode;

const KEY_NAME: &str = "Nº ESTACIÓN";
const KEY_TYPE: &str = "TIPO ESTACIÓN";
const KEY_PROVINCE: &str = "PROVINCIA";
const KEY_LOCALITY: &str = "MUNICIPIO";
const KEY_ADDRESS: &str = "DIRECCIÓN";
const KEY_POSTAL_CODE: &str = "C.POSTAL";
const KEY_SCHEDULE: &str = "HORARIOS";
const KEY_EMAIL: &str = "CORREO";
const KEY_LATITUDE: &str = "LATITUD";
const KEY_LONGITUDE: &str = "LONGITUD";

pub struct CvJsonParser;

impl CvJsonParser {
    pub fn new() -> Self {
        CvJsonParser
    }
}

impl Default for CvJsonParser {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceParser for CvJsonParser {
    fn parse(&self, file_path: &Path) -> Result<Vec<IntermediateRecord>, ExtractError> {
        let text = read_source(file_path)?;

        let root: Value =
            serde_json::from_str(&text).map_err(|e| ExtractError::malformed(file_path, e))?;

        let Value::Array(items) = root else {
            return Err(ExtractError::malformed(file_path, "expected a JSON array of stations"));
        };

        let records = items
            .iter()
            .enumerate()
            .map(|(i, item)| IntermediateRecord {
                station_name_raw: text_field(item, KEY_NAME),
                province_raw: text_field(item, KEY_PROVINCE),
                locality_raw: text_field(item, KEY_LOCALITY),
                station_type_raw: text_field(item, KEY_TYPE),
                address_raw: text_field(item, KEY_ADDRESS),
                postal_code_raw: text_field(item, KEY_POSTAL_CODE),
                latitude_raw: text_field(item, KEY_LATITUDE),
                longitude_raw: text_field(item, KEY_LONGITUDE),
                description_raw: None,
                schedule_raw: text_field(item, KEY_SCHEDULE),
                contact_raw: text_field(item, KEY_EMAIL),
                url_raw: None,
                source_line: i + 1,
            })
            .collect();

        Ok(records)
    }

    fn region(&self) -> RegionCode {
        RegionCode::Cv
    }
}

/// String or number value of `key`, trimmed; `None` for anything else
fn text_field(item: &Value, key: &str) -> Option<String> {
    match item.get(key)? {
        Value::String(s) => clean(Some(s)),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
