// Catalunya: Socrata-style XML export, one <row> per station nested in an
// outer <row>. Coordinates are integers in millionths of a degree.

use roxmltree::{Document, Node};
use std::path::Path;

use super::{clean, read_source, IntermediateRecord, SourceParser};
use crate::error::ExtractError;
use crate::tables::RegionCode;

const TAG_ROW: &str = "row";
const TAG_NAME: &str = "denominaci";
const TAG_PROVINCE: &str = "serveis_territorials";
const TAG_LOCALITY: &str = "municipi";
const TAG_ADDRESS: &str = "adre_a";
const TAG_POSTAL_CODE: &str = "cp";
const TAG_SCHEDULE: &str = "horari_de_servei";
const TAG_EMAIL: &str = "correu_electr_nic";
const TAG_LATITUDE: &str = "lat";
const TAG_LONGITUDE: &str = "long";
const TAG_WEB: &str = "web";

const STATION_TYPE: &str = "Estación fija";
const MICRODEGREES: f64 = 1_000_000.0;

pub struct CatXmlParser;

impl CatXmlParser {
    pub fn new() -> Self {
        CatXmlParser
    }
}

impl Default for CatXmlParser {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceParser for CatXmlParser {
    fn parse(&self, file_path: &Path) -> Result<Vec<IntermediateRecord>, ExtractError> {
        let text = read_source(file_path)?;
        let doc = Document::parse(&text).map_err(|e| ExtractError::malformed(file_path, e))?;

        let records = doc
            .descendants()
            .filter(is_station_row)
            .enumerate()
            .map(|(i, row)| IntermediateRecord {
                station_name_raw: child_text(row, TAG_NAME),
                province_raw: child_text(row, TAG_PROVINCE),
                locality_raw: child_text(row, TAG_LOCALITY),
                station_type_raw: Some(STATION_TYPE.to_string()),
                address_raw: child_text(row, TAG_ADDRESS),
                postal_code_raw: child_text(row, TAG_POSTAL_CODE),
                latitude_raw: child_text(row, TAG_LATITUDE).and_then(|t| from_microdegrees(&t)),
                longitude_raw: child_text(row, TAG_LONGITUDE).and_then(|t| from_microdegrees(&t)),
                description_raw: None,
                schedule_raw: child_text(row, TAG_SCHEDULE),
                contact_raw: child_text(row, TAG_EMAIL),
                url_raw: child(row, TAG_WEB).and_then(|w| clean(w.attribute("url"))),
                source_line: i + 1,
            })
            .collect();

        Ok(records)
    }

    fn region(&self) -> RegionCode {
        RegionCode::Cat
    }
}

/// A <row> element directly inside another <row>
fn is_station_row(node: &Node) -> bool {
    node.has_tag_name(TAG_ROW)
        && node
            .parent_element()
            .map_or(false, |parent| parent.has_tag_name(TAG_ROW))
}

fn child<'a, 'input>(row: Node<'a, 'input>, tag: &str) -> Option<Node<'a, 'input>> {
    row.children().find(|c| c.has_tag_name(tag))
}

fn child_text(row: Node, tag: &str) -> Option<String> {
    clean(child(row, tag).and_then(|c| c.text()))
}

/// "41388000" → "41.388". Non-numeric text is dropped.
fn from_microdegrees(text: &str) -> Option<String> {
    let value: f64 = text.parse().ok()?;
    Some((value / MICRODEGREES).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_xml(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", content).unwrap();
        file
    }

    #[test]
    fn test_cat_parse_xml() {
        let file = write_xml(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<response>
  <row>
    <row _id="1">
      <denominaci>ITV Sabadell</denominaci>
      <serveis_territorials>Barcelona</serveis_territorials>
      <municipi> Sabadell </municipi>
      <adre_a>Ctra. de Terrassa 10</adre_a>
      <cp>08205</cp>
      <horari_de_servei>L-V 8-20</horari_de_servei>
      <correu_electr_nic>sabadell@example.com</correu_electr_nic>
      <lat>41548000</lat>
      <long>2107000</long>
      <web url="https://itv.example.com/sabadell"/>
    </row>
    <row _id="2">
      <denominaci>ITV Tremp</denominaci>
      <serveis_territorials>Lleida</serveis_territorials>
      <lat>n/a</lat>
    </row>
  </row>
</response>"#,
        );

        let records = CatXmlParser::new().parse(file.path()).unwrap();
        assert_eq!(records.len(), 2);

        let sabadell = &records[0];
        assert_eq!(sabadell.station_name_raw.as_deref(), Some("ITV Sabadell"));
        assert_eq!(sabadell.province_raw.as_deref(), Some("Barcelona"));
        assert_eq!(sabadell.locality_raw.as_deref(), Some("Sabadell"));
        assert_eq!(sabadell.postal_code_raw.as_deref(), Some("08205"));
        assert_eq!(sabadell.latitude_raw.as_deref(), Some("41.548"));
        assert_eq!(sabadell.longitude_raw.as_deref(), Some("2.107"));
        assert_eq!(sabadell.station_type_raw.as_deref(), Some("Estación fija"));
        assert_eq!(
            sabadell.url_raw.as_deref(),
            Some("https://itv.example.com/sabadell")
        );

        let tremp = &records[1];
        assert_eq!(tremp.locality_raw, None);
        assert_eq!(tremp.latitude_raw, None);
        assert_eq!(tremp.url_raw, None);
        assert_eq!(tremp.source_line, 2);
    }

    #[test]
    fn test_cat_malformed_xml() {
        let file = write_xml("<response><row><row><denominaci>ITV</row></response>");
        let err = CatXmlParser::new().parse(file.path()).unwrap_err();
        assert!(matches!(err, ExtractError::MalformedInput { .. }));
    }

    #[test]
    fn test_cat_outer_rows_are_not_stations() {
        let file = write_xml("<response><row></row></response>");
        let records = CatXmlParser::new().parse(file.path()).unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn test_from_microdegrees() {
        assert_eq!(from_microdegrees("41388000").as_deref(), Some("41.388"));
        assert_eq!(from_microdegrees("-500000").as_deref(), Some("-0.5"));
        assert_eq!(from_microdegrees("abc"), None);
    }
}
