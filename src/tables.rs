// 🗺️ Validation Tables - Regions, aliases, postal prefixes, bounding boxes
// Immutable configuration injected into the validators

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::path::Path;

use crate::validation::province::fold_key;

// ============================================================================
// REGION CODE
// ============================================================================

/// Autonomous community a source file belongs to.
///
/// `Esp` is the nationwide fallback used for coordinate checks when no
/// specific region applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RegionCode {
    Gal,
    Cv,
    Cat,
    Esp,
}

impl RegionCode {
    /// The three regions that have their own extractor
    pub const EXTRACTED: [RegionCode; 3] = [RegionCode::Gal, RegionCode::Cv, RegionCode::Cat];

    pub fn code(&self) -> &'static str {
        match self {
            RegionCode::Gal => "GAL",
            RegionCode::Cv => "CV",
            RegionCode::Cat => "CAT",
            RegionCode::Esp => "ESP",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            RegionCode::Gal => "Galicia",
            RegionCode::Cv => "Comunitat Valenciana",
            RegionCode::Cat => "Catalunya",
            RegionCode::Esp => "España",
        }
    }

    /// Parse a region code, case-insensitive. Unknown codes yield `None`.
    pub fn from_code(code: &str) -> Option<RegionCode> {
        match code.trim().to_uppercase().as_str() {
            "GAL" => Some(RegionCode::Gal),
            "CV" => Some(RegionCode::Cv),
            "CAT" => Some(RegionCode::Cat),
            "ESP" => Some(RegionCode::Esp),
            _ => None,
        }
    }
}

impl fmt::Display for RegionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

// ============================================================================
// BOUNDING BOX
// ============================================================================

/// Closed latitude/longitude rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub lat_min: f64,
    pub lat_max: f64,
    pub lon_min: f64,
    pub lon_max: f64,
}

impl BoundingBox {
    pub const fn new(lat_min: f64, lat_max: f64, lon_min: f64, lon_max: f64) -> Self {
        BoundingBox {
            lat_min,
            lat_max,
            lon_min,
            lon_max,
        }
    }

    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        (self.lat_min..=self.lat_max).contains(&lat) && (self.lon_min..=self.lon_max).contains(&lon)
    }
}

// ============================================================================
// VALIDATION TABLES
// ============================================================================

/// Lookup tables shared by every validator.
///
/// `province_aliases` keys are stored folded (lowercase, trimmed, no
/// diacritics); `from_file` and `with_alias` fold whatever they are given.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationTables {
    pub province_aliases: BTreeMap<String, String>,
    pub postal_prefixes: BTreeMap<RegionCode, BTreeSet<String>>,
    pub bounding_boxes: BTreeMap<RegionCode, BoundingBox>,
    pub national_box: BoundingBox,
}

impl ValidationTables {
    /// Reference tables for Galicia, Comunitat Valenciana and Catalunya
    pub fn reference() -> Self {
        let aliases: &[(&str, &str)] = &[
            // Comunitat Valenciana
            ("valencia", "Valencia"),
            ("valència", "Valencia"),
            ("alicante", "Alicante"),
            ("alacant", "Alicante"),
            ("alicante/alacant", "Alicante"),
            ("castellon", "Castellón"),
            ("castello", "Castellón"),
            ("castellon de la plana", "Castellón"),
            ("castello de la plana", "Castellón"),
            // Galicia
            ("a coruna", "A Coruña"),
            ("la coruna", "A Coruña"),
            ("coruna", "A Coruña"),
            ("lugo", "Lugo"),
            ("ourense", "Ourense"),
            ("orense", "Ourense"),
            ("pontevedra", "Pontevedra"),
            // Catalunya
            ("barcelona", "Barcelona"),
            ("girona", "Girona"),
            ("gerona", "Girona"),
            ("lleida", "Lleida"),
            ("lerida", "Lleida"),
            ("tarragona", "Tarragona"),
        ];

        let prefixes: &[(RegionCode, &[&str])] = &[
            (RegionCode::Gal, &["15", "27", "32", "36"]),
            (RegionCode::Cv, &["03", "12", "46"]),
            (RegionCode::Cat, &["08", "17", "25", "43"]),
        ];

        // Rectangular approximations, only meant to catch gross errors
        let boxes = [
            (RegionCode::Gal, BoundingBox::new(41.5, 44.0, -9.5, -6.5)),
            (RegionCode::Cv, BoundingBox::new(37.5, 41.0, -2.0, 1.0)),
            (RegionCode::Cat, BoundingBox::new(40.0, 43.0, 0.0, 3.5)),
        ];

        let mut tables = ValidationTables {
            province_aliases: BTreeMap::new(),
            postal_prefixes: prefixes
                .iter()
                .map(|(region, set)| (*region, set.iter().map(|p| p.to_string()).collect()))
                .collect(),
            bounding_boxes: boxes.into_iter().collect(),
            national_box: BoundingBox::new(36.0, 44.0, -10.0, 3.5),
        };

        for (alias, canonical) in aliases {
            tables = tables.with_alias(alias, canonical);
        }

        tables
    }

    /// Load alternate tables from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read tables file: {:?}", path.as_ref()))?;

        let tables: ValidationTables =
            serde_json::from_str(&content).context("Failed to parse tables JSON")?;

        Ok(tables.refold())
    }

    /// Builder: register one alias (folded) for a canonical province name
    pub fn with_alias(mut self, alias: &str, canonical: &str) -> Self {
        let key = fold_key(alias);
        if !key.is_empty() {
            self.province_aliases.insert(key, canonical.to_string());
        }
        self
    }

    /// Canonical name registered for an already-folded key
    pub fn canonical_for(&self, key: &str) -> Option<&str> {
        self.province_aliases.get(key).map(String::as_str)
    }

    /// Distinct canonical province names
    pub fn canonical_provinces(&self) -> BTreeSet<&str> {
        self.province_aliases.values().map(String::as_str).collect()
    }

    /// `None` when the region has no prefix table (no prefix constraint)
    pub fn prefixes_for(&self, region: RegionCode) -> Option<&BTreeSet<String>> {
        self.postal_prefixes.get(&region)
    }

    /// Box for the region, falling back to the national box
    pub fn bounding_box_for(&self, region: Option<RegionCode>) -> &BoundingBox {
        region
            .and_then(|r| self.bounding_boxes.get(&r))
            .unwrap_or(&self.national_box)
    }

    fn refold(mut self) -> Self {
        let aliases = std::mem::take(&mut self.province_aliases);
        aliases
            .iter()
            .fold(self, |tables, (alias, canonical)| tables.with_alias(alias, canonical))
    }
}

impl Default for ValidationTables {
    fn default() -> Self {
        Self::reference()
    }
}

// ============================================================================
// TESTS
// ============================================================================
