// 📮 Postal Code Validator
// Spanish postal codes: 5 digits, first two identify the province.
// Sources drop the leading zero ("3001") or store codes as numbers.

use std::sync::Arc;

use crate::tables::{RegionCode, ValidationTables};

#[derive(Debug, Clone)]
pub struct PostalCodeValidator {
    tables: Arc<ValidationTables>,
}

impl PostalCodeValidator {
    pub fn new(tables: Arc<ValidationTables>) -> Self {
        PostalCodeValidator { tables }
    }

    /// Normalize a postal code to 5 digits.
    ///
    /// Returns an empty string when the value is missing, is not 4 or 5
    /// ASCII digits, or (with `region`) its prefix is not one of the
    /// region's provinces. Regions without a prefix table only get the
    /// format check.
    ///
    /// ```
    /// use itv_stations::{PostalCodeValidator, RegionCode};
    ///
    /// let validator = PostalCodeValidator::default();
    /// assert_eq!(validator.validate_and_format(Some("3001"), Some(RegionCode::Cv)), "03001");
    /// assert_eq!(validator.validate_and_format(Some("28001"), Some(RegionCode::Cv)), "");
    /// assert_eq!(validator.validate_and_format(Some(&46001), None), "46001");
    /// ```
    pub fn validate_and_format<R>(&self, raw: Option<&R>, region: Option<RegionCode>) -> String
    where
        R: ToString + ?Sized,
    {
        let Some(raw) = raw else {
            return String::new();
        };

        let text = raw.to_string();
        let digits = text.trim();

        if !digits.chars().all(|c| c.is_ascii_digit()) {
            return String::new();
        }

        let formatted = match digits.len() {
            4 => format!("0{}", digits),
            5 => digits.to_string(),
            _ => return String::new(),
        };

        if let Some(prefixes) = region.and_then(|r| self.tables.prefixes_for(r)) {
            if !prefixes.contains(&formatted[..2]) {
                return String::new();
            }
        }

        formatted
    }
}

impl Default for PostalCodeValidator {
    fn default() -> Self {
        Self::new(Arc::new(ValidationTables::reference()))
    }
}

// ============================================================================
// TESTS
// ============================================================================
