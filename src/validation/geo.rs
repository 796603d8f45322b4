// 🌍 Coordinate sanity filter
// Coarse rectangular check per region: catches swapped lat/lon, wrong scale
// (micro-degrees left undivided) and zeroed coordinates. Not a geofence.

use std::sync::Arc;

use crate::tables::{RegionCode, ValidationTables};

/// A raw coordinate as sources deliver it: already numeric or still text.
pub trait CoordinateValue {
    /// Decimal degrees, or `None` if the value is not a finite number
    fn as_decimal_degrees(&self) -> Option<f64>;
}

impl CoordinateValue for f64 {
    fn as_decimal_degrees(&self) -> Option<f64> {
        self.is_finite().then_some(*self)
    }
}

impl CoordinateValue for str {
    fn as_decimal_degrees(&self) -> Option<f64> {
        self.trim().parse::<f64>().ok()?.as_decimal_degrees()
    }
}

impl CoordinateValue for String {
    fn as_decimal_degrees(&self) -> Option<f64> {
        self.as_str().as_decimal_degrees()
    }
}

impl<T: CoordinateValue + ?Sized> CoordinateValue for &T {
    fn as_decimal_degrees(&self) -> Option<f64> {
        (**self).as_decimal_degrees()
    }
}

#[derive(Debug, Clone)]
pub struct GeoValidator {
    tables: Arc<ValidationTables>,
}

impl GeoValidator {
    pub fn new(tables: Arc<ValidationTables>) -> Self {
        GeoValidator { tables }
    }

    /// True iff both values are finite numbers inside the region's box.
    /// `None` or an unboxed region (`Esp`) uses the national box.
    pub fn has_valid_coordinates<La, Lo>(
        &self,
        lat: Option<La>,
        lon: Option<Lo>,
        region: Option<RegionCode>,
    ) -> bool
    where
        La: CoordinateValue,
        Lo: CoordinateValue,
    {
        match Self::parse_pair(lat, lon) {
            Some((lat, lon)) => self.tables.bounding_box_for(region).contains(lat, lon),
            None => false,
        }
    }

    /// Both coordinates as decimal degrees, if both parse
    pub fn parse_pair<La, Lo>(lat: Option<La>, lon: Option<Lo>) -> Option<(f64, f64)>
    where
        La: CoordinateValue,
        Lo: CoordinateValue,
    {
        Some((lat?.as_decimal_degrees()?, lon?.as_decimal_degrees()?))
    }
}

impl Default for GeoValidator {
    fn default() -> Self {
        Self::new(Arc::new(ValidationTables::reference()))
    }
}

// ============================================================================
// TESTS
// ============================================================================
