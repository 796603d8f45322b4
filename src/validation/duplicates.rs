// 🔍 Duplicate station names
// One existence lookup per record against everything already in the store,
// including stations inserted earlier in the same run.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::db::StationStore;

// ============================================================================
// LOOKUP FAILURE POLICY
// ============================================================================

/// What a failed existence lookup counts as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// Lookup fault → "not a duplicate"; ingestion keeps going
    #[default]
    FailOpen,

    /// Lookup fault → "duplicate"; the record is discarded
    FailClosed,
}

// ============================================================================
// DUPLICATE CHECKER
// ============================================================================

pub struct DuplicateChecker<'a, S: StationStore + ?Sized> {
    store: &'a S,
    policy: DuplicatePolicy,
}

impl<'a, S: StationStore + ?Sized> DuplicateChecker<'a, S> {
    pub fn new(store: &'a S, policy: DuplicatePolicy) -> Self {
        DuplicateChecker { store, policy }
    }

    /// Whether a station with this name is already stored.
    /// The caller rejects empty names before asking.
    pub fn is_duplicate(&self, name: &str) -> bool {
        match self.store.station_name_exists(name) {
            Ok(exists) => exists,
            Err(e) => {
                let assumed = self.policy == DuplicatePolicy::FailClosed;
                warn!(
                    station = name,
                    error = %e,
                    policy = ?self.policy,
                    "duplicate lookup failed, treating as duplicate={}",
                    assumed
                );
                assumed
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{setup_database, NormalizedStation, StationType};
    use anyhow::{anyhow, Result};
    use rusqlite::Connection;

    /// Store whose lookups always fail
    struct BrokenStore;

    impl StationStore for BrokenStore {
        fn get_or_create_province(&self, _name: &str) -> Result<i64> {
            Err(anyhow!("store offline"))
        }
        fn get_or_create_locality(&self, _name: &str, _province_id: i64) -> Result<i64> {
            Err(anyhow!("store offline"))
        }
        fn insert_station(&self, _station: &NormalizedStation, _locality_id: i64) -> Result<()> {
            Err(anyhow!("store offline"))
        }
        fn station_name_exists(&self, _name: &str) -> Result<bool> {
            Err(anyhow!("store offline"))
        }
    }

    #[test]
    fn test_detects_existing_name() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();

        let province_id = conn.get_or_create_province("Lugo").unwrap();
        let locality_id = conn.get_or_create_locality("Lugo", province_id).unwrap();
        conn.insert_station(
            &NormalizedStation {
                name: "ITV Lugo".to_string(),
                station_type: StationType::Fixed,
                province: "Lugo".to_string(),
                locality: "Lugo".to_string(),
                address: None,
                postal_code: "27001".to_string(),
                latitude: 43.0,
                longitude: -7.5,
                description: None,
                schedule: None,
                contact: None,
                url: None,
            },
            locality_id,
        )
        .unwrap();

        let checker = DuplicateChecker::new(&conn, DuplicatePolicy::default());
        assert!(checker.is_duplicate("ITV Lugo"));
        assert!(!checker.is_duplicate("ITV Monforte"));
    }

    #[test]
    fn test_fail_open_on_lookup_error() {
        let checker = DuplicateChecker::new(&BrokenStore, DuplicatePolicy::FailOpen);
        assert!(!checker.is_duplicate("EST-01"));
    }

    #[test]
    fn test_fail_closed_on_lookup_error() {
        let checker = DuplicateChecker::new(&BrokenStore, DuplicatePolicy::FailClosed);
        assert!(checker.is_duplicate("EST-01"));
    }

    #[test]
    fn test_default_policy_is_fail_open() {
        assert_eq!(DuplicatePolicy::default(), DuplicatePolicy::FailOpen);
    }
}
