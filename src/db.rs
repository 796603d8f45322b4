use anyhow::{Context, Result};
use rusqlite::functions::FunctionFlags;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, TransactionBehavior};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use crate::validation::fold_key;

// ============================================================================
// STATION TYPE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StationType {
    Fixed,
    Mobile,
    Other,
}

impl StationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StationType::Fixed => "fixed",
            StationType::Mobile => "mobile",
            StationType::Other => "other",
        }
    }

    /// Map a source type marker ("Estación fija", "Estación Móvil", ...).
    /// Anything unrecognised, or no marker at all, is `Other`.
    pub fn from_marker(marker: Option<&str>) -> StationType {
        let Some(marker) = marker else {
            return StationType::Other;
        };

        let lower = marker.to_lowercase();
        if lower.contains("fij") || lower.contains("fix") {
            StationType::Fixed
        } else if lower.contains("móvil") || lower.contains("movil") || lower.contains("mobil") {
            StationType::Mobile
        } else {
            StationType::Other
        }
    }

    /// Only fixed stations carry a postal code
    pub fn requires_postal_code(&self) -> bool {
        *self == StationType::Fixed
    }
}

impl fmt::Display for StationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// ROWS
// ============================================================================

/// Station fields after every validation rule has passed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedStation {
    pub name: String,
    pub station_type: StationType,
    pub province: String,
    pub locality: String,
    pub address: Option<String>,
    /// Empty for mobile/other stations
    pub postal_code: String,
    pub latitude: f64,
    pub longitude: f64,
    pub description: Option<String>,
    pub schedule: Option<String>,
    pub contact: Option<String>,
    pub url: Option<String>,
}

/// Station as read back from the store, joined with its locality/province
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredStation {
    pub id: i64,
    pub name: String,
    pub station_type: String,
    pub address: Option<String>,
    pub postal_code: String,
    pub longitude: Option<f64>,
    pub latitude: Option<f64>,
    pub description: Option<String>,
    pub schedule: Option<String>,
    pub contact: Option<String>,
    pub url: Option<String>,
    pub locality: String,
    pub province: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StationFilter {
    /// Case-insensitive substring of the locality name
    pub locality: Option<String>,
    /// Exact 5-digit postal code
    pub postal_code: Option<String>,
    /// Case-insensitive substring of the province name
    pub province: Option<String>,
    pub station_type: Option<StationType>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Locality {
    pub id: i64,
    pub name: String,
    pub province: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreStatus {
    pub total_stations: i64,
    pub total_provinces: i64,
    pub total_localities: i64,
    pub stations_per_type: BTreeMap<String, i64>,
}

// ============================================================================
// STORAGE PORT
// ============================================================================

/// What the validation pipeline needs from storage.
///
/// Implementations must make `get_or_create_*` safe against concurrent
/// writers (uniqueness constraint plus upsert), and are expected to run all
/// calls of one extractor run inside a single transaction.
pub trait StationStore {
    fn get_or_create_province(&self, name: &str) -> Result<i64>;
    fn get_or_create_locality(&self, name: &str, province_id: i64) -> Result<i64>;
    fn insert_station(&self, station: &NormalizedStation, locality_id: i64) -> Result<()>;
    fn station_name_exists(&self, name: &str) -> Result<bool>;
}

// `rusqlite::Transaction` derefs to `Connection`; a run passes `&*tx`.
impl StationStore for Connection {
    fn get_or_create_province(&self, name: &str) -> Result<i64> {
        self.execute(
            "INSERT INTO provinces (name) VALUES (?1) ON CONFLICT(name) DO NOTHING",
            params![name],
        )
        .with_context(|| format!("Failed to insert province {}", name))?;

        let id = self
            .query_row("SELECT id FROM provinces WHERE name = ?1", params![name], |row| row.get(0))
            .with_context(|| format!("Failed to look up province {}", name))?;

        Ok(id)
    }

    fn get_or_create_locality(&self, name: &str, province_id: i64) -> Result<i64> {
        self.execute(
            "INSERT INTO localities (name, province_id) VALUES (?1, ?2)
             ON CONFLICT(name, province_id) DO NOTHING",
            params![name, province_id],
        )
        .with_context(|| format!("Failed to insert locality {}", name))?;

        let id = self
            .query_row(
                "SELECT id FROM localities WHERE name = ?1 AND province_id = ?2",
                params![name, province_id],
                |row| row.get(0),
            )
            .with_context(|| format!("Failed to look up locality {}", name))?;

        Ok(id)
    }

    fn insert_station(&self, station: &NormalizedStation, locality_id: i64) -> Result<()> {
        self.execute(
            "INSERT INTO stations (
                name, station_type, address, postal_code, longitude, latitude,
                description, schedule, contact, url, locality_id
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                station.name,
                station.station_type.as_str(),
                station.address,
                station.postal_code,
                station.longitude,
                station.latitude,
                station.description,
                station.schedule,
                station.contact,
                station.url,
                locality_id,
            ],
        )
        .with_context(|| format!("Failed to insert station {}", station.name))?;

        Ok(())
    }

    fn station_name_exists(&self, name: &str) -> Result<bool> {
        let found: Option<i64> = self
            .query_row(
                "SELECT id FROM stations WHERE name = ?1 LIMIT 1",
                params![name],
                |row| row.get(0),
            )
            .optional()?;

        Ok(found.is_some())
    }
}

// ============================================================================
// SCHEMA
// ============================================================================

/// Open (or create) the store and make sure the schema exists
pub fn open_database(path: &Path, busy_timeout: Duration) -> Result<Connection> {
    let conn = Connection::open(path)
        .with_context(|| format!("Failed to open database: {}", path.display()))?;
    conn.busy_timeout(busy_timeout)?;
    setup_database(&conn)?;
    Ok(conn)
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // WAL lets searches run while an extractor holds the write lock
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    register_functions(conn)?;

    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS provinces (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE
        );

        CREATE TABLE IF NOT EXISTS localities (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            province_id INTEGER NOT NULL REFERENCES provinces(id) ON DELETE CASCADE,
            UNIQUE (name, province_id)
        );

        CREATE TABLE IF NOT EXISTS stations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            station_type TEXT NOT NULL CHECK (station_type IN ('fixed', 'mobile', 'other')),
            address TEXT,
            postal_code TEXT NOT NULL DEFAULT '',
            longitude REAL,
            latitude REAL,
            description TEXT,
            schedule TEXT,
            contact TEXT,
            url TEXT,
            locality_id INTEGER NOT NULL REFERENCES localities(id) ON DELETE CASCADE,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );

        CREATE INDEX IF NOT EXISTS idx_stations_locality ON stations(locality_id);
        CREATE INDEX IF NOT EXISTS idx_stations_postal_code ON stations(postal_code);
        CREATE INDEX IF NOT EXISTS idx_localities_province ON localities(province_id);",
    )?;

    Ok(())
}

/// `fold_key(text)` in SQL: SQLite's own LOWER only handles ASCII, so
/// "CASTELLÓN" would never match "Castellón"
fn register_functions(conn: &Connection) -> Result<()> {
    conn.create_scalar_function(
        "fold_key",
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let text: Option<String> = ctx.get(0)?;
            Ok(text.map(|t| fold_key(&t)))
        },
    )
    .context("Failed to register fold_key SQL function")?;

    Ok(())
}

// ============================================================================
// QUERIES
// ============================================================================

pub fn search_stations(conn: &Connection, filter: &StationFilter) -> Result<Vec<StoredStation>> {
    let mut sql = String::from(
        "SELECT s.id, s.name, s.station_type, s.address, s.postal_code,
                s.longitude, s.latitude, s.description, s.schedule, s.contact, s.url,
                l.name, p.name
         FROM stations s
         JOIN localities l ON s.locality_id = l.id
         JOIN provinces p ON l.province_id = p.id
         WHERE 1=1",
    );
    let mut values: Vec<String> = Vec::new();

    if let Some(locality) = filter.locality.as_deref().filter(|s| !s.trim().is_empty()) {
        sql.push_str(" AND fold_key(l.name) LIKE ?");
        values.push(format!("%{}%", fold_key(locality)));
    }

    if let Some(postal_code) = filter.postal_code.as_deref().filter(|s| !s.trim().is_empty()) {
        sql.push_str(" AND s.postal_code = ?");
        values.push(postal_code.trim().to_string());
    }

    if let Some(province) = filter.province.as_deref().filter(|s| !s.trim().is_empty()) {
        sql.push_str(" AND fold_key(p.name) LIKE ?");
        values.push(format!("%{}%", fold_key(province)));
    }

    if let Some(station_type) = filter.station_type {
        sql.push_str(" AND s.station_type = ?");
        values.push(station_type.as_str().to_string());
    }

    sql.push_str(" ORDER BY p.name, l.name, s.name");

    let mut stmt = conn.prepare(&sql)?;
    let stations = stmt
        .query_map(params_from_iter(values.iter()), |row| {
            Ok(StoredStation {
                id: row.get(0)?,
                name: row.get(1)?,
                station_type: row.get(2)?,
                address: row.get(3)?,
                postal_code: row.get(4)?,
                longitude: row.get(5)?,
                latitude: row.get(6)?,
                description: row.get(7)?,
                schedule: row.get(8)?,
                contact: row.get(9)?,
                url: row.get(10)?,
                locality: row.get(11)?,
                province: row.get(12)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(stations)
}

pub fn list_provinces(conn: &Connection) -> Result<Vec<(i64, String)>> {
    let mut stmt = conn.prepare("SELECT id, name FROM provinces ORDER BY name")?;
    let provinces = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(provinces)
}

/// Localities of a province, matched by folded name (case and accents ignored)
pub fn list_localities(conn: &Connection, province: &str) -> Result<Vec<Locality>> {
    let mut stmt = conn.prepare(
        "SELECT l.id, l.name, p.name
         FROM localities l
         JOIN provinces p ON l.province_id = p.id
         WHERE fold_key(p.name) = ?1
         ORDER BY l.name",
    )?;

    let localities = stmt
        .query_map(params![fold_key(province)], |row| {
            Ok(Locality {
                id: row.get(0)?,
                name: row.get(1)?,
                province: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(localities)
}

pub fn count_stations(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM stations", [], |row| row.get(0))?;

    Ok(count)
}

pub fn store_status(conn: &Connection) -> Result<StoreStatus> {
    let total_provinces: i64 =
        conn.query_row("SELECT COUNT(*) FROM provinces", [], |row| row.get(0))?;
    let total_localities: i64 =
        conn.query_row("SELECT COUNT(*) FROM localities", [], |row| row.get(0))?;

    let mut stmt = conn.prepare(
        "SELECT station_type, COUNT(*) FROM stations GROUP BY station_type ORDER BY station_type",
    )?;
    let stations_per_type = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
        .collect::<Result<BTreeMap<_, _>, _>>()?;

    Ok(StoreStatus {
        total_stations: count_stations(conn)?,
        total_provinces,
        total_localities,
        stations_per_type,
    })
}

/// Delete every station, locality and province. Returns the number of
/// stations removed.
pub fn wipe_store(conn: &mut Connection) -> Result<usize> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let stations = tx.execute("DELETE FROM stations", [])?;
    tx.execute("DELETE FROM localities", [])?;
    tx.execute("DELETE FROM provinces", [])?;

    tx.commit().context("Failed to commit store wipe")?;

    Ok(stations)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_station(name: &str, station_type: StationType, postal_code: &str) -> NormalizedStation {
        NormalizedStation {
            name: name.to_string(),
            station_type,
            province: "Alicante".to_string(),
            locality: "Elche".to_string(),
            address: Some("Carrer Major 1".to_string()),
            postal_code: postal_code.to_string(),
            latitude: 38.26,
            longitude: -0.70,
            description: None,
            schedule: Some("L-V 8:00-20:00".to_string()),
            contact: Some("Email: itv@example.com".to_string()),
            url: None,
        }
    }

    fn insert(conn: &Connection, station: &NormalizedStation) {
        let province_id = conn.get_or_create_province(&station.province).unwrap();
        let locality_id = conn.get_or_create_locality(&station.locality, province_id).unwrap();
        conn.insert_station(station, locality_id).unwrap();
    }

    #[test]
    fn test_get_or_create_is_stable() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();

        let alicante1 = conn.get_or_create_province("Alicante").unwrap();
        let alicante2 = conn.get_or_create_province("Alicante").unwrap();
        let valencia = conn.get_or_create_province("Valencia").unwrap();

        assert_eq!(alicante1, alicante2);
        assert_ne!(alicante1, valencia);

        let elche1 = conn.get_or_create_locality("Elche", alicante1).unwrap();
        let elche2 = conn.get_or_create_locality("Elche", alicante1).unwrap();
        let other_elche = conn.get_or_create_locality("Elche", valencia).unwrap();

        assert_eq!(elche1, elche2);
        assert_ne!(elche1, other_elche, "Locality is unique per (name, province)");
    }

    #[test]
    fn test_station_name_exists() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();

        assert!(!conn.station_name_exists("EST-01").unwrap());
        insert(&conn, &test_station("EST-01", StationType::Fixed, "03201"));
        assert!(conn.station_name_exists("EST-01").unwrap());
        assert!(!conn.station_name_exists("EST-02").unwrap());
    }

    #[test]
    fn test_station_name_is_unique() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();

        insert(&conn, &test_station("EST-01", StationType::Fixed, "03201"));

        let locality_id = conn.get_or_create_locality("Elche", 1).unwrap();
        let result = conn.insert_station(&test_station("EST-01", StationType::Fixed, "03201"), locality_id);
        assert!(result.is_err(), "Unique constraint backstops the duplicate check");
    }

    #[test]
    fn test_search_filters() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();

        insert(&conn, &test_station("EST-01", StationType::Fixed, "03201"));
        insert(&conn, &test_station("EST-02", StationType::Mobile, ""));

        let mut lugo = test_station("ITV Lugo", StationType::Fixed, "27001");
        lugo.province = "Lugo".to_string();
        lugo.locality = "Lugo".to_string();
        insert(&conn, &lugo);

        let all = search_stations(&conn, &StationFilter::default()).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].province, "Alicante", "Ordered by province first");

        let by_locality = search_stations(
            &conn,
            &StationFilter {
                locality: Some("ELCH".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(by_locality.len(), 2);

        let by_cp = search_stations(
            &conn,
            &StationFilter {
                postal_code: Some("27001".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(by_cp.len(), 1);
        assert_eq!(by_cp[0].name, "ITV Lugo");

        let mobile = search_stations(
            &conn,
            &StationFilter {
                province: Some("alic".to_string()),
                station_type: Some(StationType::Mobile),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(mobile.len(), 1);
        assert_eq!(mobile[0].postal_code, "");
    }

    #[test]
    fn test_search_accented_capitals() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();

        let mut station = test_station("ITV Vila-real", StationType::Fixed, "12540");
        station.province = "Castellón".to_string();
        station.locality = "Vila-real".to_string();
        insert(&conn, &station);

        for province in ["CASTELLÓN", "castellón", "Castellon"] {
            let found = search_stations(
                &conn,
                &StationFilter {
                    province: Some(province.to_string()),
                    ..Default::default()
                },
            )
            .unwrap();
            assert_eq!(found.len(), 1, "province filter {}", province);
        }

        let by_locality = search_stations(
            &conn,
            &StationFilter {
                locality: Some("VILA-REAL".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(by_locality.len(), 1);

        let localities = list_localities(&conn, "CASTELLÓN").unwrap();
        assert_eq!(localities.len(), 1);
        assert_eq!(localities[0].province, "Castellón");
    }

    #[test]
    fn test_status_and_wipe() {
        let mut conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();

        insert(&conn, &test_station("EST-01", StationType::Fixed, "03201"));
        insert(&conn, &test_station("EST-02", StationType::Mobile, ""));

        let status = store_status(&conn).unwrap();
        assert_eq!(status.total_stations, 2);
        assert_eq!(status.total_provinces, 1);
        assert_eq!(status.total_localities, 1);
        assert_eq!(status.stations_per_type.get("fixed"), Some(&1));
        assert_eq!(status.stations_per_type.get("mobile"), Some(&1));

        assert_eq!(list_provinces(&conn).unwrap(), vec![(1, "Alicante".to_string())]);
        assert_eq!(list_localities(&conn, "ALICANTE").unwrap().len(), 1);

        let removed = wipe_store(&mut conn).unwrap();
        assert_eq!(removed, 2);

        let status = store_status(&conn).unwrap();
        assert_eq!(status.total_stations, 0);
        assert_eq!(status.total_provinces, 0);
        assert!(status.stations_per_type.is_empty());
    }

    #[test]
    fn test_station_type_markers() {
        assert_eq!(StationType::from_marker(Some("Estación Fija")), StationType::Fixed);
        assert_eq!(StationType::from_marker(Some("Estación_fija")), StationType::Fixed);
        assert_eq!(StationType::from_marker(Some("Estación Móvil")), StationType::Mobile);
        assert_eq!(StationType::from_marker(Some("ESTACION MOVIL")), StationType::Mobile);
        assert_eq!(StationType::from_marker(Some("Agrícola")), StationType::Other);
        assert_eq!(StationType::from_marker(None), StationType::Other);
        assert!(StationType::Fixed.requires_postal_code());
        assert!(!StationType::Other.requires_postal_code());
    }
}
