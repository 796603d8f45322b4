// ⚙️ Ingest configuration (TOML)
//
// Example:
//
//   database = "itv.db"
//   duplicate_policy = "fail_open"
//   tables = "tables.json"
//   busy_timeout_ms = 5000
//
//   [sources]
//   gal = "data/Estacions_ITVs.csv"
//   cv = "data/estaciones.json"
//   cat = "data/ITV-CAT.xml"

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::pipeline::PipelineSettings;
use crate::tables::{RegionCode, ValidationTables};
use crate::validation::DuplicatePolicy;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub database: PathBuf,
    pub sources: SourcePaths,
    pub duplicate_policy: DuplicatePolicy,
    /// Alternate lookup tables (JSON); the reference tables otherwise
    pub tables: Option<PathBuf>,
    pub busy_timeout_ms: u64,
}

/// Source file per region. Regions without a path are skipped by `load`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcePaths {
    pub gal: Option<PathBuf>,
    pub cv: Option<PathBuf>,
    pub cat: Option<PathBuf>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        IngestConfig {
            database: PathBuf::from("itv.db"),
            sources: SourcePaths::default(),
            duplicate_policy: DuplicatePolicy::default(),
            tables: None,
            busy_timeout_ms: 5000,
        }
    }
}

impl IngestConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: IngestConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// `load` when a path is given, defaults otherwise
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::default()),
        }
    }

    pub fn source_for(&self, region: RegionCode) -> Option<&Path> {
        match region {
            RegionCode::Gal => self.sources.gal.as_deref(),
            RegionCode::Cv => self.sources.cv.as_deref(),
            RegionCode::Cat => self.sources.cat.as_deref(),
            RegionCode::Esp => None,
        }
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    /// Validation tables and duplicate policy for every run of this config
    pub fn pipeline_settings(&self) -> Result<PipelineSettings> {
        let tables = match &self.tables {
            Some(path) => ValidationTables::from_file(path)?,
            None => ValidationTables::reference(),
        };

        Ok(PipelineSettings::new(tables, self.duplicate_policy))
    }
}
