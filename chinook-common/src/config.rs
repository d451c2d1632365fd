//! Configuration model, TOML loading, and config file resolution
//!
//! The pipeline library only ever sees a resolved [`PipelineConfig`]. Locating
//! and parsing the file happens here, driven by the binary.
//!
//! Config file resolution priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (`CHINOOK_ETL_CONFIG`)
//! 3. Platform config dir: `<config dir>/chinook-etl/config.toml`
//! 4. Compiled defaults (fallback)

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "CHINOOK_ETL_CONFIG";

/// Where aggregation happens for a report
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    /// Grouping and summation pushed into the SQL query
    #[default]
    Query,
    /// Raw rows fetched and grouped in memory
    Client,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Query => "query",
            StrategyKind::Client => "client",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "query" | "sql" => Ok(StrategyKind::Query),
            "client" | "memory" => Ok(StrategyKind::Client),
            other => Err(Error::Config(format!(
                "Unknown aggregation strategy '{}' (expected 'query' or 'client')",
                other
            ))),
        }
    }
}

/// The fixed set of reports the pipeline produces, in run order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ReportId {
    SalesByMonth,
    SalesByQuarter,
    SalesByYear,
    SalesByGenre,
    TopArtists,
    TracksByGenre,
}

impl ReportId {
    pub const ALL: [ReportId; 6] = [
        ReportId::SalesByMonth,
        ReportId::SalesByQuarter,
        ReportId::SalesByYear,
        ReportId::SalesByGenre,
        ReportId::TopArtists,
        ReportId::TracksByGenre,
    ];

    /// Key used under `[reports.*]` and as the step name
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportId::SalesByMonth => "sales_by_month",
            ReportId::SalesByQuarter => "sales_by_quarter",
            ReportId::SalesByYear => "sales_by_year",
            ReportId::SalesByGenre => "sales_by_genre",
            ReportId::TopArtists => "top_artists",
            ReportId::TracksByGenre => "tracks_by_genre",
        }
    }

    pub fn default_file_name(&self) -> String {
        format!("{}.csv", self.as_str())
    }

    fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|id| id.as_str() == key)
    }
}

impl fmt::Display for ReportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `[db]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// `[logging]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log file; `None` logs to stdout only
    #[serde(default = "default_log_path")]
    pub path: Option<PathBuf>,
    /// Filter directive used when `RUST_LOG` is not set
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            path: default_log_path(),
            level: default_log_level(),
        }
    }
}

/// One `[reports.<name>]` table
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportConfig {
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub strategy: StrategyKind,
}

/// `[reports]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportsConfig {
    /// Directory for reports without an explicit `path`
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(flatten)]
    pub entries: BTreeMap<String, ReportConfig>,
}

impl Default for ReportsConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            entries: BTreeMap::new(),
        }
    }
}

/// Destination and strategy for one report after defaults are applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedReport {
    pub id: ReportId,
    pub path: PathBuf,
    pub strategy: StrategyKind,
}

/// Fully resolved pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub reports: ReportsConfig,
    /// Ranking cutoff for the top artists report
    #[serde(default = "default_top_n")]
    pub top_n: i64,
    /// Year for the annual report; latest invoice year when unset
    #[serde(default)]
    pub year: Option<i32>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            db: DbConfig::default(),
            logging: LoggingConfig::default(),
            reports: ReportsConfig::default(),
            top_n: default_top_n(),
            year: None,
        }
    }
}

impl PipelineConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: PipelineConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Read config {} failed: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Reject report keys the pipeline does not produce
    ///
    /// `top_n` and `year` are checked where they are used so the failure is
    /// attributed to the report step that needs them.
    pub fn validate(&self) -> Result<()> {
        let unknown: Vec<&str> = self
            .reports
            .entries
            .keys()
            .filter(|key| ReportId::from_key(key).is_none())
            .map(String::as_str)
            .collect();
        if !unknown.is_empty() {
            return Err(Error::Config(format!(
                "Unknown report(s) in [reports]: {}",
                unknown.join(", ")
            )));
        }
        Ok(())
    }

    /// Destination path and strategy for a report
    pub fn report(&self, id: ReportId) -> ResolvedReport {
        let entry = self.reports.entries.get(id.as_str());
        let path = entry
            .and_then(|e| e.path.clone())
            .unwrap_or_else(|| self.reports.output_dir.join(id.default_file_name()));
        let strategy = entry.map(|e| e.strategy).unwrap_or_default();
        ResolvedReport { id, path, strategy }
    }

    /// Force one strategy for every report
    pub fn set_strategy_for_all(&mut self, strategy: StrategyKind) {
        for id in ReportId::ALL {
            self.reports
                .entries
                .entry(id.as_str().to_string())
                .or_default()
                .strategy = strategy;
        }
    }
}

/// Locates the config file following the documented priority order
#[derive(Debug, Clone)]
pub struct ConfigResolver {
    app_name: String,
}

impl ConfigResolver {
    pub fn new(app_name: &str) -> Self {
        Self {
            app_name: app_name.to_string(),
        }
    }

    /// Platform default config file location
    pub fn default_config_path(&self) -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(&self.app_name).join("config.toml"))
    }

    /// Resolve and load configuration
    ///
    /// An explicitly named file (CLI or ENV) must exist and parse. The
    /// platform default file is optional: when absent, compiled defaults are
    /// used with a warning.
    pub fn resolve(&self, cli_arg: Option<&Path>) -> Result<PipelineConfig> {
        // Priority 1: Command-line argument
        if let Some(path) = cli_arg {
            info!("Loading config from command line: {}", path.display());
            return PipelineConfig::load(path);
        }

        // Priority 2: Environment variable
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            if !path.trim().is_empty() {
                info!("Loading config from {}: {}", CONFIG_ENV_VAR, path);
                return PipelineConfig::load(Path::new(&path));
            }
        }

        // Priority 3: platform config dir
        if let Some(path) = self.default_config_path() {
            if path.exists() {
                info!("Loading config from {}", path.display());
                return PipelineConfig::load(&path);
            }
        }

        // Priority 4: compiled defaults
        warn!("No config file found, using compiled defaults");
        Ok(PipelineConfig::default())
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("data/chinook.db")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_log_path() -> Option<PathBuf> {
    Some(PathBuf::from("pipeline_log.txt"))
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_top_n() -> i64 {
    10
}
