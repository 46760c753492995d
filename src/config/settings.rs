//! TOML-based configuration for dbscribe.
//!
//! Supports a config file (dbscribe.toml) with environment variable expansion.
//!
//! Example configuration:
//! ```toml
//! [source]
//! driver = "sqlite"
//! path = "${DATA_DIR}/app.db"
//!
//! [harvest]
//! owner = "main"
//! concurrency = 8
//! query_timeout = "5m"
//! table_timeout = "60s"
//! output = "database_readme.md"
//!
//! [pool]
//! headroom = 2
//! acquire_timeout = "30s"
//!
//! [mirror]
//! enabled = true
//! path = "metadata.db"
//! table_prefix = "catalog_"
//!
//! [api]
//! bind = "127.0.0.1:5000"
//! ```

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::source::SourceDriver;
use crate::catalog::TableFilter;
use crate::document::ContentRetention;
use crate::harvest::HarvestOptions;
use crate::mirror::{MirrorConfig, MirrorSchema, DEFAULT_TABLE_PREFIX};

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "DBSCRIBE_CONFIG";

/// Error type for settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid duration format: {0}")]
    InvalidDuration(String),

    #[error("Unsupported driver: {0}. Supported: sqlite, snapshot")]
    UnsupportedDriver(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    pub source: SourceSettings,
    pub harvest: HarvestSettings,
    pub pool: PoolSettings,
    pub mirror: MirrorSettings,
    pub api: ApiSettings,
}

/// Source catalog.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SourceSettings {
    /// Catalog driver (sqlite, snapshot).
    pub driver: String,

    /// Database file or snapshot path (supports ${ENV_VAR} expansion).
    pub path: Option<String>,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            driver: SourceDriver::default().as_str().to_string(),
            path: None,
        }
    }
}

impl SourceSettings {
    /// Get the driver type.
    pub fn driver_type(&self) -> Result<SourceDriver, SettingsError> {
        self.driver.parse()
    }

    /// Get the source path with environment variables expanded.
    pub fn resolved_path(&self) -> Result<PathBuf, SettingsError> {
        let path = self
            .path
            .as_deref()
            .ok_or_else(|| SettingsError::InvalidConfig("source.path is not set".to_string()))?;
        Ok(PathBuf::from(expand_env_vars(path)?))
    }
}

/// Harvest run.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HarvestSettings {
    /// Exact owner to harvest.
    pub owner: Option<String>,

    /// Table name substring.
    pub table: Option<String>,

    /// Concurrent extractions.
    pub concurrency: usize,

    /// Timeout of the table listing (e.g., "5m").
    pub query_timeout: String,

    /// Timeout of each table's extraction (e.g., "60s").
    pub table_timeout: String,

    /// Output document path.
    pub output: String,

    /// Keep rendered sections in memory until finalize.
    pub retain_content: bool,
}

impl Default for HarvestSettings {
    fn default() -> Self {
        Self {
            owner: None,
            table: None,
            concurrency: 10,
            query_timeout: "300s".to_string(),
            table_timeout: "60s".to_string(),
            output: "database_readme.md".to_string(),
            retain_content: false,
        }
    }
}

/// Connection pool sizing.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PoolSettings {
    /// Connections allowed above the harvest concurrency.
    pub headroom: usize,

    /// How long to wait for a free connection (e.g., "30s").
    pub acquire_timeout: String,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            headroom: 2,
            acquire_timeout: "30s".to_string(),
        }
    }
}

/// Mirror store.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MirrorSettings {
    /// Write the mirror during harvests.
    pub enabled: bool,

    /// SQLite file of the mirror (supports ${ENV_VAR} expansion).
    pub path: String,

    /// Prefix of the five mirror tables.
    pub table_prefix: String,
}

impl Default for MirrorSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            path: "dbscribe-mirror.db".to_string(),
            table_prefix: DEFAULT_TABLE_PREFIX.to_string(),
        }
    }
}

impl MirrorSettings {
    pub fn resolved_path(&self) -> Result<PathBuf, SettingsError> {
        Ok(PathBuf::from(expand_env_vars(&self.path)?))
    }

    pub fn schema(&self) -> Result<MirrorSchema, SettingsError> {
        MirrorSchema::new(&self.table_prefix)
            .map_err(|e| SettingsError::InvalidConfig(e.to_string()))
    }

    pub fn config(&self) -> Result<MirrorConfig, SettingsError> {
        self.schema()?;
        Ok(MirrorConfig::new(self.resolved_path()?).with_prefix(self.table_prefix.clone()))
    }
}

/// Query API server.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ApiSettings {
    /// Address to listen on.
    pub bind: String,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:5000".to_string(),
        }
    }
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SettingsError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let settings: Settings = toml::from_str(&content)?;
        Ok(settings)
    }

    /// Load settings from the default config file locations.
    ///
    /// Searches in order:
    /// 1. Environment variable `DBSCRIBE_CONFIG`
    /// 2. `./dbscribe.toml`
    /// 3. `~/.config/dbscribe/config.toml`
    pub fn load() -> Result<Self, SettingsError> {
        if let Ok(path) = env::var(CONFIG_ENV) {
            return Self::from_file(&path);
        }

        let local_config = PathBuf::from("dbscribe.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("dbscribe").join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        Ok(Settings::default())
    }

    /// Load an explicit file when given, otherwise search the defaults.
    pub fn load_from(path: Option<&Path>) -> Result<Self, SettingsError> {
        match path {
            Some(path) => Self::from_file(path),
            None => Self::load(),
        }
    }

    /// Check values that deserialize fine but cannot be used.
    pub fn validate(&self) -> Result<(), SettingsError> {
        self.source.driver_type()?;
        if self.harvest.concurrency == 0 {
            return Err(SettingsError::InvalidConfig(
                "harvest.concurrency must be at least 1".to_string(),
            ));
        }
        parse_duration(&self.harvest.query_timeout)?;
        parse_duration(&self.harvest.table_timeout)?;
        parse_duration(&self.pool.acquire_timeout)?;
        self.mirror.schema()?;
        Ok(())
    }

    /// Build the options of a harvest run.
    pub fn harvest_options(&self) -> Result<HarvestOptions, SettingsError> {
        self.validate()?;
        let h = &self.harvest;

        let mut options = HarvestOptions::new(expand_env_vars(&h.output)?);
        options.filter = TableFilter::new(h.owner.clone(), h.table.clone());
        options.concurrency = h.concurrency;
        options.query_timeout = parse_duration(&h.query_timeout)?;
        options.table_timeout = parse_duration(&h.table_timeout)?;
        options.retention = ContentRetention::from_flag(h.retain_content);
        options.pool_headroom = self.pool.headroom;
        options.acquire_timeout = parse_duration(&self.pool.acquire_timeout)?;
        options.mirror = if self.mirror.enabled {
            Some(self.mirror.config()?)
        } else {
            None
        };
        Ok(options)
    }
}

/// Parse a human duration: `"250ms"`, `"30s"`, `"5m"`, `"1h"`, or bare seconds.
pub fn parse_duration(s: &str) -> Result<Duration, SettingsError> {
    let s = s.trim();
    let invalid = || SettingsError::InvalidDuration(s.to_string());

    let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let (number, unit) = s.split_at(split);
    let value: u64 = number.parse().map_err(|_| invalid())?;

    let duration = match unit.trim() {
        "" | "s" => Duration::from_secs(value),
        "ms" => Duration::from_millis(value),
        "m" => Duration::from_secs(value.checked_mul(60).ok_or_else(invalid)?),
        "h" => Duration::from_secs(value.checked_mul(3600).ok_or_else(invalid)?),
        _ => return Err(invalid()),
    };
    if duration.is_zero() {
        return Err(invalid());
    }
    Ok(duration)
}

/// Expand environment variables in a string.
///
/// Supports `${VAR}` and `$VAR` syntax.
pub fn expand_env_vars(s: &str) -> Result<String, SettingsError> {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            result.push(c);
            continue;
        }

        let var_name: String = if chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            chars.by_ref().take_while(|ch| *ch != '}').collect()
        } else {
            let mut name = String::new();
            while let Some(ch) = chars.next_if(|ch| ch.is_alphanumeric() || *ch == '_') {
                name.push(ch);
            }
            if name.is_empty() {
                // Just a lone $, keep it
                result.push('$');
                continue;
            }
            name
        };

        let value =
            env::var(&var_name).map_err(|_| SettingsError::MissingEnvVar(var_name.clone()))?;
        result.push_str(&value);
    }

    Ok(result)
}
