//! Source catalog driver selection.

use std::fmt;
use std::str::FromStr;

use super::settings::SettingsError;

/// Supported source catalog drivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceDriver {
    /// SQLite database file, introspected through pragmas.
    #[default]
    Sqlite,
    /// JSON snapshot of previously exported metadata.
    Snapshot,
}

impl SourceDriver {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceDriver::Sqlite => "sqlite",
            SourceDriver::Snapshot => "snapshot",
        }
    }
}

impl FromStr for SourceDriver {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sqlite" | "sqlite3" => Ok(SourceDriver::Sqlite),
            "snapshot" | "json" => Ok(SourceDriver::Snapshot),
            other => Err(SettingsError::UnsupportedDriver(other.to_string())),
        }
    }
}

impl fmt::Display for SourceDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
