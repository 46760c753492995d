//! Configuration module for dbscribe.
//!
//! Handles the settings file, environment variables, and source selection.

mod settings;
mod source;

pub use settings::{
    expand_env_vars, parse_duration, ApiSettings, HarvestSettings, MirrorSettings, PoolSettings,
    Settings, SettingsError, SourceSettings, CONFIG_ENV,
};
pub use source::SourceDriver;
