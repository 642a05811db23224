//! Configuration module for Milestone.
//!
//! Handles job files and environment variable expansion.

mod settings;

pub use settings::{
    expand_env_vars, DatasetSettings, DeleteIndicatorSettings, ModeSettings, Settings,
    SettingsError, TransactionSettings, ValiditySettings,
};
