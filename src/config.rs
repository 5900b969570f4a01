//! Configuration management
//!
//! Handles loading and parsing of JSON configuration files, with environment
//! variable overrides loaded from `.env`.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::debug;

use crate::analysis::AnalysisConfig;
use crate::data::{ColumnMap, DEFAULT_CACHE_TTL_SECS};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub data: DataConfig,
    pub analysis: AnalysisConfig,
    pub output: OutputConfig,
}

impl Config {
    /// Load configuration from JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref()).context("Failed to read config file")?;
        let mut config = Self::from_json(&contents)?;
        config.apply_env();
        Ok(config)
    }

    pub fn from_json(contents: &str) -> Result<Self> {
        serde_json::from_str(contents).context("Failed to parse config JSON")
    }

    /// Load from `path` if it exists, otherwise start from defaults
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::from_file(path)
        } else {
            debug!("Config file {} not found, using defaults", path.display());
            let mut config = Config::default();
            config.apply_env();
            Ok(config)
        }
    }

    /// Environment overrides: `STOPLOSS_RESULTS_DIR`, `STOPLOSS_CACHE_TTL_SECS`
    pub fn apply_env(&mut self) {
        if let Ok(dir) = std::env::var("STOPLOSS_RESULTS_DIR") {
            self.output.results_dir = dir;
        }
        if let Some(ttl) = std::env::var("STOPLOSS_CACHE_TTL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            self.data.cache_ttl_secs = ttl;
        }
    }
}

/// Where price data comes from
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// CSV export to load; takes precedence over `ticker`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub csv_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ticker: Option<String>,
    /// Company name, resolved to a ticker when `ticker` is unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<NaiveDate>,
    pub columns: ColumnMap,
    pub cache_ttl_secs: i64,
    /// Exchange suffix preferred when resolving names, e.g. ".OL"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferred_suffix: Option<String>,
}

impl Default for DataConfig {
    fn default() -> Self {
        DataConfig {
            csv_path: None,
            ticker: None,
            company: None,
            start: None,
            end: None,
            columns: ColumnMap::default(),
            cache_ttl_secs: DEFAULT_CACHE_TTL_SECS,
            preferred_suffix: None,
        }
    }
}

/// Result export settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub results_dir: String,
    /// Rows shown in the terminal table
    pub top: usize,
    pub export: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig {
            results_dir: "results".to_string(),
            top: 10,
            export: true,
        }
    }
}
