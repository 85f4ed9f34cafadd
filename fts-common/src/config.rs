//! Configuration loading and data directory resolution

use crate::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Environment variable overriding the response directory
pub const DATA_DIR_ENV: &str = "FTS_DATA_DIR";

/// Environment variable naming the TOML config file
pub const CONFIG_ENV: &str = "FTS_CONFIG";

/// Compiled default response directory, relative to the working directory
pub const DEFAULT_DATA_DIR: &str = "data/responses";

/// Tunables of the analysis pipeline
///
/// Every field has a default, so a partial TOML file is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Number of distinct faces in the full study
    pub expected_total_faces: usize,
    pub production_completion_threshold: f64,
    pub test_completion_threshold: f64,
    /// Rows per face assumed when the data carries no face ids
    pub assumed_rows_per_face: usize,
    /// Expected rows per participant when no face count is configured
    pub flat_expected_rows: usize,
    /// Participants matching this pattern skip the completion filter
    pub real_participant_pattern: String,
    pub fast_rt_ms: f64,
    pub slow_rt_quantile: f64,
    pub split_half_seed: u64,
    pub log_level: String,
    pub data_dir: Option<PathBuf>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            expected_total_faces: 35,
            production_completion_threshold: 0.8,
            test_completion_threshold: 0.5,
            assumed_rows_per_face: 10,
            flat_expected_rows: 60,
            real_participant_pattern: r"^(\d+|P.+)$".to_string(),
            fast_rt_ms: 200.0,
            slow_rt_quantile: 0.995,
            split_half_seed: 42,
            log_level: "info".to_string(),
            data_dir: None,
        }
    }
}

impl AnalysisConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| Error::Config(format!("invalid TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load the config file at `path`.
    ///
    /// A missing or unreadable file is not fatal: a warning is logged and the
    /// defaults are used. Malformed content or invalid values are errors.
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                debug!("Loading config from {}", path.display());
                Self::from_toml_str(&content)
                    .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
            }
            Err(e) => {
                warn!(
                    "Config file {} not readable ({}), using defaults",
                    path.display(),
                    e
                );
                Ok(Self::default())
            }
        }
    }

    /// Load from the resolved config path, or defaults when there is none
    pub fn load_resolved(cli_path: Option<&Path>) -> Result<Self> {
        match resolve_config_path(cli_path) {
            Some(path) => Self::load(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("production_completion_threshold", self.production_completion_threshold),
            ("test_completion_threshold", self.test_completion_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(Error::Config(format!(
                    "{} must be within [0, 1], got {}",
                    name, value
                )));
            }
        }

        if !(self.slow_rt_quantile > 0.0 && self.slow_rt_quantile <= 1.0) {
            return Err(Error::Config(format!(
                "slow_rt_quantile must be within (0, 1], got {}",
                self.slow_rt_quantile
            )));
        }

        if !self.fast_rt_ms.is_finite() || self.fast_rt_ms < 0.0 {
            return Err(Error::Config(format!(
                "fast_rt_ms must be a non-negative number, got {}",
                self.fast_rt_ms
            )));
        }

        if self.log_level.trim().is_empty() {
            return Err(Error::Config("log_level must not be empty".to_string()));
        }

        self.real_participant_regex()?;
        Ok(())
    }

    /// Compiled `real_participant_pattern`
    pub fn real_participant_regex(&self) -> Result<Regex> {
        Regex::new(&self.real_participant_pattern).map_err(|e| {
            Error::Config(format!(
                "real_participant_pattern '{}': {}",
                self.real_participant_pattern, e
            ))
        })
    }
}

/// Config file resolution:
/// 1. Command-line argument
/// 2. `FTS_CONFIG` environment variable
/// 3. `<config_dir>/fts/config.toml`, when it exists
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(CONFIG_ENV) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    dirs::config_dir()
        .map(|d| d.join("fts").join("config.toml"))
        .filter(|p| p.exists())
}

/// Response directory resolution:
/// 1. Command-line argument (highest priority)
/// 2. `FTS_DATA_DIR` environment variable
/// 3. `data_dir` from the TOML config
/// 4. Compiled default (fallback)
pub fn resolve_data_dir(cli_arg: Option<&Path>, config: &AnalysisConfig) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(DATA_DIR_ENV) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = &config.data_dir {
        return path.clone();
    }

    PathBuf::from(DEFAULT_DATA_DIR)
}
