//! Tests for configuration loading and data directory resolution
//!
//! Uses serial_test: tests touching FTS_DATA_DIR or FTS_CONFIG are marked
//! #[serial] so they never race on the process environment.

use fts_common::config::{
    resolve_config_path, resolve_data_dir, AnalysisConfig, CONFIG_ENV, DATA_DIR_ENV,
    DEFAULT_DATA_DIR,
};
use fts_common::Error;
use serial_test::serial;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn clear_env() {
    env::remove_var(DATA_DIR_ENV);
    env::remove_var(CONFIG_ENV);
}

#[test]
#[serial]
fn test_data_dir_cli_argument_wins() {
    env::set_var(DATA_DIR_ENV, "/tmp/fts-from-env");
    let config = AnalysisConfig {
        data_dir: Some(PathBuf::from("/tmp/fts-from-toml")),
        ..Default::default()
    };

    let dir = resolve_data_dir(Some(Path::new("/tmp/fts-from-cli")), &config);
    assert_eq!(dir, PathBuf::from("/tmp/fts-from-cli"));
    clear_env();
}

#[test]
#[serial]
fn test_data_dir_env_beats_toml() {
    env::set_var(DATA_DIR_ENV, "/tmp/fts-from-env");
    let config = AnalysisConfig {
        data_dir: Some(PathBuf::from("/tmp/fts-from-toml")),
        ..Default::default()
    };

    assert_eq!(resolve_data_dir(None, &config), PathBuf::from("/tmp/fts-from-env"));
    clear_env();
}

#[test]
#[serial]
fn test_data_dir_toml_then_default() {
    clear_env();
    let config = AnalysisConfig {
        data_dir: Some(PathBuf::from("/tmp/fts-from-toml")),
        ..Default::default()
    };
    assert_eq!(resolve_data_dir(None, &config), PathBuf::from("/tmp/fts-from-toml"));

    let defaults = AnalysisConfig::default();
    assert_eq!(resolve_data_dir(None, &defaults), PathBuf::from(DEFAULT_DATA_DIR));
}

#[test]
#[serial]
fn test_config_path_from_env() {
    clear_env();
    env::set_var(CONFIG_ENV, "/tmp/fts-config.toml");
    assert_eq!(
        resolve_config_path(None),
        Some(PathBuf::from("/tmp/fts-config.toml"))
    );

    // CLI still wins
    assert_eq!(
        resolve_config_path(Some(Path::new("/tmp/other.toml"))),
        Some(PathBuf::from("/tmp/other.toml"))
    );
    clear_env();
}

#[test]
fn test_missing_config_file_uses_defaults() {
    let temp = TempDir::new().unwrap();
    let config = AnalysisConfig::load(&temp.path().join("absent.toml")).unwrap();
    assert_eq!(config, AnalysisConfig::default());
}

#[test]
fn test_load_config_file() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("config.toml");
    fs::write(
        &path,
        r#"
expected_total_faces = 12
production_completion_threshold = 0.9
split_half_seed = 7
data_dir = "/srv/study/responses"
"#,
    )
    .unwrap();

    let config = AnalysisConfig::load(&path).unwrap();
    assert_eq!(config.expected_total_faces, 12);
    assert_eq!(config.production_completion_threshold, 0.9);
    assert_eq!(config.split_half_seed, 7);
    assert_eq!(config.data_dir, Some(PathBuf::from("/srv/study/responses")));
    assert_eq!(config.test_completion_threshold, 0.5);
}

#[test]
fn test_invalid_config_file_is_an_error() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("config.toml");
    fs::write(&path, "slow_rt_quantile = 0.0\n").unwrap();

    let err = AnalysisConfig::load(&path).unwrap_err();
    assert!(matches!(err, Error::Config(_)));
    assert!(err.to_string().contains("slow_rt_quantile"));
}

#[test]
#[serial]
fn test_load_resolved_via_env() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("fts.toml");
    fs::write(&path, "fast_rt_ms = 150.0\n").unwrap();

    clear_env();
    env::set_var(CONFIG_ENV, &path);
    let config = AnalysisConfig::load_resolved(None).unwrap();
    assert_eq!(config.fast_rt_ms, 150.0);
    clear_env();
}
