//! Configuration loading: environment overrides, validation and the shipped config file

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use conductor_core::config::{ConfigManager, ConfigurationError};
use conductor_core::WorkflowCoordinator;

fn write_config(contents: &str) -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("conductor-config.yaml"), contents).unwrap();
    dir
}

const BASE: &str = r#"
execution:
  max_concurrent_workflows: 4
  max_queue_size: 50
backoff:
  base_delay_ms: 250
health:
  check_interval_seconds: 20
test:
  execution:
    max_concurrent_workflows: 2
  health:
    enabled: false
production:
  execution:
    max_concurrent_workflows: 64
"#;

#[test]
fn test_environment_section_overrides_base_values() {
    let dir = write_config(BASE);
    let manager =
        ConfigManager::load_from_directory_with_env(Some(dir.path().to_path_buf()), "test").unwrap();
    let config = manager.config();

    assert_eq!(manager.environment(), "test");
    assert_eq!(config.execution.max_concurrent_workflows, 2);
    // Untouched siblings survive the deep merge
    assert_eq!(config.execution.max_queue_size, 50);
    assert!(!config.health.enabled);
    assert_eq!(config.health.check_interval(), Duration::from_secs(20));
    assert_eq!(config.backoff.base_delay_ms, 250);
    // Absent sections fall back to defaults
    assert_eq!(config.circuit_breakers.default_config.failure_threshold, 5);
}

#[test]
fn test_unknown_environment_uses_base_configuration() {
    let dir = write_config(BASE);
    let manager =
        ConfigManager::load_from_directory_with_env(Some(dir.path().to_path_buf()), "staging")
            .unwrap();

    assert_eq!(manager.config().execution.max_concurrent_workflows, 4);
    assert!(manager.config().health.enabled);
}

#[test]
fn test_invalid_values_are_rejected() {
    let dir = write_config("execution:\n  max_concurrent_workflows: 0\n");
    let error = ConfigManager::load_from_directory_with_env(Some(dir.path().to_path_buf()), "test")
        .unwrap_err();

    assert!(matches!(error, ConfigurationError::InvalidValue { ref field, .. } if field == "execution.max_concurrent_workflows"));
}

#[test]
fn test_malformed_yaml_is_reported() {
    let dir = write_config("execution: [unclosed\n");
    let error = ConfigManager::load_from_directory_with_env(Some(dir.path().to_path_buf()), "test")
        .unwrap_err();

    assert!(matches!(error, ConfigurationError::InvalidYaml { .. }));
}

#[test]
fn test_missing_file_lists_searched_paths() {
    let dir = tempfile::tempdir().unwrap();
    let error = ConfigManager::load_from_directory_with_env(Some(dir.path().to_path_buf()), "test")
        .unwrap_err();

    match error {
        ConfigurationError::ConfigFileNotFound { searched_paths } => {
            assert_eq!(searched_paths.len(), 2);
            assert!(searched_paths[0].starts_with(dir.path()));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_shipped_config_loads_for_every_environment() {
    let config_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("config");

    for environment in ["development", "test", "production"] {
        let manager =
            ConfigManager::load_from_directory_with_env(Some(config_dir.clone()), environment)
                .unwrap();
        assert!(manager.config().validate().is_ok());
    }

    let test = ConfigManager::load_from_directory_with_env(Some(config_dir), "test").unwrap();
    assert_eq!(test.config().backoff.base_delay_ms, 10);
    assert_eq!(test.config().circuit_breakers.default_config.failure_threshold, 3);
    assert!(!test.config().scaling.enabled);
}

#[tokio::test]
async fn test_coordinator_builds_from_loaded_config() {
    let dir = write_config(BASE);
    let manager =
        ConfigManager::load_from_directory_with_env(Some(dir.path().to_path_buf()), "test").unwrap();

    let coordinator = WorkflowCoordinator::from_config_manager(&manager).unwrap();
    assert_eq!(coordinator.get_system_metrics().capacity, 2);
}
