//! Configuration Loader
//!
//! Environment-aware configuration loading. Handles YAML file discovery, environment
//! detection, and merging of environment-specific override sections.

use super::error::{ConfigResult, ConfigurationError};
use super::CoordinatorConfig;
use serde_yaml::Value as YamlValue;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, warn};

const CONFIG_FILE_NAMES: [&str; 2] = ["conductor-config.yaml", "conductor-config.yml"];
const ENVIRONMENT_SECTIONS: [&str; 3] = ["development", "test", "production"];
const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024;

/// Loaded configuration together with the environment it was resolved for
#[derive(Debug)]
pub struct ConfigManager {
    config: CoordinatorConfig,
    environment: String,
    config_directory: PathBuf,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from_directory(None)
    }

    /// Load configuration from a specific directory
    pub fn load_from_directory(config_dir: Option<PathBuf>) -> ConfigResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load configuration from a specific directory with explicit environment.
    /// Lets tests pick an environment without touching process environment variables.
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let config_directory = config_dir.unwrap_or_else(Self::default_config_directory);

        debug!(
            "Loading configuration for environment '{}' from directory: {}",
            environment,
            config_directory.display()
        );

        let config = Self::load_and_merge_config(&config_directory, environment)?;
        config.validate()?;

        debug!(
            "Configuration loaded successfully: {}",
            serde_json::to_string_pretty(&config)
                .unwrap_or_else(|_| "[serialization error]".to_string())
        );

        info!(
            environment = environment,
            max_concurrent_workflows = config.execution.max_concurrent_workflows,
            max_queue_size = config.execution.max_queue_size,
            "⚙️ Configuration loaded"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory,
        }))
    }

    /// Wrap an already-built configuration, validating it first
    pub fn from_config(config: CoordinatorConfig, environment: &str) -> ConfigResult<ConfigManager> {
        config.validate()?;
        Ok(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory: PathBuf::from("config"),
        })
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Get the current environment
    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Get the configuration directory
    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }

    /// Detect current environment: CONDUCTOR_ENV || APP_ENV || 'development'
    pub fn detect_environment() -> String {
        env::var("CONDUCTOR_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
            .to_lowercase()
    }

    fn default_config_directory() -> PathBuf {
        if let Ok(dir) = env::var("CONDUCTOR_CONFIG_DIR") {
            return PathBuf::from(dir);
        }

        let possible_dirs = [PathBuf::from("config"), PathBuf::from("../config")];
        for dir in possible_dirs {
            if CONFIG_FILE_NAMES.iter().any(|name| dir.join(name).exists()) {
                debug!("Found config directory: {}", dir.display());
                return dir;
            }
        }

        PathBuf::from("config")
    }

    /// Find the configuration file
    fn find_config_file(config_directory: &Path) -> ConfigResult<PathBuf> {
        let mut searched_paths = Vec::new();

        for name in CONFIG_FILE_NAMES {
            let config_path = config_directory.join(name);
            searched_paths.push(config_path.clone());

            if config_path.exists() {
                debug!("Found configuration file: {}", config_path.display());
                return Ok(config_path);
            }
        }

        Err(ConfigurationError::config_file_not_found(searched_paths))
    }

    /// Read a configuration file, refusing anything that is not a small regular file
    fn read_config_file_safely(path: &Path) -> ConfigResult<String> {
        let metadata = std::fs::metadata(path)
            .map_err(|e| ConfigurationError::file_read_error(path.display().to_string(), e))?;

        if !metadata.is_file() {
            return Err(ConfigurationError::invalid_value(
                "file_type",
                "directory or special file",
                "Configuration path must point to a regular file",
            ));
        }

        if metadata.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigurationError::invalid_value(
                "file_size",
                metadata.len().to_string(),
                format!("Configuration file exceeds {MAX_CONFIG_FILE_SIZE} bytes"),
            ));
        }

        std::fs::read_to_string(path)
            .map_err(|e| ConfigurationError::file_read_error(path.display().to_string(), e))
    }

    /// Load and merge configuration with environment-specific overrides
    fn load_and_merge_config(
        config_directory: &Path,
        environment: &str,
    ) -> ConfigResult<CoordinatorConfig> {
        let config_file = Self::find_config_file(config_directory)?;
        let yaml_content = Self::read_config_file_safely(&config_file)?;
        Self::parse_with_environment(&yaml_content, &config_file.display().to_string(), environment)
    }

    /// Parse YAML text and apply the override section named after `environment`
    pub fn parse_with_environment(
        yaml_content: &str,
        source: &str,
        environment: &str,
    ) -> ConfigResult<CoordinatorConfig> {
        let mut yaml_data: YamlValue = serde_yaml::from_str(yaml_content)
            .map_err(|e| ConfigurationError::invalid_yaml(source, e))?;

        if yaml_data.is_null() {
            yaml_data = YamlValue::Mapping(Default::default());
        }

        if let Some(env_overrides) = yaml_data
            .get(YamlValue::String(environment.to_string()))
            .cloned()
        {
            debug!("Applying environment-specific overrides for: {}", environment);
            Self::merge_yaml_values(&mut yaml_data, env_overrides)?;
        } else if !ENVIRONMENT_SECTIONS.contains(&environment) {
            warn!(
                environment = environment,
                "⚠️ No override section for environment, using base configuration"
            );
        }

        // Environment sections are not part of the config schema
        if let YamlValue::Mapping(ref mut map) = yaml_data {
            for section in ENVIRONMENT_SECTIONS {
                map.remove(YamlValue::String(section.to_string()));
            }
            map.remove(YamlValue::String(environment.to_string()));
        }

        serde_yaml::from_value(yaml_data).map_err(|e| {
            ConfigurationError::invalid_yaml(source, format!("Failed to deserialize configuration: {e}"))
        })
    }

    /// Recursively merge YAML values (environment overrides into base config)
    fn merge_yaml_values(base: &mut YamlValue, override_value: YamlValue) -> ConfigResult<()> {
        match (&mut *base, override_value) {
            (YamlValue::Mapping(base_map), YamlValue::Mapping(override_map)) => {
                for (key, value) in override_map {
                    if let Some(existing_value) = base_map.get_mut(&key) {
                        Self::merge_yaml_values(existing_value, value)?;
                    } else {
                        base_map.insert(key, value);
                    }
                }
            }
            (YamlValue::Mapping(_), other) if !other.is_null() => {
                return Err(ConfigurationError::ConfigMergeError {
                    error: format!("cannot merge scalar override {other:?} into a mapping"),
                });
            }
            (base_ref, override_val) => {
                *base_ref = override_val;
            }
        }
        Ok(())
    }
}

static GLOBAL_CONFIG: OnceLock<Arc<ConfigManager>> = OnceLock::new();

impl ConfigManager {
    /// Get or initialize the process-wide configuration, falling back to defaults
    /// when no config file can be loaded
    pub fn global() -> Arc<ConfigManager> {
        GLOBAL_CONFIG
            .get_or_init(|| {
                ConfigManager::load().unwrap_or_else(|e| {
                    warn!("Configuration loading failed, using defaults: {e}");
                    Arc::new(ConfigManager {
                        config: CoordinatorConfig::default(),
                        environment: Self::detect_environment(),
                        config_directory: PathBuf::from("config"),
                    })
                })
            })
            .clone()
    }
}
