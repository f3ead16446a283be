//! Configuration Loader
//!
//! Environment-aware configuration loading. Handles YAML file discovery,
//! environment detection, environment-section merging and `${VAR}` expansion.

use super::error::{ConfigResult, ConfigurationError};
use super::TransportConfig;
use crate::providers::ConnectionStringProvider;
use serde_yaml::Value as YamlValue;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

const CONFIG_FILE_NAMES: [&str; 2] = ["pirina-transport.yaml", "pirina-transport.yml"];
const ENVIRONMENT_SECTIONS: [&str; 3] = ["development", "test", "production"];
const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024; // 1MB limit

/// Loaded, validated transport configuration
#[derive(Debug)]
pub struct ConfigManager {
    config: TransportConfig,
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

    /// Load configuration from a specific directory with explicit environment
    ///
    /// Useful for testing without modifying global environment variables.
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

        let mut config = Self::load_and_merge_config(&config_directory, environment)?;
        Self::expand_environment_variables(&mut config)?;

        config.validate()?;

        let sanitized_config = Self::sanitize_config_for_logging(&config);
        debug!(
            "Configuration loaded successfully: {}",
            serde_json::to_string_pretty(&sanitized_config)
                .unwrap_or_else(|_| "[serialization error]".to_string())
        );

        info!(
            environment = %environment,
            circuit_breakers_enabled = config.circuit_breakers.enabled,
            queue_overrides = config.circuit_breakers.queue_configs.len(),
            "⚙️ Transport configuration loaded"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory,
        }))
    }

    /// Wrap an already-built configuration (validated)
    pub fn from_config(config: TransportConfig) -> ConfigResult<Arc<ConfigManager>> {
        config.validate()?;
        let environment = config.environment.clone();
        Ok(Arc::new(ConfigManager {
            config,
            environment,
            config_directory: PathBuf::from("config"),
        }))
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Configuration with secrets masked, for debugging and logging
    pub fn debug_config(&self) -> serde_json::Value {
        Self::sanitize_config_for_logging(&self.config)
    }

    /// Get the current environment
    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Get the configuration directory
    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }

    /// Detect current environment from environment variables
    pub fn detect_environment() -> String {
        env::var("PIRINA_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
            .to_lowercase()
    }

    /// `PIRINA_CONFIG_DIR`, else the first of `./config` / `../config` holding a config file
    fn default_config_directory() -> PathBuf {
        if let Ok(dir) = env::var("PIRINA_CONFIG_DIR") {
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

    /// Read a configuration file, refusing oversized or non-regular files
    fn read_config_file_safely(path: &Path) -> ConfigResult<String> {
        let metadata = std::fs::metadata(path)
            .map_err(|e| ConfigurationError::file_read_error(path.display().to_string(), e))?;

        if metadata.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigurationError::invalid_value(
                "file_size",
                metadata.len().to_string(),
                format!(
                    "Configuration file too large ({} bytes > {} bytes limit)",
                    metadata.len(),
                    MAX_CONFIG_FILE_SIZE
                ),
            ));
        }

        if !metadata.is_file() {
            return Err(ConfigurationError::invalid_value(
                "file_type",
                "directory or special file",
                "Configuration path must point to a regular file",
            ));
        }

        std::fs::read_to_string(path)
            .map_err(|e| ConfigurationError::file_read_error(path.display().to_string(), e))
    }

    /// Load and merge configuration with environment-specific overrides
    fn load_and_merge_config(
        config_directory: &Path,
        environment: &str,
    ) -> ConfigResult<TransportConfig> {
        let config_file = Self::find_config_file(config_directory)?;
        let yaml_content = Self::read_config_file_safely(&config_file)?;

        let mut yaml_data: YamlValue = serde_yaml::from_str(&yaml_content)
            .map_err(|e| ConfigurationError::invalid_yaml(config_file.display().to_string(), e))?;

        if let Some(env_overrides) = yaml_data
            .get(YamlValue::String(environment.to_string()))
            .cloned()
        {
            debug!(
                "Applying environment-specific overrides for: {}",
                environment
            );
            Self::merge_yaml_values(&mut yaml_data, env_overrides);
        }

        if let YamlValue::Mapping(ref mut map) = yaml_data {
            for section in ENVIRONMENT_SECTIONS {
                map.remove(YamlValue::String(section.to_string()));
            }
        }

        let mut config: TransportConfig = serde_yaml::from_value(yaml_data).map_err(|e| {
            ConfigurationError::invalid_yaml(
                config_file.display().to_string(),
                format!("Failed to deserialize configuration: {e}"),
            )
        })?;

        config.environment = environment.to_string();

        Ok(config)
    }

    /// Recursively merge YAML values (environment overrides into base config)
    fn merge_yaml_values(base: &mut YamlValue, override_value: YamlValue) {
        match (&mut *base, override_value) {
            (YamlValue::Mapping(base_map), YamlValue::Mapping(override_map)) => {
                for (key, value) in override_map {
                    if let Some(existing_value) = base_map.get_mut(&key) {
                        Self::merge_yaml_values(existing_value, value);
                    } else {
                        base_map.insert(key, value);
                    }
                }
            }
            (base_ref, override_val) => {
                *base_ref = override_val;
            }
        }
    }

    /// Expand `${VAR}` references in the connection string
    fn expand_environment_variables(config: &mut TransportConfig) -> ConfigResult<()> {
        let expanded = expand_variables(&config.connection.connection_string, |name| {
            env::var(name).ok()
        })?;
        config.connection.connection_string = expanded;
        Ok(())
    }

    fn sanitize_config_for_logging(config: &TransportConfig) -> serde_json::Value {
        let mut config_json = serde_json::json!(config);

        let sensitive_patterns = [
            "password",
            "secret",
            "key",
            "token",
            "credential",
            "connection_string",
        ];

        Self::sanitize_json_recursive(&mut config_json, &sensitive_patterns);

        config_json
    }

    /// Recursively mask sensitive fields in JSON configuration
    fn sanitize_json_recursive(value: &mut serde_json::Value, sensitive_patterns: &[&str]) {
        match value {
            serde_json::Value::Object(map) => {
                for (key, val) in map.iter_mut() {
                    let key_lower = key.to_lowercase();
                    let is_sensitive = sensitive_patterns
                        .iter()
                        .any(|pattern| key_lower.contains(pattern));

                    if is_sensitive {
                        *val = serde_json::Value::String(mask_value(val));
                    } else {
                        Self::sanitize_json_recursive(val, sensitive_patterns);
                    }
                }
            }
            serde_json::Value::Array(arr) => {
                for item in arr.iter_mut() {
                    Self::sanitize_json_recursive(item, sensitive_patterns);
                }
            }
            _ => {}
        }
    }
}

impl ConnectionStringProvider for ConfigManager {
    fn connection_string(&self) -> String {
        self.config.connection.connection_string.clone()
    }
}

/// Show only the first and last two characters of a secret
fn mask_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) if s.is_empty() => "[EMPTY]".to_string(),
        serde_json::Value::String(s) => {
            let chars: Vec<char> = s.chars().collect();
            let masked = if chars.len() > 4 {
                let head: String = chars[..2].iter().collect();
                let tail: String = chars[chars.len() - 2..].iter().collect();
                format!("{head}***{tail}")
            } else {
                "***".to_string()
            };
            format!("[MASKED: {masked}]")
        }
        _ => "[MASKED]".to_string(),
    }
}

/// Replace each `${NAME}` with `lookup(NAME)`
///
/// An unset variable or an unterminated reference is an error: a placeholder
/// left in a connection string never names a reachable endpoint.
fn expand_variables(
    input: &str,
    lookup: impl Fn(&str) -> Option<String>,
) -> ConfigResult<String> {
    let mut output = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        output.push_str(&rest[..start]);
        let after_open = &rest[start + 2..];

        let end = after_open.find('}').ok_or_else(|| {
            ConfigurationError::environment_variable_error(
                after_open,
                "unterminated ${...} reference",
            )
        })?;

        let name = &after_open[..end];
        let value = lookup(name).ok_or_else(|| {
            warn!("Environment variable {} not found", name);
            ConfigurationError::environment_variable_error(name, "variable is not set")
        })?;

        debug!("Expanding environment variable {} in configuration", name);
        output.push_str(&value);
        rest = &after_open[end + 1..];
    }

    output.push_str(rest);
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const BASE_CONFIG: &str = r#"
connection:
  connection_string: "Endpoint=sb://local/;SharedAccessKey=supersecretvalue"
circuit_breakers:
  enabled: true
  default_config:
    exceptions_allowed_before_breaking: 5
    duration_of_break_seconds: 300
  queue_configs:
    payments:
      exceptions_allowed_before_breaking: 2
      duration_of_break_seconds: 30
in_memory:
  max_delivery_count: 10

test:
  circuit_breakers:
    default_config:
      duration_of_break_seconds: 1
  in_memory:
    max_delivery_count: 3
"#;

    fn write_config(dir: &TempDir, name: &str, contents: &str) {
        fs::write(dir.path().join(name), contents).unwrap();
    }

    #[test]
    fn test_environment_section_is_merged() {
        let dir = TempDir::new().unwrap();
        write_config(&dir, "pirina-transport.yaml", BASE_CONFIG);

        let manager =
            ConfigManager::load_from_directory_with_env(Some(dir.path().to_path_buf()), "test")
                .unwrap();
        let config = manager.config();

        assert_eq!(manager.environment(), "test");
        assert_eq!(config.environment, "test");
        assert_eq!(config.in_memory.max_delivery_count, 3);
        assert_eq!(config.circuit_breakers.default_config.duration_of_break_seconds, 1);
        // Untouched keys survive the merge
        assert_eq!(
            config
                .circuit_breakers
                .default_config
                .exceptions_allowed_before_breaking,
            5
        );
        assert_eq!(
            config
                .circuit_breakers
                .config_for_queue("payments")
                .exceptions_allowed_before_breaking,
            2
        );
    }

    #[test]
    fn test_base_config_without_matching_section() {
        let dir = TempDir::new().unwrap();
        write_config(&dir, "pirina-transport.yml", BASE_CONFIG);

        let manager = ConfigManager::load_from_directory_with_env(
            Some(dir.path().to_path_buf()),
            "production",
        )
        .unwrap();

        assert_eq!(manager.config().in_memory.max_delivery_count, 10);
    }

    #[test]
    fn test_missing_file_reports_searched_paths() {
        let dir = TempDir::new().unwrap();

        let error =
            ConfigManager::load_from_directory_with_env(Some(dir.path().to_path_buf()), "test")
                .unwrap_err();

        match error {
            ConfigurationError::ConfigFileNotFound { searched_paths } => {
                assert_eq!(searched_paths.len(), 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_invalid_yaml_is_rejected() {
        let dir = TempDir::new().unwrap();
        write_config(&dir, "pirina-transport.yaml", "connection: [unclosed");

        let error =
            ConfigManager::load_from_directory_with_env(Some(dir.path().to_path_buf()), "test")
                .unwrap_err();
        assert!(matches!(error, ConfigurationError::InvalidYaml { .. }));
    }

    #[test]
    fn test_debug_config_masks_connection_string() {
        let dir = TempDir::new().unwrap();
        write_config(&dir, "pirina-transport.yaml", BASE_CONFIG);

        let manager =
            ConfigManager::load_from_directory_with_env(Some(dir.path().to_path_buf()), "test")
                .unwrap();
        let debug = manager.debug_config().to_string();

        assert!(!debug.contains("supersecretvalue"));
        assert!(debug.contains("[MASKED: En***ue]"));
        assert_eq!(
            manager.connection_string(),
            "Endpoint=sb://local/;SharedAccessKey=supersecretvalue"
        );
    }

    #[test]
    fn test_expand_variables() {
        let lookup = |name: &str| match name {
            "HOST" => Some("queue.local".to_string()),
            _ => None,
        };

        assert_eq!(
            expand_variables("amqp://${HOST}:5672", lookup).unwrap(),
            "amqp://queue.local:5672"
        );
        assert_eq!(expand_variables("plain", lookup).unwrap(), "plain");

        match expand_variables("${MISSING}/x", lookup).unwrap_err() {
            ConfigurationError::EnvironmentVariableError { variable, .. } => {
                assert_eq!(variable, "MISSING")
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(matches!(
            expand_variables("broken ${HOST", lookup),
            Err(ConfigurationError::EnvironmentVariableError { .. })
        ));
    }

    #[test]
    fn test_unset_connection_variable_fails_load() {
        let dir = TempDir::new().unwrap();
        write_config(
            &dir,
            "pirina-transport.yaml",
            "connection:\n  connection_string: \"${PIRINA_TEST_UNSET_CONNECTION_STRING}\"\n",
        );

        let error =
            ConfigManager::load_from_directory_with_env(Some(dir.path().to_path_buf()), "test")
                .unwrap_err();

        assert!(error
            .to_string()
            .contains("Failed to expand environment variable 'PIRINA_TEST_UNSET_CONNECTION_STRING'"));
    }

    #[test]
    fn test_from_config_validates() {
        let mut config = TransportConfig::default();
        assert!(ConfigManager::from_config(config.clone()).is_ok());

        config.in_memory.max_delivery_count = 0;
        assert!(ConfigManager::from_config(config).is_err());
    }
}
