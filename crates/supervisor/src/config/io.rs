//! Configuration IO helpers for the orchestrator.

use crate::config::{ConfigError, OrchestratorConfig, validate_config};
use bizobs_types::env_keys;
use bizobs_util::expand_tilde;
use dirs_next::config_dir;
use std::env;
use std::fs;
use std::fs::{create_dir_all, write};
use std::path::{Path, PathBuf};

/// Environment variable overriding the configuration file location.
pub const CONFIG_PATH_ENV: &str = env_keys::CONFIG_PATH;

/// Returns the default path for the orchestrator configuration file.
pub fn default_config_path() -> PathBuf {
    if let Ok(path) = env::var(CONFIG_PATH_ENV)
        && !path.trim().is_empty()
    {
        return expand_tilde(&path);
    }

    config_dir().unwrap_or_else(|| PathBuf::from(".")).join("bizobs").join("orchestrator.json")
}

/// Loads the configuration from the default path.
pub fn load_config() -> Result<OrchestratorConfig, ConfigError> {
    let path = default_config_path();
    load_config_from_path(&path)
}

/// Loads and validates the configuration from a specific path.
///
/// A missing file yields the defaults.
pub fn load_config_from_path(path: &Path) -> Result<OrchestratorConfig, ConfigError> {
    if !path.exists() {
        return Ok(OrchestratorConfig::default());
    }

    let content = fs::read_to_string(path)?;
    let mut config: OrchestratorConfig = serde_json::from_str(&content)?;
    if let Some(dir) = config.services_dir.take() {
        config.services_dir = Some(expand_tilde(&dir.to_string_lossy()));
    }
    validate_config(&config)?;
    Ok(config)
}

/// Saves the configuration to a specific path.
pub fn save_config_to_path(config: &OrchestratorConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent_directory) = path.parent() {
        create_dir_all(parent_directory)?;
    }

    let content = serde_json::to_string_pretty(config)?;
    write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PortRange;

    #[test]
    fn default_path_honors_environment_override() {
        let override_path = "~/custom/bizobs/orchestrator.json";
        temp_env::with_var(CONFIG_PATH_ENV, Some(override_path), || {
            let path = default_config_path();
            let expected = expand_tilde(override_path);
            assert_eq!(path, expected);
        });
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_from_path(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config, OrchestratorConfig::default());
    }

    #[test]
    fn save_then_load_preserves_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("orchestrator.json");
        let config = OrchestratorConfig {
            port_range: PortRange { base: 6100, size: 20 },
            call_timeout_ms: 5_000,
            ..Default::default()
        };
        save_config_to_path(&config, &path).unwrap();
        let loaded = load_config_from_path(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn invalid_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("orchestrator.json");
        fs::write(&path, r#"{"adminBindAddress": "0.0.0.0:4000"}"#).unwrap();
        assert!(matches!(load_config_from_path(&path), Err(ConfigError::Validation(_))));
    }
}
