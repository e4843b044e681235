//! Configuration validation for the orchestrator.

use crate::config::OrchestratorConfig;
use once_cell::sync::Lazy;
use regex::Regex;
use std::net::SocketAddr;
use thiserror::Error;
use tracing::debug;

/// Validate the entire orchestrator configuration.
pub fn validate_config(config: &OrchestratorConfig) -> Result<(), ValidationError> {
    validate_port_range(config)?;
    validate_timeouts(config)?;
    validate_bind_address(&config.admin_bind_address)?;
    for key in config.env.keys() {
        validate_env_key(key)?;
    }
    if let Some(command) = &config.runtime_command
        && command.program.trim().is_empty()
    {
        return Err(ValidationError::MissingRequiredField {
            field: "runtimeCommand.program".to_string(),
        });
    }
    debug!("Validated orchestrator configuration");
    Ok(())
}

fn validate_port_range(config: &OrchestratorConfig) -> Result<(), ValidationError> {
    let range = config.port_range;
    if range.size == 0 {
        return Err(ValidationError::InvalidPortRange {
            reason: "size must be at least 1".to_string(),
        });
    }
    if range.base == 0 {
        return Err(ValidationError::InvalidPortRange {
            reason: "base port 0 is reserved".to_string(),
        });
    }
    if range.end() > u32::from(u16::MAX) + 1 {
        return Err(ValidationError::InvalidPortRange {
            reason: format!("range {}..{} exceeds the highest port", range.base, range.end()),
        });
    }
    Ok(())
}

fn validate_timeouts(config: &OrchestratorConfig) -> Result<(), ValidationError> {
    let checks = [
        ("readiness.intervalMs", config.readiness.interval_ms),
        ("readiness.probeTimeoutMs", config.readiness.probe_timeout_ms),
        ("readiness.timeoutMs", config.readiness.timeout_ms),
        ("callTimeoutMs", config.call_timeout_ms),
        ("shutdownTimeoutMs", config.shutdown_timeout_ms),
    ];
    for (field, value) in checks {
        if value == 0 {
            return Err(ValidationError::InvalidTimeout { field: field.to_string() });
        }
    }
    Ok(())
}

/// The admin server only ever listens on loopback.
pub fn validate_bind_address(address: &str) -> Result<SocketAddr, ValidationError> {
    let parsed: SocketAddr = address.parse().map_err(|_| ValidationError::InvalidBindAddress {
        address: address.to_string(),
        reason: "expected host:port".to_string(),
    })?;
    if !parsed.ip().is_loopback() {
        return Err(ValidationError::InvalidBindAddress {
            address: address.to_string(),
            reason: "must be a loopback address".to_string(),
        });
    }
    Ok(parsed)
}

static ENV_KEY_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Z_][A-Z0-9_]*$").expect("env key regex should compile"));

fn validate_env_key(key: &str) -> Result<(), ValidationError> {
    if !ENV_KEY_REGEX.is_match(key) {
        return Err(ValidationError::InvalidEnvKey {
            key: key.to_string(),
            reason: "Environment variable keys must start with uppercase letter or underscore, followed by uppercase letters, numbers, or underscores".to_string(),
        });
    }

    Ok(())
}

/// Errors that can occur during validation.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid port range: {reason}")]
    InvalidPortRange { reason: String },

    #[error("Timeout '{field}' must be greater than zero")]
    InvalidTimeout { field: String },

    #[error("Invalid bind address '{address}': {reason}")]
    InvalidBindAddress { address: String, reason: String },

    #[error("Missing required field '{field}'")]
    MissingRequiredField { field: String },

    #[error("Invalid environment variable key '{key}': {reason}")]
    InvalidEnvKey { key: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PortRange, RuntimeCommand};

    #[test]
    fn default_config_is_valid() {
        assert!(validate_config(&OrchestratorConfig::default()).is_ok());
    }

    #[test]
    fn rejects_empty_or_overflowing_port_range() {
        let mut config = OrchestratorConfig::default();
        config.port_range = PortRange { base: 4101, size: 0 };
        assert!(matches!(validate_config(&config), Err(ValidationError::InvalidPortRange { .. })));

        config.port_range = PortRange { base: 65_500, size: 99 };
        assert!(matches!(validate_config(&config), Err(ValidationError::InvalidPortRange { .. })));
    }

    #[test]
    fn rejects_zero_timeouts() {
        let mut config = OrchestratorConfig::default();
        config.readiness.interval_ms = 0;
        assert!(matches!(validate_config(&config), Err(ValidationError::InvalidTimeout { field }) if field == "readiness.intervalMs"));
    }

    #[test]
    fn admin_must_bind_loopback() {
        assert!(validate_bind_address("127.0.0.1:4000").is_ok());
        assert!(validate_bind_address("[::1]:4000").is_ok());
        assert!(validate_bind_address("0.0.0.0:4000").is_err());
        assert!(validate_bind_address("localhost").is_err());
    }

    #[test]
    fn rejects_blank_runtime_program() {
        let config = OrchestratorConfig {
            runtime_command: Some(RuntimeCommand::new(" ", Vec::<String>::new())),
            ..Default::default()
        };
        assert!(matches!(validate_config(&config), Err(ValidationError::MissingRequiredField { .. })));
    }

    #[test]
    fn test_validate_env_key() {
        assert!(validate_env_key("NODE_ENV").is_ok());
        assert!(validate_env_key("_PRIVATE").is_ok());
        assert!(validate_env_key("node_env").is_err());
        assert!(validate_env_key("1ABC").is_err());
    }
}
