//! Data models for orchestrator configuration.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Orchestrator configuration.
///
/// Every field has a default so an absent or partial file is valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OrchestratorConfig {
    /// Ports handed out to step services.
    pub port_range: PortRange,
    /// Health probing used while waiting for a service.
    pub readiness: ReadinessConfig,
    /// Hard deadline for one chained `/process` call.
    pub call_timeout_ms: u64,
    /// Grace period between SIGTERM and a forced kill.
    pub shutdown_timeout_ms: u64,
    /// Think time used when a journey request does not carry one.
    pub default_think_time_ms: u64,
    /// Where the admin server listens.
    pub admin_bind_address: String,
    /// Directory searched for dedicated per-service executables.
    pub services_dir: Option<PathBuf>,
    /// Program launched for services without a dedicated executable.
    /// Defaults to this binary's `step` subcommand.
    pub runtime_command: Option<RuntimeCommand>,
    /// Extra environment passed to every spawned service.
    pub env: BTreeMap<String, String>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            port_range: PortRange::default(),
            readiness: ReadinessConfig::default(),
            call_timeout_ms: 30_000,
            shutdown_timeout_ms: 5_000,
            default_think_time_ms: 250,
            admin_bind_address: "127.0.0.1:4000".to_string(),
            services_dir: None,
            runtime_command: None,
            env: BTreeMap::new(),
        }
    }
}

impl OrchestratorConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

/// Contiguous port range `[base, base + size)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PortRange {
    pub base: u16,
    pub size: u16,
}

impl Default for PortRange {
    fn default() -> Self {
        Self { base: 4101, size: 99 }
    }
}

impl PortRange {
    pub fn contains(&self, port: u16) -> bool {
        port >= self.base && u32::from(port) < self.end()
    }

    /// One past the last port, widened so `base + size` cannot overflow.
    pub fn end(&self) -> u32 {
        u32::from(self.base) + u32::from(self.size)
    }
}

/// Health probe timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReadinessConfig {
    pub interval_ms: u64,
    pub probe_timeout_ms: u64,
    pub timeout_ms: u64,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            interval_ms: 200,
            probe_timeout_ms: 1_000,
            timeout_ms: 8_000,
        }
    }
}

impl ReadinessConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Command line used to launch the generic step runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeCommand {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl RuntimeCommand {
    pub fn new(program: impl Into<String>, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// This executable re-invoked with its `step` subcommand.
    pub fn current_exe_step() -> Result<Self, ConfigError> {
        let exe = std::env::current_exe()?;
        Ok(Self::new(exe.to_string_lossy().into_owned(), ["step"]))
    }
}

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(#[from] crate::config::ValidationError),
}
