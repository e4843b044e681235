//! Error types for service supervision and chained calls.

use bizobs_types::{ChainErrorKind, NextError};
use thiserror::Error;

/// Errors raised while making a step service available.
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("Step name '{step_name}' does not resolve to a service name")]
    UnresolvableName { step_name: String },

    #[error("Port range exhausted: {in_use} of {size} ports in use")]
    PortRangeExhausted { in_use: usize, size: u16 },

    #[error("Failed to spawn {service_name}: {reason}")]
    SpawnFailure { service_name: String, reason: String },

    #[error("{service_name} did not become ready on port {port} within {timeout_ms}ms")]
    ReadinessTimeout { service_name: String, port: u16, timeout_ms: u64 },

    #[error("No port allocated for {service_name}")]
    NotAllocated { service_name: String },
}

impl SupervisorError {
    /// How this failure is reported inside a chain response.
    pub fn chain_kind(&self) -> ChainErrorKind {
        match self {
            SupervisorError::ReadinessTimeout { .. } => ChainErrorKind::Readiness,
            SupervisorError::NotAllocated { .. } => ChainErrorKind::Network,
            _ => ChainErrorKind::Spawn,
        }
    }
}

/// A failed call to the next step's `/process` endpoint.
#[derive(Debug, Clone, Error)]
#[error("{kind} error calling {service_name}: {message}")]
pub struct ChainError {
    pub kind: ChainErrorKind,
    pub service_name: String,
    pub message: String,
}

impl ChainError {
    pub fn new(kind: ChainErrorKind, service_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            service_name: service_name.into(),
            message: message.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    /// The `nextError` record attached to the caller's response.
    pub fn to_next_error(&self) -> NextError {
        NextError {
            service: self.service_name.clone(),
            kind: self.kind,
            message: self.message.clone(),
        }
    }
}

impl From<SupervisorError> for ChainError {
    fn from(error: SupervisorError) -> Self {
        let service_name = match &error {
            SupervisorError::SpawnFailure { service_name, .. }
            | SupervisorError::ReadinessTimeout { service_name, .. }
            | SupervisorError::NotAllocated { service_name } => service_name.clone(),
            SupervisorError::UnresolvableName { step_name } => step_name.clone(),
            SupervisorError::PortRangeExhausted { .. } => String::new(),
        };
        ChainError::new(error.chain_kind(), service_name, error.to_string())
    }
}
