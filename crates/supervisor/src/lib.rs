//! Service supervision for BizObs journeys.
//!
//! This crate owns everything the orchestrator needs to make a journey step
//! reachable: configuration, deterministic port allocation, child process
//! management, health polling and the hop-to-hop HTTP caller.

pub mod caller;
pub mod config;
pub mod ports;
pub mod process;
pub mod readiness;
pub mod types;

pub use caller::ChainCaller;
pub use config::{ConfigError, OrchestratorConfig, PortRange, ReadinessConfig, RuntimeCommand};
pub use ports::{PortAllocator, base_port};
pub use process::{ProcessEnv, Supervisor};
pub use readiness::ReadinessGate;
pub use types::{ChainError, ServiceStatus, ServiceSummary, SupervisorError};
