//! Error and status types for the supervisor.

pub mod errors;
pub mod status;

pub use errors::{ChainError, SupervisorError};
pub use status::{ServiceStatus, ServiceSummary};
