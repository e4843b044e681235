//! Status types for supervised services.

use bizobs_types::CompanyContext;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of one service name.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    /// Not tracked.
    Absent,
    /// Spawned, not yet answering health probes.
    Starting,
    /// Answering health probes.
    Running,
    /// Running with a company context that no longer matches the request.
    Stale,
}

impl ServiceStatus {
    pub fn is_running(&self) -> bool {
        matches!(self, ServiceStatus::Running | ServiceStatus::Starting)
    }

    pub fn display(&self) -> &'static str {
        match self {
            ServiceStatus::Absent => "Absent",
            ServiceStatus::Starting => "Starting",
            ServiceStatus::Running => "Running",
            ServiceStatus::Stale => "Stale",
        }
    }
}

/// Snapshot of a tracked service, as listed by the admin API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceSummary {
    pub service_name: String,
    pub step_name: String,
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    pub status: ServiceStatus,
    pub start_time: DateTime<Utc>,
    pub company_context: CompanyContext,
}
