//! Service identity records and the health/admin contracts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{CompanyContext, StepDescriptor};

/// Environment variable names a spawned step process is started with.
///
/// The environment is the only channel through which a child learns who it
/// is; nothing else is written on its behalf.
pub mod env_keys {
    pub const SERVICE_NAME: &str = "SERVICE_NAME";
    pub const STEP_NAME: &str = "STEP_NAME";
    pub const PORT: &str = "PORT";
    pub const COMPANY_NAME: &str = "COMPANY_NAME";
    pub const DOMAIN: &str = "DOMAIN";
    pub const INDUSTRY_TYPE: &str = "INDUSTRY_TYPE";
    pub const SERVICE_START_TIME: &str = "SERVICE_START_TIME";
    pub const ADMIN_URL: &str = "BIZOBS_ADMIN_URL";
    pub const CONFIG_PATH: &str = "BIZOBS_CONFIG_PATH";
}

/// A currently running step service as tracked by the supervisor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceIdentity {
    pub service_name: String,
    pub step_name: String,
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    pub start_time: DateTime<Utc>,
    pub company_context: CompanyContext,
}

impl ServiceIdentity {
    pub fn endpoint(&self) -> ServiceEndpoint {
        ServiceEndpoint {
            service_name: self.service_name.clone(),
            port: self.port,
        }
    }
}

/// Where a step service can be reached.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceEndpoint {
    pub service_name: String,
    pub port: u16,
}

impl ServiceEndpoint {
    pub fn new(service_name: impl Into<String>, port: u16) -> Self {
        Self {
            service_name: service_name.into(),
            port,
        }
    }
}

/// Body of `GET /health` on a step service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub status: String,
    pub service: String,
    #[serde(default)]
    pub step_name: String,
    pub pid: u32,
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub company_name: String,
    pub timestamp: DateTime<Utc>,
}

impl HealthReport {
    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

/// Body of `POST /api/admin/ensure-service`.
///
/// The whole step descriptor travels, so the admin server resolves the same
/// service name the requesting child did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnsureServiceRequest {
    #[serde(flatten)]
    pub step: StepDescriptor,
    #[serde(default)]
    pub context: CompanyContext,
}

impl EnsureServiceRequest {
    pub fn for_step(step: &StepDescriptor, context: CompanyContext) -> Self {
        Self {
            step: step.clone(),
            context,
        }
    }
}

/// Reply of `POST /api/admin/ensure-service`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnsureServiceResponse {
    pub service_name: String,
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    pub running: bool,
}
