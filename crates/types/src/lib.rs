//! Shared type definitions for the BizObs journey orchestrator.
//!
//! Everything that crosses a process boundary lives here: the step list a
//! journey is built from, the request that travels hop to hop, the nested
//! response that travels back, and the identity records the supervisor keeps
//! for each running step service.

use serde::{Deserialize, Serialize};

pub mod journey;
pub mod service;

pub use journey::{ChainErrorKind, ChainResponse, HopRecord, JourneyRequest, NextError, StepStatus, TraceContext};
pub use service::{EnsureServiceRequest, EnsureServiceResponse, HealthReport, ServiceEndpoint, ServiceIdentity, env_keys};

/// Company name used when a caller supplies none.
pub const DEFAULT_COMPANY_NAME: &str = "DefaultCompany";
/// Company domain used when a caller supplies none.
pub const DEFAULT_DOMAIN: &str = "default.com";
/// Industry used when a caller supplies none.
pub const DEFAULT_INDUSTRY_TYPE: &str = "general";

/// One node of a journey's ordered step list.
///
/// `step_name` is the identity of the step. `service_name`, when present,
/// overrides the name the resolver would otherwise derive. `description`,
/// `category` and `endpoint` only feed the resolver's suffix selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepDescriptor {
    /// Human-readable step name (e.g. "Discovery", "checkout_process").
    #[serde(alias = "name")]
    pub step_name: String,
    /// Explicit service name; skips derivation when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

impl StepDescriptor {
    /// Create a descriptor carrying only a step name.
    pub fn named(step_name: impl Into<String>) -> Self {
        Self {
            step_name: step_name.into(),
            service_name: None,
            description: None,
            category: None,
            endpoint: None,
        }
    }

    /// Pin the service name instead of deriving it.
    pub fn with_service_name(mut self, service_name: impl Into<String>) -> Self {
        self.service_name = Some(service_name.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }
}

/// Company context a service instance is started for.
///
/// Two contexts are equal only when all three fields match; a mismatch
/// against a running instance makes that instance stale.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyContext {
    #[serde(default = "default_company_name")]
    pub company_name: String,
    #[serde(default = "default_domain")]
    pub domain: String,
    #[serde(default = "default_industry_type")]
    pub industry_type: String,
}

impl CompanyContext {
    pub fn new(company_name: impl Into<String>, domain: impl Into<String>, industry_type: impl Into<String>) -> Self {
        Self {
            company_name: company_name.into(),
            domain: domain.into(),
            industry_type: industry_type.into(),
        }
    }
}

impl Default for CompanyContext {
    fn default() -> Self {
        Self {
            company_name: default_company_name(),
            domain: default_domain(),
            industry_type: default_industry_type(),
        }
    }
}

fn default_company_name() -> String {
    DEFAULT_COMPANY_NAME.to_string()
}

fn default_domain() -> String {
    DEFAULT_DOMAIN.to_string()
}

fn default_industry_type() -> String {
    DEFAULT_INDUSTRY_TYPE.to_string()
}
