//! Making the next step's service reachable before it is called.
//!
//! A step runtime either owns a supervisor itself or asks the admin server
//! that spawned it. Both paths end with the service answering `/health`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bizobs_supervisor::{PortRange, ReadinessGate, Supervisor, SupervisorError, base_port};
use bizobs_types::{CompanyContext, EnsureServiceRequest, EnsureServiceResponse, ServiceEndpoint, StepDescriptor};
use bizobs_util::service_name_for;
use tracing::{debug, warn};
use url::Url;

/// Admin route that spawns or reuses a step service.
pub const ENSURE_SERVICE_PATH: &str = "/api/admin/ensure-service";

/// Brings up the service for a step and reports where it listens.
#[async_trait]
pub trait ServiceProvisioner: Send + Sync {
    async fn provision(&self, step: &StepDescriptor, company: &CompanyContext) -> Result<ServiceEndpoint, SupervisorError>;
}

/// Provisions through a supervisor living in this process.
#[derive(Debug, Clone)]
pub struct LocalProvisioner {
    supervisor: Arc<Supervisor>,
    timeout: Duration,
}

impl LocalProvisioner {
    pub fn new(supervisor: Arc<Supervisor>) -> Self {
        let timeout = supervisor.config().readiness.timeout();
        Self { supervisor, timeout }
    }
}

#[async_trait]
impl ServiceProvisioner for LocalProvisioner {
    async fn provision(&self, step: &StepDescriptor, company: &CompanyContext) -> Result<ServiceEndpoint, SupervisorError> {
        let identity = self.supervisor.ensure_ready(step, company, self.timeout).await?;
        Ok(identity.endpoint())
    }
}

/// Provisions by asking the admin server, falling back to the hashed port.
#[derive(Debug, Clone)]
pub struct AdminProvisioner {
    client: reqwest::Client,
    admin_url: Option<Url>,
    port_range: PortRange,
    readiness: ReadinessGate,
    timeout: Duration,
}

impl AdminProvisioner {
    /// `admin_url` may be absent or unparsable; provisioning then relies on
    /// the deterministic port alone.
    pub fn new(admin_url: Option<&str>, port_range: PortRange, readiness: ReadinessGate, timeout: Duration) -> Self {
        let admin_url = admin_url.and_then(|raw| match Url::parse(raw) {
            Ok(url) => Some(url),
            Err(error) => {
                warn!(admin_url = %raw, error = %error, "ignoring invalid admin url");
                None
            }
        });
        Self {
            client: reqwest::Client::new(),
            admin_url,
            port_range,
            readiness,
            timeout,
        }
    }

    async fn request_service(&self, request: &EnsureServiceRequest) -> anyhow::Result<EnsureServiceResponse> {
        let base = self.admin_url.as_ref().ok_or_else(|| anyhow::anyhow!("no admin server configured"))?;
        let url = base.join(ENSURE_SERVICE_PATH)?;
        let response = self
            .client
            .post(url)
            .timeout(self.timeout)
            .json(request)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl ServiceProvisioner for AdminProvisioner {
    async fn provision(&self, step: &StepDescriptor, company: &CompanyContext) -> Result<ServiceEndpoint, SupervisorError> {
        let service_name = service_name_for(step).ok_or_else(|| SupervisorError::UnresolvableName {
            step_name: step.step_name.clone(),
        })?;

        let request = EnsureServiceRequest::for_step(step, company.clone());
        let (service_name, port) = match self.request_service(&request).await {
            Ok(response) => {
                debug!(service = %response.service_name, port = response.port, "admin server ensured service");
                (response.service_name, response.port)
            }
            Err(error) => {
                let fallback = base_port(&service_name, self.port_range);
                warn!(service = %service_name, port = fallback, error = %error, "admin ensure failed; using deterministic port");
                (service_name, fallback)
            }
        };

        if !self.readiness.wait_ready(port, self.timeout).await {
            return Err(SupervisorError::ReadinessTimeout {
                service_name,
                port,
                timeout_ms: self.timeout.as_millis() as u64,
            });
        }
        Ok(ServiceEndpoint::new(service_name, port))
    }
}
