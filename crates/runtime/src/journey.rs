//! Entry point that starts a journey at its first step.

use std::sync::Arc;
use std::time::Duration;

use bizobs_supervisor::{ChainError, Supervisor, SupervisorError};
use bizobs_types::{ChainResponse, JourneyRequest, ServiceIdentity, StepDescriptor};
use bizobs_util::trace_headers::{CORRELATION_ID_HEADER, TRACEPARENT_HEADER};
use bizobs_util::{TraceHeaders, new_correlation_id, new_traceparent};
use thiserror::Error;
use tracing::{info, warn};

/// Errors returned to whoever started the journey.
///
/// Only the first step's failures surface here; later hops report theirs
/// inside the response.
#[derive(Debug, Error)]
pub enum JourneyError {
    #[error("Journey has no steps")]
    EmptyJourney,

    #[error(transparent)]
    Supervisor(#[from] SupervisorError),

    #[error(transparent)]
    Chain(#[from] ChainError),
}

/// Starts journeys against services managed by a local supervisor.
#[derive(Debug, Clone)]
pub struct JourneyOrchestrator {
    supervisor: Arc<Supervisor>,
    readiness_timeout: Duration,
    prewarm: bool,
}

impl JourneyOrchestrator {
    pub fn new(supervisor: Arc<Supervisor>) -> Self {
        let readiness_timeout = supervisor.config().readiness.timeout();
        Self {
            supervisor,
            readiness_timeout,
            prewarm: false,
        }
    }

    pub fn with_readiness_timeout(mut self, readiness_timeout: Duration) -> Self {
        self.readiness_timeout = readiness_timeout;
        self
    }

    /// Spawn every later step's service before the first call.
    pub fn with_prewarm(mut self, prewarm: bool) -> Self {
        self.prewarm = prewarm;
        self
    }

    pub fn supervisor(&self) -> &Arc<Supervisor> {
        &self.supervisor
    }

    /// Runs a journey and returns the first step's nested response.
    ///
    /// Fills in a correlation id and a `traceparent` when the caller supplied
    /// none, waits for the first step to be ready, then calls it.
    ///
    /// # Errors
    /// The first step failing to start, become ready or answer.
    pub async fn run(&self, mut request: JourneyRequest, mut headers: TraceHeaders) -> Result<ChainResponse, JourneyError> {
        let first = first_step(&request).ok_or(JourneyError::EmptyJourney)?;

        let correlation_id = match request.correlation_id.clone().or_else(|| headers.correlation_id().map(str::to_string)) {
            Some(existing) => existing,
            None => new_correlation_id(),
        };
        headers.insert(CORRELATION_ID_HEADER, &correlation_id);
        request.correlation_id = Some(correlation_id.clone());

        if request.trace_context.traceparent.is_none() && headers.get(TRACEPARENT_HEADER).is_none() {
            headers.insert(TRACEPARENT_HEADER, &new_traceparent());
        }
        headers.merge_into(&mut request.trace_context);

        info!(
            correlation_id = %correlation_id,
            first = %first.step_name,
            steps = request.steps.len(),
            company = %request.company.company_name,
            "starting journey"
        );

        if self.prewarm {
            self.prewarm_steps(&request).await;
        }

        let identity = self.supervisor.ensure_ready(&first, &request.company, self.readiness_timeout).await?;
        let response = self.supervisor.caller().call(&identity.endpoint(), &request, &headers).await?;
        info!(correlation_id = %correlation_id, depth = response.depth(), "journey finished");
        Ok(response)
    }

    /// Ensures a process for every step after the first, without waiting.
    pub async fn prewarm_steps(&self, request: &JourneyRequest) -> Vec<ServiceIdentity> {
        let mut started = Vec::new();
        for step in request.steps.iter().skip(1) {
            match self.supervisor.ensure(step, &request.company).await {
                Ok(identity) => started.push(identity),
                Err(error) => warn!(step = %step.step_name, error = %error, "pre-warm failed"),
            }
        }
        started
    }
}

/// The entry named by `stepName`, else a bare descriptor for it.
fn first_step(request: &JourneyRequest) -> Option<StepDescriptor> {
    if let Some(step) = request.steps.iter().find(|step| step.step_name == request.step_name) {
        return Some(step.clone());
    }
    if !request.step_name.trim().is_empty() {
        return Some(StepDescriptor::named(request.step_name.clone()));
    }
    request.steps.first().cloned()
}
