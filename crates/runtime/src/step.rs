//! The HTTP service every journey step runs as.
//!
//! A step service does its own simulated work, then forwards the journey to
//! the step after it and nests that step's answer under `next`. Failures
//! further down never fail this step; they are reported as `nextError`.

use std::env;
use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use bizobs_supervisor::{ChainCaller, ChainError};
use bizobs_types::{
    ChainResponse, CompanyContext, HealthReport, HopRecord, JourneyRequest, ServiceIdentity, StepDescriptor, StepStatus, env_keys,
};
use bizobs_util::trace_headers::{CORRELATION_ID_HEADER, TRACEPARENT_HEADER};
use bizobs_util::{TraceHeaders, new_correlation_id, service_name_for};
use chrono::{DateTime, Utc};
use rand::Rng;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::metadata::generate_metadata;
use crate::provision::ServiceProvisioner;

/// Bounds of the simulated processing time, in milliseconds.
pub const DEFAULT_PROCESSING_MS: RangeInclusive<u64> = 100..=300;

/// Errors reading a step service's identity from its environment.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Missing environment variable {key}")]
    MissingEnv { key: &'static str },

    #[error("Invalid environment variable {key}: {reason}")]
    InvalidEnv { key: &'static str, reason: String },
}

/// Builds the identity of this process from the variables its supervisor set.
pub fn identity_from_env() -> Result<ServiceIdentity, RuntimeError> {
    let service_name = required(env_keys::SERVICE_NAME)?;
    let step_name = optional(env_keys::STEP_NAME).unwrap_or_else(|| service_name.clone());
    let port = required(env_keys::PORT)?.parse::<u16>().map_err(|error| RuntimeError::InvalidEnv {
        key: env_keys::PORT,
        reason: error.to_string(),
    })?;

    let defaults = CompanyContext::default();
    let company_context = CompanyContext {
        company_name: optional(env_keys::COMPANY_NAME).unwrap_or(defaults.company_name),
        domain: optional(env_keys::DOMAIN).unwrap_or(defaults.domain),
        industry_type: optional(env_keys::INDUSTRY_TYPE).unwrap_or(defaults.industry_type),
    };
    let start_time = match optional(env_keys::SERVICE_START_TIME) {
        Some(raw) => DateTime::parse_from_rfc3339(&raw)
            .map(|time| time.with_timezone(&Utc))
            .map_err(|error| RuntimeError::InvalidEnv {
                key: env_keys::SERVICE_START_TIME,
                reason: error.to_string(),
            })?,
        None => Utc::now(),
    };

    Ok(ServiceIdentity {
        service_name,
        step_name,
        port,
        pid: Some(std::process::id()),
        start_time,
        company_context,
    })
}

/// Admin server URL passed down by the supervisor, if any.
pub fn admin_url_from_env() -> Option<String> {
    optional(env_keys::ADMIN_URL)
}

fn required(key: &'static str) -> Result<String, RuntimeError> {
    optional(key).ok_or(RuntimeError::MissingEnv { key })
}

fn optional(key: &str) -> Option<String> {
    env::var(key).ok().map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
}

/// Request handling for one step service.
pub struct StepRuntime {
    identity: ServiceIdentity,
    provisioner: Arc<dyn ServiceProvisioner>,
    caller: ChainCaller,
    processing_ms: RangeInclusive<u64>,
}

impl StepRuntime {
    pub fn new(identity: ServiceIdentity, provisioner: Arc<dyn ServiceProvisioner>, caller: ChainCaller) -> Self {
        Self {
            identity,
            provisioner,
            caller,
            processing_ms: DEFAULT_PROCESSING_MS,
        }
    }

    pub fn with_processing_ms(mut self, processing_ms: RangeInclusive<u64>) -> Self {
        self.processing_ms = processing_ms;
        self
    }

    pub fn identity(&self) -> &ServiceIdentity {
        &self.identity
    }

    /// `POST /process` and `GET /health`.
    pub fn router(self: Arc<Self>) -> Router {
        Router::new()
            .route("/process", post(process_handler))
            .route("/health", get(health_handler))
            .with_state(self)
    }

    /// Processes one hop and, when a step follows, chains to it.
    pub async fn handle(&self, mut request: JourneyRequest, incoming: TraceHeaders) -> ChainResponse {
        let service_name = self.identity.service_name.as_str();
        request.strip_response_keys();
        let mut headers = TraceHeaders::from_context(request.correlation_id.as_deref(), &request.trace_context);
        for (name, value) in incoming.iter() {
            headers.insert(name, value);
        }
        let correlation_id = match request.correlation_id.clone() {
            Some(existing) => existing,
            None => headers.correlation_id().map(str::to_string).unwrap_or_else(new_correlation_id),
        };
        headers.insert(CORRELATION_ID_HEADER, &correlation_id);
        headers.merge_into(&mut request.trace_context);
        request.correlation_id = Some(correlation_id.clone());

        info!(
            service = %service_name,
            step = %request.step_name,
            correlation_id = %correlation_id,
            traceparent = headers.get(TRACEPARENT_HEADER).unwrap_or_default(),
            "processing step"
        );

        let processing_ms = rand::rng().random_range(self.processing_ms.clone());
        sleep(Duration::from_millis(processing_ms)).await;

        let pid = std::process::id();
        let mut response = ChainResponse {
            status: StepStatus::Completed,
            service: service_name.to_string(),
            processing_time: processing_ms,
            pid,
            timestamp: Utc::now(),
            metadata: generate_metadata(&request.step_name),
            next: None,
            next_error: None,
            request,
        };
        debug!(service = %service_name, processing_ms, "step completed");

        let Some(next_step) = self.next_step(&response.request).cloned() else {
            return response;
        };

        sleep(Duration::from_millis(response.request.think_time_ms)).await;
        let hop = HopRecord {
            step_name: response.request.step_name.clone(),
            service_name: service_name.to_string(),
            pid,
            timestamp: response.timestamp,
        };
        let forwarded = response.request.forward_to(&next_step, hop);
        match self.chain(&next_step, &forwarded, &headers).await {
            Ok(next) => response.next = Some(Box::new(next)),
            Err(error) => {
                warn!(
                    service = %service_name,
                    next = %error.service_name,
                    kind = %error.kind,
                    error = %error.message,
                    "chained call failed"
                );
                response.next_error = Some(error.to_next_error());
            }
        }
        response
    }

    /// Index of the entry this service handles.
    ///
    /// An entry matches on the request's step name, on its explicit service
    /// name, or on the name it resolves to.
    pub fn current_index(&self, request: &JourneyRequest) -> Option<usize> {
        let own = self.identity.service_name.as_str();
        request.steps.iter().position(|step| {
            step.step_name == request.step_name
                || step.service_name.as_deref() == Some(own)
                || service_name_for(step).as_deref() == Some(own)
        })
    }

    /// The entry after the current one; none when last or unmatched.
    pub fn next_step<'a>(&self, request: &'a JourneyRequest) -> Option<&'a StepDescriptor> {
        let index = self.current_index(request)?;
        request.steps.get(index + 1)
    }

    async fn chain(&self, next_step: &StepDescriptor, forwarded: &JourneyRequest, headers: &TraceHeaders) -> Result<ChainResponse, ChainError> {
        let endpoint = self
            .provisioner
            .provision(next_step, &forwarded.company)
            .await
            .map_err(|error| {
                let mut error = ChainError::from(error);
                if error.service_name.is_empty() {
                    error.service_name = service_name_for(next_step).unwrap_or_else(|| next_step.step_name.clone());
                }
                error
            })?;
        debug!(service = %self.identity.service_name, next = %endpoint.service_name, port = endpoint.port, "calling next step");
        self.caller.call(&endpoint, forwarded, headers).await
    }

    fn health(&self) -> HealthReport {
        HealthReport {
            status: "ok".to_string(),
            service: self.identity.service_name.clone(),
            step_name: self.identity.step_name.clone(),
            pid: std::process::id(),
            port: self.identity.port,
            company_name: self.identity.company_context.company_name.clone(),
            timestamp: Utc::now(),
        }
    }
}

async fn process_handler(State(runtime): State<Arc<StepRuntime>>, headers: HeaderMap, Json(request): Json<JourneyRequest>) -> Json<ChainResponse> {
    let incoming = TraceHeaders::from_pairs(headers.iter().filter_map(|(name, value)| Some((name.as_str(), value.to_str().ok()?))));
    Json(runtime.handle(request, incoming).await)
}

async fn health_handler(State(runtime): State<Arc<StepRuntime>>) -> Json<HealthReport> {
    Json(runtime.health())
}
