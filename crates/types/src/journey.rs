//! Journey wire contract: the request passed hop to hop and the nested
//! response returned back up the chain.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{CompanyContext, StepDescriptor};

/// Think time applied between hops when the caller does not provide one.
pub const DEFAULT_THINK_TIME_MS: u64 = 250;

/// Action tag stamped on requests that a step runtime forwards itself.
pub const AUTO_CHAINED_ACTION: &str = "auto_chained";

/// Distributed-trace state carried alongside a journey.
///
/// `traceparent`/`tracestate` are the W3C fields; `headers` holds any other
/// allow-listed tracing headers captured at a hop, keyed by lowercase name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traceparent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracestate: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
}

impl TraceContext {
    pub fn is_empty(&self) -> bool {
        self.traceparent.is_none() && self.tracestate.is_none() && self.headers.is_empty()
    }
}

/// One executed hop, appended by each step runtime before it forwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HopRecord {
    pub step_name: String,
    pub service_name: String,
    pub pid: u32,
    pub timestamp: DateTime<Utc>,
}

/// Request body for `POST /process`.
///
/// Passed by value through the chain. Fields the orchestrator does not know
/// about are kept in `extra` and mirrored back in every response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JourneyRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub journey_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(flatten)]
    pub company: CompanyContext,
    /// Identity of the step this request is addressed to.
    pub step_name: String,
    #[serde(default)]
    pub steps: Vec<StepDescriptor>,
    #[serde(default = "default_think_time_ms")]
    pub think_time_ms: u64,
    #[serde(default, skip_serializing_if = "TraceContext::is_empty")]
    pub trace_context: TraceContext,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_step: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub journey_history: Vec<HopRecord>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl JourneyRequest {
    /// Build a request addressed to the first entry of `steps`.
    ///
    /// Returns `None` for an empty step list.
    pub fn for_steps(steps: Vec<StepDescriptor>, company: CompanyContext) -> Option<Self> {
        let first = steps.first()?.step_name.clone();
        Some(Self {
            journey_id: None,
            correlation_id: None,
            company,
            step_name: first,
            steps,
            think_time_ms: DEFAULT_THINK_TIME_MS,
            trace_context: TraceContext::default(),
            parent_step: None,
            action: None,
            journey_history: Vec::new(),
            extra: Map::new(),
        })
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    pub fn with_think_time_ms(mut self, think_time_ms: u64) -> Self {
        self.think_time_ms = think_time_ms;
        self
    }

    /// Remove caller fields that collide with [`ChainResponse`]'s own keys.
    ///
    /// The request is flattened into the response, so a stray `status` in
    /// `extra` would otherwise be emitted next to the real one.
    pub fn strip_response_keys(&mut self) {
        self.extra.retain(|key, _| !RESPONSE_KEYS.contains(&key.as_str()));
    }

    /// Derive the request for the following hop.
    ///
    /// The step list, correlation id, trace and company context are carried
    /// forward untouched; `hop` is appended to the history.
    pub fn forward_to(&self, next: &StepDescriptor, hop: HopRecord) -> Self {
        let mut forwarded = self.clone();
        forwarded.parent_step = Some(self.step_name.clone());
        forwarded.step_name = next.step_name.clone();
        forwarded.action = Some(AUTO_CHAINED_ACTION.to_string());
        forwarded.journey_history.push(hop);
        forwarded
    }
}

/// Top-level keys owned by [`ChainResponse`].
pub const RESPONSE_KEYS: &[&str] = &["status", "service", "processingTime", "pid", "timestamp", "metadata", "next", "nextError"];

fn default_think_time_ms() -> u64 {
    DEFAULT_THINK_TIME_MS
}

/// Outcome of a step's own work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Completed,
    Failed,
}

/// Classification of a chaining failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainErrorKind {
    /// Connection refused, reset, or similar transport failure.
    Network,
    /// The call exceeded its deadline.
    Timeout,
    /// The downstream body was not a valid chain response.
    Parse,
    /// The downstream step reported a failure itself.
    Upstream,
    /// The downstream process could not be launched.
    Spawn,
    /// The downstream process never answered its health probe.
    Readiness,
}

impl ChainErrorKind {
    /// Transport failures that a caller could reasonably retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network | Self::Timeout | Self::Readiness)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Timeout => "timeout",
            Self::Parse => "parse",
            Self::Upstream => "upstream",
            Self::Spawn => "spawn",
            Self::Readiness => "readiness",
        }
    }
}

impl fmt::Display for ChainErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Downstream failure recorded in place of `next`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NextError {
    pub service: String,
    pub kind: ChainErrorKind,
    pub message: String,
}

/// Response body of `POST /process`.
///
/// Mirrors the request and nests the downstream response under `next`, so
/// the tree depth equals the number of steps executed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainResponse {
    pub status: StepStatus,
    pub service: String,
    /// Simulated processing time in milliseconds.
    pub processing_time: u64,
    pub pid: u32,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<Box<ChainResponse>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_error: Option<NextError>,
    #[serde(flatten)]
    pub request: JourneyRequest,
}

impl ChainResponse {
    /// Number of responses in this chain, including this one.
    pub fn depth(&self) -> usize {
        1 + self.next.as_ref().map(|next| next.depth()).unwrap_or(0)
    }

    /// Step names in execution order.
    pub fn step_names(&self) -> Vec<&str> {
        let mut names = vec![self.request.step_name.as_str()];
        let mut cursor = self.next.as_deref();
        while let Some(response) = cursor {
            names.push(response.request.step_name.as_str());
            cursor = response.next.as_deref();
        }
        names
    }

    /// The deepest response of the chain.
    pub fn last(&self) -> &ChainResponse {
        let mut cursor = self;
        while let Some(next) = cursor.next.as_deref() {
            cursor = next;
        }
        cursor
    }

    /// The first `nextError` found walking down the chain.
    pub fn first_error(&self) -> Option<&NextError> {
        let mut cursor = Some(self);
        while let Some(response) = cursor {
            if let Some(error) = response.next_error.as_ref() {
                return Some(error);
            }
            cursor = response.next.as_deref();
        }
        None
    }
}
