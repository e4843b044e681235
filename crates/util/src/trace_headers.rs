//! Correlation and distributed-trace header propagation.
//!
//! Only an explicit allow-list of headers is carried from one hop to the
//! next. Identifiers are never invented when the upstream supplied them.

use std::collections::BTreeMap;

use bizobs_types::TraceContext;
use uuid::Uuid;

pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";
pub const TRACEPARENT_HEADER: &str = "traceparent";
pub const TRACESTATE_HEADER: &str = "tracestate";

/// Header name prefixes forwarded in addition to the correlation id.
const FORWARDED_PREFIXES: &[&str] = &[
    TRACEPARENT_HEADER,
    TRACESTATE_HEADER,
    "x-dynatrace",
    "x-trace",
    "x-request-id",
    "x-span-id",
    "dt-",
    "uber-trace-id",
];

/// Returns true for headers that travel with a journey.
pub fn is_forwarded_header(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower == CORRELATION_ID_HEADER || FORWARDED_PREFIXES.iter().any(|prefix| lower.starts_with(prefix))
}

/// Allow-listed headers keyed by lowercase name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TraceHeaders {
    headers: BTreeMap<String, String>,
}

impl TraceHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep the allow-listed entries of an arbitrary header set.
    pub fn from_pairs<'a, I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let headers = pairs
            .into_iter()
            .filter(|(name, _)| is_forwarded_header(name))
            .map(|(name, value)| (name.to_ascii_lowercase(), value.to_string()))
            .collect();
        Self { headers }
    }

    /// Rebuild the header set from a journey's body state.
    pub fn from_context(correlation_id: Option<&str>, trace: &TraceContext) -> Self {
        let mut headers = TraceHeaders::new();
        for (name, value) in &trace.headers {
            headers.insert(name, value);
        }
        if let Some(traceparent) = trace.traceparent.as_deref() {
            headers.insert(TRACEPARENT_HEADER, traceparent);
        }
        if let Some(tracestate) = trace.tracestate.as_deref() {
            headers.insert(TRACESTATE_HEADER, tracestate);
        }
        if let Some(correlation_id) = correlation_id {
            headers.insert(CORRELATION_ID_HEADER, correlation_id);
        }
        headers
    }

    /// Insert a header if it is on the allow-list. Returns whether it was kept.
    pub fn insert(&mut self, name: &str, value: &str) -> bool {
        if !is_forwarded_header(name) {
            return false;
        }
        self.headers.insert(name.to_ascii_lowercase(), value.to_string());
        true
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn correlation_id(&self) -> Option<&str> {
        self.get(CORRELATION_ID_HEADER)
    }

    /// Return the correlation id, generating one only when none is present.
    pub fn ensure_correlation_id(&mut self) -> String {
        if let Some(existing) = self.correlation_id() {
            return existing.to_string();
        }
        let generated = new_correlation_id();
        self.headers.insert(CORRELATION_ID_HEADER.to_string(), generated.clone());
        generated
    }

    /// Fold the headers back into the journey's trace state.
    pub fn merge_into(&self, trace: &mut TraceContext) {
        for (name, value) in &self.headers {
            match name.as_str() {
                CORRELATION_ID_HEADER => {}
                TRACEPARENT_HEADER => trace.traceparent = Some(value.clone()),
                TRACESTATE_HEADER => trace.tracestate = Some(value.clone()),
                _ => {
                    trace.headers.insert(name.clone(), value.clone());
                }
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers.iter().map(|(name, value)| (name.as_str(), value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }
}

/// A fresh correlation id.
pub fn new_correlation_id() -> String {
    Uuid::new_v4().to_string()
}

/// A fresh, sampled W3C `traceparent` value.
pub fn new_traceparent() -> String {
    let trace_id = Uuid::new_v4().simple().to_string();
    let span_id = Uuid::new_v4().simple().to_string();
    format!("00-{trace_id}-{}-01", &span_id[..16])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_only_allow_listed_headers() {
        let headers = TraceHeaders::from_pairs([
            ("X-Correlation-Id", "cid-1"),
            ("traceparent", "00-abc-def-01"),
            ("x-dynatrace", "FW4;1"),
            ("dt-tenant", "t1"),
            ("uber-trace-id", "u1"),
            ("authorization", "Bearer secret"),
            ("content-type", "application/json"),
        ]);
        assert_eq!(headers.len(), 5);
        assert_eq!(headers.correlation_id(), Some("cid-1"));
        assert!(headers.get("authorization").is_none());
        assert!(headers.get("content-type").is_none());
    }

    #[test]
    fn does_not_replace_supplied_correlation_id() {
        let mut headers = TraceHeaders::from_pairs([("x-correlation-id", "cid-1")]);
        assert_eq!(headers.ensure_correlation_id(), "cid-1");
    }

    #[test]
    fn generates_correlation_id_when_missing() {
        let mut headers = TraceHeaders::new();
        let generated = headers.ensure_correlation_id();
        assert!(!generated.is_empty());
        assert_eq!(headers.correlation_id(), Some(generated.as_str()));
        assert_eq!(headers.ensure_correlation_id(), generated);
    }

    #[test]
    fn context_round_trip_preserves_trace_fields() {
        let incoming = TraceHeaders::from_pairs([
            ("traceparent", "00-aaaa-bbbb-01"),
            ("tracestate", "vendor=1"),
            ("x-request-id", "req-9"),
            ("x-correlation-id", "cid-1"),
        ]);
        let mut trace = TraceContext::default();
        incoming.merge_into(&mut trace);
        assert_eq!(trace.traceparent.as_deref(), Some("00-aaaa-bbbb-01"));
        assert_eq!(trace.tracestate.as_deref(), Some("vendor=1"));
        assert_eq!(trace.headers.get("x-request-id").map(String::as_str), Some("req-9"));
        assert!(!trace.headers.contains_key("x-correlation-id"));

        let rebuilt = TraceHeaders::from_context(Some("cid-1"), &trace);
        assert_eq!(rebuilt, incoming);
    }

    #[test]
    fn traceparent_has_w3c_shape() {
        let value = new_traceparent();
        let parts: Vec<_> = value.split('-').collect();
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0], "00");
        assert_eq!(parts[1].len(), 32);
        assert_eq!(parts[2].len(), 16);
        assert_eq!(parts[3], "01");
    }
}
