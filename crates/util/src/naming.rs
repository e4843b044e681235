//! # Service Naming
//!
//! Derives the canonical service name a journey step runs under. A step such
//! as `"checkout_process"` becomes `"CheckoutProcessService"`; a name that
//! already carries a service-type suffix is passed through untouched so the
//! resolver is idempotent.
//!
//! The suffix depends on the caller's description and category, so the same
//! step name may resolve differently for two callers. That is kept as-is:
//! both journeys then get their own service process.

use std::borrow::Cow;

use bizobs_types::StepDescriptor;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

/// Suffixes that mark a name as already qualified.
pub const QUALIFIED_SUFFIXES: &[&str] = &["Service", "API", "Processor", "Manager", "Gateway"];

const DEFAULT_SUFFIX: &str = "Service";

static DISALLOWED_CHARACTERS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-zA-Z0-9_\s-]").expect("valid disallowed-character pattern"));
static SEPARATOR_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[-_]+").expect("valid separator pattern"));
static CAMEL_BOUNDARY: Lazy<Regex> = Lazy::new(|| Regex::new(r"([a-z0-9])([A-Z])").expect("valid camel-case pattern"));

/// Caller-supplied hints that steer suffix selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NamingContext<'a> {
    pub description: Option<&'a str>,
    pub category: Option<&'a str>,
    pub has_endpoint: bool,
}

impl<'a> NamingContext<'a> {
    /// Collect the hints carried by a step descriptor.
    pub fn from_step(step: &'a StepDescriptor) -> Self {
        Self {
            description: step.description.as_deref(),
            category: step.category.as_deref(),
            has_endpoint: step.endpoint.is_some(),
        }
    }
}

/// Returns true when `name` already ends in a recognized service-type suffix.
pub fn is_qualified(name: &str) -> bool {
    QUALIFIED_SUFFIXES.iter().any(|suffix| name.ends_with(suffix))
}

/// Resolves a step or service name into a canonical service name.
///
/// Qualified names are returned unchanged. Anything else is normalized into
/// upper-camel words and given a suffix picked from `context`:
///
/// | description keyword        | suffix                 |
/// |----------------------------|------------------------|
/// | `api` (or an endpoint set) | `API`                  |
/// | `process`, `handle`        | `Processor`            |
/// | `manage`, `control`        | `Manager`              |
/// | `gateway`, `proxy`         | `Gateway`              |
/// | none, category given       | `<Category>Service`    |
/// | none                       | `Service`              |
///
/// # Returns
/// `None` when the name has no alphanumeric content to build from.
///
/// # Example
/// ```
/// use bizobs_util::naming::{NamingContext, resolve_service_name};
///
/// let name = resolve_service_name("checkout_process", &NamingContext::default());
/// assert_eq!(name.as_deref(), Some("CheckoutProcessService"));
/// ```
pub fn resolve_service_name(name: &str, context: &NamingContext<'_>) -> Option<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return None;
    }
    if is_qualified(trimmed) {
        return Some(trimmed.to_string());
    }

    let base = upper_camel_words(trimmed)?;
    let suffix = select_suffix(context);
    let resolved = format!("{base}{suffix}");
    debug!(step = %name, service = %resolved, "resolved step to service name");
    Some(resolved)
}

/// Service name for a step: the explicit `serviceName` if present, otherwise
/// the resolved one.
pub fn service_name_for(step: &StepDescriptor) -> Option<String> {
    if let Some(explicit) = step.service_name.as_deref().map(str::trim)
        && !explicit.is_empty()
    {
        return Some(explicit.to_string());
    }
    resolve_service_name(&step.step_name, &NamingContext::from_step(step))
}

fn select_suffix(context: &NamingContext<'_>) -> Cow<'static, str> {
    let description = context.description.unwrap_or_default().to_lowercase();
    let mentions = |keywords: &[&str]| keywords.iter().any(|keyword| description.contains(keyword));

    if mentions(&["api"]) || context.has_endpoint {
        return Cow::Borrowed("API");
    }
    if mentions(&["process", "handle"]) {
        return Cow::Borrowed("Processor");
    }
    if mentions(&["manage", "control"]) {
        return Cow::Borrowed("Manager");
    }
    if mentions(&["gateway", "proxy"]) {
        return Cow::Borrowed("Gateway");
    }
    if let Some(category) = context.category
        && !category.to_lowercase().contains("step")
        && let Some(category) = upper_camel_words(category)
    {
        return Cow::Owned(format!("{category}{DEFAULT_SUFFIX}"));
    }
    Cow::Borrowed(DEFAULT_SUFFIX)
}

fn upper_camel_words(input: &str) -> Option<String> {
    let cleaned = DISALLOWED_CHARACTERS.replace_all(input, "");
    let spaced = SEPARATOR_RUNS.replace_all(&cleaned, " ");
    let spaced = CAMEL_BOUNDARY.replace_all(&spaced, "$1 $2");

    let joined: String = spaced.split_whitespace().map(capitalize_first).collect();
    (!joined.is_empty()).then_some(joined)
}

fn capitalize_first(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
