//! Helpers shared by the supervisor, the step runtime and the CLI.

pub mod naming;
pub mod path_processing;
pub mod trace_headers;

pub use naming::{NamingContext, is_qualified, resolve_service_name, service_name_for};
pub use path_processing::{expand_tilde, specialized_executable};
pub use trace_headers::{TraceHeaders, is_forwarded_header, new_correlation_id, new_traceparent};
