//! Orchestrator configuration: model, file IO and validation.

mod io;
mod model;
mod validation;

pub use io::{CONFIG_PATH_ENV, default_config_path, load_config, load_config_from_path, save_config_to_path};
pub use model::{ConfigError, OrchestratorConfig, PortRange, ReadinessConfig, RuntimeCommand};
pub use validation::{ValidationError, validate_bind_address, validate_config};
