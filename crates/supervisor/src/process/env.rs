//! Environment handed to spawned step services.

use std::collections::BTreeMap;
use std::path::Path;

use bizobs_types::{ServiceIdentity, env_keys};

/// Everything a child needs to know about itself, passed as variables.
#[derive(Debug, Clone)]
pub struct ProcessEnv<'a> {
    pub identity: &'a ServiceIdentity,
    /// Admin server the child asks to provision its successor.
    pub admin_url: Option<&'a str>,
    /// Configured extra variables. These never override the identity keys.
    pub extra: &'a BTreeMap<String, String>,
    /// Configuration file the parent was loaded from.
    pub config_path: Option<&'a Path>,
}

impl<'a> ProcessEnv<'a> {
    pub fn new(identity: &'a ServiceIdentity, admin_url: Option<&'a str>, extra: &'a BTreeMap<String, String>) -> Self {
        Self {
            identity,
            admin_url,
            extra,
            config_path: None,
        }
    }

    pub fn with_config_path(mut self, config_path: Option<&'a Path>) -> Self {
        self.config_path = config_path;
        self
    }

    /// Convert to the variable list applied to the child command.
    pub fn to_env_vars(&self) -> BTreeMap<String, String> {
        let mut env = self.extra.clone();
        let identity = self.identity;
        let company = &identity.company_context;

        env.insert(env_keys::SERVICE_NAME.to_string(), identity.service_name.clone());
        env.insert(env_keys::STEP_NAME.to_string(), identity.step_name.clone());
        env.insert(env_keys::PORT.to_string(), identity.port.to_string());
        env.insert(env_keys::COMPANY_NAME.to_string(), company.company_name.clone());
        env.insert(env_keys::DOMAIN.to_string(), company.domain.clone());
        env.insert(env_keys::INDUSTRY_TYPE.to_string(), company.industry_type.clone());
        env.insert(env_keys::SERVICE_START_TIME.to_string(), identity.start_time.to_rfc3339());

        if let Some(admin_url) = self.admin_url {
            env.insert(env_keys::ADMIN_URL.to_string(), admin_url.to_string());
        }
        if let Some(config_path) = self.config_path {
            env.insert(env_keys::CONFIG_PATH.to_string(), config_path.to_string_lossy().into_owned());
        }

        env
    }
}
