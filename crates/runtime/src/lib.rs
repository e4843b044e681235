//! Step service runtime, provisioning and admin API for BizObs journeys.

pub mod admin;
pub mod journey;
pub mod metadata;
pub mod provision;
pub mod server;
pub mod step;

pub use admin::{admin_router, start_admin_server};
pub use journey::{JourneyError, JourneyOrchestrator};
pub use metadata::{StepCategory, generate_metadata};
pub use provision::{AdminProvisioner, LocalProvisioner, ServiceProvisioner};
pub use server::RunningServer;
pub use step::{RuntimeError, StepRuntime, admin_url_from_env, identity_from_env};
