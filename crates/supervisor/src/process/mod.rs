//! Spawning, tracking and terminating step service processes.

mod env;
mod output;
mod supervisor;

pub use env::ProcessEnv;
pub use supervisor::Supervisor;
