//! Supervisor owning the step service processes and their ports.
//!
//! One table, guarded by a single async lock, maps each service name to the
//! process currently serving it. Every spawned child gets a watcher task that
//! removes the entry and frees the port when the child goes away, unless the
//! entry has already been replaced by a newer instance.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use bizobs_types::{ChainResponse, CompanyContext, JourneyRequest, ServiceEndpoint, ServiceIdentity, StepDescriptor};
use bizobs_util::{TraceHeaders, service_name_for, specialized_executable};
use chrono::Utc;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::env::ProcessEnv;
use super::output::{OutputStream, spawn_output_logger};
use crate::caller::ChainCaller;
use crate::config::{OrchestratorConfig, RuntimeCommand};
use crate::ports::PortAllocator;
use crate::readiness::ReadinessGate;
use crate::types::{ChainError, ServiceStatus, ServiceSummary, SupervisorError};

/// Extra time allowed past the shutdown grace period for the kill to land.
const KILL_MARGIN: Duration = Duration::from_secs(2);

type ProcessTable = Arc<Mutex<HashMap<String, TrackedProcess>>>;

#[derive(Debug)]
struct TrackedProcess {
    instance: u64,
    identity: ServiceIdentity,
    status: ServiceStatus,
    /// Cancelled to ask the watcher to terminate the child.
    stop: CancellationToken,
    /// Cancelled by the watcher once the child has exited.
    exited: CancellationToken,
}

impl TrackedProcess {
    fn is_live(&self) -> bool {
        !self.exited.is_cancelled()
    }
}

/// Spawns, tracks and terminates step services.
#[derive(Debug)]
pub struct Supervisor {
    config: OrchestratorConfig,
    ports: Arc<PortAllocator>,
    processes: ProcessTable,
    readiness: ReadinessGate,
    caller: ChainCaller,
    admin_url: RwLock<Option<String>>,
    config_path: Option<PathBuf>,
    next_instance: AtomicU64,
}

impl Supervisor {
    pub fn new(config: OrchestratorConfig) -> Self {
        Self {
            ports: Arc::new(PortAllocator::new(config.port_range)),
            processes: Arc::new(Mutex::new(HashMap::new())),
            readiness: ReadinessGate::new(config.readiness),
            caller: ChainCaller::new(config.call_timeout()),
            admin_url: RwLock::new(None),
            config_path: None,
            next_instance: AtomicU64::new(1),
            config,
        }
    }

    /// Hand `path` to every child so it loads the same configuration.
    pub fn with_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    pub fn ports(&self) -> &PortAllocator {
        &self.ports
    }

    pub fn readiness(&self) -> &ReadinessGate {
        &self.readiness
    }

    pub fn caller(&self) -> &ChainCaller {
        &self.caller
    }

    /// Admin server URL handed to every child spawned from now on.
    pub fn set_admin_url(&self, url: Option<String>) {
        *self.admin_url.write().unwrap_or_else(|poisoned| poisoned.into_inner()) = url;
    }

    pub fn admin_url(&self) -> Option<String> {
        self.admin_url.read().unwrap_or_else(|poisoned| poisoned.into_inner()).clone()
    }

    /// Makes sure a process serves `step` under `company`.
    ///
    /// Returns the running identity when the company context is unchanged.
    /// A different context replaces the running process with a fresh one.
    ///
    /// # Errors
    /// `UnresolvableName`, `PortRangeExhausted` or `SpawnFailure`. Spawn
    /// failures release the port and are not retried.
    pub async fn ensure(&self, step: &StepDescriptor, company: &CompanyContext) -> Result<ServiceIdentity, SupervisorError> {
        let service_name = service_name_for(step).ok_or_else(|| SupervisorError::UnresolvableName {
            step_name: step.step_name.clone(),
        })?;

        let mut processes = self.processes.lock().await;
        if let Some(tracked) = processes.get(&service_name)
            && tracked.is_live()
            && tracked.identity.company_context == *company
        {
            return Ok(tracked.identity.clone());
        }

        if let Some(previous) = processes.remove(&service_name) {
            self.ports.release(&service_name);
            if previous.is_live() {
                info!(
                    service = %service_name,
                    pid = ?previous.identity.pid,
                    from = %previous.identity.company_context.company_name,
                    to = %company.company_name,
                    "company context changed; restarting service"
                );
                self.terminate(previous).await;
            }
        }

        let port = self.ports.allocate(&service_name)?;
        match self.spawn(&service_name, step, company, port) {
            Ok(tracked) => {
                let identity = tracked.identity.clone();
                processes.insert(service_name, tracked);
                Ok(identity)
            }
            Err(error) => {
                self.ports.release(&service_name);
                Err(error)
            }
        }
    }

    /// [`Supervisor::ensure`] followed by health probing until `timeout`.
    ///
    /// Each failed probe re-runs `ensure`, so a child that died while
    /// starting is replaced.
    pub async fn ensure_ready(&self, step: &StepDescriptor, company: &CompanyContext, timeout: Duration) -> Result<ServiceIdentity, SupervisorError> {
        let deadline = Instant::now() + timeout;
        loop {
            let identity = self.ensure(step, company).await?;
            if self.readiness.probe(identity.port).await {
                self.mark_running(&identity).await;
                return Ok(identity);
            }

            let now = Instant::now();
            if now >= deadline {
                warn!(service = %identity.service_name, port = identity.port, "service did not become ready");
                return Err(SupervisorError::ReadinessTimeout {
                    service_name: identity.service_name,
                    port: identity.port,
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
            sleep(self.readiness.interval().min(deadline - now)).await;
        }
    }

    /// Polls `port` until it answers `/health` or `timeout` passes.
    pub async fn wait_ready(&self, port: u16, timeout: Duration) -> bool {
        self.readiness.wait_ready(port, timeout).await
    }

    /// Calls a service by name through its allocated port.
    ///
    /// # Errors
    /// A [`ChainError`]; a name with no port is reported as not allocated.
    pub async fn call(&self, service_name: &str, payload: &JourneyRequest, headers: &TraceHeaders) -> Result<ChainResponse, ChainError> {
        let port = self.ports.port_of(service_name).ok_or_else(|| SupervisorError::NotAllocated {
            service_name: service_name.to_string(),
        })?;
        self.caller.call(&ServiceEndpoint::new(service_name, port), payload, headers).await
    }

    /// Terminates every tracked service and clears all allocations.
    pub async fn stop_all(&self) {
        let drained: Vec<TrackedProcess> = {
            let mut processes = self.processes.lock().await;
            self.ports.clear();
            processes.drain().map(|(_, tracked)| tracked).collect()
        };
        if drained.is_empty() {
            return;
        }

        info!(count = drained.len(), "stopping all services");
        for tracked in &drained {
            tracked.stop.cancel();
        }
        for tracked in drained {
            self.await_exit(&tracked).await;
        }
    }

    /// Snapshot of every live service, ordered by name.
    pub async fn services(&self) -> Vec<ServiceSummary> {
        let processes = self.processes.lock().await;
        let mut summaries: Vec<ServiceSummary> = processes
            .values()
            .filter(|tracked| tracked.is_live())
            .map(|tracked| ServiceSummary {
                service_name: tracked.identity.service_name.clone(),
                step_name: tracked.identity.step_name.clone(),
                port: tracked.identity.port,
                pid: tracked.identity.pid,
                status: tracked.status,
                start_time: tracked.identity.start_time,
                company_context: tracked.identity.company_context.clone(),
            })
            .collect();
        summaries.sort_by(|a, b| a.service_name.cmp(&b.service_name));
        summaries
    }

    pub async fn identity(&self, service_name: &str) -> Option<ServiceIdentity> {
        let processes = self.processes.lock().await;
        processes
            .get(service_name)
            .filter(|tracked| tracked.is_live())
            .map(|tracked| tracked.identity.clone())
    }

    /// State of `service_name` as seen by a request carrying `company`.
    pub async fn status(&self, service_name: &str, company: &CompanyContext) -> ServiceStatus {
        let processes = self.processes.lock().await;
        match processes.get(service_name) {
            Some(tracked) if !tracked.is_live() => ServiceStatus::Absent,
            Some(tracked) if tracked.identity.company_context != *company => ServiceStatus::Stale,
            Some(tracked) => tracked.status,
            None => ServiceStatus::Absent,
        }
    }

    async fn mark_running(&self, identity: &ServiceIdentity) {
        let mut processes = self.processes.lock().await;
        if let Some(tracked) = processes.get_mut(&identity.service_name)
            && tracked.identity.pid == identity.pid
            && tracked.status != ServiceStatus::Running
        {
            tracked.status = ServiceStatus::Running;
            debug!(service = %identity.service_name, pid = ?identity.pid, "service marked running");
        }
    }

    async fn terminate(&self, tracked: TrackedProcess) {
        tracked.stop.cancel();
        self.await_exit(&tracked).await;
    }

    async fn await_exit(&self, tracked: &TrackedProcess) {
        let limit = self.config.shutdown_timeout() + KILL_MARGIN;
        if timeout(limit, tracked.exited.cancelled()).await.is_err() {
            warn!(
                service = %tracked.identity.service_name,
                pid = ?tracked.identity.pid,
                "service did not confirm exit in time"
            );
        }
    }

    fn launch_command(&self, service_name: &str) -> Result<RuntimeCommand, SupervisorError> {
        if let Some(dir) = self.config.services_dir.as_deref()
            && let Some(path) = specialized_executable(dir, service_name)
        {
            return Ok(RuntimeCommand::new(path.to_string_lossy().into_owned(), Vec::<String>::new()));
        }
        match &self.config.runtime_command {
            Some(command) => Ok(command.clone()),
            None => RuntimeCommand::current_exe_step().map_err(|error| SupervisorError::SpawnFailure {
                service_name: service_name.to_string(),
                reason: error.to_string(),
            }),
        }
    }

    fn spawn(&self, service_name: &str, step: &StepDescriptor, company: &CompanyContext, port: u16) -> Result<TrackedProcess, SupervisorError> {
        let mut identity = ServiceIdentity {
            service_name: service_name.to_string(),
            step_name: step.step_name.clone(),
            port,
            pid: None,
            start_time: Utc::now(),
            company_context: company.clone(),
        };
        let command = self.launch_command(service_name)?;
        let admin_url = self.admin_url();
        let env = ProcessEnv::new(&identity, admin_url.as_deref(), &self.config.env)
            .with_config_path(self.config_path.as_deref())
            .to_env_vars();

        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .envs(&env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|error| {
            error!(service = %service_name, program = %command.program, error = %error, "failed to spawn service");
            SupervisorError::SpawnFailure {
                service_name: service_name.to_string(),
                reason: error.to_string(),
            }
        })?;
        identity.pid = child.id();

        if let Some(stdout) = child.stdout.take() {
            spawn_output_logger(service_name.to_string(), OutputStream::Stdout, stdout);
        }
        if let Some(stderr) = child.stderr.take() {
            spawn_output_logger(service_name.to_string(), OutputStream::Stderr, stderr);
        }

        let tracked = TrackedProcess {
            instance: self.next_instance.fetch_add(1, Ordering::Relaxed),
            identity,
            status: ServiceStatus::Starting,
            stop: CancellationToken::new(),
            exited: CancellationToken::new(),
        };
        let watch = ChildWatch {
            service_name: service_name.to_string(),
            instance: tracked.instance,
            stop: tracked.stop.clone(),
            exited: tracked.exited.clone(),
            processes: Arc::clone(&self.processes),
            ports: Arc::clone(&self.ports),
            grace: self.config.shutdown_timeout(),
        };
        tokio::spawn(watch.run(child));

        info!(
            service = %service_name,
            step = %step.step_name,
            port,
            pid = ?tracked.identity.pid,
            program = %command.program,
            "spawned step service"
        );
        Ok(tracked)
    }
}

/// Background task owning one child process.
struct ChildWatch {
    service_name: String,
    instance: u64,
    stop: CancellationToken,
    exited: CancellationToken,
    processes: ProcessTable,
    ports: Arc<PortAllocator>,
    grace: Duration,
}

impl ChildWatch {
    async fn run(self, mut child: Child) {
        let finished = tokio::select! {
            status = child.wait() => Some(status),
            _ = self.stop.cancelled() => None,
        };
        let status = match finished {
            Some(status) => status,
            None => stop_child(&mut child, &self.service_name, self.grace).await,
        };
        match &status {
            Ok(status) => info!(service = %self.service_name, %status, "service exited"),
            Err(error) => warn!(service = %self.service_name, error = %error, "failed to reap service"),
        }

        // Signal before locking: whoever asked for the stop may hold the lock.
        self.exited.cancel();

        let mut processes = self.processes.lock().await;
        if processes.get(&self.service_name).is_some_and(|tracked| tracked.instance == self.instance) {
            processes.remove(&self.service_name);
            self.ports.release(&self.service_name);
            debug!(service = %self.service_name, "removed exited service");
        }
    }
}

async fn stop_child(child: &mut Child, service_name: &str, grace: Duration) -> io::Result<ExitStatus> {
    if let Some(status) = request_graceful_stop(child, service_name, grace).await {
        return status;
    }
    child.kill().await?;
    child.wait().await
}

/// SIGTERM, then wait up to `grace`. `None` means a hard kill is needed.
#[cfg(unix)]
async fn request_graceful_stop(child: &mut Child, service_name: &str, grace: Duration) -> Option<io::Result<ExitStatus>> {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    let pid = child.id().and_then(|pid| i32::try_from(pid).ok())?;
    if let Err(error) = kill(Pid::from_raw(pid), Signal::SIGTERM) {
        warn!(service = %service_name, pid, error = %error, "failed to send SIGTERM");
        return None;
    }
    match timeout(grace, child.wait()).await {
        Ok(status) => Some(status),
        Err(_) => {
            warn!(service = %service_name, pid, "service ignored SIGTERM; killing");
            None
        }
    }
}

#[cfg(not(unix))]
async fn request_graceful_stop(_child: &mut Child, _service_name: &str, _grace: Duration) -> Option<io::Result<ExitStatus>> {
    None
}
