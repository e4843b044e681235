use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use bizobs_runtime::{AdminProvisioner, JourneyOrchestrator, RunningServer, StepRuntime, admin_url_from_env, identity_from_env, start_admin_server};
use bizobs_supervisor::config::{default_config_path, load_config_from_path, validate_bind_address};
use bizobs_supervisor::{ChainCaller, OrchestratorConfig, ReadinessGate, Supervisor};
use bizobs_types::{CompanyContext, JourneyRequest, StepDescriptor};
use bizobs_util::TraceHeaders;
use clap::{Args, Parser, Subcommand};
use tracing::info;

/// Spawn and chain per-step services for simulated customer journeys.
#[derive(Parser, Debug)]
#[command(name = "bizobs", version, about)]
struct Cli {
    /// Orchestrator configuration file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the admin server until interrupted
    Serve {
        /// Loopback address to listen on (overrides the configuration)
        #[arg(long)]
        bind: Option<String>,
    },
    /// Run one step service; identity comes from the environment
    Step,
    /// Run a single journey and print the nested response as JSON
    Journey(JourneyArgs),
}

#[derive(Args, Debug)]
struct JourneyArgs {
    /// Step in journey order, as NAME or NAME=SERVICE
    #[arg(long = "step", required = true, value_parser = parse_step)]
    steps: Vec<StepDescriptor>,

    #[arg(long, default_value = bizobs_types::DEFAULT_COMPANY_NAME)]
    company: String,

    #[arg(long, default_value = bizobs_types::DEFAULT_DOMAIN)]
    domain: String,

    #[arg(long, default_value = bizobs_types::DEFAULT_INDUSTRY_TYPE)]
    industry: String,

    #[arg(long)]
    correlation_id: Option<String>,

    /// Pause between steps (defaults to the configuration)
    #[arg(long)]
    think_time_ms: Option<u64>,

    /// Spawn every step's service before the first call
    #[arg(long)]
    prewarm: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    // Absolute so children resolve the same file from any working directory.
    let config_path = cli.config.clone().unwrap_or_else(default_config_path);
    let config_path = std::path::absolute(&config_path).unwrap_or(config_path);
    let config = load_config_from_path(&config_path).with_context(|| format!("failed to load {}", config_path.display()))?;

    match cli.command {
        Command::Serve { bind } => serve(config, &config_path, bind).await,
        Command::Step => step(config).await,
        Command::Journey(args) => journey(config, &config_path, args).await,
    }
}

fn init_tracing() {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

async fn serve(config: OrchestratorConfig, config_path: &Path, bind: Option<String>) -> Result<()> {
    let bind_address = validate_bind_address(bind.as_deref().unwrap_or(&config.admin_bind_address))?;
    let supervisor = Arc::new(Supervisor::new(config).with_config_path(config_path));
    let orchestrator = JourneyOrchestrator::new(Arc::clone(&supervisor));
    let server = start_admin_server(bind_address, orchestrator).await?;

    shutdown_signal().await;
    info!("shutting down");
    supervisor.stop_all().await;
    server.stop().await
}

async fn step(config: OrchestratorConfig) -> Result<()> {
    let identity = identity_from_env().context("step services are started by the supervisor")?;
    let admin_url = admin_url_from_env();
    let provisioner = AdminProvisioner::new(
        admin_url.as_deref(),
        config.port_range,
        ReadinessGate::new(config.readiness),
        config.readiness.timeout(),
    );
    let bind_address = SocketAddr::from(([127, 0, 0, 1], identity.port));
    info!(
        service = %identity.service_name,
        step = %identity.step_name,
        port = identity.port,
        pid = std::process::id(),
        "starting step service"
    );

    let runtime = Arc::new(StepRuntime::new(identity, Arc::new(provisioner), ChainCaller::new(config.call_timeout())));
    let server = RunningServer::bind(bind_address, runtime.router()).await?;

    shutdown_signal().await;
    info!("shutting down");
    server.stop().await
}

async fn journey(config: OrchestratorConfig, config_path: &Path, args: JourneyArgs) -> Result<()> {
    let think_time_ms = args.think_time_ms.unwrap_or(config.default_think_time_ms);
    let company = CompanyContext::new(args.company, args.domain, args.industry);
    let mut request = JourneyRequest::for_steps(args.steps, company)
        .ok_or_else(|| anyhow!("at least one --step is required"))?
        .with_think_time_ms(think_time_ms);
    if let Some(correlation_id) = args.correlation_id {
        request = request.with_correlation_id(correlation_id);
    }

    // Children reach the supervisor through an admin server on an ephemeral port.
    let supervisor = Arc::new(Supervisor::new(config).with_config_path(config_path));
    let orchestrator = JourneyOrchestrator::new(Arc::clone(&supervisor)).with_prewarm(args.prewarm);
    let server = start_admin_server(SocketAddr::from(([127, 0, 0, 1], 0)), orchestrator.clone()).await?;

    let outcome = orchestrator.run(request, TraceHeaders::new()).await;
    supervisor.stop_all().await;
    server.stop().await?;

    let response = outcome?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

fn parse_step(raw: &str) -> Result<StepDescriptor, String> {
    let (step_name, service_name) = match raw.split_once('=') {
        Some((step_name, service_name)) => (step_name.trim(), Some(service_name.trim())),
        None => (raw.trim(), None),
    };
    if step_name.is_empty() {
        return Err("step name must not be empty".to_string());
    }
    let step = StepDescriptor::named(step_name);
    Ok(match service_name.filter(|name| !name.is_empty()) {
        Some(service_name) => step.with_service_name(service_name),
        None => step,
    })
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_journey_steps() {
        let cli = Cli::try_parse_from([
            "bizobs",
            "journey",
            "--step",
            "Discovery",
            "--step",
            "Purchase=CheckoutAPI",
            "--company",
            "Acme",
            "--correlation-id",
            "cid-1",
        ])
        .unwrap();
        let Command::Journey(args) = cli.command else {
            panic!("expected journey command");
        };
        assert_eq!(args.steps[0], StepDescriptor::named("Discovery"));
        assert_eq!(args.steps[1].service_name.as_deref(), Some("CheckoutAPI"));
        assert_eq!(args.company, "Acme");
        assert_eq!(args.domain, bizobs_types::DEFAULT_DOMAIN);
        assert_eq!(args.correlation_id.as_deref(), Some("cid-1"));
    }

    #[test]
    fn rejects_empty_step_name() {
        assert!(parse_step("=CheckoutAPI").is_err());
        assert_eq!(parse_step(" Discovery ").unwrap().step_name, "Discovery");
    }

    #[test]
    fn journey_requires_a_step() {
        assert!(Cli::try_parse_from(["bizobs", "journey"]).is_err());
    }
}
