#![cfg(unix)]

use std::sync::Arc;
use std::time::Duration;

use axum::{Json, Router, routing::get};
use bizobs_supervisor::{OrchestratorConfig, PortRange, ReadinessConfig, RuntimeCommand, ServiceStatus, Supervisor, SupervisorError};
use bizobs_types::{CompanyContext, StepDescriptor};
use nix::sys::signal::kill;
use nix::unistd::Pid;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::time::{Instant, sleep};

fn supervisor_with(program: &str, args: &[&str], port_range: PortRange) -> Supervisor {
    Supervisor::new(OrchestratorConfig {
        port_range,
        readiness: ReadinessConfig {
            interval_ms: 20,
            probe_timeout_ms: 200,
            timeout_ms: 1_000,
        },
        shutdown_timeout_ms: 500,
        runtime_command: Some(RuntimeCommand::new(program, args.iter().copied())),
        ..Default::default()
    })
}

fn sleeping_supervisor() -> Supervisor {
    supervisor_with("sleep", &["30"], PortRange { base: 4401, size: 50 })
}

fn pid_is_alive(pid: u32) -> bool {
    // No signal only checks that the process exists.
    kill(Pid::from_raw(pid as i32), None).is_ok()
}

async fn wait_until<F, Fut>(mut condition: F, limit: Duration) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = Instant::now() + limit;
    while Instant::now() < deadline {
        if condition().await {
            return true;
        }
        sleep(Duration::from_millis(20)).await;
    }
    false
}

#[tokio::test]
async fn context_change_restarts_with_new_process() {
    let supervisor = sleeping_supervisor();
    let step = StepDescriptor::named("Discovery");
    let acme = CompanyContext::new("Acme", "acme.io", "retail");
    let globex = CompanyContext::new("Globex", "globex.com", "energy");

    let first = supervisor.ensure(&step, &acme).await.unwrap();
    let old_pid = first.pid.unwrap();
    assert_eq!(supervisor.status(&first.service_name, &globex).await, ServiceStatus::Stale);

    let second = supervisor.ensure(&step, &globex).await.unwrap();
    let new_pid = second.pid.unwrap();
    assert_ne!(old_pid, new_pid);
    assert_eq!(second.company_context, globex);
    assert_eq!(supervisor.identity("DiscoveryService").await.unwrap().pid, Some(new_pid));
    assert!(wait_until(move || async move { !pid_is_alive(old_pid) }, Duration::from_secs(3)).await);

    supervisor.stop_all().await;
    assert!(wait_until(move || async move { !pid_is_alive(new_pid) }, Duration::from_secs(3)).await);
}

#[tokio::test]
async fn exited_child_is_untracked_and_port_released() {
    let supervisor = Arc::new(supervisor_with("sleep", &["0.1"], PortRange { base: 4461, size: 20 }));
    let identity = supervisor.ensure(&StepDescriptor::named("Purchase"), &CompanyContext::default()).await.unwrap();
    assert_eq!(supervisor.ports().port_of("PurchaseService"), Some(identity.port));

    let watched = Arc::clone(&supervisor);
    let cleaned = wait_until(
        move || {
            let supervisor = Arc::clone(&watched);
            async move { supervisor.identity("PurchaseService").await.is_none() }
        },
        Duration::from_secs(5),
    )
    .await;
    assert!(cleaned);
    assert_eq!(supervisor.ports().port_of("PurchaseService"), None);
    assert!(supervisor.services().await.is_empty());
}

#[tokio::test]
async fn stop_all_terminates_every_service() {
    let supervisor = sleeping_supervisor();
    let company = CompanyContext::default();
    let mut pids = Vec::new();
    for step in ["Discovery", "Consideration", "Purchase"] {
        let identity = supervisor.ensure(&StepDescriptor::named(step), &company).await.unwrap();
        pids.push(identity.pid.unwrap());
    }
    assert_eq!(supervisor.services().await.len(), 3);

    supervisor.stop_all().await;
    assert!(supervisor.services().await.is_empty());
    assert!(supervisor.ports().is_empty());
    for pid in pids {
        assert!(wait_until(move || async move { !pid_is_alive(pid) }, Duration::from_secs(3)).await);
    }
}

#[tokio::test]
async fn ensure_ready_times_out_when_service_never_answers() {
    let supervisor = sleeping_supervisor();
    let error = supervisor
        .ensure_ready(&StepDescriptor::named("Discovery"), &CompanyContext::default(), Duration::from_millis(200))
        .await
        .unwrap_err();
    assert!(matches!(error, SupervisorError::ReadinessTimeout { ref service_name, .. } if service_name == "DiscoveryService"));
    supervisor.stop_all().await;
}

#[tokio::test]
async fn ensure_ready_returns_once_port_answers_health() {
    // A single-port range forces the service onto a port whose /health we serve.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let router = Router::new().route("/health", get(|| async { Json(json!({"status": "ok"})) }));
        let _ = axum::serve(listener, router).await;
    });

    let supervisor = supervisor_with("sleep", &["30"], PortRange { base: port, size: 1 });
    let company = CompanyContext::default();
    let identity = supervisor
        .ensure_ready(&StepDescriptor::named("Discovery"), &company, Duration::from_secs(2))
        .await
        .unwrap();
    assert_eq!(identity.port, port);
    assert_eq!(supervisor.status("DiscoveryService", &company).await, ServiceStatus::Running);
    assert!(supervisor.wait_ready(port, Duration::from_millis(200)).await);

    supervisor.stop_all().await;
}

#[tokio::test]
async fn concurrent_ensure_spawns_a_single_process() {
    let supervisor = Arc::new(sleeping_supervisor());
    let company = CompanyContext::new("Acme", "acme.io", "retail");

    let mut handles = Vec::new();
    for _ in 0..8 {
        let supervisor = Arc::clone(&supervisor);
        let company = company.clone();
        handles.push(tokio::spawn(async move { supervisor.ensure(&StepDescriptor::named("Discovery"), &company).await }));
    }
    let mut identities = Vec::new();
    for handle in handles {
        identities.push(handle.await.unwrap().unwrap());
    }

    let first = &identities[0];
    assert!(identities.iter().all(|identity| identity.pid == first.pid && identity.port == first.port));
    assert_eq!(supervisor.services().await.len(), 1);
    assert_eq!(supervisor.ports().len(), 1);

    supervisor.stop_all().await;
}

#[tokio::test]
async fn concurrent_ensure_ready_shares_one_process() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let router = Router::new().route("/health", get(|| async { Json(json!({"status": "ok"})) }));
        let _ = axum::serve(listener, router).await;
    });

    let supervisor = Arc::new(supervisor_with("sleep", &["30"], PortRange { base: port, size: 1 }));
    let mut handles = Vec::new();
    for _ in 0..6 {
        let supervisor = Arc::clone(&supervisor);
        handles.push(tokio::spawn(async move {
            supervisor
                .ensure_ready(&StepDescriptor::named("Purchase"), &CompanyContext::default(), Duration::from_secs(2))
                .await
        }));
    }
    let mut pids = Vec::new();
    for handle in handles {
        pids.push(handle.await.unwrap().unwrap().pid);
    }

    assert!(pids.iter().all(|pid| *pid == pids[0]));
    let services = supervisor.services().await;
    assert_eq!(services.len(), 1);
    assert_eq!(services[0].status, ServiceStatus::Running);

    supervisor.stop_all().await;
}

#[tokio::test]
async fn children_receive_parent_config_path() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("seen");
    let config_path = dir.path().join("orchestrator.json");

    let supervisor = Supervisor::new(OrchestratorConfig {
        port_range: PortRange { base: 4481, size: 10 },
        shutdown_timeout_ms: 500,
        runtime_command: Some(RuntimeCommand::new(
            "sh",
            ["-c", r#"printf %s "$BIZOBS_CONFIG_PATH" > "$SEEN_FILE"; sleep 30"#],
        )),
        env: [("SEEN_FILE".to_string(), out.to_string_lossy().into_owned())].into(),
        ..Default::default()
    })
    .with_config_path(&config_path);
    assert_eq!(supervisor.config_path(), Some(config_path.as_path()));

    supervisor.ensure(&StepDescriptor::named("Discovery"), &CompanyContext::default()).await.unwrap();
    let expected = config_path.to_string_lossy().into_owned();
    let written = wait_until(
        || {
            let out = out.clone();
            let expected = expected.clone();
            async move { std::fs::read_to_string(&out).is_ok_and(|seen| seen == expected) }
        },
        Duration::from_secs(3),
    )
    .await;
    assert!(written);

    supervisor.stop_all().await;
}
