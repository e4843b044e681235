//! Multi-hop journeys across in-process step services.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use axum::http::StatusCode;
use axum::routing::post;
use bizobs_runtime::{RunningServer, ServiceProvisioner, StepRuntime};
use bizobs_supervisor::{ChainCaller, SupervisorError};
use bizobs_types::journey::AUTO_CHAINED_ACTION;
use bizobs_types::{ChainErrorKind, ChainResponse, CompanyContext, JourneyRequest, ServiceEndpoint, ServiceIdentity, StepDescriptor, StepStatus};
use bizobs_util::{TraceHeaders, service_name_for};
use chrono::Utc;
use tokio::net::TcpListener;

/// Resolves services to the ports of servers started by the test.
#[derive(Default)]
struct StaticProvisioner {
    ports: HashMap<String, u16>,
}

#[async_trait]
impl ServiceProvisioner for StaticProvisioner {
    async fn provision(&self, step: &StepDescriptor, _company: &CompanyContext) -> Result<ServiceEndpoint, SupervisorError> {
        let service_name = service_name_for(step).unwrap_or_default();
        match self.ports.get(&service_name) {
            Some(port) => Ok(ServiceEndpoint::new(service_name, *port)),
            None => Err(SupervisorError::SpawnFailure {
                service_name,
                reason: "not started".into(),
            }),
        }
    }
}

struct Journey {
    servers: Vec<RunningServer>,
    entry: ServiceEndpoint,
}

impl Journey {
    async fn stop(self) {
        for server in self.servers {
            server.stop().await.unwrap();
        }
    }
}

/// Starts a step service for each of `running`, wired to one another.
async fn start_services(running: &[StepDescriptor], replacements: Vec<(String, Router)>) -> Journey {
    let mut listeners = Vec::new();
    let mut provisioner = StaticProvisioner::default();
    for step in running {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let service_name = service_name_for(step).unwrap();
        provisioner.ports.insert(service_name.clone(), listener.local_addr().unwrap().port());
        listeners.push((step.clone(), service_name, listener));
    }
    let provisioner: Arc<dyn ServiceProvisioner> = Arc::new(provisioner);

    let mut servers = Vec::new();
    let mut entry = None;
    for (step, service_name, listener) in listeners {
        let port = listener.local_addr().unwrap().port();
        let router = match replacements.iter().find(|(name, _)| *name == service_name) {
            Some((_, router)) => router.clone(),
            None => {
                let identity = ServiceIdentity {
                    service_name: service_name.clone(),
                    step_name: step.step_name.clone(),
                    port,
                    pid: None,
                    start_time: Utc::now(),
                    company_context: CompanyContext::default(),
                };
                let runtime = StepRuntime::new(identity, Arc::clone(&provisioner), ChainCaller::default()).with_processing_ms(1..=5);
                Arc::new(runtime).router()
            }
        };
        entry.get_or_insert_with(|| ServiceEndpoint::new(service_name.clone(), port));
        servers.push(RunningServer::start(listener, router).unwrap());
    }

    Journey {
        servers,
        entry: entry.unwrap(),
    }
}

fn journey_request(steps: &[StepDescriptor]) -> JourneyRequest {
    JourneyRequest::for_steps(steps.to_vec(), CompanyContext::new("Acme", "acme.io", "retail"))
        .unwrap()
        .with_correlation_id("cid-1")
        .with_think_time_ms(0)
}

async fn run(journey: &Journey, request: &JourneyRequest) -> ChainResponse {
    ChainCaller::default().call(&journey.entry, request, &TraceHeaders::new()).await.unwrap()
}

#[tokio::test]
async fn chain_nests_one_response_per_step() {
    let steps: Vec<StepDescriptor> = ["Awareness", "Discovery", "Consideration", "Purchase"]
        .into_iter()
        .map(StepDescriptor::named)
        .collect();
    let journey = start_services(&steps, Vec::new()).await;

    let response = run(&journey, &journey_request(&steps)).await;
    assert_eq!(response.depth(), 4);
    assert_eq!(response.step_names(), vec!["Awareness", "Discovery", "Consideration", "Purchase"]);
    assert!(response.first_error().is_none());

    let last = response.last();
    assert_eq!(last.service, "PurchaseService");
    assert!(last.next.is_none());
    assert!(last.next_error.is_none());
    assert_eq!(last.request.journey_history.len(), 3);
    assert_eq!(last.request.journey_history[0].service_name, "AwarenessService");

    let mut cursor = Some(&response);
    while let Some(hop) = cursor {
        assert_eq!(hop.status, StepStatus::Completed);
        assert_eq!(hop.request.correlation_id.as_deref(), Some("cid-1"));
        assert_eq!(hop.request.company.company_name, "Acme");
        assert_eq!(hop.request.steps, steps);
        cursor = hop.next.as_deref();
    }

    journey.stop().await;
}

#[tokio::test]
async fn discovery_then_purchase_example() {
    let steps = vec![StepDescriptor::named("Discovery"), StepDescriptor::named("Purchase")];
    let journey = start_services(&steps, Vec::new()).await;

    let response = run(&journey, &journey_request(&steps)).await;
    assert_eq!(response.service, "DiscoveryService");
    assert_eq!(response.request.step_name, "Discovery");
    assert!(response.metadata.get("itemsDiscovered").is_some());

    let next = response.next.as_deref().unwrap();
    assert_eq!(next.service, "PurchaseService");
    assert_eq!(next.request.step_name, "Purchase");
    assert_eq!(next.request.parent_step.as_deref(), Some("Discovery"));
    assert_eq!(next.request.action.as_deref(), Some(AUTO_CHAINED_ACTION));
    assert_eq!(next.request.correlation_id.as_deref(), Some("cid-1"));
    assert!(next.metadata.get("transactionValue").is_some());
    assert!(next.next.is_none());

    journey.stop().await;
}

#[tokio::test]
async fn failure_at_a_hop_is_isolated_to_that_hop() {
    let steps: Vec<StepDescriptor> = ["Discovery", "Consideration", "Purchase"].into_iter().map(StepDescriptor::named).collect();
    // Purchase never gets a server.
    let journey = start_services(&steps[..2], Vec::new()).await;

    let response = run(&journey, &journey_request(&steps)).await;
    assert_eq!(response.status, StepStatus::Completed);
    assert!(response.next_error.is_none());

    let consideration = response.next.as_deref().unwrap();
    assert_eq!(consideration.status, StepStatus::Completed);
    assert!(consideration.next.is_none());
    let error = consideration.next_error.as_ref().unwrap();
    assert_eq!(error.kind, ChainErrorKind::Spawn);
    assert_eq!(error.service, "PurchaseService");
    assert_eq!(response.first_error(), Some(error));

    journey.stop().await;
}

#[tokio::test]
async fn upstream_error_is_reported_as_next_error() {
    let steps = vec![StepDescriptor::named("Discovery"), StepDescriptor::named("Purchase")];
    let broken = Router::new().route("/process", post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "database offline") }));
    let journey = start_services(&steps, vec![("PurchaseService".to_string(), broken)]).await;

    let response = run(&journey, &journey_request(&steps)).await;
    assert_eq!(response.status, StepStatus::Completed);
    let error = response.next_error.as_ref().unwrap();
    assert_eq!(error.kind, ChainErrorKind::Upstream);
    assert!(error.message.contains("database offline"));

    journey.stop().await;
}

#[tokio::test]
async fn explicit_service_names_route_the_chain() {
    let steps = vec![
        StepDescriptor::named("Browse"),
        StepDescriptor::named("Pay").with_service_name("CheckoutAPI"),
    ];
    let journey = start_services(&steps, Vec::new()).await;

    let response = run(&journey, &journey_request(&steps)).await;
    let next = response.next.as_deref().unwrap();
    assert_eq!(next.service, "CheckoutAPI");
    assert_eq!(next.request.step_name, "Pay");

    journey.stop().await;
}
