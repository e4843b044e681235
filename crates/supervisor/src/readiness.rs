//! Health polling used to decide when a step service can take calls.

use std::time::{Duration, Instant};

use tokio::time::sleep;
use tracing::{debug, info};

use crate::config::ReadinessConfig;

/// Polls `GET /health` on loopback ports.
#[derive(Debug, Clone)]
pub struct ReadinessGate {
    client: reqwest::Client,
    interval: Duration,
    probe_timeout: Duration,
}

impl ReadinessGate {
    pub fn new(config: ReadinessConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            interval: config.interval(),
            probe_timeout: config.probe_timeout(),
        }
    }

    /// One health probe. Any 2xx answer counts as healthy.
    pub async fn probe(&self, port: u16) -> bool {
        let url = health_url(port);
        let started = Instant::now();
        match self.client.get(&url).timeout(self.probe_timeout).send().await {
            Ok(response) if response.status().is_success() => {
                debug!(port, latency_ms = started.elapsed().as_millis() as u64, "health probe succeeded");
                true
            }
            Ok(response) => {
                debug!(port, status = %response.status(), "health probe returned non-success status");
                false
            }
            Err(error) => {
                debug!(port, error = %error, "health probe failed");
                false
            }
        }
    }

    /// Probes every interval until the port answers or `timeout` passes.
    ///
    /// Never errors; the caller decides what a `false` means.
    pub async fn wait_ready(&self, port: u16, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.probe(port).await {
                info!(port, "service is ready");
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                debug!(port, timeout_ms = timeout.as_millis() as u64, "gave up waiting for service");
                return false;
            }
            sleep(self.interval.min(deadline - now)).await;
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl Default for ReadinessGate {
    fn default() -> Self {
        Self::new(ReadinessConfig::default())
    }
}

fn health_url(port: u16) -> String {
    format!("http://127.0.0.1:{port}/health")
}
