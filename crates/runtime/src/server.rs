//! Local HTTP server hosting shared by the step runtime and the admin API.

use std::net::SocketAddr;

use anyhow::{Result, anyhow};
use axum::Router;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Runtime handle for a running HTTP server.
#[derive(Debug)]
pub struct RunningServer {
    bind_address: SocketAddr,
    cancellation_token: CancellationToken,
    server_handle: JoinHandle<()>,
}

impl RunningServer {
    /// Bind `bind_address` and serve `router` until stopped.
    pub async fn bind(bind_address: SocketAddr, router: Router) -> Result<Self> {
        let listener = TcpListener::bind(bind_address)
            .await
            .map_err(|error| anyhow!("failed to bind {bind_address}: {error}"))?;
        Self::start(listener, router)
    }

    /// Serve `router` on an already bound listener.
    pub fn start(listener: TcpListener, router: Router) -> Result<Self> {
        let bound_address = listener.local_addr()?;
        let cancellation_token = CancellationToken::new();

        let server_handle = tokio::spawn({
            let shutdown = cancellation_token.child_token();
            async move {
                let _ = axum::serve(listener, router)
                    .with_graceful_shutdown(async move {
                        shutdown.cancelled().await;
                    })
                    .await;
            }
        });
        debug!(address = %bound_address, "http server started");

        Ok(Self {
            bind_address: bound_address,
            cancellation_token,
            server_handle,
        })
    }

    /// Return the bound socket address for the running server.
    pub fn bound_address(&self) -> SocketAddr {
        self.bind_address
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.bind_address)
    }

    /// Stop the server and wait for in-flight requests to finish.
    pub async fn stop(self) -> Result<()> {
        self.cancellation_token.cancel();
        self.server_handle
            .await
            .map_err(|error| anyhow!("HTTP server task failed: {error}"))
    }
}
