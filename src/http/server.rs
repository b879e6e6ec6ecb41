//! HTTP server startup and draining.
//!
//! The listener is bound synchronously before anything else happens so that a
//! port conflict surfaces as a startup failure. The server then runs on its
//! own task, controlled through an `axum_server::Handle`.

use std::io;
use std::net::{SocketAddr, TcpListener};
use std::time::Duration;

use axum::Router;
use axum_server::Handle;
use tokio::task::JoinHandle;

/// Server startup error
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("Server error: {0}")]
    Server(#[from] io::Error),

    #[error("Server task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Bind the listening socket.
pub fn bind_listener(addr: SocketAddr) -> Result<TcpListener, ServerError> {
    let bind_err = |source| ServerError::Bind { addr, source };
    let listener = TcpListener::bind(addr).map_err(bind_err)?;
    listener.set_nonblocking(true).map_err(bind_err)?;
    Ok(listener)
}

/// A server running on a background task.
pub struct ServerTask {
    local_addr: SocketAddr,
    handle: Handle,
    task: JoinHandle<io::Result<()>>,
    outcome: Option<Result<(), ServerError>>,
}

/// Start serving `app` on an already bound listener.
pub fn spawn_server(app: Router, listener: TcpListener) -> Result<ServerTask, ServerError> {
    let local_addr = listener.local_addr()?;
    let handle = Handle::new();

    tracing::info!(%local_addr, "Starting HTTP server");

    let server = axum_server::from_tcp(listener).handle(handle.clone());
    let task = tokio::spawn(async move { server.serve(app.into_make_service()).await });

    Ok(ServerTask {
        local_addr,
        handle,
        task,
        outcome: None,
    })
}

fn flatten(joined: Result<io::Result<()>, tokio::task::JoinError>) -> Result<(), ServerError> {
    joined?.map_err(ServerError::from)
}

impl ServerTask {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Resolve when the server stops on its own. Cancel safe.
    pub async fn exited(&mut self) {
        let outcome = flatten((&mut self.task).await);
        match &outcome {
            Ok(()) => tracing::warn!("HTTP server stopped unexpectedly"),
            Err(e) => tracing::error!(error = %e, "HTTP server failed"),
        }
        self.outcome = Some(outcome);
    }

    /// Stop accepting connections and wait up to `timeout` for in-flight
    /// requests to complete.
    pub async fn drain(self, timeout: Duration) -> Result<(), ServerError> {
        if let Some(outcome) = self.outcome {
            return outcome;
        }

        self.handle.graceful_shutdown(Some(timeout));
        tracing::info!(
            timeout_secs = timeout.as_secs(),
            connections = self.handle.connection_count(),
            "Graceful shutdown initiated, waiting for connections to close"
        );

        let result = flatten(self.task.await);
        tracing::info!("HTTP listener closed");
        result
    }

    /// Stop immediately without draining. Used when startup fails after bind.
    pub async fn abort(self) {
        if self.outcome.is_some() {
            return;
        }
        self.handle.shutdown();
        if let Err(e) = flatten(self.task.await) {
            tracing::debug!(error = %e, "HTTP server stopped with error during abort");
        }
    }
}
