//! Termination signal handling.
//!
//! Handlers are installed when [`ShutdownSignal::install`] is called, so a
//! signal that arrives during startup is held until someone waits for it.
//! The caller is responsible for draining; this module only reports that a
//! signal arrived.

#[cfg(unix)]
use tokio::signal::unix::{signal, Signal, SignalKind};

/// SIGTERM (orchestrator stop) or SIGINT (Ctrl+C).
#[derive(Debug)]
pub struct ShutdownSignal {
    #[cfg(unix)]
    interrupt: Option<Signal>,
    #[cfg(unix)]
    terminate: Option<Signal>,
}

#[cfg(unix)]
fn install_unix(kind: SignalKind, name: &str) -> Option<Signal> {
    match signal(kind) {
        Ok(stream) => Some(stream),
        Err(e) => {
            tracing::error!(error = %e, signal = name, "Failed to install signal handler");
            None
        }
    }
}

#[cfg(unix)]
async fn recv_or_pending(stream: &mut Option<Signal>) {
    match stream {
        Some(stream) => {
            if stream.recv().await.is_none() {
                std::future::pending::<()>().await;
            }
        }
        None => std::future::pending::<()>().await,
    }
}

impl ShutdownSignal {
    /// Install the handlers now. Must be called from inside the runtime.
    ///
    /// If a handler cannot be installed, that signal source is treated as
    /// never firing and the failure is logged.
    pub fn install() -> Self {
        Self {
            #[cfg(unix)]
            interrupt: install_unix(SignalKind::interrupt(), "SIGINT"),
            #[cfg(unix)]
            terminate: install_unix(SignalKind::terminate(), "SIGTERM"),
        }
    }

    /// Wait for the next SIGTERM or SIGINT, including one delivered between
    /// `install` and this call.
    #[cfg(unix)]
    pub async fn recv(&mut self) {
        tokio::select! {
            _ = recv_or_pending(&mut self.interrupt) => {
                tracing::info!("Received Ctrl+C, initiating graceful shutdown");
            }
            _ = recv_or_pending(&mut self.terminate) => {
                tracing::info!("Received SIGTERM, initiating graceful shutdown");
            }
        }
    }

    #[cfg(not(unix))]
    pub async fn recv(&mut self) {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
        tracing::info!("Received Ctrl+C, initiating graceful shutdown");
    }
}
