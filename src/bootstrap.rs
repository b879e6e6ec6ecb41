//! Service bootstrap: startup, discovery registration and graceful shutdown.
//!
//! Startup binds the listener, starts serving, registers with the discovery
//! registry and moves the lifecycle to `Running`. Shutdown moves to
//! `Draining`, drains the listener, always attempts deregistration and ends
//! in `Stopped`.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;

use crate::config::{AppConfig, ConfigError};
use crate::http::{self, ServerError, ServerTask};
use crate::lifecycle::{Lifecycle, LifecycleError, Phase};
use crate::registry::{
    ConsulRegistry, Registration, RegistryError, ServiceInstance, ServiceRegistry,
};
use crate::routes::create_router;
use crate::state::AppState;

/// Errors that abort startup. The process is expected to exit non-zero.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Server(#[from] ServerError),

    #[error("Failed to register with discovery registry: {0}")]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error("Startup interrupted by shutdown signal")]
    Interrupted,
}

/// Builder for a running service.
pub struct Bootstrap {
    config: AppConfig,
    registry: Option<Arc<dyn ServiceRegistry>>,
    routes: Router<AppState>,
    lifecycle: Lifecycle,
}

impl Bootstrap {
    /// Prepare a bootstrap from configuration. A Consul client is created
    /// when a `[registry]` section is present.
    pub fn new(config: AppConfig) -> Result<Self, StartupError> {
        let registry = match &config.registry {
            Some(registry_config) => {
                let consul = ConsulRegistry::new(registry_config)?;
                Some(Arc::new(consul) as Arc<dyn ServiceRegistry>)
            }
            None => None,
        };

        Ok(Self {
            config,
            registry,
            routes: Router::new(),
            lifecycle: Lifecycle::new(),
        })
    }

    /// Use a specific registry client instead of the configured one.
    pub fn with_registry(mut self, registry: Arc<dyn ServiceRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Merge additional routes next to the health endpoints.
    pub fn with_routes(mut self, routes: Router<AppState>) -> Self {
        self.routes = self.routes.merge(routes);
        self
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle.clone()
    }

    /// Bind, serve and register. On any failure the listener is closed and
    /// the lifecycle ends in `Stopped`.
    pub async fn start(self) -> Result<RunningService, StartupError> {
        self.start_until(std::future::pending()).await
    }

    /// Like [`Bootstrap::start`], but gives up with
    /// [`StartupError::Interrupted`] if `signal` resolves while the registry
    /// call is in flight. The instance is deregistered in that case, since the
    /// registry may already have accepted it.
    pub async fn start_until<F>(self, signal: F) -> Result<RunningService, StartupError>
    where
        F: Future<Output = ()>,
    {
        let lifecycle = self.lifecycle.clone();
        let result = self.start_inner(signal).await;
        if result.is_err() {
            let _ = lifecycle.advance(Phase::Stopped);
        }
        result
    }

    async fn start_inner<F>(self, signal: F) -> Result<RunningService, StartupError>
    where
        F: Future<Output = ()>,
    {
        let Bootstrap {
            config,
            registry,
            routes,
            lifecycle,
        } = self;

        let addr = config.http.socket_addr()?;
        let listener = http::bind_listener(addr)?;

        let state = AppState::new(&config.service.name, lifecycle.clone());
        let app = create_router(state, routes);
        let server = http::spawn_server(app, listener)?;
        let local_addr = server.local_addr();

        let registration = match registry {
            Some(registry) => {
                let instance = ServiceInstance::from_config(&config, local_addr.port());
                let instance_id = instance.id.clone();

                tokio::pin!(signal);
                let acquired = tokio::select! {
                    result = Registration::acquire(Arc::clone(&registry), instance) => Some(result),
                    _ = &mut signal => None,
                };

                match acquired {
                    Some(Ok(registration)) => Some(registration),
                    Some(Err(e)) => {
                        server.abort().await;
                        return Err(e.into());
                    }
                    None => {
                        tracing::warn!(
                            instance_id = %instance_id,
                            "Shutdown signal during registration, withdrawing instance"
                        );
                        if let Err(e) = registry.deregister(&instance_id).await {
                            tracing::warn!(
                                instance_id = %instance_id,
                                error = %e,
                                "Failed to deregister service"
                            );
                        }
                        server.abort().await;
                        return Err(StartupError::Interrupted);
                    }
                }
            }
            None => {
                tracing::info!("Service registry not configured, skipping registration");
                None
            }
        };

        if let Err(e) = lifecycle.advance(Phase::Running) {
            if let Some(registration) = registration {
                let _ = registration.release().await;
            }
            server.abort().await;
            return Err(e.into());
        }

        tracing::info!(
            service = %config.service.name,
            %local_addr,
            registered = registration.is_some(),
            "Service running"
        );

        Ok(RunningService {
            local_addr,
            lifecycle,
            server,
            registration,
            shutdown_timeout: config.http.shutdown_timeout(),
        })
    }
}

/// A started service. Call [`RunningService::shutdown`] or
/// [`RunningService::run_until`] to stop it.
pub struct RunningService {
    local_addr: SocketAddr,
    lifecycle: Lifecycle,
    server: ServerTask,
    registration: Option<Registration>,
    shutdown_timeout: Duration,
}

impl RunningService {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    pub fn phase(&self) -> Phase {
        self.lifecycle.current()
    }

    /// The registered instance, if registration is configured.
    pub fn instance(&self) -> Option<&ServiceInstance> {
        self.registration.as_ref().map(Registration::instance)
    }

    /// Serve until `signal` resolves (or the server stops by itself), then
    /// shut down.
    pub async fn run_until<F>(mut self, signal: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            _ = signal => {}
            _ = self.server.exited() => {}
        }
        self.shutdown().await
    }

    /// Drain in-flight requests, close the listener, then deregister.
    ///
    /// Deregistration failures are logged and do not fail shutdown.
    pub async fn shutdown(self) -> Result<(), ServerError> {
        let RunningService {
            lifecycle,
            server,
            registration,
            shutdown_timeout,
            ..
        } = self;

        if let Err(e) = lifecycle.advance(Phase::Draining) {
            tracing::warn!(error = %e, "Shutdown requested from unexpected phase");
        }

        let drained = server.drain(shutdown_timeout).await;

        if let Some(registration) = registration {
            // Failure is already logged as a warning by the guard
            let _ = registration.release().await;
        }

        let _ = lifecycle.advance(Phase::Stopped);
        drained
    }
}
