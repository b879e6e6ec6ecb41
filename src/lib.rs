//! sub-manager service runtime.
//!
//! Bootstraps an HTTP listener exposing liveness and readiness probes,
//! registers the instance with a Consul-compatible discovery registry, and
//! drains and deregisters on shutdown.

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod health;
pub mod http;
pub mod lifecycle;
pub mod middleware;
pub mod registry;
pub mod routes;
pub mod state;

pub use bootstrap::{Bootstrap, RunningService, StartupError};
pub use config::AppConfig;
pub use error::AppError;
pub use health::{HealthReport, HealthReporter, HealthStatus};
pub use lifecycle::{Lifecycle, Phase};
