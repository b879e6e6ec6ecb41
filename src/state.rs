//! Shared application state for request handlers.

use crate::health::HealthReporter;
use crate::lifecycle::Lifecycle;

/// Shared application state, cloneable across handlers.
///
/// Holds the health reporter for this service and a handle to the process
/// lifecycle, which the drain middleware and readiness probe consult.
#[derive(Clone, Debug)]
pub struct AppState {
    pub reporter: HealthReporter,
    pub lifecycle: Lifecycle,
}

impl AppState {
    /// Creates a new application state for the named service.
    pub fn new(service_name: &str, lifecycle: Lifecycle) -> Self {
        Self {
            reporter: HealthReporter::new(service_name),
            lifecycle,
        }
    }
}
