//! Health report model and reporter.
//!
//! A `HealthReport` is built fresh for every probe and discarded after it is
//! serialized. The reporter only holds the service name, so concurrent probes
//! share nothing mutable.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reported health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthStatus {
    Up,
    Down,
    Degraded,
}

/// Body of a health probe response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub service: String,
    pub timestamp: DateTime<Utc>,
}

/// Builds health reports for one logical service.
#[derive(Debug, Clone)]
pub struct HealthReporter {
    service: Arc<str>,
}

impl HealthReporter {
    pub fn new(service: impl Into<Arc<str>>) -> Self {
        Self {
            service: service.into(),
        }
    }

    /// Liveness report: always `UP`, stamped with the current time.
    pub fn report(&self) -> HealthReport {
        self.report_with(HealthStatus::Up)
    }

    pub fn report_with(&self, status: HealthStatus) -> HealthReport {
        HealthReport {
            status,
            service: self.service.to_string(),
            timestamp: Utc::now(),
        }
    }
}
