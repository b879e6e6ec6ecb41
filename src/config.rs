//! Configuration loading and constants.
//!
//! Loads service configuration from a TOML file and defines constants for
//! HTTP probe caching, shutdown draining, discovery registry defaults, logging
//! format, and default paths. `AppConfig` is the root configuration struct.

use serde::Deserialize;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;

// =============================================================================
// HTTP Probe Responses
// =============================================================================

/// Health responses must never be served from an intermediate cache
pub const CACHE_CONTROL_HEALTH: &str = "no-store";

/// Header carrying the per-request correlation ID
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Paths whose request completion is logged at debug level (probe traffic)
pub const PROBE_PATHS: &[&str] = &["/health", "/health/ready"];

// =============================================================================
// Shutdown
// =============================================================================

/// Default time allowed for in-flight requests to finish during shutdown
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

// =============================================================================
// Discovery Registry Defaults
// =============================================================================

/// Interval at which the registry polls the health endpoint
pub const DEFAULT_CHECK_INTERVAL_SECS: u64 = 10;

/// Timeout for each registry API call (and the registry's probe of us)
pub const DEFAULT_REGISTRY_TIMEOUT_SECS: u64 = 5;

/// How long the registry keeps a critical instance before removing it
pub const DEFAULT_DEREGISTER_CRITICAL_AFTER_SECS: u64 = 60;

/// Address advertised when the listener is bound to the IPv4 unspecified address
pub const FALLBACK_ADVERTISE_ADDRESS: &str = "127.0.0.1";

/// Address advertised when the listener is bound to the IPv6 unspecified address
pub const FALLBACK_ADVERTISE_ADDRESS_V6: &str = "::1";

// =============================================================================
// Default Paths and Strings
// =============================================================================

/// Default configuration file path
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Default logical service name
pub const DEFAULT_SERVICE_NAME: &str = "sub-manager";

/// Default log filter when RUST_LOG is not set
pub const DEFAULT_LOG_FILTER: &str = "sub_manager=info,tower_http=info";

/// Default log format (text or json)
pub const DEFAULT_LOG_FORMAT: &str = "text";

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Service identity
    #[serde(default)]
    pub service: ServiceConfig,
    /// HTTP server configuration
    pub http: HttpServerConfig,
    /// Discovery registry; registration is skipped when absent
    #[serde(default)]
    pub registry: Option<RegistryConfig>,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Service identity reported by health checks and announced to the registry
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "ServiceConfig::default_name")]
    pub name: String,
    /// Tags attached to the registry entry
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: Self::default_name(),
            tags: Vec::new(),
        }
    }
}

impl ServiceConfig {
    fn default_name() -> String {
        DEFAULT_SERVICE_NAME.to_string()
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HttpServerConfig {
    pub host: String,
    pub port: u16,
    /// Upper bound on the graceful drain (default: 30 seconds)
    #[serde(default = "HttpServerConfig::default_shutdown_timeout")]
    pub shutdown_timeout_seconds: u64,
}

impl HttpServerConfig {
    fn default_shutdown_timeout() -> u64 {
        DEFAULT_SHUTDOWN_TIMEOUT_SECS
    }

    /// Parse `host:port` into a socket address.
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip: IpAddr = self.host.parse().map_err(|e| {
            ConfigError::Validation(format!("Invalid http.host '{}': {}", self.host, e))
        })?;
        Ok(SocketAddr::new(ip, self.port))
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_seconds)
    }

    /// Host to advertise when nothing more specific is configured. Wildcard
    /// bind addresses fall back to loopback of the same family.
    pub fn advertise_host(&self) -> String {
        match self.host.parse::<IpAddr>() {
            Ok(IpAddr::V4(ip)) if ip.is_unspecified() => FALLBACK_ADVERTISE_ADDRESS.to_string(),
            Ok(IpAddr::V6(ip)) if ip.is_unspecified() => {
                FALLBACK_ADVERTISE_ADDRESS_V6.to_string()
            }
            _ => self.host.clone(),
        }
    }
}

/// Consul-compatible discovery registry
#[derive(Debug, Clone, Deserialize)]
pub struct RegistryConfig {
    /// Base URL of the registry agent, e.g. `http://127.0.0.1:8500`
    pub url: String,
    /// Fixed instance ID (default: `{service}-{random 8 hex chars}`)
    pub instance_id: Option<String>,
    /// Address other services should use to reach this instance
    pub advertise_address: Option<String>,
    #[serde(default = "RegistryConfig::default_check_interval")]
    pub check_interval_seconds: u64,
    #[serde(default = "RegistryConfig::default_request_timeout")]
    pub request_timeout_seconds: u64,
    #[serde(default = "RegistryConfig::default_deregister_critical_after")]
    pub deregister_critical_after_seconds: u64,
}

impl RegistryConfig {
    fn default_check_interval() -> u64 {
        DEFAULT_CHECK_INTERVAL_SECS
    }

    fn default_request_timeout() -> u64 {
        DEFAULT_REGISTRY_TIMEOUT_SECS
    }

    fn default_deregister_critical_after() -> u64 {
        DEFAULT_DEREGISTER_CRITICAL_AFTER_SECS
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(self.url.starts_with("http://") || self.url.starts_with("https://")) {
            return Err(ConfigError::Validation(format!(
                "registry.url must start with http:// or https://, got '{}'",
                self.url
            )));
        }
        if let Err(e) = reqwest::Url::parse(&self.url) {
            return Err(ConfigError::Validation(format!(
                "Invalid registry.url '{}': {}",
                self.url, e
            )));
        }

        if matches!(&self.instance_id, Some(id) if id.trim().is_empty()) {
            return Err(ConfigError::Validation(
                "registry.instance_id must not be empty".to_string(),
            ));
        }

        for (field, value) in [
            ("check_interval_seconds", self.check_interval_seconds),
            ("request_timeout_seconds", self.request_timeout_seconds),
            (
                "deregister_critical_after_seconds",
                self.deregister_critical_after_seconds,
            ),
        ] {
            if value == 0 {
                return Err(ConfigError::Validation(format!(
                    "registry.{field} must be greater than zero"
                )));
            }
        }
        Ok(())
    }

    /// Address to announce: the configured value, else the bind host.
    pub fn advertise_address(&self, http: &HttpServerConfig) -> String {
        self.advertise_address
            .clone()
            .unwrap_or_else(|| http.advertise_host())
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log format: "text" (human-readable, default) or "json" (structured)
    #[serde(default = "LoggingConfig::default_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: DEFAULT_LOG_FORMAT.to_string(),
        }
    }
}

impl LoggingConfig {
    fn default_format() -> String {
        DEFAULT_LOG_FORMAT.to_string()
    }

    pub fn is_json(&self) -> bool {
        self.format.eq_ignore_ascii_case("json")
    }
}

impl AppConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.service.name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "service.name must not be empty".to_string(),
            ));
        }

        self.http.socket_addr()?;

        if let Some(registry) = &self.registry {
            registry.validate()?;
        }

        match self.logging.format.to_ascii_lowercase().as_str() {
            "text" | "json" => Ok(()),
            other => Err(ConfigError::Validation(format!(
                "logging.format must be \"text\" or \"json\", got '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Configuration error: {0}")]
    Validation(String),
}
