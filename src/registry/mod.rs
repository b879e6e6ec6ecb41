//! Service discovery registration.
//!
//! The service announces itself to an external registry at startup and
//! withdraws on shutdown. `ServiceRegistry` is the seam over the registry's
//! API; `Registration` is the guard that owns a live registration and makes
//! sure deregistration is attempted on every exit path.

mod consul;

use std::net::Ipv6Addr;
use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::config::{AppConfig, RegistryConfig};

pub use consul::ConsulRegistry;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Registry request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid registry URL: {0}")]
    InvalidUrl(String),

    #[error("Registry rejected {operation} with status {status}: {body}")]
    Rejected {
        operation: &'static str,
        status: u16,
        body: String,
    },
}

/// An instance as announced to the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceInstance {
    pub id: String,
    pub name: String,
    pub address: String,
    pub port: u16,
    pub tags: Vec<String>,
}

impl ServiceInstance {
    /// Build the instance for this process from configuration and the port
    /// the listener actually bound.
    pub fn from_config(config: &AppConfig, port: u16) -> Self {
        let name = config.service.name.clone();
        let registry: Option<&RegistryConfig> = config.registry.as_ref();
        Self {
            id: generate_instance_id(&name, registry.and_then(|r| r.instance_id.clone())),
            address: registry
                .map(|r| r.advertise_address(&config.http))
                .unwrap_or_else(|| config.http.advertise_host()),
            port,
            tags: config.service.tags.clone(),
            name,
        }
    }

    /// URL the registry polls to check this instance.
    pub fn health_check_url(&self) -> String {
        if self.address.parse::<Ipv6Addr>().is_ok() {
            format!("http://[{}]:{}/health", self.address, self.port)
        } else {
            format!("http://{}:{}/health", self.address, self.port)
        }
    }
}

/// Generate an instance ID (if not configured) as `{service}-{uuid_short}`.
pub fn generate_instance_id(service: &str, instance_id: Option<String>) -> String {
    instance_id.unwrap_or_else(|| {
        let short = Uuid::new_v4().simple().to_string();
        format!("{}-{}", service, &short[..8])
    })
}

/// Discovery registry API.
#[async_trait]
pub trait ServiceRegistry: Send + Sync {
    async fn register(&self, instance: &ServiceInstance) -> Result<(), RegistryError>;

    async fn deregister(&self, instance_id: &str) -> Result<(), RegistryError>;
}

/// A live registration. Call [`Registration::release`] to deregister.
///
/// If dropped without release, deregistration is spawned on the current tokio
/// runtime.
pub struct Registration {
    registry: Arc<dyn ServiceRegistry>,
    instance: ServiceInstance,
    released: bool,
}

impl Registration {
    pub async fn acquire(
        registry: Arc<dyn ServiceRegistry>,
        instance: ServiceInstance,
    ) -> Result<Self, RegistryError> {
        registry.register(&instance).await?;
        tracing::info!(
            instance_id = %instance.id,
            service = %instance.name,
            address = %instance.address,
            port = instance.port,
            "Service registered"
        );
        Ok(Self {
            registry,
            instance,
            released: false,
        })
    }

    pub fn instance(&self) -> &ServiceInstance {
        &self.instance
    }

    pub async fn release(mut self) -> Result<(), RegistryError> {
        let result = self.registry.deregister(&self.instance.id).await;
        self.released = true;
        match &result {
            Ok(()) => {
                tracing::info!(instance_id = %self.instance.id, "Service deregistered");
            }
            Err(e) => {
                tracing::warn!(
                    instance_id = %self.instance.id,
                    error = %e,
                    "Failed to deregister service"
                );
            }
        }
        result
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        if self.released {
            return;
        }

        let instance_id = self.instance.id.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                tracing::warn!(
                    instance_id = %instance_id,
                    "Registration dropped without release, deregistering in background"
                );
                let registry = Arc::clone(&self.registry);
                handle.spawn(async move {
                    if let Err(e) = registry.deregister(&instance_id).await {
                        tracing::warn!(
                            instance_id = %instance_id,
                            error = %e,
                            "Failed to deregister service"
                        );
                    }
                });
            }
            Err(_) => {
                tracing::warn!(
                    instance_id = %instance_id,
                    "Registration dropped outside a runtime, instance left registered"
                );
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Records calls instead of talking to a registry.
    #[derive(Default)]
    pub(crate) struct RecordingRegistry {
        pub registered: Mutex<Vec<ServiceInstance>>,
        pub deregistered: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ServiceRegistry for RecordingRegistry {
        async fn register(&self, instance: &ServiceInstance) -> Result<(), RegistryError> {
            self.registered.lock().unwrap().push(instance.clone());
            Ok(())
        }

        async fn deregister(&self, instance_id: &str) -> Result<(), RegistryError> {
            self.deregistered.lock().unwrap().push(instance_id.to_string());
            Ok(())
        }
    }

    fn instance() -> ServiceInstance {
        ServiceInstance {
            id: "sub-manager-1".to_string(),
            name: "sub-manager".to_string(),
            address: "10.0.0.5".to_string(),
            port: 8080,
            tags: vec![],
        }
    }

    #[test]
    fn test_generate_instance_id_format() {
        let id = generate_instance_id("sub-manager", None);
        let suffix = id.strip_prefix("sub-manager-").unwrap();
        assert_eq!(suffix.len(), 8);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_generate_instance_id_keeps_configured() {
        assert_eq!(
            generate_instance_id("sub-manager", Some("fixed".to_string())),
            "fixed"
        );
    }

    #[test]
    fn test_health_check_url() {
        assert_eq!(instance().health_check_url(), "http://10.0.0.5:8080/health");
    }

    #[test]
    fn test_health_check_url_brackets_ipv6() {
        let instance = ServiceInstance {
            address: "::1".to_string(),
            ..instance()
        };
        assert_eq!(instance.health_check_url(), "http://[::1]:8080/health");
    }

    #[test]
    fn test_ipv6_wildcard_instance_advertises_ipv6_loopback() {
        let config = AppConfig::from_toml_str(
            r#"
            [http]
            host = "::"
            port = 0
            "#,
        )
        .unwrap();
        let instance = ServiceInstance::from_config(&config, 41234);
        assert_eq!(instance.address, "::1");
        assert_eq!(instance.health_check_url(), "http://[::1]:41234/health");
    }

    #[test]
    fn test_instance_from_config() {
        let config = AppConfig::from_toml_str(
            r#"
            [service]
            name = "sub-manager"
            tags = ["blue"]

            [http]
            host = "0.0.0.0"
            port = 0

            [registry]
            url = "http://consul:8500"
            instance_id = "sub-manager-a"
            "#,
        )
        .unwrap();
        let instance = ServiceInstance::from_config(&config, 41234);
        assert_eq!(instance.id, "sub-manager-a");
        assert_eq!(instance.address, "127.0.0.1");
        assert_eq!(instance.port, 41234);
        assert_eq!(instance.tags, vec!["blue".to_string()]);
    }

    #[test]
    fn test_instance_without_registry_section() {
        let config = AppConfig::from_toml_str(
            r#"
            [http]
            host = "10.1.2.3"
            port = 8080
            "#,
        )
        .unwrap();
        let instance = ServiceInstance::from_config(&config, 8080);
        assert!(instance.id.starts_with("sub-manager-"));
        assert_eq!(instance.address, "10.1.2.3");
    }

    #[tokio::test]
    async fn test_release_deregisters() {
        let registry = Arc::new(RecordingRegistry::default());
        let registration = Registration::acquire(registry.clone(), instance())
            .await
            .unwrap();
        assert_eq!(registry.registered.lock().unwrap().len(), 1);

        registration.release().await.unwrap();
        assert_eq!(
            *registry.deregistered.lock().unwrap(),
            vec!["sub-manager-1".to_string()]
        );
    }

    #[tokio::test]
    async fn test_drop_without_release_deregisters() {
        let registry = Arc::new(RecordingRegistry::default());
        let registration = Registration::acquire(registry.clone(), instance())
            .await
            .unwrap();
        drop(registration);

        for _ in 0..50 {
            if !registry.deregistered.lock().unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(
            *registry.deregistered.lock().unwrap(),
            vec!["sub-manager-1".to_string()]
        );
    }
}
