//! Consul agent HTTP API client.
//!
//! Registers the instance with an HTTP health check pointing at `/health`,
//! so the registry itself polls the liveness probe.

use async_trait::async_trait;
use reqwest::Url;
use serde::Serialize;

use crate::config::RegistryConfig;

use super::{RegistryError, ServiceInstance, ServiceRegistry};

const REGISTER_PATH: &[&str] = &["v1", "agent", "service", "register"];
const DEREGISTER_PATH: &[&str] = &["v1", "agent", "service", "deregister"];

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct AgentServiceRegistration<'a> {
    #[serde(rename = "ID")]
    id: &'a str,
    name: &'a str,
    address: &'a str,
    port: u16,
    tags: &'a [String],
    check: AgentServiceCheck,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct AgentServiceCheck {
    #[serde(rename = "HTTP")]
    http: String,
    interval: String,
    timeout: String,
    deregister_critical_service_after: String,
}

/// Registry backed by a Consul agent.
#[derive(Debug, Clone)]
pub struct ConsulRegistry {
    client: reqwest::Client,
    base_url: Url,
    check_interval_seconds: u64,
    check_timeout_seconds: u64,
    deregister_critical_after_seconds: u64,
}

impl ConsulRegistry {
    pub fn new(config: &RegistryConfig) -> Result<Self, RegistryError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        let base_url = Url::parse(&config.url)
            .map_err(|e| RegistryError::InvalidUrl(format!("{}: {e}", config.url)))?;
        if base_url.cannot_be_a_base() {
            return Err(RegistryError::InvalidUrl(config.url.clone()));
        }

        Ok(Self {
            client,
            base_url,
            check_interval_seconds: config.check_interval_seconds,
            check_timeout_seconds: config.request_timeout_seconds,
            deregister_critical_after_seconds: config.deregister_critical_after_seconds,
        })
    }

    /// Append path segments to the base URL, percent-encoding each one.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn put(
        &self,
        operation: &'static str,
        request: reqwest::RequestBuilder,
    ) -> Result<(), RegistryError> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        tracing::debug!(operation, status = status.as_u16(), body = %body, "Registry rejected request");
        Err(RegistryError::Rejected {
            operation,
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl ServiceRegistry for ConsulRegistry {
    async fn register(&self, instance: &ServiceInstance) -> Result<(), RegistryError> {
        let payload = AgentServiceRegistration {
            id: &instance.id,
            name: &instance.name,
            address: &instance.address,
            port: instance.port,
            tags: &instance.tags,
            check: AgentServiceCheck {
                http: instance.health_check_url(),
                interval: format!("{}s", self.check_interval_seconds),
                timeout: format!("{}s", self.check_timeout_seconds),
                deregister_critical_service_after: format!(
                    "{}s",
                    self.deregister_critical_after_seconds
                ),
            },
        };

        let url = self.endpoint(REGISTER_PATH);
        tracing::debug!(%url, instance_id = %instance.id, "Registering with Consul");
        self.put("register", self.client.put(url).json(&payload))
            .await
    }

    async fn deregister(&self, instance_id: &str) -> Result<(), RegistryError> {
        let mut segments: Vec<&str> = DEREGISTER_PATH.to_vec();
        segments.push(instance_id);
        let url = self.endpoint(&segments);
        tracing::debug!(%url, instance_id, "Deregistering from Consul");
        self.put("deregister", self.client.put(url)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn registry_config(url: &str) -> RegistryConfig {
        RegistryConfig {
            url: url.to_string(),
            instance_id: None,
            advertise_address: None,
            check_interval_seconds: 10,
            request_timeout_seconds: 5,
            deregister_critical_after_seconds: 60,
        }
    }

    fn instance() -> ServiceInstance {
        ServiceInstance {
            id: "sub-manager-abc12345".to_string(),
            name: "sub-manager".to_string(),
            address: "10.0.0.5".to_string(),
            port: 8080,
            tags: vec!["v1".to_string()],
        }
    }

    #[tokio::test]
    async fn test_register_sends_agent_payload() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/v1/agent/service/register"))
            .and(body_partial_json(serde_json::json!({
                "ID": "sub-manager-abc12345",
                "Name": "sub-manager",
                "Address": "10.0.0.5",
                "Port": 8080,
                "Tags": ["v1"],
                "Check": {
                    "HTTP": "http://10.0.0.5:8080/health",
                    "Interval": "10s",
                    "Timeout": "5s",
                    "DeregisterCriticalServiceAfter": "60s"
                }
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let registry = ConsulRegistry::new(&registry_config(&server.uri())).unwrap();
        registry.register(&instance()).await.unwrap();
    }

    #[tokio::test]
    async fn test_deregister_uses_instance_path() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/v1/agent/service/deregister/sub-manager-abc12345"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        // Trailing slash on the base URL must not double up
        let url = format!("{}/", server.uri());
        let registry = ConsulRegistry::new(&registry_config(&url)).unwrap();
        registry.deregister("sub-manager-abc12345").await.unwrap();
    }

    #[tokio::test]
    async fn test_deregister_escapes_instance_id() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/v1/agent/service/deregister/a%2Fb%3Fc%20d"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let registry = ConsulRegistry::new(&registry_config(&server.uri())).unwrap();
        registry.deregister("a/b?c d").await.unwrap();

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].url.query(), None);
    }

    #[tokio::test]
    async fn test_base_url_path_prefix_is_kept() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/consul/v1/agent/service/register"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let url = format!("{}/consul/", server.uri());
        let registry = ConsulRegistry::new(&registry_config(&url)).unwrap();
        registry.register(&instance()).await.unwrap();
    }

    #[test]
    fn test_unparseable_url_is_rejected() {
        let err = ConsulRegistry::new(&registry_config("http://")).unwrap_err();
        assert!(matches!(err, RegistryError::InvalidUrl(_)));
    }

    #[tokio::test]
    async fn test_non_success_status_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(500).set_body_string("agent unavailable"))
            .mount(&server)
            .await;

        let registry = ConsulRegistry::new(&registry_config(&server.uri())).unwrap();
        let err = registry.register(&instance()).await.unwrap_err();
        match err {
            RegistryError::Rejected {
                operation,
                status,
                body,
            } => {
                assert_eq!(operation, "register");
                assert_eq!(status, 500);
                assert_eq!(body, "agent unavailable");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unreachable_registry_is_http_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let registry = ConsulRegistry::new(&registry_config(&format!("http://{addr}"))).unwrap();
        let err = registry.register(&instance()).await.unwrap_err();
        assert!(matches!(err, RegistryError::Http(_)));
    }
}
