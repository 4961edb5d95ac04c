//! Connection provider for Elasticsearch

use crate::bulk::{Credentials, ElasticBulkBackend};
use crate::config::{ElasticConfig, Endpoint};
use async_trait::async_trait;
use bulkbuf_core::{BulkBackend, ConnectionError, ConnectionProvider};
use std::sync::Arc;
use tracing::{debug, info};

/// Builds [`ElasticBulkBackend`] connections from an [`ElasticConfig`].
///
/// Every configured host is validated; the first one is used.
#[derive(Debug, Clone)]
pub struct ElasticConnectionProvider {
    config: ElasticConfig,
}

impl ElasticConnectionProvider {
    pub fn new(config: ElasticConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ElasticConfig {
        &self.config
    }

    /// Build the HTTP client for `endpoint`.
    ///
    /// Certificate verification is only relaxed for https endpoints with
    /// self-signed certificates explicitly allowed.
    pub fn build_client(&self, endpoint: &Endpoint) -> Result<reqwest::Client, ConnectionError> {
        let mut builder = reqwest::Client::builder();
        if endpoint.is_https() && self.config.accept_self_signed_certificate {
            debug!("accepting self-signed certificates from {}", endpoint.url());
            builder = builder.danger_accept_invalid_certs(true);
        }
        builder
            .build()
            .map_err(|err| ConnectionError::unavailable(endpoint.url(), err))
    }

    fn credentials(&self) -> Option<Credentials> {
        self.config
            .basic_auth()
            .map(|(username, password)| Credentials {
                username: username.to_string(),
                password: password.to_string(),
            })
    }
}

#[async_trait]
impl ConnectionProvider for ElasticConnectionProvider {
    async fn connect(&self) -> Result<Arc<dyn BulkBackend>, ConnectionError> {
        let endpoints = self
            .config
            .endpoints()
            .map_err(|err| ConnectionError::invalid_config(err.to_string()))?;
        debug!("configured {} elasticsearch hosts", endpoints.len());

        let endpoint = endpoints.into_iter().next().ok_or(ConnectionError::NoHosts)?;
        let client = self.build_client(&endpoint)?;
        let backend = ElasticBulkBackend::new(client, endpoint.url(), self.credentials());

        if self.config.healthcheck {
            backend.ping(self.config.timeout).await?;
        }

        info!("connected to elasticsearch at {}", backend.base_url());
        Ok(Arc::new(backend))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_invalid_host_fails_before_connecting() {
        let provider = ElasticConnectionProvider::new(ElasticConfig::new(["localhost:port"]));
        let err = provider.connect().await.err().unwrap();
        assert!(matches!(err, ConnectionError::InvalidConfig { .. }));
    }

    #[tokio::test]
    async fn test_empty_host_list() {
        let provider = ElasticConnectionProvider::new(ElasticConfig::new(Vec::<String>::new()));
        let err = provider.connect().await.err().unwrap();
        assert!(matches!(err, ConnectionError::NoHosts));
    }

    #[tokio::test]
    async fn test_connect_without_healthcheck() {
        let config = ElasticConfig::new(["127.0.0.1:9"])
            .with_basic_auth("elastic", "secret")
            .with_healthcheck(false);
        let provider = ElasticConnectionProvider::new(config);

        let backend = provider.connect().await.unwrap();
        assert_eq!(backend.backend_name(), "elasticsearch");
    }

    #[test]
    fn test_credentials_require_both_parts() {
        let mut config = ElasticConfig::new(["localhost"]);
        config.username = Some("elastic".to_string());
        assert!(ElasticConnectionProvider::new(config.clone()).credentials().is_none());

        config.password = Some("secret".to_string());
        let credentials = ElasticConnectionProvider::new(config).credentials().unwrap();
        assert_eq!(credentials.username, "elastic");
        assert!(!format!("{credentials:?}").contains("secret"));
    }
}
