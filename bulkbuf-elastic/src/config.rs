//! Elasticsearch settings read from the environment
//!
//! | Variable | Meaning | Default |
//! |----------|---------|---------|
//! | `ELASTICSEARCH_HOSTS` | comma separated `host[:port]` list | required |
//! | `ELASTICSEARCH_USERNAME` / `ELASTICSEARCH_PASSWORD` | basic auth, used only when both are set | none |
//! | `ELASTICSEARCH_API_SCHEME` | `http` or `https` | `https` on port 443, else `http` |
//! | `ELASTICSEARCH_ACCEPT_SELF_SIGNED_CERTIFICATE` | `true` to skip certificate checks over https | `false` |
//! | `ELASTICSEARCH_TIMEOUT` | bulk request timeout, seconds | 30 |
//! | `ELASTICSEARCH_MAX_BATCH_SIZE_BYTES` | flush threshold | indexer default |
//! | `ELASTICSEARCH_MAX_BATCH_INTERVAL` | staleness bound, seconds | indexer default |
//! | `ELASTICSEARCH_LOG_LEVEL` | tracing filter for binaries | `info` |

use crate::error::ConfigError;
use bulkbuf_core::IndexerConfig;
use bulkbuf_core::config::DEFAULT_FLUSH_TIMEOUT;
use std::str::FromStr;
use std::time::Duration;

pub const ENV_HOSTS: &str = "ELASTICSEARCH_HOSTS";
pub const ENV_USERNAME: &str = "ELASTICSEARCH_USERNAME";
pub const ENV_PASSWORD: &str = "ELASTICSEARCH_PASSWORD";
pub const ENV_API_SCHEME: &str = "ELASTICSEARCH_API_SCHEME";
pub const ENV_ACCEPT_SELF_SIGNED_CERTIFICATE: &str = "ELASTICSEARCH_ACCEPT_SELF_SIGNED_CERTIFICATE";
pub const ENV_TIMEOUT: &str = "ELASTICSEARCH_TIMEOUT";
pub const ENV_MAX_BATCH_SIZE_BYTES: &str = "ELASTICSEARCH_MAX_BATCH_SIZE_BYTES";
pub const ENV_MAX_BATCH_INTERVAL: &str = "ELASTICSEARCH_MAX_BATCH_INTERVAL";
pub const ENV_LOG_LEVEL: &str = "ELASTICSEARCH_LOG_LEVEL";

pub const DEFAULT_ELASTICSEARCH_PORT: u16 = 9200;
pub const DEFAULT_ELASTICSEARCH_SCHEME: &str = "http";
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// A resolved cluster address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub scheme: String,
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    /// Base URL; standard http(s) ports are left implicit.
    pub fn url(&self) -> String {
        match self.port {
            80 | 443 => format!("{}://{}", self.scheme, self.host),
            port => format!("{}://{}:{}", self.scheme, self.host, port),
        }
    }

    pub fn is_https(&self) -> bool {
        self.scheme.eq_ignore_ascii_case("https")
    }
}

/// Connection and batching settings for an Elasticsearch cluster.
#[derive(Clone)]
pub struct ElasticConfig {
    /// `host[:port]` entries; the first one is used for connections
    pub hosts: Vec<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Overrides the port-based scheme choice
    pub api_scheme: Option<String>,
    pub accept_self_signed_certificate: bool,
    /// Bulk request timeout, also used for the health check
    pub timeout: Duration,
    pub max_batch_size_bytes: Option<usize>,
    pub max_batch_interval: Option<Duration>,
    pub log_level: String,
    /// Check the cluster responds before handing out a connection
    pub healthcheck: bool,
}

impl std::fmt::Debug for ElasticConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElasticConfig")
            .field("hosts", &self.hosts)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("api_scheme", &self.api_scheme)
            .field(
                "accept_self_signed_certificate",
                &self.accept_self_signed_certificate,
            )
            .field("timeout", &self.timeout)
            .field("max_batch_size_bytes", &self.max_batch_size_bytes)
            .field("max_batch_interval", &self.max_batch_interval)
            .field("log_level", &self.log_level)
            .field("healthcheck", &self.healthcheck)
            .finish()
    }
}

fn parse_var<T>(name: &str, value: Option<String>) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|err| ConfigError::invalid_value(name, raw.as_str(), err))
        })
        .transpose()
}

impl ElasticConfig {
    /// Settings for the given hosts with every other value defaulted.
    pub fn new<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            hosts: hosts.into_iter().map(Into::into).collect(),
            username: None,
            password: None,
            api_scheme: None,
            accept_self_signed_certificate: false,
            timeout: DEFAULT_FLUSH_TIMEOUT,
            max_batch_size_bytes: None,
            max_batch_interval: None,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            healthcheck: true,
        }
    }

    /// Read settings from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read settings through `lookup`; empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let hosts: Vec<String> = var(ENV_HOSTS)
            .map(|raw| {
                raw.split(',')
                    .map(|host| host.trim().to_string())
                    .filter(|host| !host.is_empty())
                    .collect()
            })
            .unwrap_or_default();
        if hosts.is_empty() {
            return Err(ConfigError::MissingHosts);
        }

        let api_scheme = var(ENV_API_SCHEME).map(|scheme| scheme.trim().to_lowercase());
        if let Some(scheme) = &api_scheme {
            if scheme != "http" && scheme != "https" {
                return Err(ConfigError::invalid_value(
                    ENV_API_SCHEME,
                    scheme.as_str(),
                    "expected http or https",
                ));
            }
        }

        let timeout = parse_var::<u64>(ENV_TIMEOUT, var(ENV_TIMEOUT))?
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_FLUSH_TIMEOUT);

        Ok(Self {
            hosts,
            username: var(ENV_USERNAME),
            password: var(ENV_PASSWORD),
            api_scheme,
            accept_self_signed_certificate: var(ENV_ACCEPT_SELF_SIGNED_CERTIFICATE)
                .is_some_and(|value| value.trim().eq_ignore_ascii_case("true")),
            timeout,
            max_batch_size_bytes: parse_var(
                ENV_MAX_BATCH_SIZE_BYTES,
                var(ENV_MAX_BATCH_SIZE_BYTES),
            )?,
            max_batch_interval: parse_var::<u64>(
                ENV_MAX_BATCH_INTERVAL,
                var(ENV_MAX_BATCH_INTERVAL),
            )?
            .map(Duration::from_secs),
            log_level: var(ENV_LOG_LEVEL).unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
            healthcheck: true,
        })
    }

    /// Set basic auth credentials (builder style)
    pub fn with_basic_auth(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Enable or disable the connection health check (builder style)
    pub fn with_healthcheck(mut self, healthcheck: bool) -> Self {
        self.healthcheck = healthcheck;
        self
    }

    /// Credentials, when both username and password are configured.
    pub fn basic_auth(&self) -> Option<(&str, &str)> {
        match (&self.username, &self.password) {
            (Some(username), Some(password)) => Some((username.as_str(), password.as_str())),
            _ => None,
        }
    }

    /// Apply the batching settings found here on top of `base`.
    pub fn indexer_config(&self, base: IndexerConfig) -> IndexerConfig {
        let mut config = base.with_flush_timeout(self.timeout);
        if let Some(bytes) = self.max_batch_size_bytes {
            config = config.with_max_batch_size_bytes(bytes);
        }
        if let Some(interval) = self.max_batch_interval {
            config = config.with_max_batch_interval(interval);
        }
        config
    }

    /// Resolve every configured host.
    pub fn endpoints(&self) -> Result<Vec<Endpoint>, ConfigError> {
        self.hosts.iter().map(|host| self.resolve(host)).collect()
    }

    fn resolve(&self, host: &str) -> Result<Endpoint, ConfigError> {
        let parts: Vec<&str> = host.split(':').collect();
        let (name, port) = match parts.as_slice() {
            [name] => (*name, DEFAULT_ELASTICSEARCH_PORT),
            [name, port] => {
                let port = port.parse::<u16>().map_err(|err| {
                    ConfigError::invalid_value(
                        ENV_HOSTS,
                        host,
                        format!(
                            "invalid port parsed during elasticsearch client configuration; {err}"
                        ),
                    )
                })?;
                (*name, port)
            }
            _ => {
                return Err(ConfigError::invalid_value(
                    ENV_HOSTS,
                    host,
                    "expected host or host:port",
                ));
            }
        };

        if name.is_empty() {
            return Err(ConfigError::invalid_value(ENV_HOSTS, host, "empty host name"));
        }

        let scheme = match &self.api_scheme {
            Some(scheme) => scheme.clone(),
            None if port == 443 => "https".to_string(),
            None => DEFAULT_ELASTICSEARCH_SCHEME.to_string(),
        };

        Ok(Endpoint {
            scheme,
            host: name.to_string(),
            port,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_hosts_are_required() {
        let err = ElasticConfig::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingHosts));

        let err = ElasticConfig::from_lookup(lookup(&[(ENV_HOSTS, " , ")])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingHosts));
    }

    #[test]
    fn test_from_lookup_reads_everything() {
        let config = ElasticConfig::from_lookup(lookup(&[
            (ENV_HOSTS, "es-1:9201, es-2"),
            (ENV_USERNAME, "elastic"),
            (ENV_PASSWORD, "changeme"),
            (ENV_API_SCHEME, "HTTPS"),
            (ENV_ACCEPT_SELF_SIGNED_CERTIFICATE, "True"),
            (ENV_TIMEOUT, "12"),
            (ENV_MAX_BATCH_SIZE_BYTES, "1048576"),
            (ENV_MAX_BATCH_INTERVAL, "3"),
            (ENV_LOG_LEVEL, "debug"),
        ]))
        .unwrap();

        assert_eq!(config.hosts, vec!["es-1:9201", "es-2"]);
        assert_eq!(config.basic_auth(), Some(("elastic", "changeme")));
        assert_eq!(config.api_scheme.as_deref(), Some("https"));
        assert!(config.accept_self_signed_certificate);
        assert_eq!(config.timeout, Duration::from_secs(12));
        assert_eq!(config.max_batch_size_bytes, Some(1_048_576));
        assert_eq!(config.max_batch_interval, Some(Duration::from_secs(3)));
        assert_eq!(config.log_level, "debug");
        assert!(!format!("{config:?}").contains("changeme"));
    }

    #[test]
    fn test_defaults_and_partial_auth() {
        let config = ElasticConfig::from_lookup(lookup(&[
            (ENV_HOSTS, "localhost"),
            (ENV_USERNAME, "elastic"),
        ]))
        .unwrap();

        assert_eq!(config.basic_auth(), None);
        assert!(!config.accept_self_signed_certificate);
        assert_eq!(config.timeout, DEFAULT_FLUSH_TIMEOUT);
        assert_eq!(config.log_level, DEFAULT_LOG_LEVEL);
        assert!(config.healthcheck);
    }

    #[test]
    fn test_unparsable_values_are_errors() {
        let err = ElasticConfig::from_lookup(lookup(&[
            (ENV_HOSTS, "localhost"),
            (ENV_TIMEOUT, "soon"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref name, .. } if name == ENV_TIMEOUT));

        let err = ElasticConfig::from_lookup(lookup(&[
            (ENV_HOSTS, "localhost"),
            (ENV_API_SCHEME, "ftp"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_endpoint_resolution() {
        let config = ElasticConfig::new(["localhost", "search:443", "plain:80", "custom:9300"]);
        let endpoints = config.endpoints().unwrap();
        let urls: Vec<String> = endpoints.iter().map(Endpoint::url).collect();

        assert_eq!(
            urls,
            vec![
                "http://localhost:9200",
                "https://search",
                "http://plain",
                "http://custom:9300",
            ]
        );
        assert!(endpoints[1].is_https());
    }

    #[test]
    fn test_explicit_scheme_wins() {
        let mut config = ElasticConfig::new(["search:443", "localhost"]);
        config.api_scheme = Some("http".to_string());
        let urls: Vec<String> = config.endpoints().unwrap().iter().map(Endpoint::url).collect();
        assert_eq!(urls, vec!["http://search", "http://localhost:9200"]);
    }

    #[test]
    fn test_invalid_port_is_rejected() {
        let config = ElasticConfig::new(["localhost:nine"]);
        let err = config.endpoints().unwrap_err();
        assert!(err.to_string().contains("invalid port"));

        let config = ElasticConfig::new(["http://localhost:9200"]);
        assert!(config.endpoints().is_err());
    }

    #[test]
    fn test_indexer_config_overrides() {
        let mut config = ElasticConfig::new(["localhost"]);
        config.timeout = Duration::from_secs(7);
        config.max_batch_interval = Some(Duration::from_secs(2));

        let indexer = config.indexer_config(IndexerConfig::default());
        assert_eq!(indexer.flush_timeout, Duration::from_secs(7));
        assert_eq!(indexer.max_batch_interval, Duration::from_secs(2));
        assert_eq!(
            indexer.max_batch_size_bytes,
            IndexerConfig::default().max_batch_size_bytes
        );
    }
}
