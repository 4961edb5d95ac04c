//! Error types for Elasticsearch configuration and connections

/// Errors found while reading Elasticsearch settings.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// `ELASTICSEARCH_HOSTS` is unset or lists no host
    #[error("failed to parse ELASTICSEARCH_HOSTS from environment")]
    MissingHosts,

    /// A setting is present but cannot be used
    #[error("invalid value {value:?} for {name}: {reason}")]
    InvalidValue {
        name: String,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    pub fn invalid_value(
        name: impl Into<String>,
        value: impl Into<String>,
        reason: impl ToString,
    ) -> Self {
        Self::InvalidValue {
            name: name.into(),
            value: value.into(),
            reason: reason.to_string(),
        }
    }
}

/// The cluster answered the health check with a non-success status.
#[derive(Debug, thiserror::Error)]
#[error("health check returned status {status}")]
pub struct HealthcheckError {
    pub status: u16,
}
