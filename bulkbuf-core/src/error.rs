//! Error types for the bulk indexing buffer

use std::time::Duration;

/// Result type for indexer operations.
///
/// Convenience alias that uses [`IndexerError`] as the error type.
pub type Result<T> = std::result::Result<T, IndexerError>;

/// Errors raised by a [`BulkBackend`](crate::backend::BulkBackend) while
/// submitting a bulk request.
///
/// Any of these means the whole request failed. Per-item failures inside a
/// successful response are reported through
/// [`BulkResponse::failed`](crate::backend::BulkResponse::failed) instead.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The request did not complete within the per-flush timeout
    #[error("bulk request timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    /// The request could not be delivered or the connection dropped
    #[error("bulk request transport failed: {source}")]
    Transport {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The backend answered with a non-success status for the whole request
    #[error("bulk request rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },

    /// The request body could not be encoded for the wire
    #[error("failed to encode bulk request: {message}")]
    Encode { message: String },

    /// The response body could not be decoded
    #[error("failed to decode bulk response: {message}")]
    Decode { message: String },
}

impl BackendError {
    /// Wrap any transport-level error.
    pub fn transport<E>(source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Transport {
            source: Box::new(source),
        }
    }
}

/// Errors raised by a [`ConnectionProvider`](crate::backend::ConnectionProvider).
///
/// A connection failure is fatal to indexer construction.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// No backend host is configured
    #[error("no backend hosts configured")]
    NoHosts,

    /// The connection settings are unusable
    #[error("invalid connection configuration: {message}")]
    InvalidConfig { message: String },

    /// The backend could not be reached or failed its health check
    #[error("backend at {url} is unavailable: {source}")]
    Unavailable {
        url: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl ConnectionError {
    pub fn invalid_config<S: Into<String>>(message: S) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    pub fn unavailable<E>(url: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Unavailable {
            url: url.into(),
            source: Box::new(source),
        }
    }
}

/// Error type for everything the [`BatchIndexer`](crate::indexer::BatchIndexer)
/// reports to its callers.
///
/// # Error Categories
///
/// - **Rejections**: [`InvalidMessage`](Self::InvalidMessage) is returned
///   synchronously from `submit`; the caller may fix the message and resubmit.
/// - **Lifecycle**: [`QueueClosed`](Self::QueueClosed) and
///   [`AlreadyStarted`](Self::AlreadyStarted).
/// - **Flush outcomes**: [`NothingToFlush`](Self::NothingToFlush) is
///   informational, [`Backend`](Self::Backend) means the batch was dropped.
/// - **Construction**: [`Connection`](Self::Connection) and
///   [`InvalidConfig`](Self::InvalidConfig).
#[derive(Debug, thiserror::Error)]
pub enum IndexerError {
    /// The message is missing routing information
    #[error("failed to index {size}-byte message; {reason}")]
    InvalidMessage { size: usize, reason: String },

    /// The inbound queue no longer accepts messages
    #[error("indexer ({identifier}) inbound queue is closed")]
    QueueClosed { identifier: String },

    /// A flush was attempted with an empty batch
    #[error("indexer ({identifier}) attempted to send bulk index request, but nothing was queued")]
    NothingToFlush { identifier: String },

    /// The bulk request failed as a whole; its items were dropped
    #[error("bulk index request failed: {0}")]
    Backend(#[from] BackendError),

    /// No connection handle could be obtained
    #[error("failed to obtain backend connection: {0}")]
    Connection(#[from] ConnectionError),

    /// The indexer configuration is unusable
    #[error("invalid indexer configuration: {message}")]
    InvalidConfig { message: String },

    /// The worker loop of this instance is already running or has run
    #[error("indexer ({identifier}) worker loop was already started")]
    AlreadyStarted { identifier: String },
}

impl IndexerError {
    pub fn invalid_message<S: Into<String>>(size: usize, reason: S) -> Self {
        Self::InvalidMessage {
            size,
            reason: reason.into(),
        }
    }

    pub fn invalid_config<S: Into<String>>(message: S) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// True for the non-fatal empty-batch flush outcome.
    pub fn is_nothing_to_flush(&self) -> bool {
        matches!(self, Self::NothingToFlush { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = IndexerError::invalid_message(42, "no index provided in header");
        assert_eq!(
            err.to_string(),
            "failed to index 42-byte message; no index provided in header"
        );

        let err = IndexerError::NothingToFlush {
            identifier: "abc".to_string(),
        };
        assert!(err.is_nothing_to_flush());
        assert!(err.to_string().contains("nothing was queued"));

        let err: IndexerError = BackendError::Rejected {
            status: 503,
            body: "unavailable".to_string(),
        }
        .into();
        assert!(!err.is_nothing_to_flush());
        assert_eq!(
            err.to_string(),
            "bulk index request failed: bulk request rejected with status 503: unavailable"
        );
    }

    #[test]
    fn test_connection_error_source_is_kept() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err = ConnectionError::unavailable("http://localhost:9200", io);
        assert!(err.to_string().contains("http://localhost:9200"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
