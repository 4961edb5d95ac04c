//! Configuration for the batch indexer

use crate::error::{IndexerError, Result};
use std::time::Duration;

/// Default capacity of the bounded inbound queue
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;
/// Default flush threshold for a single bulk request (5 MiB)
pub const DEFAULT_MAX_BATCH_SIZE_BYTES: usize = 5 * 1024 * 1024;
/// Default staleness bound for a non-empty batch
pub const DEFAULT_MAX_BATCH_INTERVAL: Duration = Duration::from_secs(5);
/// Default timeout applied to each bulk request
pub const DEFAULT_FLUSH_TIMEOUT: Duration = Duration::from_secs(30);
/// Default poll interval used while waiting for the worker to stop
pub const DEFAULT_IDLE_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Configuration for a [`BatchIndexer`](crate::indexer::BatchIndexer).
///
/// All values have defaults; use the `with_*` methods to override them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexerConfig {
    /// Capacity of the inbound queue; `submit` waits while it is full
    pub queue_capacity: usize,
    /// A batch is flushed before it would reach this many payload bytes
    pub max_batch_size_bytes: usize,
    /// Maximum time the oldest document of a batch waits before a flush
    pub max_batch_interval: Duration,
    /// Timeout for each bulk request
    pub flush_timeout: Duration,
    /// Poll interval used by [`shutdown`](crate::indexer::BatchIndexer::shutdown)
    pub idle_poll_interval: Duration,
    /// Flush the partial batch when the inbound queue closes without a shutdown
    pub flush_on_queue_close: bool,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            max_batch_size_bytes: DEFAULT_MAX_BATCH_SIZE_BYTES,
            max_batch_interval: DEFAULT_MAX_BATCH_INTERVAL,
            flush_timeout: DEFAULT_FLUSH_TIMEOUT,
            idle_poll_interval: DEFAULT_IDLE_POLL_INTERVAL,
            flush_on_queue_close: true,
        }
    }
}

impl IndexerConfig {
    /// Set the inbound queue capacity.
    ///
    /// Smaller queues push back on producers sooner; larger queues absorb
    /// bursts at the cost of memory.
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Set the batch size, in payload bytes, that triggers a flush.
    pub fn with_max_batch_size_bytes(mut self, bytes: usize) -> Self {
        self.max_batch_size_bytes = bytes;
        self
    }

    /// Set the maximum time a non-empty batch may wait for a flush.
    pub fn with_max_batch_interval(mut self, interval: Duration) -> Self {
        self.max_batch_interval = interval;
        self
    }

    /// Set the timeout applied to every bulk request.
    pub fn with_flush_timeout(mut self, timeout: Duration) -> Self {
        self.flush_timeout = timeout;
        self
    }

    pub fn with_idle_poll_interval(mut self, interval: Duration) -> Self {
        self.idle_poll_interval = interval;
        self
    }

    /// Choose whether a queue closure flushes the pending batch.
    ///
    /// When disabled, documents accumulated since the last flush are lost
    /// if every producer handle goes away before a timer, size or shutdown
    /// trigger fires.
    pub fn with_flush_on_queue_close(mut self, flush: bool) -> Self {
        self.flush_on_queue_close = flush;
        self
    }

    /// Check that the configuration can drive an indexer.
    pub fn validate(&self) -> Result<()> {
        if self.queue_capacity == 0 {
            return Err(IndexerError::invalid_config(
                "queue_capacity must be greater than zero",
            ));
        }
        if self.max_batch_size_bytes == 0 {
            return Err(IndexerError::invalid_config(
                "max_batch_size_bytes must be greater than zero",
            ));
        }
        if self.max_batch_interval.is_zero() {
            return Err(IndexerError::invalid_config(
                "max_batch_interval must be greater than zero",
            ));
        }
        if self.flush_timeout.is_zero() {
            return Err(IndexerError::invalid_config(
                "flush_timeout must be greater than zero",
            ));
        }
        if self.idle_poll_interval.is_zero() {
            return Err(IndexerError::invalid_config(
                "idle_poll_interval must be greater than zero",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = IndexerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.queue_capacity, DEFAULT_QUEUE_CAPACITY);
        assert!(config.flush_on_queue_close);
    }

    #[test]
    fn test_builder_methods() {
        let config = IndexerConfig::default()
            .with_queue_capacity(8)
            .with_max_batch_size_bytes(100)
            .with_max_batch_interval(Duration::from_secs(1))
            .with_flush_timeout(Duration::from_secs(2))
            .with_idle_poll_interval(Duration::from_millis(1))
            .with_flush_on_queue_close(false);

        assert_eq!(config.queue_capacity, 8);
        assert_eq!(config.max_batch_size_bytes, 100);
        assert_eq!(config.max_batch_interval, Duration::from_secs(1));
        assert_eq!(config.flush_timeout, Duration::from_secs(2));
        assert_eq!(config.idle_poll_interval, Duration::from_millis(1));
        assert!(!config.flush_on_queue_close);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_values_are_rejected() {
        let zero_queue = IndexerConfig::default().with_queue_capacity(0);
        assert!(matches!(
            zero_queue.validate(),
            Err(IndexerError::InvalidConfig { .. })
        ));

        let zero_batch = IndexerConfig::default().with_max_batch_size_bytes(0);
        assert!(zero_batch.validate().is_err());

        let zero_interval = IndexerConfig::default().with_max_batch_interval(Duration::ZERO);
        assert!(zero_interval.validate().is_err());

        let zero_timeout = IndexerConfig::default().with_flush_timeout(Duration::ZERO);
        assert!(zero_timeout.validate().is_err());
    }
}
