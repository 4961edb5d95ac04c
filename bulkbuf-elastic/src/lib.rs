//! # bulkbuf-elastic
//!
//! Elasticsearch plumbing for [`bulkbuf_core`]: environment configuration,
//! a [`ConnectionProvider`](bulkbuf_core::ConnectionProvider) that resolves
//! hosts, credentials and TLS settings, and a
//! [`BulkBackend`](bulkbuf_core::BulkBackend) speaking the `_bulk` API.
//!
//! ```no_run
//! use bulkbuf_core::{BatchIndexer, IndexerConfig, Message};
//! use bulkbuf_elastic::{ElasticConfig, ElasticConnectionProvider};
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = ElasticConfig::from_env()?;
//! let indexer_config = config.indexer_config(IndexerConfig::default());
//! let provider = ElasticConnectionProvider::new(config);
//!
//! let indexer = Arc::new(BatchIndexer::create(indexer_config, &provider).await?);
//! let worker = indexer.spawn()?;
//! indexer.submit(Message::new("logs", r#"{"msg":"hello"}"#)).await?;
//! indexer.shutdown().await;
//! worker.await??;
//! # Ok(())
//! # }
//! ```

pub mod bulk;
pub mod config;
pub mod connection;
pub mod error;

pub use bulk::{Credentials, ElasticBulkBackend, decode_bulk_response, encode_bulk_body};
pub use config::{ElasticConfig, Endpoint};
pub use connection::ElasticConnectionProvider;
pub use error::{ConfigError, HealthcheckError};
