//! # bulkbuf-core
//!
//! A bulk-indexing buffer. Producers submit documents addressed to a search
//! index; a [`BatchIndexer`] accumulates them and writes each batch to the
//! backend as a single bulk request once it grows too large, gets too old,
//! or the indexer shuts down.
//!
//! ## Quick Start
//!
//! ```no_run
//! use bulkbuf_core::{BatchIndexer, IndexerConfig, Message};
//! use bulkbuf_core::testing::{RecordingBackend, StaticProvider};
//! use std::sync::Arc;
//!
//! # async fn example() -> bulkbuf_core::Result<()> {
//! let provider = StaticProvider::new(Arc::new(RecordingBackend::new()));
//! let indexer = Arc::new(BatchIndexer::create(IndexerConfig::default(), &provider).await?);
//! let worker = indexer.spawn()?;
//!
//! indexer.submit(Message::new("logs", r#"{"level":"info"}"#)).await?;
//!
//! indexer.shutdown().await;
//! # let _ = worker;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! submit ──▶ bounded queue ──▶ worker loop ──▶ PendingBatch ──flush──▶ BulkBackend
//!                                  ▲                                     │
//!                       timer / shutdown / size          RetryPolicy ◀───┘ failures
//! ```
//!
//! - [`config`]: indexer settings and defaults
//! - [`message`]: what producers submit
//! - [`backend`]: the bulk request/response model and the backend traits
//! - [`batch`]: the pending batch and its size accounting
//! - [`indexer`]: the worker loop and flush
//! - [`retry`]: what happens to documents a flush could not index
//! - [`testing`]: in-memory backends for tests and examples

pub mod backend;
pub mod batch;
pub mod config;
pub mod error;
pub mod indexer;
pub mod message;
pub mod retry;
pub mod testing;

pub use backend::{
    BulkBackend, BulkItem, BulkItemResult, BulkRequest, BulkResponse, ConnectionProvider,
};
pub use config::IndexerConfig;
pub use error::{BackendError, ConnectionError, IndexerError, Result};
pub use indexer::{BatchIndexer, FlushReport, IndexerState, IndexerStats};
pub use message::{Message, MessageHeader};
pub use retry::{DropFailures, RetryPolicy};
