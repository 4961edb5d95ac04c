//! Boundary between the indexer and the search backend
//!
//! The indexer never talks to a search cluster directly. It obtains a
//! [`BulkBackend`] from a [`ConnectionProvider`] once at construction and
//! hands it whole [`BulkRequest`]s. The wire format is the backend's concern.

use crate::error::{BackendError, ConnectionError, IndexerError};
use crate::message::Message;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// One document write inside a bulk request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkItem {
    pub index: String,
    pub id: Option<String>,
    pub doc_type: Option<String>,
    pub body: Vec<u8>,
}

impl TryFrom<Message> for BulkItem {
    type Error = IndexerError;

    fn try_from(msg: Message) -> Result<Self, Self::Error> {
        msg.validate()?;
        let Message { header, payload } = msg;
        Ok(Self {
            index: header.index.unwrap_or_default(),
            id: header.id,
            doc_type: header.doc_type,
            body: payload,
        })
    }
}

/// Builder for a bulk request; items keep the order they were added in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkRequest {
    items: Vec<BulkItem>,
}

impl BulkRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, item: BulkItem) {
        self.items.push(item);
    }

    pub fn number_of_actions(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[BulkItem] {
        &self.items
    }

    /// Move every item out, leaving the builder empty.
    pub fn take(&mut self) -> BulkRequest {
        std::mem::take(self)
    }
}

impl FromIterator<BulkItem> for BulkRequest {
    fn from_iter<T: IntoIterator<Item = BulkItem>>(iter: T) -> Self {
        Self {
            items: iter.into_iter().collect(),
        }
    }
}

/// Outcome of a single item of a bulk request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkItemResult {
    pub index: String,
    /// Document id, as assigned or echoed by the backend
    pub id: Option<String>,
    pub status: u16,
    pub error: Option<String>,
}

impl BulkItemResult {
    pub fn succeeded(&self) -> bool {
        self.error.is_none() && (200..300).contains(&self.status)
    }
}

/// Response of a bulk request that reached the backend.
///
/// `items` are in request order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkResponse {
    /// Time the backend reports spending on the request
    pub took_ms: u64,
    pub items: Vec<BulkItemResult>,
}

impl BulkResponse {
    pub fn succeeded(&self) -> impl Iterator<Item = &BulkItemResult> {
        self.items.iter().filter(|item| item.succeeded())
    }

    pub fn failed(&self) -> impl Iterator<Item = &BulkItemResult> {
        self.items.iter().filter(|item| !item.succeeded())
    }
}

/// A live connection able to execute bulk requests.
#[async_trait]
pub trait BulkBackend: Send + Sync {
    /// Submit every item of `request` as one bulk operation.
    ///
    /// `timeout` is the per-flush budget; implementations should pass it on
    /// to the remote side where the protocol allows it.
    async fn submit_bulk(
        &self,
        request: &BulkRequest,
        timeout: Duration,
    ) -> Result<BulkResponse, BackendError>;

    /// Get the name of this backend, for logs
    fn backend_name(&self) -> &str;
}

/// Supplies the connection an indexer is constructed with.
#[async_trait]
pub trait ConnectionProvider: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn BulkBackend>, ConnectionError>;
}
