//! The batch of documents waiting for the next flush

use crate::backend::{BulkItem, BulkRequest};

/// Documents accumulated since the last flush, plus their payload size.
///
/// The byte count only drives the size trigger; it is reset by every flush
/// attempt whether or not the items are submitted.
#[derive(Debug, Default)]
pub struct PendingBatch {
    request: BulkRequest,
    size_in_bytes: usize,
}

impl PendingBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.request.is_empty()
    }

    pub fn len(&self) -> usize {
        self.request.number_of_actions()
    }

    pub fn size_in_bytes(&self) -> usize {
        self.size_in_bytes
    }

    /// Whether adding `incoming` bytes reaches `max_bytes`.
    pub fn would_reach(&self, incoming: usize, max_bytes: usize) -> bool {
        self.size_in_bytes.saturating_add(incoming) >= max_bytes
    }

    pub fn push(&mut self, item: BulkItem) {
        self.size_in_bytes = self.size_in_bytes.saturating_add(item.body.len());
        self.request.add(item);
    }

    pub fn reset_size(&mut self) {
        self.size_in_bytes = 0;
    }

    /// Move the accumulated request out, leaving the batch empty.
    pub fn take_request(&mut self) -> BulkRequest {
        self.size_in_bytes = 0;
        self.request.take()
    }
}
