//! Hook for handling documents a flush could not index

use crate::backend::{BulkItemResult, BulkRequest};
use crate::error::BackendError;
use tracing::debug;

/// Decides what happens to documents that a flush failed to index.
///
/// The indexer calls the policy after the batch has already been cleared, so
/// an implementation that wants at-least-once delivery has to resubmit the
/// items itself (for example through a channel back to a producer).
pub trait RetryPolicy: Send + Sync {
    /// The whole bulk request failed before producing a response.
    fn on_request_failure(&self, request: &BulkRequest, error: &BackendError);

    /// Some items of an otherwise successful bulk request failed.
    ///
    /// `failed` is never empty.
    fn on_item_failures(&self, request: &BulkRequest, failed: &[BulkItemResult]);
}

/// Drops failed documents after logging them.
#[derive(Debug, Clone, Copy, Default)]
pub struct DropFailures;

impl RetryPolicy for DropFailures {
    fn on_request_failure(&self, request: &BulkRequest, error: &BackendError) {
        debug!(
            "dropping {} documents after failed bulk request: {}",
            request.number_of_actions(),
            error
        );
    }

    fn on_item_failures(&self, _request: &BulkRequest, failed: &[BulkItemResult]) {
        debug!("dropping {} documents that failed indexing", failed.len());
    }
}
