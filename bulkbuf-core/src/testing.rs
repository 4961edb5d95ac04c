//! In-memory backends for exercising an indexer without a search cluster.

use crate::backend::{BulkBackend, BulkItemResult, BulkRequest, BulkResponse, ConnectionProvider};
use crate::error::{BackendError, ConnectionError};
use crate::retry::RetryPolicy;
use async_trait::async_trait;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A backend that records every bulk request it receives.
///
/// Items succeed with status 201 unless their id was passed to
/// [`reject_ids`](Self::reject_ids). Whole-request failures can be queued
/// with [`fail_next`](Self::fail_next).
#[derive(Default)]
pub struct RecordingBackend {
    requests: Mutex<Vec<BulkRequest>>,
    failures: Mutex<VecDeque<BackendError>>,
    rejected_ids: Mutex<HashSet<String>>,
    latency: Mutex<Option<Duration>>,
    next_id: AtomicUsize,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next bulk request fail with `error`.
    pub fn fail_next(&self, error: BackendError) {
        lock(&self.failures).push_back(error);
    }

    /// Report items with these ids as failed inside a successful response.
    pub fn reject_ids<I, S>(&self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        lock(&self.rejected_ids).extend(ids.into_iter().map(Into::into));
    }

    /// Delay every response by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        *lock(&self.latency) = Some(latency);
    }

    /// Every request received so far, in order.
    pub fn requests(&self) -> Vec<BulkRequest> {
        lock(&self.requests).clone()
    }

    pub fn flush_count(&self) -> usize {
        lock(&self.requests).len()
    }

    /// Payloads of every received item, across all requests.
    pub fn submitted_bodies(&self) -> Vec<Vec<u8>> {
        lock(&self.requests)
            .iter()
            .flat_map(|request| request.items().iter().map(|item| item.body.clone()))
            .collect()
    }
}

#[async_trait]
impl BulkBackend for RecordingBackend {
    async fn submit_bulk(
        &self,
        request: &BulkRequest,
        _timeout: Duration,
    ) -> Result<BulkResponse, BackendError> {
        lock(&self.requests).push(request.clone());

        let latency = *lock(&self.latency);
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        if let Some(error) = lock(&self.failures).pop_front() {
            return Err(error);
        }

        let rejected = lock(&self.rejected_ids).clone();
        let items = request
            .items()
            .iter()
            .map(|item| {
                let id = item.id.clone().unwrap_or_else(|| {
                    format!("auto-{}", self.next_id.fetch_add(1, Ordering::SeqCst))
                });
                if rejected.contains(&id) {
                    BulkItemResult {
                        index: item.index.clone(),
                        id: Some(id),
                        status: 400,
                        error: Some("mapper_parsing_exception".to_string()),
                    }
                } else {
                    BulkItemResult {
                        index: item.index.clone(),
                        id: Some(id),
                        status: 201,
                        error: None,
                    }
                }
            })
            .collect();

        Ok(BulkResponse { took_ms: 1, items })
    }

    fn backend_name(&self) -> &str {
        "recording"
    }
}

/// Hands out a fixed backend, or fails every time.
pub struct StaticProvider {
    backend: Option<Arc<dyn BulkBackend>>,
}

impl StaticProvider {
    pub fn new(backend: Arc<dyn BulkBackend>) -> Self {
        Self {
            backend: Some(backend),
        }
    }

    /// A provider whose `connect` always fails.
    pub fn unavailable() -> Self {
        Self { backend: None }
    }
}

#[async_trait]
impl ConnectionProvider for StaticProvider {
    async fn connect(&self) -> Result<Arc<dyn BulkBackend>, ConnectionError> {
        self.backend.clone().ok_or(ConnectionError::NoHosts)
    }
}

/// Retry policy that counts what it is handed.
#[derive(Debug, Default)]
pub struct CountingRetryPolicy {
    pub request_failures: AtomicUsize,
    pub dropped_items: AtomicUsize,
    pub item_failures: AtomicUsize,
}

impl RetryPolicy for CountingRetryPolicy {
    fn on_request_failure(&self, request: &BulkRequest, _error: &BackendError) {
        self.request_failures.fetch_add(1, Ordering::SeqCst);
        self.dropped_items
            .fetch_add(request.number_of_actions(), Ordering::SeqCst);
    }

    fn on_item_failures(&self, _request: &BulkRequest, failed: &[BulkItemResult]) {
        self.item_failures.fetch_add(failed.len(), Ordering::SeqCst);
    }
}
