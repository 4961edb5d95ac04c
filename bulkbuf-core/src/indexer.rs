//! The batch indexer: a bounded inbound queue, one worker loop and a
//! mutex-guarded flush.
//!
//! ## Lifecycle
//!
//! ```text
//! create ──▶ Idle ──start/spawn──▶ Running ──stop──▶ ShuttingDown ──▶ Stopped
//!                                     │                                  ▲
//!                                     └──────── queue closed ────────────┘
//! ```
//!
//! ## Flush triggers
//!
//! The worker flushes the pending batch when
//! - adding the next document would reach `max_batch_size_bytes`,
//! - the flush timer fires, `max_batch_interval` after a document started
//!   a new batch,
//! - a shutdown is requested, or
//! - the queue closes and `flush_on_queue_close` is set.
//!
//! [`BatchIndexer::flush`] can also be called directly; every flush takes the
//! same mutex, so at most one bulk request is in flight per indexer.
//!
//! ## Delivery
//!
//! Each document is submitted at most once. Failed requests and failed items
//! are handed to the [`RetryPolicy`] and then dropped from the batch.

use crate::backend::{BulkBackend, BulkItem, BulkItemResult, ConnectionProvider};
use crate::batch::PendingBatch;
use crate::config::IndexerConfig;
use crate::error::{BackendError, IndexerError, Result};
use crate::message::Message;
use crate::retry::{DropFailures, RetryPolicy};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use std::sync::{Arc, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{Mutex, Notify, RwLock, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Worker loop state of an indexer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexerState {
    /// Constructed, worker loop not started yet
    Idle,
    Running,
    /// Shutdown requested; draining and flushing for the last time
    ShuttingDown,
    Stopped,
}

/// Result of a flush that reached the backend
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub submitted: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Time the backend reports spending on the request
    pub took_ms: u64,
    /// Wall time of the request as seen by the indexer
    pub elapsed: Duration,
}

/// Running counters for an indexer instance
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexerStats {
    pub flushes: usize,
    pub empty_flushes: usize,
    pub failed_flushes: usize,
    pub documents_submitted: usize,
    pub documents_indexed: usize,
    pub documents_failed: usize,
    /// Malformed messages dropped by the worker
    pub messages_dropped: usize,
}

/// Stand-in deadline for flush intervals the clock cannot represent
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

fn lock<T>(mutex: &std::sync::Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Buffers documents and writes them to a [`BulkBackend`] in bulk.
///
/// Share it behind an [`Arc`]: producers call [`submit`](Self::submit) from
/// any task while one worker runs [`start`](Self::start) or was launched with
/// [`spawn`](Self::spawn).
pub struct BatchIndexer {
    identifier: String,
    config: IndexerConfig,
    backend: Arc<dyn BulkBackend>,
    retry_policy: Arc<dyn RetryPolicy>,
    sender: std::sync::Mutex<Option<mpsc::Sender<Message>>>,
    receiver: std::sync::Mutex<Option<mpsc::Receiver<Message>>>,
    batch: Mutex<PendingBatch>,
    shutdown: Notify,
    state: std::sync::Mutex<IndexerState>,
    stats: RwLock<IndexerStats>,
}

impl std::fmt::Debug for BatchIndexer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchIndexer")
            .field("identifier", &self.identifier)
            .field("config", &self.config)
            .field("backend", &self.backend.backend_name())
            .field("state", &self.state())
            .finish()
    }
}

impl BatchIndexer {
    /// Create an indexer with a connection obtained from `provider`.
    ///
    /// # Errors
    /// - [`IndexerError::InvalidConfig`] if `config` does not validate
    /// - [`IndexerError::Connection`] if the provider cannot supply a
    ///   connection; no indexer is created in that case
    pub async fn create<P>(config: IndexerConfig, provider: &P) -> Result<Self>
    where
        P: ConnectionProvider + ?Sized,
    {
        config.validate()?;
        let backend = provider.connect().await?;
        Self::with_backend(config, backend)
    }

    /// Create an indexer around an existing connection.
    pub fn with_backend(config: IndexerConfig, backend: Arc<dyn BulkBackend>) -> Result<Self> {
        config.validate()?;
        let (sender, receiver) = mpsc::channel(config.queue_capacity);
        let identifier = URL_SAFE_NO_PAD.encode(Uuid::new_v4().as_bytes());
        debug!(
            "created bulk indexer ({}) with {}-message queue and {}-byte batches",
            identifier, config.queue_capacity, config.max_batch_size_bytes
        );

        Ok(Self {
            identifier,
            config,
            backend,
            retry_policy: Arc::new(DropFailures),
            sender: std::sync::Mutex::new(Some(sender)),
            receiver: std::sync::Mutex::new(Some(receiver)),
            batch: Mutex::new(PendingBatch::new()),
            shutdown: Notify::new(),
            state: std::sync::Mutex::new(IndexerState::Idle),
            stats: RwLock::new(IndexerStats::default()),
        })
    }

    /// Replace the default [`DropFailures`] policy (builder style)
    pub fn with_retry_policy(mut self, policy: Arc<dyn RetryPolicy>) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Identifier used to correlate this instance's log lines
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn config(&self) -> &IndexerConfig {
        &self.config
    }

    pub fn state(&self) -> IndexerState {
        *lock(&self.state)
    }

    fn set_state(&self, state: IndexerState) {
        *lock(&self.state) = state;
    }

    pub async fn stats(&self) -> IndexerStats {
        self.stats.read().await.clone()
    }

    /// Number of documents waiting for the next flush.
    ///
    /// Waits for an in-flight flush to finish.
    pub async fn pending_len(&self) -> usize {
        self.batch.lock().await.len()
    }

    /// Payload bytes counted toward the size trigger.
    pub async fn pending_bytes(&self) -> usize {
        self.batch.lock().await.size_in_bytes()
    }

    fn queue_closed(&self) -> IndexerError {
        IndexerError::QueueClosed {
            identifier: self.identifier.clone(),
        }
    }

    /// Validate `msg` and place it on the inbound queue.
    ///
    /// Waits while the queue is full. A message without an index is rejected
    /// here and never reaches the batch.
    ///
    /// # Errors
    /// - [`IndexerError::InvalidMessage`] for a message without an index
    /// - [`IndexerError::QueueClosed`] after shutdown or [`close`](Self::close)
    pub async fn submit(&self, msg: Message) -> Result<()> {
        msg.validate()?;

        let sender = lock(&self.sender).clone().ok_or_else(|| self.queue_closed())?;
        sender.send(msg).await.map_err(|_| self.queue_closed())
    }

    /// Stop accepting messages through this indexer.
    ///
    /// The worker sees the queue close once every buffered message has been
    /// consumed and no `submit` call is still waiting.
    pub fn close(&self) {
        if lock(&self.sender).take().is_some() {
            debug!("closing inbound queue for indexer ({})", self.identifier);
        }
    }

    fn begin(&self) -> Result<mpsc::Receiver<Message>> {
        let receiver = lock(&self.receiver)
            .take()
            .ok_or_else(|| IndexerError::AlreadyStarted {
                identifier: self.identifier.clone(),
            })?;
        self.set_state(IndexerState::Running);
        Ok(receiver)
    }

    /// Run the worker loop on the current task.
    ///
    /// Returns after a shutdown has been processed or the queue closed.
    ///
    /// # Errors
    /// [`IndexerError::AlreadyStarted`] if the loop was started before.
    pub async fn start(&self) -> Result<()> {
        let receiver = self.begin()?;
        self.run(receiver).await
    }

    /// Run the worker loop on a new tokio task.
    ///
    /// The indexer is `Running` when this returns.
    pub fn spawn(self: &Arc<Self>) -> Result<JoinHandle<Result<()>>> {
        let receiver = self.begin()?;
        let indexer = Arc::clone(self);
        Ok(tokio::spawn(async move { indexer.run(receiver).await }))
    }

    /// Request a graceful shutdown without waiting for it.
    ///
    /// Safe to call more than once; the worker handles the first request.
    pub fn stop(&self) {
        debug!("requesting shutdown of indexer ({})", self.identifier);
        self.shutdown.notify_one();
    }

    /// Request a shutdown and wait until the final flush has completed.
    pub async fn shutdown(&self) {
        self.stop();
        while !matches!(self.state(), IndexerState::Stopped | IndexerState::Idle) {
            tokio::time::sleep(self.config.idle_poll_interval).await;
        }
        debug!("indexer ({}) shutdown complete", self.identifier);
    }

    /// Deadline for the batch started at this instant.
    fn flush_deadline(&self) -> Instant {
        let now = Instant::now();
        now.checked_add(self.config.max_batch_interval)
            .or_else(|| now.checked_add(FAR_FUTURE))
            .unwrap_or(now)
    }

    async fn run(&self, mut receiver: mpsc::Receiver<Message>) -> Result<()> {
        let _stopped = StoppedOnExit(self);
        info!(
            "running bulk indexer instance {} against {} backend",
            self.identifier,
            self.backend.backend_name()
        );

        let flush_timer = tokio::time::sleep(self.config.max_batch_interval);
        tokio::pin!(flush_timer);
        let mut timer_armed = false;

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.notified() => {
                    debug!("closing indexer ({}) on shutdown", self.identifier);
                    self.set_state(IndexerState::ShuttingDown);
                    self.drain(&mut receiver).await;
                    let _ = self.flush().await;
                    break;
                }

                () = &mut flush_timer, if timer_armed => {
                    timer_armed = false;
                    debug!("indexer ({}) queue flush timer invoked", self.identifier);
                    let _ = self.flush().await;
                }

                delivery = receiver.recv() => match delivery {
                    Some(msg) => {
                        if self.accumulate(msg).await {
                            debug!(
                                "indexer ({}) queue was empty, resetting queue flush timer",
                                self.identifier
                            );
                            flush_timer.as_mut().reset(self.flush_deadline());
                            timer_armed = true;
                        }
                    }
                    None => {
                        debug!("inbound queue of indexer ({}) closed", self.identifier);
                        if self.config.flush_on_queue_close {
                            let _ = self.flush().await;
                        } else {
                            let pending = self.pending_len().await;
                            if pending > 0 {
                                warn!(
                                    "indexer ({}) discarding {} unflushed documents on queue close",
                                    self.identifier, pending
                                );
                            }
                        }
                        break;
                    }
                },
            }
        }

        info!("indexer instance ({}) closed", self.identifier);
        Ok(())
    }

    /// Close the queue and move whatever is still buffered into the batch.
    async fn drain(&self, receiver: &mut mpsc::Receiver<Message>) {
        debug!("closing buffered queue for indexer ({})", self.identifier);
        lock(&self.sender).take();
        receiver.close();

        // recv() only yields None once no producer still holds a send permit
        let mut drained = 0;
        while let Some(msg) = receiver.recv().await {
            self.accumulate(msg).await;
            drained += 1;
        }
        if drained > 0 {
            debug!(
                "moved {} buffered messages into the final batch of indexer ({})",
                drained, self.identifier
            );
        }
    }

    /// Add `msg` to the batch, flushing first if it would reach the size
    /// limit. Returns true when `msg` started a new batch.
    async fn accumulate(&self, msg: Message) -> bool {
        let size = msg.size();
        debug!(
            "received {}-byte delivery on inbound queue for indexer ({})",
            size, self.identifier
        );

        // submit() already rejected these; only a sender that bypassed it gets here
        let item = match BulkItem::try_from(msg) {
            Ok(item) => item,
            Err(err) => {
                warn!(
                    "indexer ({}) skipped document delivered with invalid headers: {}",
                    self.identifier, err
                );
                self.stats.write().await.messages_dropped += 1;
                return false;
            }
        };

        let mut batch = self.batch.lock().await;
        let starts_batch = batch.is_empty();
        debug!(
            "current size of indexer ({}) queue in bytes: {}",
            self.identifier,
            batch.size_in_bytes()
        );

        if !starts_batch && batch.would_reach(size, self.config.max_batch_size_bytes) {
            debug!(
                "adding {}-byte document would exceed configured max {}-byte batch size",
                size, self.config.max_batch_size_bytes
            );
            let _ = self.flush_locked(&mut batch).await;
        }

        batch.push(item);
        starts_batch
    }

    /// Submit the pending batch as one bulk request.
    ///
    /// Waits for any flush already in progress. The batch is empty afterward
    /// whatever the outcome.
    ///
    /// # Errors
    /// - [`IndexerError::NothingToFlush`] when the batch is empty; not a failure
    /// - [`IndexerError::Backend`] when the request failed; its documents
    ///   were handed to the retry policy and dropped
    pub async fn flush(&self) -> Result<FlushReport> {
        let mut batch = self.batch.lock().await;
        self.flush_locked(&mut batch).await
    }

    async fn flush_locked(&self, batch: &mut PendingBatch) -> Result<FlushReport> {
        batch.reset_size();

        if batch.is_empty() {
            let err = IndexerError::NothingToFlush {
                identifier: self.identifier.clone(),
            };
            warn!("{}", err);
            self.stats.write().await.empty_flushes += 1;
            return Err(err);
        }

        let request = batch.take_request();
        let submitted = request.number_of_actions();
        let timeout = self.config.flush_timeout;
        let started = Instant::now();

        let outcome =
            match tokio::time::timeout(timeout, self.backend.submit_bulk(&request, timeout)).await {
                Ok(outcome) => outcome,
                Err(_) => Err(BackendError::Timeout { timeout }),
            };

        let response = match outcome {
            Ok(response) => response,
            Err(err) => {
                warn!(
                    "indexer ({}) bulk index request of {} documents failed: {}",
                    self.identifier, submitted, err
                );
                self.retry_policy.on_request_failure(&request, &err);

                let mut stats = self.stats.write().await;
                stats.failed_flushes += 1;
                stats.documents_submitted += submitted;
                return Err(err.into());
            }
        };

        let elapsed = started.elapsed();
        info!(
            "bulk index of {} items succeeded in {} ms",
            response.items.len(),
            response.took_ms
        );

        for item in response.succeeded() {
            debug!(
                "bulk indexer indexed document with id {:?} in {}",
                item.id, item.index
            );
        }

        let failed: Vec<BulkItemResult> = response.failed().cloned().collect();
        for item in &failed {
            debug!(
                "bulk indexer document {:?} failed indexing in {} with status {}: {:?}",
                item.id, item.index, item.status, item.error
            );
        }
        if !failed.is_empty() {
            warn!(
                "indexer ({}) {} of {} documents failed indexing",
                self.identifier,
                failed.len(),
                submitted
            );
            self.retry_policy.on_item_failures(&request, &failed);
        }

        let report = FlushReport {
            submitted,
            succeeded: response.succeeded().count(),
            failed: failed.len(),
            took_ms: response.took_ms,
            elapsed,
        };

        let mut stats = self.stats.write().await;
        stats.flushes += 1;
        stats.documents_submitted += report.submitted;
        stats.documents_indexed += report.succeeded;
        stats.documents_failed += report.failed;

        Ok(report)
    }
}

/// Marks the indexer `Stopped` however the worker loop exits, so
/// `shutdown()` does not wait on a worker that panicked.
struct StoppedOnExit<'a>(&'a BatchIndexer);

impl Drop for StoppedOnExit<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            error!("worker of indexer ({}) panicked", self.0.identifier);
        }
        self.0.set_state(IndexerState::Stopped);
    }
}
