//! Fault-Tolerant Consumer
//!
//! The orchestrator that sits downstream of the ring buffer. It accumulates
//! delivered elements into batches, runs each batch through the retry policy,
//! routes permanent failures to the dead letter sink, and checkpoints
//! progress. Its delivery entry point absorbs every failure class: the ring
//! buffer is a shared mechanism and one consumer's failure must stay
//! invisible to the others.

use crate::consumer::accumulator::BatchAccumulator;
use crate::consumer::checkpoint::{
    Checkpoint, CheckpointError, CheckpointStore, FileCheckpointStore,
};
use crate::consumer::config::ConsumerConfig;
use crate::consumer::dead_letter::{DeadLetterSink, FileDeadLetterSink};
use crate::consumer::processor::BatchProcessor;
use crate::consumer::retry::{RetryError, RetryPolicy};
use crate::consumer::shutdown::ShutdownSignal;
use crate::consumer::{ConsumerError, RingBufferConsumer};
use chrono::Utc;
use crossbeam_utils::CachePadded;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Lifecycle states of a consumer identity
///
/// `Faulted` is the escalation target for persistence failures: progress can
/// no longer be durably recorded, so the consumer stops accepting deliveries
/// instead of silently continuing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    Initializing,
    Running,
    Draining,
    Faulted,
    Closed,
}

/// Observability callback: `(consumer_id, batch_len, error)`
///
/// Invoked for terminal batch failures and persistence failures. A
/// persistence failure (checkpoint or dead-letter write) has no associated
/// batch, and `batch_len` is reported as `0` for it. Must not alter consumer
/// state or control flow.
pub type ErrorCallback = Box<dyn Fn(&str, usize, &str) + Send + Sync>;

/// Running counters for one consumer, on cache-padded atomics
///
/// Shared via `Arc` so an operator thread can observe progress without
/// touching consumer state.
#[derive(Debug, Default)]
pub struct ConsumerMetrics {
    processed: CachePadded<AtomicU64>,
    batches: CachePadded<AtomicU64>,
    retries: CachePadded<AtomicU64>,
    errors: CachePadded<AtomicU64>,
    dead_lettered: CachePadded<AtomicU64>,
}

impl ConsumerMetrics {
    /// Take a point-in-time snapshot of all counters
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            processed_count: self.processed.load(Ordering::Relaxed),
            last_batch_number: self.batches.load(Ordering::Relaxed),
            retry_count: self.retries.load(Ordering::Relaxed),
            error_count: self.errors.load(Ordering::Relaxed),
            dead_letter_count: self.dead_lettered.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of a consumer's counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Elements successfully processed (monotonic, survives restarts)
    pub processed_count: u64,
    /// Number of the last successfully processed batch
    pub last_batch_number: u64,
    /// Backoff retries performed
    pub retry_count: u64,
    /// Terminal failures (retries exhausted, non-retryable, or panics)
    pub error_count: u64,
    /// Batches routed to the dead letter sink
    pub dead_letter_count: u64,
}

/// Fault-tolerant batch consumer
///
/// One instance per consumer identity. Deliveries are processed strictly
/// sequentially, which keeps the accumulator and checkpoint path free of
/// internal locking; cross-identity concurrency is handled by the namespaced
/// stores.
pub struct FaultTolerantConsumer<T, P>
where
    T: Send + 'static,
    P: BatchProcessor<T>,
{
    id: String,
    config: ConsumerConfig,
    state: ConsumerState,
    accumulator: BatchAccumulator<T>,
    retry: RetryPolicy,
    processor: P,
    checkpoints: Box<dyn CheckpointStore>,
    dead_letters: Box<dyn DeadLetterSink<T>>,
    shutdown: ShutdownSignal,
    metrics: Arc<ConsumerMetrics>,
    error_callback: Option<ErrorCallback>,
    last_batch_number: u64,
    processed_count: u64,
    batches_since_checkpoint: u64,
}

impl<T, P> FaultTolerantConsumer<T, P>
where
    T: Send + 'static,
    P: BatchProcessor<T>,
{
    /// Create a consumer with explicit storage backends
    ///
    /// Loads the identity's checkpoint (fresh start if absent), seeds the
    /// counters from it and transitions straight to `Running`. A checkpoint
    /// that exists but cannot be parsed is logged and treated as a fresh
    /// start rather than blocking startup.
    ///
    /// # Errors
    /// Returns `ConsumerError::Config` when the configuration is invalid, or
    /// `ConsumerError::Checkpoint` when the store fails to read an existing
    /// checkpoint. Starting fresh over an unreadable record would silently
    /// discard recorded progress, so I/O failures block startup.
    pub fn new(
        id: impl Into<String>,
        config: ConsumerConfig,
        processor: P,
        checkpoints: Box<dyn CheckpointStore>,
        dead_letters: Box<dyn DeadLetterSink<T>>,
    ) -> Result<Self, ConsumerError> {
        config.validate()?;
        let id = id.into();
        let accumulator = BatchAccumulator::new(config.batch_size)?;
        let retry = RetryPolicy::new(config.max_retries, config.base_delay);

        let checkpoint = match checkpoints.load(&id) {
            Ok(Some(cp)) => {
                info!(
                    consumer_id = %id,
                    last_batch = cp.last_batch_number,
                    processed = cp.processed_count,
                    "resumed from checkpoint"
                );
                cp
            }
            Ok(None) => Checkpoint::fresh(),
            Err(e @ CheckpointError::Serialization(_)) => {
                warn!(consumer_id = %id, error = %e, "unparseable checkpoint, starting fresh");
                Checkpoint::fresh()
            }
            Err(e) => return Err(e.into()),
        };

        let metrics = Arc::new(ConsumerMetrics::default());
        metrics
            .processed
            .store(checkpoint.processed_count, Ordering::Relaxed);
        metrics
            .batches
            .store(checkpoint.last_batch_number, Ordering::Relaxed);

        Ok(Self {
            id,
            config,
            state: ConsumerState::Running,
            accumulator,
            retry,
            processor,
            checkpoints,
            dead_letters,
            shutdown: ShutdownSignal::new(),
            metrics,
            error_callback: None,
            last_batch_number: checkpoint.last_batch_number,
            processed_count: checkpoint.processed_count,
            batches_since_checkpoint: 0,
        })
    }

    /// Attach an observability callback for terminal and persistence failures
    #[must_use]
    pub fn with_error_callback(mut self, callback: ErrorCallback) -> Self {
        self.error_callback = Some(callback);
        self
    }

    /// The consumer identity
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Current lifecycle state
    pub fn state(&self) -> ConsumerState {
        self.state
    }

    /// Snapshot of the running counters
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Shared handle to the counters, for observation from other threads
    pub fn metrics_handle(&self) -> Arc<ConsumerMetrics> {
        Arc::clone(&self.metrics)
    }

    /// A clone of the shutdown signal
    ///
    /// Triggering it interrupts an in-progress backoff wait promptly; the
    /// embedder should follow up with [`close`](Self::close) to drain.
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    /// Accept an ordered group of elements from the ring buffer
    ///
    /// Never returns an error and never panics: transient failures are
    /// retried, terminal failures are dead-lettered, panics from the
    /// processing step are caught and counted. Deliveries to a consumer that
    /// is not `Running` are dropped with a warning.
    pub fn deliver(&mut self, elements: Vec<T>) {
        if self.state != ConsumerState::Running {
            warn!(
                consumer_id = %self.id,
                state = ?self.state,
                dropped = elements.len(),
                "delivery ignored, consumer not running"
            );
            return;
        }

        for batch in self.accumulator.accept(elements) {
            self.process_batch(batch);
            if self.state != ConsumerState::Running {
                break;
            }
        }
    }

    /// Drain and close the consumer
    ///
    /// Flushes the accumulator remainder through the normal retry/DLQ path,
    /// persists a final checkpoint and releases the storage backends.
    /// Idempotent; a faulted consumer stays faulted.
    pub fn close(&mut self) {
        if matches!(self.state, ConsumerState::Closed | ConsumerState::Faulted) {
            return;
        }
        self.state = ConsumerState::Draining;

        if let Some(remainder) = self.accumulator.flush() {
            info!(
                consumer_id = %self.id,
                len = remainder.len(),
                "draining final partial batch"
            );
            self.process_batch(remainder);
        }

        if self.state == ConsumerState::Draining && self.save_checkpoint() {
            self.state = ConsumerState::Closed;
            let m = self.metrics.snapshot();
            info!(
                consumer_id = %self.id,
                processed = m.processed_count,
                batches = m.last_batch_number,
                errors = m.error_count,
                retries = m.retry_count,
                dead_lettered = m.dead_letter_count,
                "consumer closed"
            );
        }
    }

    /// Re-inject all dead-lettered batches through the normal ingestion path
    ///
    /// Operator-facing: entries are listed from the sink and their payloads
    /// fed back through [`deliver`](Self::deliver). Entry files are not
    /// deleted and no deduplication is performed; idempotency of processing
    /// is the implementer's responsibility.
    ///
    /// # Returns
    /// The number of entries re-injected.
    ///
    /// # Errors
    /// Returns an error when the sink cannot be listed.
    pub fn reprocess_dead_letters(&mut self) -> Result<usize, ConsumerError> {
        let entries = self.dead_letters.list(&self.id)?;
        let count = entries.len();
        if count == 0 {
            return Ok(0);
        }
        info!(
            consumer_id = %self.id,
            entries = count,
            "re-injecting dead-lettered batches"
        );
        for entry in entries {
            self.deliver(entry.data);
        }
        Ok(count)
    }

    fn process_batch(&mut self, batch: Vec<T>) {
        let batch_len = batch.len();
        let mut invocations = 0u64;

        let outcome = {
            let processor = &mut self.processor;
            let retry = &self.retry;
            let shutdown = &self.shutdown;
            let mut work = || {
                invocations += 1;
                processor.process(&batch)
            };
            catch_unwind(AssertUnwindSafe(|| retry.execute(&mut work, shutdown)))
        };

        if invocations > 1 {
            self.metrics
                .retries
                .fetch_add(invocations - 1, Ordering::Relaxed);
        }

        match outcome {
            Ok(Ok(())) => {
                self.last_batch_number += 1;
                self.processed_count += batch_len as u64;
                self.metrics
                    .processed
                    .fetch_add(batch_len as u64, Ordering::Relaxed);
                self.metrics
                    .batches
                    .store(self.last_batch_number, Ordering::Relaxed);

                self.batches_since_checkpoint += 1;
                if self.batches_since_checkpoint >= self.config.checkpoint_interval {
                    self.save_checkpoint();
                }

                info!(
                    consumer_id = %self.id,
                    batch = self.last_batch_number,
                    len = batch_len,
                    processed = self.processed_count,
                    "batch processed"
                );
            }
            Ok(Err(terminal)) => {
                if matches!(terminal, RetryError::Interrupted) {
                    warn!(
                        consumer_id = %self.id,
                        batch_len,
                        "shutdown interrupted retry backoff, preserving batch"
                    );
                }
                self.handle_terminal_failure(batch, &terminal.to_string());
            }
            Err(panic) => {
                let msg = panic_message(panic.as_ref());
                error!(
                    consumer_id = %self.id,
                    batch_len,
                    error = %msg,
                    "unanticipated panic in processing step, batch skipped"
                );
                self.metrics.errors.fetch_add(1, Ordering::Relaxed);
                self.notify_error(batch_len, &msg);
            }
        }
    }

    fn handle_terminal_failure(&mut self, batch: Vec<T>, message: &str) {
        let batch_len = batch.len();
        self.metrics.errors.fetch_add(1, Ordering::Relaxed);
        error!(
            consumer_id = %self.id,
            batch_len,
            error = %message,
            "batch failed permanently"
        );
        self.notify_error(batch_len, message);

        if !self.config.enable_dead_letter {
            warn!(
                consumer_id = %self.id,
                batch_len,
                "dead letter sink disabled, dropping failed batch"
            );
            return;
        }

        match self.dead_letters.record(&self.id, batch, message) {
            Ok(entry) => {
                self.metrics.dead_lettered.fetch_add(1, Ordering::Relaxed);
                warn!(
                    consumer_id = %self.id,
                    entry_id = %entry.id,
                    batch_len,
                    "batch routed to dead letter queue"
                );
            }
            Err(e) => {
                // Last line of defense against data loss failed.
                self.fault(&format!("dead letter write failed: {e}"));
            }
        }
    }

    /// Persist the current progress; faults the consumer on failure
    fn save_checkpoint(&mut self) -> bool {
        let checkpoint = Checkpoint {
            last_batch_number: self.last_batch_number,
            processed_count: self.processed_count,
            timestamp: Utc::now(),
        };
        match self.checkpoints.save(&self.id, &checkpoint) {
            Ok(()) => {
                self.batches_since_checkpoint = 0;
                true
            }
            Err(e) => {
                self.fault(&format!("checkpoint save failed: {e}"));
                false
            }
        }
    }

    fn fault(&mut self, reason: &str) {
        error!(
            consumer_id = %self.id,
            reason,
            "persistence failure, consumer faulted"
        );
        self.notify_error(0, reason);
        self.state = ConsumerState::Faulted;
    }

    fn notify_error(&self, batch_len: usize, message: &str) {
        if let Some(callback) = &self.error_callback {
            callback(&self.id, batch_len, message);
        }
    }
}

impl<T, P> FaultTolerantConsumer<T, P>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
    P: BatchProcessor<T>,
{
    /// Create a consumer backed by file stores under `config.data_dir`
    ///
    /// Produces the standard on-disk layout:
    /// `<data_dir>/<consumer_id>/checkpoint.json` and
    /// `<data_dir>/<consumer_id>/dlq/dlq-<uuid>.json`.
    ///
    /// # Errors
    /// Returns `ConsumerError::Config` when the configuration is invalid.
    pub fn with_file_stores(
        id: impl Into<String>,
        config: ConsumerConfig,
        processor: P,
    ) -> Result<Self, ConsumerError> {
        let checkpoints = Box::new(FileCheckpointStore::new(&config.data_dir));
        let dead_letters = Box::new(FileDeadLetterSink::new(&config.data_dir));
        Self::new(id, config, processor, checkpoints, dead_letters)
    }
}

impl<T, P> RingBufferConsumer<T> for FaultTolerantConsumer<T, P>
where
    T: Send + 'static,
    P: BatchProcessor<T>,
{
    fn deliver(&mut self, elements: Vec<T>) {
        FaultTolerantConsumer::deliver(self, elements);
    }

    fn close(&mut self) {
        FaultTolerantConsumer::close(self);
    }
}

impl<T, P> Drop for FaultTolerantConsumer<T, P>
where
    T: Send + 'static,
    P: BatchProcessor<T>,
{
    fn drop(&mut self) {
        if matches!(self.state, ConsumerState::Running | ConsumerState::Draining) {
            self.close();
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
