//! `BatchGuard` - Fault-Tolerant Batch Consumption
//!
//! A fault-tolerance layer for consumers sitting downstream of a
//! high-throughput, Disruptor-style ring buffer. The ring buffer itself is an
//! external collaborator that pushes ordered element groups to registered
//! consumers; this library supplies everything such a consumer needs to
//! survive failures without losing data or disturbing its neighbors.
//!
//! ## Features
//!
//! - **Batching**: Accumulates delivered elements into fixed-size batches,
//!   dispatched FIFO with an explicit flush at shutdown
//! - **Retries**: Exponential-backoff retry loop with a bounded budget and
//!   transient/permanent failure classification
//! - **Dead letter queue**: Durable, append-only record of permanently failed
//!   batches, round-tripping every element for operator reprocessing
//! - **Checkpointing**: Crash-safe progress records written atomically via
//!   write-then-rename
//! - **Graceful shutdown**: A shutdown signal that interrupts in-progress
//!   backoff waits promptly, then drains buffered work
//! - **Isolation**: The delivery entry point absorbs every failure class,
//!   including panics, so nothing escapes into the shared ring buffer
//!
//! ## Quick Start
//!
//! ```rust
//! use batchguard::consumer::{
//!     BatchProcessor, ConsumerConfig, FaultTolerantConsumer, InMemoryCheckpointStore,
//!     InMemoryDeadLetterSink, ProcessingError,
//! };
//!
//! // The domain-specific processing step (e.g. transform + persist)
//! struct Printer;
//!
//! impl BatchProcessor<i64> for Printer {
//!     fn process(&mut self, batch: &[i64]) -> Result<(), ProcessingError> {
//!         println!("processing {} elements", batch.len());
//!         Ok(())
//!     }
//! }
//!
//! let config = ConsumerConfig {
//!     batch_size: 2,
//!     ..Default::default()
//! };
//! let mut consumer = FaultTolerantConsumer::new(
//!     "quickstart",
//!     config,
//!     Printer,
//!     Box::new(InMemoryCheckpointStore::new()),
//!     Box::new(InMemoryDeadLetterSink::new()),
//! )
//! .unwrap();
//!
//! // The ring buffer delivers ordered element groups...
//! consumer.deliver(vec![1, 2, 3]);
//!
//! // ...and shutdown drains the remainder and writes a final checkpoint.
//! consumer.close();
//! assert_eq!(consumer.metrics().processed_count, 3);
//! ```
//!
//! ## Architecture
//!
//! The fault-tolerance layer consists of several key components:
//!
//! - **`BatchAccumulator`**: Buffers incoming elements into fixed-size batches
//! - **`RetryPolicy`**: Exponential-backoff retry with shutdown-aware waits
//! - **`CheckpointStore`**: Durable, atomically replaced progress records
//! - **`DeadLetterSink`**: Append-only storage for permanently failed batches
//! - **`BatchProcessor`**: The seam where domain processing plugs in
//! - **`FaultTolerantConsumer`**: Orchestrates all of the above behind a
//!   single infallible delivery entry point
//!
//! ## Failure Model
//!
//! Transient failures are retried with backoff; permanent failures are
//! dead-lettered and the pipeline continues; panics are caught at the
//! delivery boundary, logged and counted. Only persistence failures
//! (checkpoint or dead-letter writes) are fatal to a consumer identity,
//! because they threaten the recovery and no-data-loss guarantees.

pub mod consumer;

// Re-export the main types for convenience
pub use consumer::{
    BatchAccumulator,
    BatchProcessor,
    // Durable progress
    Checkpoint,
    CheckpointError,
    CheckpointStore,

    ClosureBatchProcessor,
    // Configuration
    ConfigError,
    ConsumerConfig,
    // Error types
    ConsumerError,
    ConsumerMetrics,
    ConsumerState,

    // Dead letter queue
    DeadLetterEntry,
    DeadLetterError,
    DeadLetterSink,
    ErrorCallback,

    // Core types
    FaultTolerantConsumer,
    FileCheckpointStore,
    FileDeadLetterSink,
    InMemoryCheckpointStore,
    InMemoryDeadLetterSink,

    MetricsSnapshot,
    ProcessingError,
    Result,
    // Retry
    RetryError,
    RetryPolicy,

    // Delivery contract
    RingBufferConsumer,
    ShutdownSignal,
    // Constants
    MAX_RETRY_LIMIT,
};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get the version of the `BatchGuard` library
#[must_use]
pub fn version() -> &'static str {
    VERSION
}
