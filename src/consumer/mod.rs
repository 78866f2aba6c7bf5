//! Fault-Tolerant Batch Consumption
//!
//! This module layers fault tolerance on top of a Disruptor-style ring
//! buffer: elements delivered by the ring buffer are accumulated into
//! fixed-size batches, each batch is processed with exponential-backoff
//! retries, permanently failed batches are routed to a durable dead letter
//! queue, and progress is checkpointed for crash recovery. The ring buffer
//! itself is an external collaborator modeled as a delivery contract.

pub mod accumulator;
pub mod checkpoint;
pub mod config;
pub mod dead_letter;
pub mod fault_tolerant;
pub mod processor;
pub mod retry;
pub mod shutdown;


pub use accumulator::BatchAccumulator;
pub use checkpoint::{
    Checkpoint, CheckpointError, CheckpointStore, FileCheckpointStore, InMemoryCheckpointStore,
};
pub use config::{ConfigError, ConsumerConfig, MAX_RETRY_LIMIT};
pub use dead_letter::{
    DeadLetterEntry, DeadLetterError, DeadLetterSink, FileDeadLetterSink, InMemoryDeadLetterSink,
};
pub use fault_tolerant::{
    ConsumerMetrics, ConsumerState, ErrorCallback, FaultTolerantConsumer, MetricsSnapshot,
};
pub use processor::{BatchProcessor, ClosureBatchProcessor, ProcessingError};
pub use retry::{RetryError, RetryPolicy};
pub use shutdown::ShutdownSignal;

/// Errors surfaced by consumer construction and operator-facing operations
///
/// Failures on the delivery path itself are absorbed by the consumer and
/// never reach the ring buffer; this type covers the fallible edges only.
#[derive(Debug, thiserror::Error)]
pub enum ConsumerError {
    #[error("invalid configuration: {0}")]
    Config(#[from] config::ConfigError),

    #[error("checkpoint store failure: {0}")]
    Checkpoint(#[from] checkpoint::CheckpointError),

    #[error("dead letter sink failure: {0}")]
    DeadLetter(#[from] dead_letter::DeadLetterError),
}

pub type Result<T> = std::result::Result<T, ConsumerError>;

/// Delivery contract between the external ring buffer and a consumer
///
/// The ring buffer pushes ordered element groups through `deliver`, possibly
/// from a dedicated thread per registered consumer, and calls `close` on
/// shutdown. Implementations must return control promptly and must never
/// propagate failures back into the shared delivery mechanism.
pub trait RingBufferConsumer<T>: Send {
    /// Accept an ordered group of elements
    fn deliver(&mut self, elements: Vec<T>);

    /// Drain buffered work and release resources
    fn close(&mut self);
}
