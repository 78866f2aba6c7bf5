//! Batch Processor Seam
//!
//! The domain-specific processing step (e.g. transform + persist) plugs into
//! the fault-tolerance layer through the [`BatchProcessor`] trait. Failures
//! are classified at this seam: transient failures are retried with backoff,
//! permanent failures go straight to the dead letter path.

use std::fmt::Debug;

/// Failure classification for one processing attempt
///
/// The retry policy only re-attempts `Transient` failures. A `Permanent`
/// failure skips the remaining retry budget and is dead-lettered directly.
#[derive(Debug, thiserror::Error)]
pub enum ProcessingError {
    #[error("transient processing failure: {0}")]
    Transient(#[source] anyhow::Error),

    #[error("permanent processing failure: {0}")]
    Permanent(#[source] anyhow::Error),
}

impl ProcessingError {
    /// Create a transient (retryable) failure
    pub fn transient<E: Into<anyhow::Error>>(error: E) -> Self {
        Self::Transient(error.into())
    }

    /// Create a permanent (non-retryable) failure
    pub fn permanent<E: Into<anyhow::Error>>(error: E) -> Self {
        Self::Permanent(error.into())
    }

    /// The underlying domain error
    pub fn into_inner(self) -> anyhow::Error {
        match self {
            Self::Transient(e) | Self::Permanent(e) => e,
        }
    }
}

/// Processes one dispatched batch
///
/// Implementations own the domain semantics (writing files, calling services,
/// building columnar output). They must be prepared to see the same batch
/// again after a transient failure; idempotency across retries and crash
/// recovery is the implementer's responsibility.
pub trait BatchProcessor<T>: Send {
    /// Process a single batch
    ///
    /// # Arguments
    /// * `batch` - The elements of the batch, in accumulation order
    ///
    /// # Errors
    /// Returns a classified `ProcessingError` on failure.
    fn process(&mut self, batch: &[T]) -> Result<(), ProcessingError>;
}

/// A batch processor created from a closure
///
/// Convenient for tests and small pipelines that do not warrant a named type.
pub struct ClosureBatchProcessor<T, F>
where
    F: FnMut(&[T]) -> Result<(), ProcessingError> + Send,
{
    processor: F,
    _phantom: std::marker::PhantomData<fn(&T)>,
}

impl<T, F> ClosureBatchProcessor<T, F>
where
    F: FnMut(&[T]) -> Result<(), ProcessingError> + Send,
{
    /// Create a new closure-based batch processor
    pub fn new(processor: F) -> Self {
        Self {
            processor,
            _phantom: std::marker::PhantomData,
        }
    }
}

impl<T, F> BatchProcessor<T> for ClosureBatchProcessor<T, F>
where
    F: FnMut(&[T]) -> Result<(), ProcessingError> + Send,
{
    fn process(&mut self, batch: &[T]) -> Result<(), ProcessingError> {
        (self.processor)(batch)
    }
}
