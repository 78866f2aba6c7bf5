//! Batch Accumulator
//!
//! Buffers elements delivered by the ring buffer into fixed-size batches.
//! Elements are kept in delivery order; full batches are drained FIFO and a
//! partial remainder is only released by an explicit `flush` at shutdown.

use crate::consumer::config::ConfigError;
use std::collections::VecDeque;

/// Accumulates incoming elements into fixed-size batches
///
/// The accumulator is owned exclusively by one consumer and mutated only from
/// that consumer's execution context, so it carries no internal locking.
#[derive(Debug)]
pub struct BatchAccumulator<T> {
    buffer: VecDeque<T>,
    batch_size: usize,
}

impl<T> BatchAccumulator<T> {
    /// Create a new accumulator
    ///
    /// # Errors
    /// Returns `ConfigError::InvalidBatchSize` if `batch_size` is zero.
    pub fn new(batch_size: usize) -> Result<Self, ConfigError> {
        if batch_size == 0 {
            return Err(ConfigError::InvalidBatchSize(batch_size));
        }
        Ok(Self {
            buffer: VecDeque::new(),
            batch_size,
        })
    }

    /// Append elements and drain any full batches
    ///
    /// Appends the delivered elements to the internal buffer, then removes and
    /// returns every complete batch of exactly `batch_size` elements in FIFO
    /// order. Elements beyond the last full batch stay buffered.
    pub fn accept(&mut self, elements: Vec<T>) -> Vec<Vec<T>> {
        self.buffer.extend(elements);

        let mut batches = Vec::new();
        while self.buffer.len() >= self.batch_size {
            batches.push(self.buffer.drain(..self.batch_size).collect());
        }
        batches
    }

    /// Drain the remainder as a final, possibly short, batch
    ///
    /// Returns `None` when the buffer is empty, which makes repeated flushes
    /// at shutdown a no-op.
    pub fn flush(&mut self) -> Option<Vec<T>> {
        if self.buffer.is_empty() {
            return None;
        }
        Some(self.buffer.drain(..).collect())
    }

    /// Number of elements currently buffered
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// True when no elements are buffered
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// The configured batch size
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_batch_size_rejected() {
        assert!(BatchAccumulator::<i32>::new(0).is_err());
    }

    #[test]
    fn test_partial_buffer_emits_nothing() {
        let mut acc = BatchAccumulator::new(3).unwrap();
        let batches = acc.accept(vec![1, 2]);
        assert!(batches.is_empty());
        assert_eq!(acc.len(), 2);
    }

    #[test]
    fn test_full_batch_with_remainder() {
        // batch_size=3, elements [A,B,C,D,E] -> one batch [A,B,C], [D,E] buffered
        let mut acc = BatchAccumulator::new(3).unwrap();
        let batches = acc.accept(vec!["A", "B", "C", "D", "E"]);

        assert_eq!(batches, vec![vec!["A", "B", "C"]]);
        assert_eq!(acc.len(), 2);

        let remainder = acc.flush();
        assert_eq!(remainder, Some(vec!["D", "E"]));
    }

    #[test]
    fn test_multiple_batches_in_one_delivery() {
        let mut acc = BatchAccumulator::new(2).unwrap();
        let batches = acc.accept(vec![1, 2, 3, 4, 5]);

        assert_eq!(batches, vec![vec![1, 2], vec![3, 4]]);
        assert_eq!(acc.len(), 1);
    }

    #[test]
    fn test_batches_preserve_delivery_order_across_calls() {
        let mut acc = BatchAccumulator::new(4).unwrap();
        assert!(acc.accept(vec![1, 2, 3]).is_empty());
        let batches = acc.accept(vec![4, 5]);

        assert_eq!(batches, vec![vec![1, 2, 3, 4]]);
        assert_eq!(acc.flush(), Some(vec![5]));
    }

    #[test]
    fn test_flush_on_empty_is_noop() {
        let mut acc = BatchAccumulator::<i32>::new(3).unwrap();
        assert_eq!(acc.flush(), None);
    }

    #[test]
    fn test_flush_is_idempotent() {
        let mut acc = BatchAccumulator::new(10).unwrap();
        acc.accept(vec![1, 2, 3]);

        assert_eq!(acc.flush(), Some(vec![1, 2, 3]));
        assert_eq!(acc.flush(), None);
        assert!(acc.is_empty());
    }

    #[test]
    fn test_exact_multiple_leaves_empty_buffer() {
        let mut acc = BatchAccumulator::new(2).unwrap();
        let batches = acc.accept(vec![1, 2, 3, 4]);

        assert_eq!(batches.len(), 2);
        assert!(acc.is_empty());
        assert_eq!(acc.flush(), None);
    }
}
