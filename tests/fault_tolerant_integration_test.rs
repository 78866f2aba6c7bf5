#![allow(
    missing_docs,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    clippy::cargo
)]

//! Integration tests for the fault-tolerant consumer
//!
//! These tests exercise the full deliver -> batch -> retry -> DLQ -> checkpoint
//! path against real file-backed stores.

use batchguard::consumer::{
    BatchProcessor, ConsumerConfig, ConsumerState, FaultTolerantConsumer, FileCheckpointStore,
    FileDeadLetterSink, ProcessingError, RingBufferConsumer,
};
use batchguard::CheckpointStore;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Route consumer log output through the test harness capture
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_target(false)
        .try_init();
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Record {
    id: u64,
    name: String,
    amount: f64,
}

fn record(id: u64) -> Record {
    Record {
        id,
        name: format!("user_{id}"),
        amount: id as f64 * 1.5,
    }
}

fn config(data_dir: &std::path::Path, batch_size: usize) -> ConsumerConfig {
    ConsumerConfig {
        batch_size,
        max_retries: 2,
        base_delay: Duration::from_millis(20),
        checkpoint_interval: 1,
        enable_dead_letter: true,
        data_dir: data_dir.to_path_buf(),
    }
}

struct CountingProcessor {
    processed: Arc<Mutex<Vec<Vec<Record>>>>,
}

impl BatchProcessor<Record> for CountingProcessor {
    fn process(&mut self, batch: &[Record]) -> Result<(), ProcessingError> {
        self.processed.lock().push(batch.to_vec());
        Ok(())
    }
}

#[test]
fn test_crash_and_restart_resumes_from_checkpoint() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();

    // First run: two full batches checkpointed, then a simulated crash
    // (no close, Drop suppressed).
    {
        let mut consumer = FaultTolerantConsumer::with_file_stores(
            "resumable",
            config(dir.path(), 2),
            CountingProcessor {
                processed: Arc::new(Mutex::new(Vec::new())),
            },
        )
        .unwrap();
        consumer.deliver(vec![record(1), record(2), record(3), record(4)]);
        assert_eq!(consumer.metrics().last_batch_number, 2);
        std::mem::forget(consumer);
    }

    // Restart: counters are seeded from the durable checkpoint, so no
    // successfully checkpointed batch is ever re-counted.
    let mut consumer = FaultTolerantConsumer::with_file_stores(
        "resumable",
        config(dir.path(), 2),
        CountingProcessor {
            processed: Arc::new(Mutex::new(Vec::new())),
        },
    )
    .unwrap();

    let resumed = consumer.metrics();
    assert_eq!(resumed.processed_count, 4);
    assert_eq!(resumed.last_batch_number, 2);

    consumer.deliver(vec![record(5), record(6)]);
    let after = consumer.metrics();
    assert_eq!(after.processed_count, 6);
    assert_eq!(after.last_batch_number, 3);
    assert!(after.processed_count >= resumed.processed_count);
}

#[test]
fn test_always_failing_batch_lands_verbatim_in_dlq_once() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();

    let mut consumer = FaultTolerantConsumer::with_file_stores(
        "doomed",
        config(dir.path(), 3),
        batchguard::ClosureBatchProcessor::new(|batch: &[Record]| {
            if batch.iter().any(|r| r.id == 13) {
                Err(ProcessingError::transient(anyhow::anyhow!(
                    "downstream rejected batch"
                )))
            } else {
                Ok(())
            }
        }),
    )
    .unwrap();

    let poisoned = vec![record(13), record(14), record(15)];
    consumer.deliver(poisoned.clone());
    consumer.deliver(vec![record(1), record(2), record(3)]);

    // Exactly one entry, payload round-trips byte for byte
    let sink = FileDeadLetterSink::new(dir.path());
    let entries: Vec<batchguard::DeadLetterEntry<Record>> =
        batchguard::DeadLetterSink::list(&sink, "doomed").unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].data, poisoned);
    assert_eq!(entries[0].batch_size, 3);
    assert!(entries[0].error.contains("downstream rejected batch"));

    // Subsequent batches were still processed
    let m = consumer.metrics();
    assert_eq!(m.processed_count, 3);
    assert_eq!(m.error_count, 1);
    assert_eq!(m.dead_letter_count, 1);
    // max_retries = 2 backoff retries were spent on the poisoned batch
    assert_eq!(m.retry_count, 2);
}

#[test]
fn test_transient_failures_recover_with_backoff_ladder() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let base = Duration::from_millis(40);

    let attempts = Arc::new(Mutex::new(Vec::new()));
    let attempts_clone = attempts.clone();
    let start = Instant::now();

    let mut consumer = FaultTolerantConsumer::with_file_stores(
        "flaky",
        ConsumerConfig {
            max_retries: 3,
            base_delay: base,
            ..config(dir.path(), 2)
        },
        batchguard::ClosureBatchProcessor::new(move |_: &[Record]| {
            let mut seen = attempts_clone.lock();
            seen.push(start.elapsed());
            // Fail twice, then succeed
            if seen.len() < 3 {
                Err(ProcessingError::transient(anyhow::anyhow!("not yet")))
            } else {
                Ok(())
            }
        }),
    )
    .unwrap();

    consumer.deliver(vec![record(1), record(2)]);

    let seen = attempts.lock();
    assert_eq!(seen.len(), 3);
    // Waits of base and 2*base between attempts, within timing tolerance
    let first_gap = seen[1] - seen[0];
    let second_gap = seen[2] - seen[1];
    assert!(first_gap >= base && first_gap < base * 4);
    assert!(second_gap >= base * 2 && second_gap < base * 8);
    drop(seen);

    // Recovered: processed, nothing dead-lettered
    let m = consumer.metrics();
    assert_eq!(m.processed_count, 2);
    assert_eq!(m.dead_letter_count, 0);
    assert_eq!(m.retry_count, 2);
}

#[test]
fn test_exhausted_retries_follow_exact_schedule() {
    init_tracing();
    // max_retries=2, base_delay=50ms: attempts at t=0, t=50ms, t=150ms,
    // then the batch is dead-lettered with its exact contents.
    let dir = tempfile::tempdir().unwrap();
    let base = Duration::from_millis(50);

    let attempts = Arc::new(Mutex::new(Vec::new()));
    let attempts_clone = attempts.clone();
    let start = Instant::now();

    let mut consumer = FaultTolerantConsumer::with_file_stores(
        "exhausted",
        ConsumerConfig {
            max_retries: 2,
            base_delay: base,
            ..config(dir.path(), 2)
        },
        batchguard::ClosureBatchProcessor::new(move |_: &[Record]| {
            attempts_clone.lock().push(start.elapsed());
            Err(ProcessingError::transient(anyhow::anyhow!("hard down")))
        }),
    )
    .unwrap();

    let batch = vec![record(7), record(8)];
    consumer.deliver(batch.clone());

    let seen = attempts.lock();
    assert_eq!(seen.len(), 3);
    assert!(seen[0] < Duration::from_millis(25));
    assert!(seen[1] >= base && seen[1] < base * 3);
    assert!(seen[2] >= base * 3 && seen[2] < base * 7);
    drop(seen);

    let sink = FileDeadLetterSink::new(dir.path());
    let entries: Vec<batchguard::DeadLetterEntry<Record>> =
        batchguard::DeadLetterSink::list(&sink, "exhausted").unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].data, batch);
}

#[test]
fn test_accumulator_scenario_through_consumer() {
    init_tracing();
    // batch_size=3, deliver [A,B,C,D,E]: one batch [A,B,C] processed,
    // [D,E] stays buffered until close() drains it.
    let dir = tempfile::tempdir().unwrap();
    let processed = Arc::new(Mutex::new(Vec::new()));

    let mut consumer = FaultTolerantConsumer::with_file_stores(
        "letters",
        config(dir.path(), 3),
        batchguard::ClosureBatchProcessor::new({
            let processed = processed.clone();
            move |batch: &[String]| {
                processed.lock().push(batch.to_vec());
                Ok(())
            }
        }),
    )
    .unwrap();

    consumer.deliver(
        ["A", "B", "C", "D", "E"]
            .into_iter()
            .map(String::from)
            .collect(),
    );
    assert_eq!(processed.lock().len(), 1);
    assert_eq!(processed.lock()[0], vec!["A", "B", "C"]);

    consumer.close();
    assert_eq!(processed.lock().len(), 2);
    assert_eq!(processed.lock()[1], vec!["D", "E"]);
    assert_eq!(consumer.metrics().processed_count, 5);
}

#[test]
fn test_final_checkpoint_written_on_close() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();

    let mut consumer = FaultTolerantConsumer::with_file_stores(
        "closer",
        ConsumerConfig {
            // Large interval: only the drain-time save should happen
            checkpoint_interval: 1000,
            ..config(dir.path(), 2)
        },
        batchguard::ClosureBatchProcessor::new(|_: &[Record]| Ok(())),
    )
    .unwrap();

    consumer.deliver(vec![record(1), record(2), record(3)]);
    let store = FileCheckpointStore::new(dir.path());
    assert_eq!(store.load("closer").unwrap(), None);

    consumer.close();
    let cp = store.load("closer").unwrap().unwrap();
    assert_eq!(cp.processed_count, 3);
    assert_eq!(cp.last_batch_number, 2);
}

#[test]
fn test_consumer_usable_through_delivery_trait() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let processed = Arc::new(Mutex::new(Vec::new()));

    let consumer = FaultTolerantConsumer::with_file_stores(
        "registered",
        config(dir.path(), 2),
        CountingProcessor {
            processed: processed.clone(),
        },
    )
    .unwrap();

    // How a ring buffer would hold a registered consumer
    let mut registered: Box<dyn RingBufferConsumer<Record>> = Box::new(consumer);
    registered.deliver(vec![record(1), record(2), record(3)]);
    registered.close();

    assert_eq!(processed.lock().len(), 2);
}

#[test]
fn test_identities_do_not_interfere() {
    init_tracing();
    // Two consumer identities sharing one data_dir, each on its own thread,
    // checkpoint and dead-letter independently.
    let dir = tempfile::tempdir().unwrap();
    let store = FileCheckpointStore::new(dir.path());

    let mut handles = Vec::new();
    for name in ["worker-a", "worker-b"] {
        let cfg = config(dir.path(), 2);
        handles.push(thread::spawn(move || {
            let mut consumer = FaultTolerantConsumer::with_file_stores(
                name,
                cfg,
                batchguard::ClosureBatchProcessor::new(|_: &[Record]| Ok(())),
            )
            .unwrap();
            for i in 0..10 {
                consumer.deliver(vec![record(i), record(i + 100)]);
            }
            consumer.close();
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    for name in ["worker-a", "worker-b"] {
        let cp = store.load(name).unwrap().unwrap();
        assert_eq!(cp.processed_count, 20);
        assert_eq!(cp.last_batch_number, 10);
    }
}

#[test]
fn test_shutdown_signal_aborts_long_backoff() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let healthy = Arc::new(AtomicBool::new(false));
    let healthy_clone = healthy.clone();

    let mut consumer = FaultTolerantConsumer::with_file_stores(
        "stuck",
        ConsumerConfig {
            base_delay: Duration::from_secs(60),
            ..config(dir.path(), 1)
        },
        batchguard::ClosureBatchProcessor::new(move |_: &[Record]| {
            if healthy_clone.load(Ordering::SeqCst) {
                Ok(())
            } else {
                Err(ProcessingError::transient(anyhow::anyhow!("outage")))
            }
        }),
    )
    .unwrap();

    let signal = consumer.shutdown_signal();
    let trigger = thread::spawn(move || {
        thread::sleep(Duration::from_millis(100));
        signal.trigger();
    });

    // Without the signal this delivery would park for 60 seconds.
    let start = Instant::now();
    consumer.deliver(vec![record(1)]);
    assert!(start.elapsed() < Duration::from_secs(10));
    trigger.join().unwrap();

    // The interrupted batch was preserved durably
    let sink = FileDeadLetterSink::new(dir.path());
    let entries: Vec<batchguard::DeadLetterEntry<Record>> =
        batchguard::DeadLetterSink::list(&sink, "stuck").unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].data, vec![record(1)]);

    assert_eq!(consumer.state(), ConsumerState::Running);
    consumer.close();
    assert_eq!(consumer.state(), ConsumerState::Closed);
}
