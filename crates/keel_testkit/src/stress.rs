//! Stress tests for Keel.
//!
//! These runs drive many short transactions at shared counters. Lock and
//! buffer timeouts are expected under contention: the harness rolls the
//! transaction back, backs off and retries.

use keel_core::{CoreError, CoreResult, Database, Transaction};
use keel_storage::BlockId;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// File holding the stress counters.
pub const COUNTER_FILE: &str = "counters.tbl";

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Total transactions attempted.
    pub total_ops: usize,
    /// Transactions that committed.
    pub successful_ops: usize,
    /// Transactions that timed out and were rolled back.
    pub failed_ops: usize,
    /// Total duration.
    pub duration: Duration,
    /// Attempts per second.
    pub ops_per_second: f64,
}

impl StressTestResult {
    /// Creates a new result.
    pub fn new(successful: usize, failed: usize, duration: Duration) -> Self {
        let total = successful + failed;
        let ops_per_second = if duration.as_secs_f64() > 0.0 {
            total as f64 / duration.as_secs_f64()
        } else {
            0.0
        };

        Self {
            total_ops: total,
            successful_ops: successful,
            failed_ops: failed,
            duration,
            ops_per_second,
        }
    }

    /// Prints a summary of the test.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {name} ===");
        println!("Attempts: {}", self.total_ops);
        println!("Committed: {}", self.successful_ops);
        println!("Timed out: {}", self.failed_ops);
        println!("Duration: {:?}", self.duration);
        println!("Throughput: {:.2} attempts/sec", self.ops_per_second);
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Committed increments each thread performs.
    pub operations: usize,
    /// Number of concurrent threads.
    pub threads: usize,
    /// Number of distinct counters (one per block).
    pub counters: u32,
    /// Largest backoff after a timeout.
    pub max_backoff: Duration,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            operations: 100,
            threads: 4,
            counters: 1,
            max_backoff: Duration::from_millis(20),
        }
    }
}

/// Returns the block holding counter `index`.
pub fn counter_block(index: u32) -> BlockId {
    BlockId::new(COUNTER_FILE, index)
}

/// Adds one to the counter in `block` inside `tx`, returning the new value.
///
/// # Errors
///
/// Returns any error from the transaction, including lock timeouts.
pub fn increment(tx: &mut Transaction, block: &BlockId) -> CoreResult<i32> {
    tx.pin(block)?;
    let value = tx.get_int(block, 0)? + 1;
    tx.set_int(block, 0, value, true)?;
    tx.unpin(block)?;
    Ok(value)
}

/// Reads the committed value of every counter.
///
/// # Errors
///
/// Returns any error from the reading transaction.
pub fn read_counters(db: &Database, counters: u32) -> CoreResult<Vec<i32>> {
    let mut tx = db.begin()?;
    let mut values = Vec::with_capacity(counters as usize);
    for index in 0..counters {
        let block = counter_block(index);
        tx.pin(&block)?;
        values.push(tx.get_int(&block, 0)?);
        tx.unpin(&block)?;
    }
    tx.commit()?;
    Ok(values)
}

/// Runs one increment transaction until it commits.
///
/// Returns how many attempts timed out first. Errors other than timeouts
/// are returned after rolling the transaction back.
fn increment_until_committed(
    db: &Database,
    block: &BlockId,
    seed: usize,
    max_backoff: Duration,
) -> CoreResult<usize> {
    let mut timeouts = 0;
    loop {
        let mut tx = db.begin()?;
        match increment(&mut tx, block).and_then(|_| tx.commit()) {
            Ok(()) => return Ok(timeouts),
            Err(e) if e.is_timeout() => {
                tx.rollback()?;
                timeouts += 1;
                thread::sleep(backoff(seed, timeouts, max_backoff));
            }
            Err(e) => {
                if tx.is_active() {
                    tx.rollback()?;
                }
                return Err(e);
            }
        }
    }
}

// Spreads retries so that deadlocked upgraders do not collide again.
fn backoff(seed: usize, attempt: usize, max: Duration) -> Duration {
    let max_ms = max.as_millis().max(1) as usize;
    let spread = seed.wrapping_mul(31).wrapping_add(attempt.wrapping_mul(17));
    Duration::from_millis((spread % max_ms) as u64 + 1)
}

/// Runs single-threaded increments spread over every counter.
///
/// # Errors
///
/// Returns the first non-timeout error.
pub fn stress_sequential_increments(db: &Database, config: &StressConfig) -> CoreResult<StressTestResult> {
    let start = Instant::now();
    let mut failed = 0usize;

    for i in 0..config.operations {
        let block = counter_block(i as u32 % config.counters.max(1));
        failed += increment_until_committed(db, &block, i, config.max_backoff)?;
    }

    Ok(StressTestResult::new(config.operations, failed, start.elapsed()))
}

/// Runs increments from several threads against shared counters.
///
/// Every committed increment must be visible afterwards: the counters sum to
/// `threads * operations`.
///
/// # Errors
///
/// Returns the first non-timeout error any thread hit.
pub fn stress_concurrent_increments(
    db: Arc<Database>,
    config: &StressConfig,
) -> CoreResult<StressTestResult> {
    let successful = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));
    let counters = config.counters.max(1);

    let start = Instant::now();
    let handles: Vec<_> = (0..config.threads)
        .map(|thread_id| {
            let db = Arc::clone(&db);
            let successful = Arc::clone(&successful);
            let failed = Arc::clone(&failed);
            let operations = config.operations;
            let max_backoff = config.max_backoff;

            thread::spawn(move || -> CoreResult<()> {
                for i in 0..operations {
                    let block = counter_block((thread_id + i) as u32 % counters);
                    let seed = thread_id * operations + i;
                    let timeouts = increment_until_committed(&db, &block, seed, max_backoff)?;
                    failed.fetch_add(timeouts, Ordering::Relaxed);
                    successful.fetch_add(1, Ordering::Relaxed);
                }
                Ok(())
            })
        })
        .collect();

    for handle in handles {
        handle
            .join()
            .map_err(|_| CoreError::invalid_format("stress thread panicked"))??;
    }

    Ok(StressTestResult::new(
        successful.load(Ordering::Relaxed),
        failed.load(Ordering::Relaxed),
        start.elapsed(),
    ))
}

/// Alternates committed and rolled-back increments on one counter.
///
/// Only the committed half may be visible afterwards.
///
/// # Errors
///
/// Returns any error from the transactions.
pub fn stress_rollbacks(db: &Database, config: &StressConfig) -> CoreResult<StressTestResult> {
    let block = counter_block(0);
    let start = Instant::now();
    let mut committed = 0usize;
    let mut rolled_back = 0usize;

    for i in 0..config.operations {
        let mut tx = db.begin()?;
        increment(&mut tx, &block)?;
        if i % 2 == 0 {
            tx.commit()?;
            committed += 1;
        } else {
            tx.rollback()?;
            rolled_back += 1;
        }
    }

    Ok(StressTestResult::new(committed, rolled_back, start.elapsed()))
}
