//! Stress tests for the ledger.
//!
//! These helpers hammer a ledger with concurrent appends from several
//! store replicas sharing one engine, lock service and cache, then verify
//! that every chain came out intact.

use crate::fixtures::sample_event;
use auditor_core::coord::LockOptions;
use auditor_core::engine::{EmbeddedDocumentDb, EmbeddedKeyRangeDb};
use auditor_core::{
    document_store, partitioned_store, AuditEvent, BackendKind, ChainReport, ChainedStore,
    Deadline, LedgerConfig, LedgerResult, SharedServices, Store,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Total operations performed.
    pub total_ops: usize,
    /// Successful operations.
    pub successful_ops: usize,
    /// Failed operations.
    pub failed_ops: usize,
    /// Total duration.
    pub duration: Duration,
    /// Operations per second.
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
        println!("\n=== {} ===", name);
        println!("Total operations: {}", self.total_ops);
        println!("Successful: {}", self.successful_ops);
        println!("Failed: {}", self.failed_ops);
        println!("Duration: {:?}", self.duration);
        println!("Throughput: {:.2} ops/sec", self.ops_per_second);
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Appends per thread.
    pub appends_per_thread: usize,
    /// Number of concurrent threads, each with its own store replica.
    pub threads: usize,
    /// Customers appended to, round-robin. Each is its own chain on a
    /// partitioned backend.
    pub customers: Vec<String>,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            appends_per_thread: 50,
            threads: 4,
            customers: vec!["acme".into(), "globex".into()],
        }
    }
}

/// Outcome of [`stress_concurrent_appends`].
#[derive(Debug, Clone)]
pub struct StressOutcome {
    /// Throughput and failure counts.
    pub result: StressTestResult,
    /// One report per chain: one per customer on a partitioned backend,
    /// a single global chain on a document backend.
    pub reports: Vec<ChainReport>,
}

impl StressOutcome {
    /// Whether every chain verified.
    pub fn all_valid(&self) -> bool {
        self.reports.iter().all(ChainReport::is_valid)
    }

    /// Records checked across all chains.
    pub fn records_checked(&self) -> usize {
        self.reports.iter().map(|r| r.checked).sum()
    }
}

/// Lock policy that outlasts heavy contention.
fn contended_locks() -> LockOptions {
    LockOptions::default()
        .retry_count(100_000)
        .retry_delay(Duration::from_millis(1))
}

/// Builds `count` store replicas over one shared engine and shared
/// services.
pub fn replicas(kind: BackendKind, count: usize) -> LedgerResult<Vec<ChainedStore<AuditEvent>>> {
    let services = SharedServices::in_memory();
    let config = LedgerConfig::new(kind).lock(contended_locks());
    match kind {
        BackendKind::Document => {
            let db = Arc::new(EmbeddedDocumentDb::in_memory());
            (0..count)
                .map(|_| document_store(db.clone(), &config, &services))
                .collect()
        }
        BackendKind::Partitioned => {
            let db = Arc::new(EmbeddedKeyRangeDb::in_memory());
            (0..count)
                .map(|_| partitioned_store(db.clone(), &config, &services))
                .collect()
        }
    }
}

/// Run appends from `config.threads` replicas at once, then verify every
/// chain.
pub fn stress_concurrent_appends(kind: BackendKind, config: &StressConfig) -> StressOutcome {
    let stores = replicas(kind, config.threads).expect("Failed to build replicas");
    let successful = AtomicUsize::new(0);
    let failed = AtomicUsize::new(0);

    let start = Instant::now();
    thread::scope(|s| {
        for (t, store) in stores.iter().enumerate() {
            let successful = &successful;
            let failed = &failed;
            s.spawn(move || {
                for i in 0..config.appends_per_thread {
                    let customer = &config.customers[(t + i) % config.customers.len()];
                    let mut event = sample_event(customer, t * config.appends_per_thread + i);
                    match store.save(&mut event) {
                        Ok(()) => successful.fetch_add(1, Ordering::Relaxed),
                        Err(_) => failed.fetch_add(1, Ordering::Relaxed),
                    };
                }
            });
        }
    });
    let result = StressTestResult::new(
        successful.load(Ordering::Relaxed),
        failed.load(Ordering::Relaxed),
        start.elapsed(),
    );

    let verifier = &stores[0];
    let reports = if kind.is_partitioned() {
        config
            .customers
            .iter()
            .map(|c| verify(verifier, Some(AuditEvent::cursor(c.as_str(), None))))
            .collect()
    } else {
        vec![verify(verifier, None)]
    };

    StressOutcome { result, reports }
}

/// Run `count` appends one after another on `store`.
pub fn stress_sequential_appends(
    store: &ChainedStore<AuditEvent>,
    customer: &str,
    count: usize,
) -> StressTestResult {
    let start = Instant::now();
    let mut successful = 0usize;
    let mut failed = 0usize;

    for i in 0..count {
        match store.save(&mut sample_event(customer, i)) {
            Ok(()) => successful += 1,
            Err(_) => failed += 1,
        }
    }

    StressTestResult::new(successful, failed, start.elapsed())
}

fn verify(store: &ChainedStore<AuditEvent>, scope: Option<AuditEvent>) -> ChainReport {
    store
        .verify(scope.as_ref(), 500, Deadline::never())
        .expect("Failed to read chain for verification")
}
