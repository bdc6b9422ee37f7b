//! Metrics registry for the gateway
//!
//! - Counters only
//! - Monotonic increase
//! - Reset only on process start

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Operational counters shared by the proxy chain and the HTTP layer
///
/// All counters use Relaxed atomics; exact cross-counter consistency is not
/// required.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    operations_executed: AtomicU64,
    operations_rejected: AtomicU64,
    operations_failed: AtomicU64,
    bytes_read: AtomicU64,
    bytes_written: AtomicU64,
    transactions_begun: AtomicU64,
    transactions_committed: AtomicU64,
    transactions_rolled_back: AtomicU64,
    archives_streamed: AtomicU64,
    archives_aborted: AtomicU64,
}

impl MetricsRegistry {
    /// Create a new metrics registry with all counters at zero
    pub fn new() -> Self {
        Self::default()
    }

    // Operations

    pub fn increment_operations_executed(&self) {
        self.operations_executed.fetch_add(1, Ordering::Relaxed);
    }

    /// Refused by authorization or validation
    pub fn increment_operations_rejected(&self) {
        self.operations_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Failed inside the backend
    pub fn increment_operations_failed(&self) {
        self.operations_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_bytes_read(&self, bytes: u64) {
        self.bytes_read.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn add_bytes_written(&self, bytes: u64) {
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    // Transactions

    pub fn increment_transactions_begun(&self) {
        self.transactions_begun.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_transactions_committed(&self) {
        self.transactions_committed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_transactions_rolled_back(&self) {
        self.transactions_rolled_back.fetch_add(1, Ordering::Relaxed);
    }

    // Archives

    pub fn increment_archives_streamed(&self) {
        self.archives_streamed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_archives_aborted(&self) {
        self.archives_aborted.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current snapshot of all metrics as JSON
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self.snapshot()).unwrap_or_default()
    }

    /// Get all metrics as a snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            operations_executed: self.operations_executed.load(Ordering::Relaxed),
            operations_rejected: self.operations_rejected.load(Ordering::Relaxed),
            operations_failed: self.operations_failed.load(Ordering::Relaxed),
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            transactions_begun: self.transactions_begun.load(Ordering::Relaxed),
            transactions_committed: self.transactions_committed.load(Ordering::Relaxed),
            transactions_rolled_back: self.transactions_rolled_back.load(Ordering::Relaxed),
            archives_streamed: self.archives_streamed.load(Ordering::Relaxed),
            archives_aborted: self.archives_aborted.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time snapshot of all metrics
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub operations_executed: u64,
    pub operations_rejected: u64,
    pub operations_failed: u64,
    pub bytes_read: u64,
    pub bytes_written: u64,
    pub transactions_begun: u64,
    pub transactions_committed: u64,
    pub transactions_rolled_back: u64,
    pub archives_streamed: u64,
    pub archives_aborted: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_registry_has_zero_values() {
        let snapshot = MetricsRegistry::new().snapshot();
        assert_eq!(snapshot.operations_executed, 0);
        assert_eq!(snapshot.bytes_read, 0);
        assert_eq!(snapshot.archives_streamed, 0);
    }

    #[test]
    fn test_increment_counters() {
        let registry = MetricsRegistry::new();

        registry.increment_operations_executed();
        registry.increment_operations_executed();
        registry.increment_operations_rejected();
        registry.add_bytes_written(10);
        registry.add_bytes_written(5);
        registry.increment_transactions_begun();
        registry.increment_transactions_committed();

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.operations_executed, 2);
        assert_eq!(snapshot.operations_rejected, 1);
        assert_eq!(snapshot.bytes_written, 15);
        assert_eq!(snapshot.transactions_begun, 1);
        assert_eq!(snapshot.transactions_committed, 1);
        assert_eq!(snapshot.transactions_rolled_back, 0);
    }

    #[test]
    fn test_to_json() {
        let registry = MetricsRegistry::new();
        registry.add_bytes_read(1234);

        let json = registry.to_json();
        assert_eq!(json["bytes_read"], 1234);
        assert_eq!(json["operations_failed"], 0);
    }

    #[test]
    fn test_thread_safety() {
        use std::sync::Arc;
        use std::thread;

        let registry = Arc::new(MetricsRegistry::new());
        let mut handles = vec![];

        for _ in 0..10 {
            let reg = Arc::clone(&registry);
            handles.push(thread::spawn(move || {
                for _ in 0..100 {
                    reg.increment_operations_executed();
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(registry.snapshot().operations_executed, 1000);
    }
}
