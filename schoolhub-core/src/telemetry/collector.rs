//! In-process counters mirroring the exported metrics

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time view of the counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct TelemetrySnapshot {
    pub operations: u64,
    pub operation_errors: u64,
    pub sync_writes: u64,
    pub sync_failures: u64,
}

/// Counters shared between the engine and the sync worker
#[derive(Debug, Default)]
pub struct TelemetryCollector {
    operations: AtomicU64,
    operation_errors: AtomicU64,
    sync_writes: AtomicU64,
    sync_failures: AtomicU64,
}

impl TelemetryCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_operations(&self) {
        self.operations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_operation_errors(&self) {
        self.operation_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_sync_writes(&self) {
        self.sync_writes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_sync_failures(&self) {
        self.sync_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            operations: self.operations.load(Ordering::Relaxed),
            operation_errors: self.operation_errors.load(Ordering::Relaxed),
            sync_writes: self.sync_writes.load(Ordering::Relaxed),
            sync_failures: self.sync_failures.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collector_counts() {
        let collector = TelemetryCollector::new();
        collector.inc_operations();
        collector.inc_operations();
        collector.inc_operation_errors();
        collector.inc_sync_failures();

        let snapshot = collector.snapshot();
        assert_eq!(snapshot.operations, 2);
        assert_eq!(snapshot.operation_errors, 1);
        assert_eq!(snapshot.sync_writes, 0);
        assert_eq!(snapshot.sync_failures, 1);
    }
}
