//! Operation tracing and metrics
//!
//! Every engine operation runs inside an `OperationSpan`: a tracing span
//! carrying the operation name and actor, finished with either a success or
//! an error kind. Counters go both to the `metrics` facade (for whatever
//! recorder the host installs) and to an in-process `TelemetryCollector`.

use crate::core_store::model::{PersonId, Role};
use crate::error::CoreError;
use metrics::{counter, describe_counter, describe_histogram, histogram};
use std::sync::Arc;
use std::time::Instant;
use tracing::{span, Level, Span};

mod collector;

pub use collector::{TelemetryCollector, TelemetrySnapshot};

pub const OPERATIONS_TOTAL: &str = "schoolhub_operations_total";
pub const OPERATION_ERRORS_TOTAL: &str = "schoolhub_operation_errors_total";
pub const OPERATION_DURATION_MS: &str = "schoolhub_operation_duration_ms";
pub const SYNC_FAILURES_TOTAL: &str = "schoolhub_sync_failures_total";

/// Register metric descriptions with the installed recorder
pub fn init_metrics() {
    describe_counter!(OPERATIONS_TOTAL, "Engine operations started");
    describe_counter!(OPERATION_ERRORS_TOTAL, "Engine operations that returned an error");
    describe_histogram!(OPERATION_DURATION_MS, "Engine operation duration in milliseconds");
    describe_counter!(SYNC_FAILURES_TOTAL, "Failed local or remote persistence attempts");
}

/// Count one failed persistence attempt
pub fn record_sync_failure(collector: &TelemetryCollector, target: &'static str) {
    counter!(SYNC_FAILURES_TOTAL, "target" => target).increment(1);
    collector.inc_sync_failures();
}

/// Span around a single engine operation
pub struct OperationSpan {
    span: Span,
    name: &'static str,
    start: Instant,
    collector: Arc<TelemetryCollector>,
}

impl OperationSpan {
    /// Start an operation with no known actor yet
    pub fn start(name: &'static str, collector: Arc<TelemetryCollector>) -> Self {
        let span = span!(
            Level::INFO,
            "operation",
            name = name,
            actor = tracing::field::Empty,
            role = tracing::field::Empty
        );
        counter!(OPERATIONS_TOTAL, "operation" => name).increment(1);
        collector.inc_operations();

        OperationSpan {
            span,
            name,
            start: Instant::now(),
            collector,
        }
    }

    /// Attach the authenticated caller
    pub fn record_actor(&self, actor: &PersonId, role: Role) {
        self.span.record("actor", tracing::field::display(actor));
        self.span.record("role", role.as_str());
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Close the span with the operation's result
    pub fn finish<T>(self, result: &Result<T, CoreError>) {
        let elapsed = self.start.elapsed();
        histogram!(OPERATION_DURATION_MS, "operation" => self.name)
            .record(elapsed.as_secs_f64() * 1000.0);

        match result {
            Ok(_) => {
                tracing::debug!(
                    parent: &self.span,
                    duration_ms = elapsed.as_millis() as u64,
                    "operation completed"
                );
            }
            Err(err) => {
                counter!(OPERATION_ERRORS_TOTAL, "operation" => self.name, "kind" => err.kind())
                    .increment(1);
                self.collector.inc_operation_errors();
                tracing::info!(
                    parent: &self.span,
                    duration_ms = elapsed.as_millis() as u64,
                    error = %err,
                    "operation failed"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_span_counts_errors() {
        let collector = Arc::new(TelemetryCollector::new());

        let op = OperationSpan::start("login", collector.clone());
        op.record_actor(&PersonId::new("p1"), Role::Teacher);
        op.finish::<()>(&Ok(()));

        let op = OperationSpan::start("login", collector.clone());
        op.finish::<()>(&Err(CoreError::validation("bad")));

        let snapshot = collector.snapshot();
        assert_eq!(snapshot.operations, 2);
        assert_eq!(snapshot.operation_errors, 1);
    }

    #[test]
    fn test_sync_failure_recorded() {
        let collector = TelemetryCollector::new();
        record_sync_failure(&collector, "remote");
        assert_eq!(collector.snapshot().sync_failures, 1);
    }
}
