use commonware_runtime::Metrics as RuntimeMetrics;
use prometheus_client::metrics::{counter::Counter, gauge::Gauge};

/// Metrics for the [super::Engine].
#[derive(Default)]
pub struct Metrics {
    /// Number of batches currently pending completion
    pub pending: Gauge,
    /// Number of batches completed
    pub completed: Counter,
    /// Number of batches expired
    pub expired: Counter,
    /// Number of signatures dropped for failing verification
    pub rejected_signatures: Counter,
    /// Number of local submissions rejected as malformed or over capacity
    pub rejected_submissions: Counter,
    /// Number of peer states merged
    pub merges: Counter,
    /// Number of peer batches dropped as malformed or over capacity
    pub dropped_batches: Counter,
}

impl Metrics {
    /// Create and return a new set of metrics, registered with the given context.
    pub fn init<E: RuntimeMetrics>(context: &E) -> Self {
        let metrics = Self::default();
        context.register(
            "pending",
            "Number of batches currently pending completion",
            metrics.pending.clone(),
        );
        context.register(
            "completed",
            "Number of batches completed",
            metrics.completed.clone(),
        );
        context.register(
            "expired",
            "Number of batches expired",
            metrics.expired.clone(),
        );
        context.register(
            "rejected_signatures",
            "Number of signatures dropped for failing verification",
            metrics.rejected_signatures.clone(),
        );
        context.register(
            "rejected_submissions",
            "Number of local submissions rejected as malformed or over capacity",
            metrics.rejected_submissions.clone(),
        );
        context.register(
            "merges",
            "Number of peer states merged",
            metrics.merges.clone(),
        );
        context.register(
            "dropped_batches",
            "Number of peer batches dropped as malformed or over capacity",
            metrics.dropped_batches.clone(),
        );
        metrics
    }
}
