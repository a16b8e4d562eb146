use metrics::{Counter, Histogram};
use metrics_derive::Metrics;

/// Metrics for a [`Batcher`](crate::batcher::Batcher).
#[derive(Metrics)]
#[metrics(scope = "batcher")]
pub(crate) struct BatcherMetrics {
    /// Number of announcements appended to live batches.
    pub appended: Counter,
    /// Number of batches flushed and confirmed.
    pub flushed: Counter,
    /// Number of announcements submitted in confirmed batches.
    pub flushed_items: Counter,
    /// Number of batches that failed terminally.
    pub failed: Counter,
    /// Number of flushes triggered by the size threshold.
    pub size_triggered: Counter,
    /// Number of flushes triggered by the age timer.
    pub time_triggered: Counter,
    /// Number of flushes triggered by the shutdown drain.
    pub shutdown_triggered: Counter,
    /// Time from flush to confirmed inclusion, in milliseconds.
    pub flush_time: Histogram,
}
