//! Recording facade over the raw Prometheus metrics.
//!
//! Every method is a no-op until [`init_metrics`](super::init_metrics) has
//! run, so library users that never export metrics pay nothing.

use super::prometheus::{
    BATCHES_SCORED, BATCH_SIZE, CANDIDATES_GENERATED, CANDIDATES_MERGED, GENERATIONS_IN_PROGRESS,
    GENERATIONS_TOTAL, GENERATION_DURATION, ITEMS_ACCEPTED, ITEMS_FILTERED, ITEM_SCORE,
    SCORER_LATENCY,
};

/// Filter stage an exclusion happened at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterStage {
    Inner,
    After,
}

impl FilterStage {
    fn label(&self) -> &'static str {
        match self {
            FilterStage::Inner => "inner",
            FilterStage::After => "after",
        }
    }
}

/// Metrics collector for recording generation metrics.
///
/// # Example
///
/// ```ignore
/// use itemforge::metrics::{init_metrics, MetricsCollector};
///
/// init_metrics().expect("Failed to init metrics");
/// let collector = MetricsCollector::new();
/// collector.record_batch("linear", 64, 0.012);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MetricsCollector;

impl MetricsCollector {
    /// Create a new MetricsCollector instance.
    pub fn new() -> Self {
        Self
    }

    /// Record the candidates one strategy returned.
    pub fn record_generated(&self, strategy: &str, count: usize) {
        if let Some(generated) = CANDIDATES_GENERATED.get() {
            generated
                .with_label_values(&[strategy])
                .inc_by(count as f64);
        }

        tracing::trace!(
            strategy = strategy,
            count = count,
            "Recorded generated candidates metric"
        );
    }

    /// Record candidates merged into tracked duplicates.
    pub fn record_merged(&self, count: usize) {
        if let Some(merged) = CANDIDATES_MERGED.get() {
            merged.inc_by(count as f64);
        }

        tracing::trace!(count = count, "Recorded merged candidates metric");
    }

    /// Record one scored batch.
    ///
    /// # Arguments
    ///
    /// * `scorer` - Scorer name
    /// * `size` - Number of items in the batch
    /// * `latency_secs` - Scorer call latency in seconds
    pub fn record_batch(&self, scorer: &str, size: usize, latency_secs: f64) {
        if let Some(batches) = BATCHES_SCORED.get() {
            batches.with_label_values(&[scorer]).inc();
        }

        if let Some(latency) = SCORER_LATENCY.get() {
            latency.with_label_values(&[scorer]).observe(latency_secs);
        }

        if let Some(batch_size) = BATCH_SIZE.get() {
            batch_size.observe(size as f64);
        }

        tracing::trace!(
            scorer = scorer,
            size = size,
            latency_secs = latency_secs,
            "Recorded batch metric"
        );
    }

    /// Record an item appended to the destination.
    pub fn record_accepted(&self, score: Option<f64>) {
        if let Some(accepted) = ITEMS_ACCEPTED.get() {
            accepted.inc();
        }

        if let (Some(histogram), Some(score)) = (ITEM_SCORE.get(), score) {
            histogram.observe(score);
        }

        tracing::trace!(score = ?score, "Recorded accepted item metric");
    }

    /// Record items excluded by a filter stage.
    pub fn record_filtered(&self, stage: FilterStage, count: usize) {
        if count == 0 {
            return;
        }

        if let Some(filtered) = ITEMS_FILTERED.get() {
            filtered
                .with_label_values(&[stage.label()])
                .inc_by(count as f64);
        }

        tracing::trace!(
            stage = stage.label(),
            count = count,
            "Recorded filtered items metric"
        );
    }

    /// Mark a generation call as started.
    pub fn generation_started(&self) {
        if let Some(in_progress) = GENERATIONS_IN_PROGRESS.get() {
            in_progress.inc();
        }
    }

    /// Mark a generation call as finished.
    ///
    /// # Arguments
    ///
    /// * `status` - Outcome label (e.g., "success", "failure", "cancelled")
    /// * `duration_secs` - Call duration in seconds
    pub fn generation_finished(&self, status: &str, duration_secs: f64) {
        if let Some(in_progress) = GENERATIONS_IN_PROGRESS.get() {
            in_progress.dec();
        }

        if let Some(total) = GENERATIONS_TOTAL.get() {
            total.with_label_values(&[status]).inc();
        }

        if let Some(duration) = GENERATION_DURATION.get() {
            duration.observe(duration_secs);
        }

        tracing::trace!(
            status = status,
            duration_secs = duration_secs,
            "Recorded generation metric"
        );
    }
}
