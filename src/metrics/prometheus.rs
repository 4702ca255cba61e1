//! Prometheus metrics registration and export.
//!
//! This module defines all Prometheus metrics used by itemforge and provides
//! functions for initializing, registering, and exporting metrics.

use prometheus::{
    Counter, CounterVec, Encoder, Gauge, Histogram, HistogramOpts, HistogramVec, Opts, Registry,
    TextEncoder,
};
use std::sync::OnceLock;

/// Global Prometheus registry for all itemforge metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// Candidates returned by strategies, labeled by strategy.
pub static CANDIDATES_GENERATED: OnceLock<CounterVec> = OnceLock::new();

/// Candidates folded into an already tracked duplicate.
pub static CANDIDATES_MERGED: OnceLock<Counter> = OnceLock::new();

/// Scored batches, labeled by scorer.
pub static BATCHES_SCORED: OnceLock<CounterVec> = OnceLock::new();

/// Scorer call latency in seconds, labeled by scorer.
pub static SCORER_LATENCY: OnceLock<HistogramVec> = OnceLock::new();

/// Number of items per scored batch.
pub static BATCH_SIZE: OnceLock<Histogram> = OnceLock::new();

/// Distribution of scores of accepted items.
pub static ITEM_SCORE: OnceLock<Histogram> = OnceLock::new();

/// Items appended to a destination.
pub static ITEMS_ACCEPTED: OnceLock<Counter> = OnceLock::new();

/// Items excluded, labeled by filter stage (inner / after).
pub static ITEMS_FILTERED: OnceLock<CounterVec> = OnceLock::new();

/// Generation calls, labeled by outcome.
pub static GENERATIONS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Generation call duration in seconds.
pub static GENERATION_DURATION: OnceLock<Histogram> = OnceLock::new();

/// Generation calls currently running.
pub static GENERATIONS_IN_PROGRESS: OnceLock<Gauge> = OnceLock::new();

/// Initialize all metrics and register them with the registry.
///
/// Call once at startup. Later calls are harmless: the first set of metrics
/// stays installed.
///
/// # Errors
///
/// Returns a `prometheus::Error` if metric registration fails, typically due to
/// duplicate metric names or invalid metric configurations.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    let registry = Registry::new();

    // Generation stage metrics
    let candidates_generated = CounterVec::new(
        Opts::new(
            "itemforge_candidates_generated_total",
            "Candidates returned by strategies",
        ),
        &["strategy"],
    )?;

    let candidates_merged = Counter::new(
        "itemforge_candidates_merged_total",
        "Candidates merged into an already tracked duplicate",
    )?;

    // Scoring metrics
    let batches_scored = CounterVec::new(
        Opts::new("itemforge_batches_scored_total", "Total scored batches"),
        &["scorer"],
    )?;

    let scorer_latency = HistogramVec::new(
        HistogramOpts::new(
            "itemforge_scorer_latency_seconds",
            "Scorer call latency in seconds",
        )
        .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
        &["scorer"],
    )?;

    let batch_size = Histogram::with_opts(
        HistogramOpts::new("itemforge_batch_size", "Number of items per scored batch")
            .buckets(vec![1.0, 8.0, 16.0, 32.0, 64.0, 128.0, 256.0, 1024.0]),
    )?;

    let item_score = Histogram::with_opts(
        HistogramOpts::new("itemforge_item_score", "Distribution of accepted item scores")
            .buckets(vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 0.9, 1.0]),
    )?;

    // Filter metrics
    let items_accepted = Counter::new(
        "itemforge_items_accepted_total",
        "Items appended to a destination",
    )?;

    let items_filtered = CounterVec::new(
        Opts::new("itemforge_items_filtered_total", "Items excluded by a filter"),
        &["stage"],
    )?;

    // Call metrics
    let generations_total = CounterVec::new(
        Opts::new("itemforge_generations_total", "Total generation calls"),
        &["status"],
    )?;

    let generation_duration = Histogram::with_opts(
        HistogramOpts::new(
            "itemforge_generation_duration_seconds",
            "Generation call duration in seconds",
        )
        .buckets(vec![0.01, 0.1, 0.5, 1.0, 5.0, 30.0, 120.0, 600.0]),
    )?;

    let generations_in_progress = Gauge::new(
        "itemforge_generations_in_progress",
        "Generation calls currently running",
    )?;

    registry.register(Box::new(candidates_generated.clone()))?;
    registry.register(Box::new(candidates_merged.clone()))?;
    registry.register(Box::new(batches_scored.clone()))?;
    registry.register(Box::new(scorer_latency.clone()))?;
    registry.register(Box::new(batch_size.clone()))?;
    registry.register(Box::new(item_score.clone()))?;
    registry.register(Box::new(items_accepted.clone()))?;
    registry.register(Box::new(items_filtered.clone()))?;
    registry.register(Box::new(generations_total.clone()))?;
    registry.register(Box::new(generation_duration.clone()))?;
    registry.register(Box::new(generations_in_progress.clone()))?;

    // If any of these fail, metrics were already initialized
    let _ = REGISTRY.set(registry);
    let _ = CANDIDATES_GENERATED.set(candidates_generated);
    let _ = CANDIDATES_MERGED.set(candidates_merged);
    let _ = BATCHES_SCORED.set(batches_scored);
    let _ = SCORER_LATENCY.set(scorer_latency);
    let _ = BATCH_SIZE.set(batch_size);
    let _ = ITEM_SCORE.set(item_score);
    let _ = ITEMS_ACCEPTED.set(items_accepted);
    let _ = ITEMS_FILTERED.set(items_filtered);
    let _ = GENERATIONS_TOTAL.set(generations_total);
    let _ = GENERATION_DURATION.set(generation_duration);
    let _ = GENERATIONS_IN_PROGRESS.set(generations_in_progress);

    tracing::info!("Prometheus metrics initialized successfully");

    Ok(())
}

/// Export all registered metrics in Prometheus text format.
///
/// Returns an explanatory comment line when the registry has not been
/// initialized or encoding fails.
pub fn export_metrics() -> String {
    let Some(registry) = REGISTRY.get() else {
        return "# Metrics not initialized. Call init_metrics() first.\n".to_string();
    };

    let encoder = TextEncoder::new();
    let metric_families = registry.gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return format!("# Error encoding metrics: {}\n", e);
    }

    String::from_utf8(buffer)
        .unwrap_or_else(|e| format!("# Error converting metrics to UTF-8: {}\n", e))
}
