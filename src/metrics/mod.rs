//! Metrics module for Prometheus-based monitoring.
//!
//! Counts what flows through each stage of a generation call: candidates per
//! strategy, merges, scored batches and scorer latency, accepted and filtered
//! items, and whole-call outcomes.
//!
//! # Example
//!
//! ```ignore
//! use itemforge::metrics::{init_metrics, export_metrics};
//!
//! init_metrics().expect("Failed to initialize metrics");
//! // ... run generators ...
//! let metrics_text = export_metrics();
//! ```

pub mod collectors;
pub mod prometheus;

pub use collectors::{FilterStage, MetricsCollector};
pub use prometheus::{export_metrics, init_metrics};

pub use prometheus::{
    BATCHES_SCORED, BATCH_SIZE, CANDIDATES_GENERATED, CANDIDATES_MERGED, GENERATIONS_IN_PROGRESS,
    GENERATIONS_TOTAL, GENERATION_DURATION, ITEMS_ACCEPTED, ITEMS_FILTERED, ITEM_SCORE, REGISTRY,
    SCORER_LATENCY,
};
