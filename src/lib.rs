//! itemforge: candidate generation, deduplication, batch scoring and
//! statistics-driven filtering.
//!
//! Several strategies each propose candidate items. Duplicates are merged
//! into one tracked item, the population is scored in batches, and three
//! filter stages (pre, inner, after) decide what ends up in the caller's
//! destination list.

pub mod cli;
pub mod dedup;
pub mod error;
pub mod filter;
pub mod generator;
pub mod item;
pub mod metrics;
pub mod scoring;
pub mod sources;
pub mod statistics;
pub mod strategy;

// Re-export commonly used types
pub use error::{BatchError, GenerateError, MergeError, ScoreError, SourceError, StrategyError};
pub use generator::{
    CancellationFlag, ConfigError, GenerationEvent, GenerationReport, GeneratorConfig,
    ItemGenerator,
};
pub use item::{Candidate, Item, MergeRule};
