//! Error types for itemforge operations.
//!
//! Defines error types for every stage of a generation call:
//! - Strategy candidate sourcing and modeling
//! - Batch scoring
//! - Candidate merging / deduplication
//! - Raw input sources (SQL rows, directory lines)
//! - The end-to-end `generate` call itself

use thiserror::Error;

use crate::generator::config::ConfigError;

/// Errors raised by a strategy.
///
/// A `Modeling` error on a single candidate is recoverable: the candidate is
/// dropped and the strategy moves on. Any other variant returned from
/// `candidates()` aborts the generation call.
#[derive(Debug, Error)]
pub enum StrategyError {
    #[error("Candidate '{key}' could not be modeled: {reason}")]
    Modeling { key: String, reason: String },

    #[error("Missing required input '{0}'")]
    MissingInput(String),

    #[error("Candidate source failed: {0}")]
    Source(#[from] SourceError),

    #[error("Strategy failed: {0}")]
    Other(String),
}

/// Errors raised while scoring a batch.
#[derive(Debug, Error)]
pub enum ScoreError {
    #[error("Scorer returned {actual} scores for a batch of {expected} items")]
    CountMismatch { expected: usize, actual: usize },

    #[error("Scorer produced a non-finite score for item at position {0}")]
    NonFinite(usize),

    #[error("Scoring model failed: {0}")]
    Model(String),
}

/// Errors raised by the batch buffer when its lifecycle is violated.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("Batch of {0} items was already scored")]
    AlreadyScored(usize),

    #[error("Batch of {0} items has not been scored yet")]
    NotScored(usize),

    #[error("Batch is full ({0} items)")]
    Full(usize),

    #[error(transparent)]
    Score(#[from] ScoreError),
}

/// Errors raised by a candidate store during find-or-update.
#[derive(Debug, Error)]
pub enum MergeError {
    #[error("Candidate store is unavailable: {0}")]
    Unavailable(String),

    #[error("Candidate store rejected '{key}': {reason}")]
    Rejected { key: String, reason: String },
}

/// Errors raised by raw input sources.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Query failed: {0}")]
    Query(#[from] sqlx::Error),

    #[error("Failed to walk directory: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("Invalid file pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("Row mapping failed: {0}")]
    Mapping(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that abort a `generate` call.
#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Strategy '{strategy}' failed: {source}")]
    Strategy {
        strategy: String,
        #[source]
        source: StrategyError,
    },

    #[error("Scoring failed on batch {batch}: {source}")]
    Scoring {
        batch: usize,
        #[source]
        source: BatchError,
    },

    #[error("Merge failed: {0}")]
    Merge(#[from] MergeError),

    #[error("Generation cancelled before {stage}")]
    Cancelled { stage: String },
}
