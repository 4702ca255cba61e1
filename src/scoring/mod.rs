//! Batch scoring.
//!
//! Scoring is the expensive step of a generation call, so items are never
//! scored one by one. They are collected into a [`BatchSample`] and the whole
//! batch is handed to a [`Scorer`] in a single call.
//!
//! - [`Scorer`]: the model seam, one async call per batch.
//! - [`BatchSample`]: bounded buffer enforcing add, score once, drain.
//! - [`LinearScorer`]: weighted feature sum for [`Candidate`](crate::item::Candidate).
//! - [`FnScorer`]: wraps a synchronous closure.

mod batch;
mod linear;

pub use batch::BatchSample;
pub use linear::{parse_weight, LinearScorer};

use async_trait::async_trait;

use crate::error::ScoreError;
use crate::item::Item;

/// Assigns scores to a batch of items in one call.
#[async_trait]
pub trait Scorer<I: Item>: Send + Sync {
    /// Name used in logs and metric labels.
    fn name(&self) -> &str {
        "scorer"
    }

    /// Scores every item of the batch.
    ///
    /// Must return exactly one finite score per item, in the same order.
    async fn score_batch(&self, items: &[I]) -> Result<Vec<f64>, ScoreError>;
}

/// A scorer backed by a synchronous closure.
pub struct FnScorer<F> {
    name: String,
    score: F,
}

impl<F> FnScorer<F> {
    pub fn new(name: impl Into<String>, score: F) -> Self {
        Self {
            name: name.into(),
            score,
        }
    }
}

#[async_trait]
impl<I, F> Scorer<I> for FnScorer<F>
where
    I: Item,
    F: Fn(&[I]) -> Result<Vec<f64>, ScoreError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn score_batch(&self, items: &[I]) -> Result<Vec<f64>, ScoreError> {
        (self.score)(items)
    }
}
