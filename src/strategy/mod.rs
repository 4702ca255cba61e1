//! Candidate generation strategies.
//!
//! A strategy is one generation heuristic: it knows how to list its raw
//! candidates and how to model (feature-stamp) each one. The generator runs
//! every configured strategy through [`Strategy::generate`] and merges what
//! they return.
//!
//! Where the raw candidates come from is the strategy's business. The
//! [`sources`](crate::sources) module has adapters for SQL rows and
//! directories of text files.

mod fixed;
mod lines;

pub use fixed::StaticStrategy;
pub use lines::{parse_candidate_line, LineFileStrategy};

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::StrategyError;
use crate::filter::ItemFilter;
use crate::item::Item;

/// A pluggable candidate generation heuristic.
#[async_trait]
pub trait Strategy<I: Item>: Send + Sync {
    /// Name used in logs, events and item origins.
    fn name(&self) -> &str;

    /// Lists this strategy's raw, unmodeled candidates.
    ///
    /// Candidates must be unique under this strategy's own notion of
    /// identity. An error here aborts the generation call.
    async fn candidates(&self) -> Result<Vec<I>, StrategyError>;

    /// Writes this strategy's features onto a candidate.
    ///
    /// An error drops the candidate; the strategy continues with the rest.
    async fn model(&self, item: &mut I) -> Result<(), StrategyError>;

    /// Produces the modeled candidates that pass `pre_filter`.
    async fn generate(&self, pre_filter: &dyn ItemFilter<I>) -> Result<Vec<I>, StrategyError> {
        let candidates = self.candidates().await?;
        let total = candidates.len();
        let mut generated = Vec::with_capacity(total);
        let mut rejected = 0usize;
        let mut dropped = 0usize;

        for mut item in candidates {
            if !pre_filter.test(&item) {
                rejected += 1;
                continue;
            }
            match self.model(&mut item).await {
                Ok(()) => {
                    item.record_origin(self.name());
                    generated.push(item);
                }
                Err(e) => {
                    dropped += 1;
                    warn!(
                        strategy = self.name(),
                        key = ?item.key(),
                        error = %e,
                        "Dropping candidate that could not be modeled"
                    );
                }
            }
        }

        debug!(
            strategy = self.name(),
            total = total,
            generated = generated.len(),
            pre_filtered = rejected,
            dropped = dropped,
            "Strategy generation finished"
        );
        Ok(generated)
    }
}
