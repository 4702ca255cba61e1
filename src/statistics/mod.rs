//! Statistics over the items produced by one generation call.
//!
//! A fresh aggregator is created for every call. The generator feeds it each
//! inner-filter survivor through [`ItemGroupStatistics::increase`], then calls
//! [`ItemGroupStatistics::compute`] exactly once over the slice of the
//! destination the call appended. The after-filter factory reads the result.

mod score;

pub use score::{ScoreSnapshot, ScoreStatistics};

/// Accumulates statistics over a group of items.
pub trait ItemGroupStatistics<I>: Send {
    /// Records one item that survived the inner filter, before it is appended.
    fn increase(&mut self, item: &I);

    /// Finalizes statistics over the items appended by the current call.
    fn compute(&mut self, items: &[I]);

    /// Returns the finalized score snapshot, if this aggregator produces one.
    fn snapshot(&self) -> Option<&ScoreSnapshot> {
        None
    }

    /// Number of items recorded through `increase`.
    fn observed(&self) -> usize {
        0
    }
}

/// Aggregator that computes nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdleStatistics;

impl<I> ItemGroupStatistics<I> for IdleStatistics {
    fn increase(&mut self, _item: &I) {}

    fn compute(&mut self, _items: &[I]) {}
}
