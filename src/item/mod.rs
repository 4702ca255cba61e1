//! Items: the entities generated, merged, scored and filtered by a generator.
//!
//! Any type can flow through an [`ItemGenerator`](crate::generator::ItemGenerator)
//! as long as it implements [`Item`]. The trait covers the four things the
//! pipeline needs from an item:
//!
//! - an identity key used by the candidate store to detect duplicates,
//! - a score slot written by the batch scorer,
//! - a record of which strategies produced or modeled it,
//! - a merge rule folding a duplicate's feature state into the tracked item.
//!
//! [`Candidate`] is a ready-made implementation with a string id and a
//! numeric feature map.

mod candidate;

pub use candidate::{Candidate, MergeRule};

use std::fmt::Debug;
use std::hash::Hash;

/// An entity tracked through generation, merging, scoring and filtering.
pub trait Item: Send + Sync + 'static {
    /// Identity used to recognise the same entity produced by different strategies.
    type Key: Eq + Hash + Clone + Debug + Send + Sync + 'static;

    /// Returns this item's identity key.
    fn key(&self) -> Self::Key;

    /// Returns the score, or `None` when the item has not been scored since
    /// its feature state last changed.
    fn score(&self) -> Option<f64>;

    /// Stores the score produced by a batch scorer.
    fn set_score(&mut self, score: f64);

    /// Notes that the named strategy produced or modeled this item.
    fn record_origin(&mut self, strategy: &str);

    /// Absorbs the feature state of an identity-equal item.
    ///
    /// Implementations must produce the same feature state whichever of the
    /// two items arrived first, and must clear any existing score.
    fn merge(&mut self, other: Self)
    where
        Self: Sized;
}
