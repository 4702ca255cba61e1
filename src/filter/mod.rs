//! The three-stage filter chain.
//!
//! Items can be excluded at exactly three points of a generation call:
//!
//! 1. **pre**: checked by each strategy before a candidate is modeled;
//! 2. **inner**: checked once per item right after its batch was scored;
//! 3. **after**: built from the finalized statistics of the call and run over
//!    every item the call appended, removing those that fail.
//!
//! A stage with no configured filter uses [`AcceptAll`].

mod after;
mod handler;

pub use after::{AfterFilterPolicy, TopKFilter};
pub use handler::{AfterFilterFactory, FilterChain, FilterHandler, NaiveFilterHandler};

/// A predicate over items.
///
/// Closures `Fn(&I) -> bool` implement this trait directly.
pub trait ItemFilter<I>: Send + Sync {
    /// Returns `true` when the item should be kept.
    fn test(&self, item: &I) -> bool;
}

impl<I, F> ItemFilter<I> for F
where
    F: Fn(&I) -> bool + Send + Sync,
{
    fn test(&self, item: &I) -> bool {
        self(item)
    }
}

/// The always-pass filter.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl<I> ItemFilter<I> for AcceptAll {
    fn test(&self, _item: &I) -> bool {
        true
    }
}
