//! Filter handlers bundle the three filter stages for a generator.

use std::sync::Arc;

use crate::item::Item;
use crate::statistics::ItemGroupStatistics;

use super::{AcceptAll, ItemFilter};

/// Builds the after-filter of a call from its finalized statistics.
///
/// Returning `None` means no further filtering is needed.
pub trait AfterFilterFactory<I>: Send + Sync {
    fn create(&self, statistics: &dyn ItemGroupStatistics<I>) -> Option<Box<dyn ItemFilter<I>>>;
}

impl<I, F> AfterFilterFactory<I> for F
where
    F: Fn(&dyn ItemGroupStatistics<I>) -> Option<Box<dyn ItemFilter<I>>> + Send + Sync,
{
    fn create(&self, statistics: &dyn ItemGroupStatistics<I>) -> Option<Box<dyn ItemFilter<I>>> {
        self(statistics)
    }
}

/// Supplies the pre, inner and after filters of a generation call.
///
/// Every method has an always-pass default.
pub trait FilterHandler<I: Item>: Send + Sync {
    /// Filter applied by strategies before modeling a candidate.
    fn pre_filter(&self) -> Arc<dyn ItemFilter<I>> {
        Arc::new(AcceptAll)
    }

    /// Filter applied to each item right after its batch is scored.
    fn inner_filter(&self) -> Arc<dyn ItemFilter<I>> {
        Arc::new(AcceptAll)
    }

    /// Filter derived from the finalized statistics of the call.
    fn after_filter(
        &self,
        _statistics: &dyn ItemGroupStatistics<I>,
    ) -> Option<Box<dyn ItemFilter<I>>> {
        None
    }

    /// Whether `after_filter` reads the statistics.
    ///
    /// Generators without an explicit statistics aggregator collect score
    /// statistics when this returns `true`.
    fn needs_statistics(&self) -> bool {
        false
    }
}

/// Handler that keeps everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NaiveFilterHandler;

impl<I: Item> FilterHandler<I> for NaiveFilterHandler {}

/// A configurable filter handler.
///
/// ```
/// use itemforge::filter::{AfterFilterPolicy, FilterChain};
/// use itemforge::item::{Candidate, Item};
///
/// let chain = FilterChain::<Candidate>::new()
///     .with_pre_filter(|c: &Candidate| !c.id.is_empty())
///     .with_inner_filter(|c: &Candidate| c.score().unwrap_or(0.0) > 0.1)
///     .with_after_filter(AfterFilterPolicy::TopK { k: 10 });
/// ```
pub struct FilterChain<I> {
    pre: Arc<dyn ItemFilter<I>>,
    inner: Arc<dyn ItemFilter<I>>,
    after: Option<Arc<dyn AfterFilterFactory<I>>>,
}

impl<I: Item> Default for FilterChain<I> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I: Item> FilterChain<I> {
    /// Creates a chain where every stage accepts everything.
    pub fn new() -> Self {
        Self {
            pre: Arc::new(AcceptAll),
            inner: Arc::new(AcceptAll),
            after: None,
        }
    }

    /// Sets the pre-filter.
    pub fn with_pre_filter(mut self, filter: impl ItemFilter<I> + 'static) -> Self {
        self.pre = Arc::new(filter);
        self
    }

    /// Sets the inner filter.
    pub fn with_inner_filter(mut self, filter: impl ItemFilter<I> + 'static) -> Self {
        self.inner = Arc::new(filter);
        self
    }

    /// Sets the after-filter factory.
    pub fn with_after_filter(mut self, factory: impl AfterFilterFactory<I> + 'static) -> Self {
        self.after = Some(Arc::new(factory));
        self
    }

    /// Returns `true` when an after-filter factory is configured.
    pub fn has_after_filter(&self) -> bool {
        self.after.is_some()
    }
}

impl<I: Item> FilterHandler<I> for FilterChain<I> {
    fn pre_filter(&self) -> Arc<dyn ItemFilter<I>> {
        Arc::clone(&self.pre)
    }

    fn inner_filter(&self) -> Arc<dyn ItemFilter<I>> {
        Arc::clone(&self.inner)
    }

    fn after_filter(
        &self,
        statistics: &dyn ItemGroupStatistics<I>,
    ) -> Option<Box<dyn ItemFilter<I>>> {
        self.after
            .as_ref()
            .and_then(|factory| factory.create(statistics))
    }

    fn needs_statistics(&self) -> bool {
        self.after.is_some()
    }
}
