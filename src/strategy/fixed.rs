//! A strategy serving a fixed candidate list.

use async_trait::async_trait;

use crate::error::StrategyError;
use crate::item::Item;

use super::Strategy;

type Modeler<I> = Box<dyn Fn(&mut I) -> Result<(), StrategyError> + Send + Sync>;

/// Strategy over an in-memory candidate list with a modeling closure.
///
/// Each call to `candidates()` hands out fresh clones, so the same strategy
/// can serve many generation calls.
pub struct StaticStrategy<I> {
    name: String,
    candidates: Vec<I>,
    modeler: Modeler<I>,
}

impl<I: Item + Clone> StaticStrategy<I> {
    /// Creates a strategy whose modeling step leaves candidates unchanged.
    pub fn new(name: impl Into<String>, candidates: Vec<I>) -> Self {
        Self {
            name: name.into(),
            candidates,
            modeler: Box::new(|_| Ok(())),
        }
    }

    /// Sets the modeling closure.
    pub fn with_modeler<F>(mut self, modeler: F) -> Self
    where
        F: Fn(&mut I) -> Result<(), StrategyError> + Send + Sync + 'static,
    {
        self.modeler = Box::new(modeler);
        self
    }
}

#[async_trait]
impl<I: Item + Clone> Strategy<I> for StaticStrategy<I> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn candidates(&self) -> Result<Vec<I>, StrategyError> {
        Ok(self.candidates.clone())
    }

    async fn model(&self, item: &mut I) -> Result<(), StrategyError> {
        (self.modeler)(item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::AcceptAll;
    use crate::item::Candidate;

    #[tokio::test]
    async fn test_static_strategy_applies_modeler() {
        let strategy = StaticStrategy::new(
            "recent",
            vec![Candidate::new("a"), Candidate::new("b")],
        )
        .with_modeler(|c: &mut Candidate| {
            c.set_feature("recency", 1.0);
            Ok(())
        });

        let items = strategy.generate(&AcceptAll).await.unwrap();
        assert_eq!(items.len(), 2);
        assert!(items.iter().all(|c| c.feature("recency") == Some(1.0)));

        // A second call starts from unmodeled clones again.
        let again = strategy.candidates().await.unwrap();
        assert!(again.iter().all(|c| c.feature("recency").is_none()));
    }
}
