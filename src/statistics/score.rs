//! Score distribution statistics.

use ordered_float::OrderedFloat;
use serde::Serialize;

use crate::item::Item;

use super::ItemGroupStatistics;

/// Summary of the scores of one call's appended items.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScoreSnapshot {
    /// Number of scored items.
    pub count: usize,
    /// Sum of scores.
    pub sum: f64,
    /// Mean score (0.0 for an empty population).
    pub mean: f64,
    /// Population variance of the scores.
    pub variance: f64,
    /// Lowest score.
    pub min: Option<f64>,
    /// Highest score.
    pub max: Option<f64>,
    /// All scores in ascending order.
    pub sorted_scores: Vec<f64>,
}

impl ScoreSnapshot {
    /// Builds a snapshot from scores in any order.
    ///
    /// Scores are sorted before summing so the result does not depend on the
    /// order the scores arrived in.
    pub fn from_scores(scores: impl IntoIterator<Item = f64>) -> Self {
        let mut sorted: Vec<OrderedFloat<f64>> = scores.into_iter().map(OrderedFloat).collect();
        sorted.sort();
        let sorted_scores: Vec<f64> = sorted.into_iter().map(|s| s.0).collect();

        let count = sorted_scores.len();
        if count == 0 {
            return Self::default();
        }

        let sum: f64 = sorted_scores.iter().sum();
        let mean = sum / count as f64;
        let variance = sorted_scores
            .iter()
            .map(|s| (s - mean).powi(2))
            .sum::<f64>()
            / count as f64;

        Self {
            count,
            sum,
            mean,
            variance,
            min: sorted_scores.first().copied(),
            max: sorted_scores.last().copied(),
            sorted_scores,
        }
    }

    /// Standard deviation of the scores.
    pub fn std_dev(&self) -> f64 {
        self.variance.sqrt()
    }

    /// Returns the score at quantile `q` using the nearest-rank method.
    ///
    /// `q` is clamped to [0.0, 1.0]; returns `None` for an empty population.
    pub fn quantile(&self, q: f64) -> Option<f64> {
        if self.sorted_scores.is_empty() {
            return None;
        }
        let q = q.clamp(0.0, 1.0);
        let rank = (q * self.count as f64).ceil() as usize;
        let index = rank.saturating_sub(1).min(self.count - 1);
        Some(self.sorted_scores[index])
    }

    /// Returns the k-th largest score (1-based).
    pub fn kth_largest(&self, k: usize) -> Option<f64> {
        if k == 0 || k > self.count {
            return None;
        }
        Some(self.sorted_scores[self.count - k])
    }
}

/// Aggregator producing a [`ScoreSnapshot`].
#[derive(Debug, Clone, Default)]
pub struct ScoreStatistics {
    observed: usize,
    unscored: usize,
    snapshot: Option<ScoreSnapshot>,
}

impl ScoreStatistics {
    /// Creates an empty aggregator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of observed items that carried no score.
    pub fn unscored(&self) -> usize {
        self.unscored
    }
}

impl<I: Item> ItemGroupStatistics<I> for ScoreStatistics {
    fn increase(&mut self, item: &I) {
        self.observed += 1;
        if item.score().is_none() {
            self.unscored += 1;
        }
    }

    fn compute(&mut self, items: &[I]) {
        let snapshot = ScoreSnapshot::from_scores(items.iter().filter_map(Item::score));
        tracing::debug!(
            count = snapshot.count,
            mean = snapshot.mean,
            std_dev = snapshot.std_dev(),
            "Computed score statistics"
        );
        self.snapshot = Some(snapshot);
    }

    fn snapshot(&self) -> Option<&ScoreSnapshot> {
        self.snapshot.as_ref()
    }

    fn observed(&self) -> usize {
        self.observed
    }
}
