//! Ready-made after-filter policies driven by score statistics.

use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};

use crate::item::Item;
use crate::statistics::ItemGroupStatistics;

use super::handler::AfterFilterFactory;
use super::ItemFilter;

/// Population-level policies applied once every item has been scored.
///
/// Policies that need the score distribution yield no filter when the
/// statistics aggregator produced no snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum AfterFilterPolicy {
    /// Keep the `k` highest-scoring items.
    TopK { k: usize },
    /// Keep the highest-scoring `fraction` of items, rounded up.
    TopFraction { fraction: f64 },
    /// Keep items scoring at least `min`.
    MinScore { min: f64 },
    /// Keep items scoring at least the population mean.
    AboveMean,
    /// Keep items scoring at least the given quantile (0.0 - 1.0).
    Quantile { q: f64 },
}

impl AfterFilterPolicy {
    /// Returns `true` if the policy depends on the score distribution.
    pub fn needs_statistics(&self) -> bool {
        !matches!(self, AfterFilterPolicy::MinScore { .. })
    }

    /// Checks the policy parameters.
    pub fn validate(&self) -> Result<(), String> {
        match *self {
            AfterFilterPolicy::TopFraction { fraction } if !(fraction > 0.0 && fraction <= 1.0) => {
                Err(format!("top_fraction must be in (0, 1], got {}", fraction))
            }
            AfterFilterPolicy::Quantile { q } if !(0.0..=1.0).contains(&q) => {
                Err(format!("quantile must be in [0, 1], got {}", q))
            }
            AfterFilterPolicy::MinScore { min } if !min.is_finite() => {
                Err(format!("min_score must be finite, got {}", min))
            }
            _ => Ok(()),
        }
    }
}

impl FromStr for AfterFilterPolicy {
    type Err = String;

    /// Parses `top_k=N`, `top_fraction=F`, `min_score=S`, `quantile=Q` or `above_mean`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s == "above_mean" {
            return Ok(AfterFilterPolicy::AboveMean);
        }
        let (name, value) = s
            .split_once('=')
            .ok_or_else(|| format!("expected policy=value or above_mean, got '{}'", s))?;
        let value = value.trim();
        let invalid = |e: &dyn std::fmt::Display| format!("invalid value for {}: {}", name, e);

        let policy = match name.trim() {
            "top_k" => AfterFilterPolicy::TopK {
                k: value.parse().map_err(|e| invalid(&e))?,
            },
            "top_fraction" => AfterFilterPolicy::TopFraction {
                fraction: value.parse().map_err(|e| invalid(&e))?,
            },
            "min_score" => AfterFilterPolicy::MinScore {
                min: value.parse().map_err(|e| invalid(&e))?,
            },
            "quantile" => AfterFilterPolicy::Quantile {
                q: value.parse().map_err(|e| invalid(&e))?,
            },
            other => return Err(format!("unknown after-filter policy '{}'", other)),
        };
        policy.validate()?;
        Ok(policy)
    }
}

impl<I: Item> AfterFilterFactory<I> for AfterFilterPolicy {
    fn create(&self, statistics: &dyn ItemGroupStatistics<I>) -> Option<Box<dyn ItemFilter<I>>> {
        if let AfterFilterPolicy::MinScore { min } = *self {
            return Some(Box::new(ScoreThreshold(min)));
        }

        let Some(snapshot) = statistics.snapshot() else {
            tracing::warn!(
                policy = ?self,
                "After-filter policy needs score statistics but none were computed"
            );
            return None;
        };

        match *self {
            AfterFilterPolicy::TopK { k } => top_k(k, &snapshot.sorted_scores),
            AfterFilterPolicy::TopFraction { fraction } => {
                let k = (fraction.clamp(0.0, 1.0) * snapshot.count as f64).ceil() as usize;
                top_k(k, &snapshot.sorted_scores)
            }
            AfterFilterPolicy::AboveMean => {
                if snapshot.count == 0 {
                    return None;
                }
                Some(Box::new(ScoreThreshold(snapshot.mean)))
            }
            AfterFilterPolicy::Quantile { q } => snapshot
                .quantile(q)
                .map(|threshold| Box::new(ScoreThreshold(threshold)) as Box<dyn ItemFilter<I>>),
            AfterFilterPolicy::MinScore { .. } => None,
        }
    }
}

fn top_k<I: Item>(k: usize, sorted_scores: &[f64]) -> Option<Box<dyn ItemFilter<I>>> {
    let filter = TopKFilter::from_scores(k, sorted_scores)?;
    tracing::debug!(
        k = k,
        threshold = filter.threshold(),
        population = sorted_scores.len(),
        "Derived top-k after-filter"
    );
    Some(Box::new(filter))
}

/// Keeps items whose score is at least the threshold.
#[derive(Debug, Clone, Copy)]
struct ScoreThreshold(f64);

impl<I: Item> ItemFilter<I> for ScoreThreshold {
    fn test(&self, item: &I) -> bool {
        item.score().is_some_and(|score| score >= self.0)
    }
}

/// Keeps exactly the `k` highest-scoring items.
///
/// Items strictly above the k-th largest score always pass. Items tied with
/// it pass in evaluation order until `k` items have been kept, so the filter
/// must be evaluated once per item in append order.
#[derive(Debug)]
pub struct TopKFilter {
    threshold: f64,
    ties_remaining: AtomicUsize,
}

impl TopKFilter {
    /// Builds the filter from ascending scores.
    ///
    /// Returns `None` when every score already fits within `k`.
    pub fn from_scores(k: usize, sorted_scores: &[f64]) -> Option<Self> {
        if k >= sorted_scores.len() {
            return None;
        }
        if k == 0 {
            return Some(Self {
                threshold: f64::INFINITY,
                ties_remaining: AtomicUsize::new(0),
            });
        }
        let threshold = sorted_scores[sorted_scores.len() - k];
        let above = sorted_scores.iter().filter(|&&s| s > threshold).count();
        Some(Self {
            threshold,
            ties_remaining: AtomicUsize::new(k - above),
        })
    }

    /// Returns the k-th largest score.
    pub fn threshold(&self) -> f64 {
        self.threshold
    }
}

impl<I: Item> ItemFilter<I> for TopKFilter {
    fn test(&self, item: &I) -> bool {
        let Some(score) = item.score() else {
            return false;
        };
        if score > self.threshold {
            return true;
        }
        if score < self.threshold {
            return false;
        }
        self.ties_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::Candidate;
    use crate::statistics::{IdleStatistics, ScoreStatistics};

    fn scored(id: &str, score: f64) -> Candidate {
        let mut c = Candidate::new(id);
        c.set_score(score);
        c
    }

    fn apply(policy: &AfterFilterPolicy, items: &[Candidate]) -> Vec<String> {
        let mut stats = ScoreStatistics::new();
        stats.compute(items);
        match AfterFilterFactory::<Candidate>::create(policy, &stats) {
            Some(filter) => items
                .iter()
                .filter(|c| filter.test(c))
                .map(|c| c.id.clone())
                .collect(),
            None => items.iter().map(|c| c.id.clone()).collect(),
        }
    }

    #[test]
    fn test_top_one_keeps_best() {
        let items = vec![scored("a", 0.2), scored("b", 0.9), scored("c", 0.5)];
        let kept = apply(&AfterFilterPolicy::TopK { k: 1 }, &items);
        assert_eq!(kept, vec!["b"]);
    }

    #[test]
    fn test_top_k_with_ties_keeps_exactly_k() {
        let items = vec![
            scored("a", 0.5),
            scored("b", 0.9),
            scored("c", 0.5),
            scored("d", 0.5),
        ];
        let kept = apply(&AfterFilterPolicy::TopK { k: 2 }, &items);
        assert_eq!(kept, vec!["a", "b"]);
    }

    #[test]
    fn test_top_k_larger_than_population_yields_no_filter() {
        let items = vec![scored("a", 0.1)];
        let mut stats = ScoreStatistics::new();
        stats.compute(&items[..]);
        let policy = AfterFilterPolicy::TopK { k: 5 };
        assert!(AfterFilterFactory::<Candidate>::create(&policy, &stats).is_none());
    }

    #[test]
    fn test_top_zero_removes_everything() {
        let items = vec![scored("a", 0.1), scored("b", 0.3)];
        let kept = apply(&AfterFilterPolicy::TopK { k: 0 }, &items);
        assert!(kept.is_empty());
    }

    #[test]
    fn test_top_fraction_rounds_up() {
        let items: Vec<Candidate> = (0..10)
            .map(|i| scored(&i.to_string(), i as f64 / 10.0))
            .collect();
        let kept = apply(&AfterFilterPolicy::TopFraction { fraction: 0.15 }, &items);
        assert_eq!(kept, vec!["8", "9"]);
    }

    #[test]
    fn test_above_mean() {
        let items = vec![scored("a", 1.0), scored("b", 2.0), scored("c", 6.0)];
        let kept = apply(&AfterFilterPolicy::AboveMean, &items);
        assert_eq!(kept, vec!["c"]);
    }

    #[test]
    fn test_min_score_needs_no_statistics() {
        let policy = AfterFilterPolicy::MinScore { min: 0.5 };
        assert!(!policy.needs_statistics());
        let filter = AfterFilterFactory::<Candidate>::create(&policy, &IdleStatistics)
            .expect("min score filter");
        assert!(filter.test(&scored("a", 0.5)));
        assert!(!filter.test(&scored("b", 0.4)));
    }

    #[test]
    fn test_distribution_policy_without_statistics() {
        let policy = AfterFilterPolicy::TopK { k: 1 };
        assert!(AfterFilterFactory::<Candidate>::create(&policy, &IdleStatistics).is_none());
    }

    #[test]
    fn test_policy_deserializes_from_yaml() {
        let policy: AfterFilterPolicy = serde_yaml::from_str("policy: top_k\nk: 3\n").unwrap();
        assert_eq!(policy, AfterFilterPolicy::TopK { k: 3 });
        let policy: AfterFilterPolicy = serde_yaml::from_str("policy: above_mean\n").unwrap();
        assert_eq!(policy, AfterFilterPolicy::AboveMean);
    }

    #[test]
    fn test_policy_from_str() {
        assert_eq!(
            "top_k=3".parse::<AfterFilterPolicy>().unwrap(),
            AfterFilterPolicy::TopK { k: 3 }
        );
        assert_eq!(
            "above_mean".parse::<AfterFilterPolicy>().unwrap(),
            AfterFilterPolicy::AboveMean
        );
        assert!("top_fraction=1.5".parse::<AfterFilterPolicy>().is_err());
        assert!("top_k=-1".parse::<AfterFilterPolicy>().is_err());
        assert!("best=1".parse::<AfterFilterPolicy>().is_err());
    }
}
