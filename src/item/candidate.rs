//! A general-purpose item with a string id and named numeric features.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::Item;

/// How two values of the same feature are combined when duplicates merge.
///
/// When identity-equal candidates disagree on the rule of a feature, the
/// variant declared last wins (`sum` over `min` over `max`).
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum MergeRule {
    /// Keep the larger value.
    #[default]
    Max,
    /// Keep the smaller value.
    Min,
    /// Add both values.
    Sum,
}

impl MergeRule {
    /// Combines two values of one feature.
    pub fn combine(&self, a: f64, b: f64) -> f64 {
        match self {
            MergeRule::Max => a.max(b),
            MergeRule::Min => a.min(b),
            MergeRule::Sum => a + b,
        }
    }
}

/// Running sum, min and max of every value merged into one feature.
#[derive(Debug, Clone, Copy, PartialEq)]
struct FeatureFold {
    sum: f64,
    min: f64,
    max: f64,
}

impl FeatureFold {
    fn single(value: f64) -> Self {
        Self {
            sum: value,
            min: value,
            max: value,
        }
    }

    fn absorb(&mut self, other: FeatureFold) {
        self.sum += other.sum;
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    fn value(&self, rule: MergeRule) -> f64 {
        match rule {
            MergeRule::Max => self.max,
            MergeRule::Min => self.min,
            MergeRule::Sum => self.sum,
        }
    }
}

/// A candidate entity with named numeric features.
///
/// Merging keeps the sum, min and max of every feature, so the merged value
/// under the resolved rule is the same whichever duplicate arrived first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Identity of the candidate.
    pub id: String,

    features: BTreeMap<String, f64>,

    /// Names of the strategies that produced or modeled this candidate.
    sources: BTreeSet<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    score: Option<f64>,

    #[serde(skip)]
    merge_rule: MergeRule,

    #[serde(skip)]
    feature_rules: BTreeMap<String, MergeRule>,

    #[serde(skip)]
    folds: BTreeMap<String, FeatureFold>,
}

impl Candidate {
    /// Creates an unscored candidate with no features.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            features: BTreeMap::new(),
            sources: BTreeSet::new(),
            score: None,
            merge_rule: MergeRule::default(),
            feature_rules: BTreeMap::new(),
            folds: BTreeMap::new(),
        }
    }

    /// Builder method to set a feature value.
    pub fn with_feature(mut self, name: impl Into<String>, value: f64) -> Self {
        self.set_feature(name, value);
        self
    }

    /// Builder method to set the merge rule used for features without an override.
    pub fn with_merge_rule(mut self, rule: MergeRule) -> Self {
        self.merge_rule = rule;
        self
    }

    /// Builder method to override the merge rule of one feature.
    pub fn with_feature_rule(mut self, name: impl Into<String>, rule: MergeRule) -> Self {
        self.feature_rules.insert(name.into(), rule);
        self
    }

    /// Sets a feature value, invalidating any existing score.
    ///
    /// The value replaces whatever earlier merges accumulated for the feature.
    pub fn set_feature(&mut self, name: impl Into<String>, value: f64) {
        let name = name.into();
        self.folds.insert(name.clone(), FeatureFold::single(value));
        self.features.insert(name, value);
        self.score = None;
    }

    /// Returns a feature value.
    pub fn feature(&self, name: &str) -> Option<f64> {
        self.features.get(name).copied()
    }

    /// Returns all feature values ordered by name.
    pub fn features(&self) -> &BTreeMap<String, f64> {
        &self.features
    }

    /// Returns the strategies that produced or modeled this candidate.
    pub fn sources(&self) -> &BTreeSet<String> {
        &self.sources
    }

    /// Returns the rule merges apply to `name`.
    pub fn rule_for(&self, name: &str) -> MergeRule {
        self.feature_rules
            .get(name)
            .copied()
            .unwrap_or(self.merge_rule)
    }

    // Deserialized candidates carry no folds; their plain values seed one.
    fn fold_for(&self, name: &str, value: f64) -> FeatureFold {
        self.folds
            .get(name)
            .copied()
            .unwrap_or_else(|| FeatureFold::single(value))
    }
}

impl Item for Candidate {
    type Key = String;

    fn key(&self) -> String {
        self.id.clone()
    }

    fn score(&self) -> Option<f64> {
        self.score
    }

    fn set_score(&mut self, score: f64) {
        self.score = Some(score);
    }

    fn record_origin(&mut self, strategy: &str) {
        self.sources.insert(strategy.to_string());
    }

    fn merge(&mut self, other: Self) {
        // Resolve rules first so both sides see the same rule per feature.
        let overridden: BTreeSet<String> = self
            .feature_rules
            .keys()
            .chain(other.feature_rules.keys())
            .cloned()
            .collect();
        let feature_rules: BTreeMap<String, MergeRule> = overridden
            .into_iter()
            .map(|name| {
                let rule = self.rule_for(&name).max(other.rule_for(&name));
                (name, rule)
            })
            .collect();
        self.merge_rule = self.merge_rule.max(other.merge_rule);
        self.feature_rules = feature_rules;

        for (name, value) in &other.features {
            let incoming = other.fold_for(name, *value);
            let fold = match self.features.get(name) {
                Some(current) => {
                    let mut fold = self.fold_for(name, *current);
                    fold.absorb(incoming);
                    fold
                }
                None => incoming,
            };
            self.folds.insert(name.clone(), fold);
        }

        let names: Vec<String> = self
            .features
            .keys()
            .chain(other.features.keys())
            .cloned()
            .collect();
        for name in names {
            let value = self.features.get(&name).copied();
            let fold = match (self.folds.get(&name), value) {
                (Some(fold), _) => *fold,
                (None, Some(value)) => FeatureFold::single(value),
                (None, None) => continue,
            };
            self.folds.insert(name.clone(), fold);
            let rule = self.rule_for(&name);
            self.features.insert(name, fold.value(rule));
        }

        self.sources.extend(other.sources);
        self.score = None;
    }
}
