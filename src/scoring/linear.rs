//! Linear reference scorer for [`Candidate`] items.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ScoreError;
use crate::item::Candidate;

use super::Scorer;

/// Scores a candidate as `bias + sum(weight[f] * feature[f])`.
///
/// Features without a weight contribute nothing; weights without a matching
/// feature count the feature as zero.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LinearScorer {
    #[serde(default)]
    weights: BTreeMap<String, f64>,
    #[serde(default)]
    bias: f64,
}

impl LinearScorer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_weight(mut self, feature: impl Into<String>, weight: f64) -> Self {
        self.weights.insert(feature.into(), weight);
        self
    }

    pub fn with_bias(mut self, bias: f64) -> Self {
        self.bias = bias;
        self
    }

    pub fn weights(&self) -> &BTreeMap<String, f64> {
        &self.weights
    }

    /// Scores a single candidate.
    pub fn score(&self, candidate: &Candidate) -> f64 {
        self.weights.iter().fold(self.bias, |acc, (name, weight)| {
            acc + weight * candidate.feature(name).unwrap_or(0.0)
        })
    }
}

#[async_trait]
impl Scorer<Candidate> for LinearScorer {
    fn name(&self) -> &str {
        "linear"
    }

    async fn score_batch(&self, items: &[Candidate]) -> Result<Vec<f64>, ScoreError> {
        Ok(items.iter().map(|c| self.score(c)).collect())
    }
}

/// Parses a `name=value` weight argument.
pub fn parse_weight(arg: &str) -> Result<(String, f64), String> {
    let (name, value) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got '{}'", arg))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("missing feature name in '{}'", arg));
    }
    let value: f64 = value
        .trim()
        .parse()
        .map_err(|e| format!("invalid weight in '{}': {}", arg, e))?;
    Ok((name.to_string(), value))
}
