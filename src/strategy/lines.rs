//! A strategy reading candidates from a directory of line files.
//!
//! Each non-empty, non-comment line describes one candidate:
//!
//! ```text
//! <id>\t<feature>=<value>,<feature>=<value>,...
//! ```

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::{SourceError, StrategyError};
use crate::item::{Candidate, Item, MergeRule};
use crate::sources::DirLineSource;

use super::Strategy;

/// Parses one candidate line.
///
/// Returns `None` for blank lines, `#` comments and malformed lines.
pub fn parse_candidate_line(line: &str) -> Option<Candidate> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }

    let (id, features) = match line.split_once('\t') {
        Some((id, features)) => (id.trim(), features.trim()),
        None => (line, ""),
    };
    if id.is_empty() {
        return None;
    }

    let mut candidate = Candidate::new(id);
    for pair in features.split(',').filter(|p| !p.trim().is_empty()) {
        let (name, value) = pair.split_once('=')?;
        let name = name.trim();
        if name.is_empty() {
            return None;
        }
        let value: f64 = value.trim().parse().ok()?;
        candidate.set_feature(name, value);
    }
    Some(candidate)
}

/// Strategy whose candidates are the lines of files below a directory.
///
/// Modeling checks that every required feature is present and stamps an
/// indicator feature `via_<name>` = 1.0.
#[derive(Debug, Clone)]
pub struct LineFileStrategy {
    name: String,
    source: DirLineSource,
    merge_rule: MergeRule,
    required: Vec<String>,
}

impl LineFileStrategy {
    /// Creates a strategy over `source`.
    pub fn new(name: impl Into<String>, source: DirLineSource) -> Self {
        Self {
            name: name.into(),
            source,
            merge_rule: MergeRule::default(),
            required: Vec::new(),
        }
    }

    /// Sets the merge rule given to every produced candidate.
    pub fn with_merge_rule(mut self, rule: MergeRule) -> Self {
        self.merge_rule = rule;
        self
    }

    /// Requires a feature to be present for a candidate to be modeled.
    pub fn with_required_feature(mut self, name: impl Into<String>) -> Self {
        self.required.push(name.into());
        self
    }

    fn indicator(&self) -> String {
        format!("via_{}", self.name)
    }
}

#[async_trait]
impl Strategy<Candidate> for LineFileStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    async fn candidates(&self) -> Result<Vec<Candidate>, StrategyError> {
        let source = self.source.clone();
        let rule = self.merge_rule;

        let records = tokio::task::spawn_blocking(move || {
            source
                .records(parse_candidate_line)?
                .collect::<Result<Vec<Candidate>, SourceError>>()
        })
        .await
        .map_err(|e| StrategyError::Other(format!("line reader task failed: {}", e)))??;

        // Repeated ids within this strategy's files collapse into one candidate.
        let mut index: HashMap<String, usize> = HashMap::new();
        let mut candidates: Vec<Candidate> = Vec::with_capacity(records.len());
        for record in records {
            let record = record.with_merge_rule(rule);
            match index.get(&record.id) {
                Some(&pos) => candidates[pos].merge(record),
                None => {
                    index.insert(record.id.clone(), candidates.len());
                    candidates.push(record);
                }
            }
        }

        tracing::debug!(
            strategy = %self.name,
            root = %self.source.root().display(),
            candidates = candidates.len(),
            "Loaded line-file candidates"
        );
        Ok(candidates)
    }

    async fn model(&self, item: &mut Candidate) -> Result<(), StrategyError> {
        if let Some(missing) = self
            .required
            .iter()
            .find(|name| item.feature(name).is_none())
        {
            return Err(StrategyError::MissingInput(missing.clone()));
        }
        item.set_feature(self.indicator(), 1.0);
        Ok(())
    }
}
