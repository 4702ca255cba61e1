//! The bounded batch buffer.

use crate::error::{BatchError, ScoreError};
use crate::item::Item;

use super::Scorer;

/// A bounded, ordered group of items scored as one unit.
///
/// The lifecycle is add up to capacity, [`score_by`](Self::score_by) once,
/// then [`drain`](Self::drain). Draining resets the buffer for the next batch.
#[derive(Debug)]
pub struct BatchSample<I> {
    capacity: usize,
    items: Vec<I>,
    scored: bool,
}

impl<I: Item> BatchSample<I> {
    /// Creates an empty buffer holding at most `capacity` items.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            items: Vec::with_capacity(capacity),
            scored: false,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.items.len() >= self.capacity
    }

    pub fn is_scored(&self) -> bool {
        self.scored
    }

    /// Buffers an item and returns the buffered count.
    pub fn add(&mut self, item: I) -> Result<usize, BatchError> {
        if self.scored {
            return Err(BatchError::AlreadyScored(self.items.len()));
        }
        if self.is_full() {
            return Err(BatchError::Full(self.capacity));
        }
        self.items.push(item);
        Ok(self.items.len())
    }

    /// Scores every buffered item with a single scorer call.
    ///
    /// Scores are validated before any is written, so a failed call leaves
    /// every item unscored.
    pub async fn score_by(&mut self, scorer: &dyn Scorer<I>) -> Result<(), BatchError> {
        if self.scored {
            return Err(BatchError::AlreadyScored(self.items.len()));
        }
        if self.items.is_empty() {
            self.scored = true;
            return Ok(());
        }

        let scores = scorer.score_batch(&self.items).await?;
        if scores.len() != self.items.len() {
            return Err(ScoreError::CountMismatch {
                expected: self.items.len(),
                actual: scores.len(),
            }
            .into());
        }
        if let Some(pos) = scores.iter().position(|s| !s.is_finite()) {
            return Err(ScoreError::NonFinite(pos).into());
        }

        for (item, score) in self.items.iter_mut().zip(scores) {
            item.set_score(score);
        }
        self.scored = true;
        Ok(())
    }

    /// Takes the scored items out in insertion order and resets the buffer.
    pub fn drain(&mut self) -> Result<Vec<I>, BatchError> {
        if !self.scored && !self.items.is_empty() {
            return Err(BatchError::NotScored(self.items.len()));
        }
        self.scored = false;
        Ok(std::mem::replace(
            &mut self.items,
            Vec::with_capacity(self.capacity),
        ))
    }

    /// Returns the buffered items in insertion order.
    pub fn items(&self) -> &[I] {
        &self.items
    }
}
