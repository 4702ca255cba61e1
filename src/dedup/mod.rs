//! Candidate deduplication.
//!
//! Different strategies often produce the same entity. Every generated item
//! goes through [`update`]: if the store already tracks an item with the
//! same key, the tracked item absorbs the new one through [`Item::merge`];
//! otherwise the new item is saved. A fresh store is created for every
//! generation call, so no candidate state leaks between calls.

use std::collections::HashMap;

use crate::error::MergeError;
use crate::item::Item;

/// Outcome of [`update`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The item was new and is now tracked.
    Inserted,
    /// The item was folded into an already tracked item.
    Merged,
}

/// Key-based store of the candidate population for one generation call.
pub trait CandidateStore<I: Item>: Send {
    /// Returns the tracked item identity-equal to `item`, if any.
    fn find_existing(&mut self, item: &I) -> Result<Option<&mut I>, MergeError>;

    /// Starts tracking a new item.
    fn save(&mut self, item: I) -> Result<(), MergeError>;

    /// Hands out the population in first-insertion order, leaving the store empty.
    fn take_candidates(&mut self) -> Vec<I>;

    /// Number of tracked items.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Merges `item` into its tracked duplicate or saves it.
pub fn update<I: Item>(
    store: &mut dyn CandidateStore<I>,
    item: I,
) -> Result<UpdateOutcome, MergeError> {
    if let Some(existing) = store.find_existing(&item)? {
        existing.merge(item);
        return Ok(UpdateOutcome::Merged);
    }
    store.save(item)?;
    Ok(UpdateOutcome::Inserted)
}

/// In-memory store keyed by [`Item::key`], preserving insertion order.
#[derive(Debug)]
pub struct InMemoryStore<I: Item> {
    index: HashMap<I::Key, usize>,
    items: Vec<I>,
}

impl<I: Item> InMemoryStore<I> {
    pub fn new() -> Self {
        Self {
            index: HashMap::new(),
            items: Vec::new(),
        }
    }
}

impl<I: Item> Default for InMemoryStore<I> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I: Item> CandidateStore<I> for InMemoryStore<I> {
    fn find_existing(&mut self, item: &I) -> Result<Option<&mut I>, MergeError> {
        Ok(match self.index.get(&item.key()) {
            Some(&pos) => self.items.get_mut(pos),
            None => None,
        })
    }

    fn save(&mut self, item: I) -> Result<(), MergeError> {
        let key = item.key();
        if self.index.contains_key(&key) {
            return Err(MergeError::Rejected {
                key: format!("{:?}", key),
                reason: "already tracked".to_string(),
            });
        }
        self.index.insert(key, self.items.len());
        self.items.push(item);
        Ok(())
    }

    fn take_candidates(&mut self) -> Vec<I> {
        self.index.clear();
        std::mem::take(&mut self.items)
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}
