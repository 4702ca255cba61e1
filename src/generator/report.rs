//! Progress events and the summary returned by a generation call.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::mpsc::Sender;

/// Progress of a generation call, sent to an optional event channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GenerationEvent {
    Started { strategies: usize, start_index: usize },
    StrategyCompleted { strategy: String, generated: usize, merged: usize },
    BatchScored { batch: usize, size: usize },
    ItemAccepted { key: String, score: Option<f64>, position: usize },
    AfterFilterApplied { kept: usize, removed: usize },
    Completed { appended: usize, removed: usize },
}

/// Counters of one generation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationReport {
    /// Length of the destination when the call started.
    pub start_index: usize,
    /// Items returned by all strategies, duplicates included.
    pub generated: usize,
    /// Items folded into an already tracked duplicate.
    pub merged: usize,
    /// Size of the deduplicated candidate population.
    pub candidates: usize,
    pub scored: usize,
    pub batches: usize,
    pub inner_rejected: usize,
    /// Items appended before the after-filter ran.
    pub appended: usize,
    pub after_removed: usize,
    /// Events dropped because the event channel was full.
    #[serde(default)]
    pub events_dropped: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl GenerationReport {
    pub(crate) fn new(start_index: usize) -> Self {
        let now = Utc::now();
        Self {
            start_index,
            generated: 0,
            merged: 0,
            candidates: 0,
            scored: 0,
            batches: 0,
            inner_rejected: 0,
            appended: 0,
            after_removed: 0,
            events_dropped: 0,
            started_at: now,
            finished_at: now,
        }
    }

    /// Items this call left in the destination.
    pub fn kept(&self) -> usize {
        self.appended - self.after_removed
    }

    /// Range of the destination holding this call's items.
    pub fn range(&self) -> std::ops::Range<usize> {
        self.start_index..self.start_index + self.kept()
    }
}

/// Sends `event` if a channel is attached and has room.
///
/// A closed receiver is ignored. A full channel drops the event.
pub(crate) fn emit(
    tx: &Option<Sender<GenerationEvent>>,
    event: GenerationEvent,
    report: &mut GenerationReport,
) {
    let Some(sender) = tx else {
        return;
    };
    match sender.try_send(event) {
        Ok(()) | Err(TrySendError::Closed(_)) => {}
        Err(TrySendError::Full(event)) => {
            report.events_dropped += 1;
            tracing::trace!(event = ?event, "Event channel full, dropping event");
        }
    }
}
