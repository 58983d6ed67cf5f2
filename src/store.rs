//! Deduplicated, ordered message timeline for one conversation.
//!
//! The store is the single convergence point for the three fetch paths
//! (latest window, backward pagination, forward poll). Batches from those
//! paths overlap and race, so [`MessageStore::upsert`] is insert-or-update
//! by message ID and re-sorts the whole sequence whenever anything landed:
//! a later batch may carry timestamps that predate earlier-stored rows.

use std::collections::HashMap;

use crate::message::Message;

/// What a call to [`MessageStore::upsert`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertOutcome {
    /// Any insert or overwrite happened. An overwrite with identical
    /// content still counts; there is no deep-equality check.
    pub changed: bool,
    /// Messages that were not previously present.
    pub inserted: usize,
}

#[derive(Debug, Default)]
pub struct MessageStore {
    by_id: HashMap<String, Message>,
    ordered_ids: Vec<String>,
    oldest_ts: Option<u64>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert-or-update each message by ID. Messages with an empty ID are
    /// dropped. Re-sorts the full ordering when anything changed.
    pub fn upsert(&mut self, batch: &[Message]) -> UpsertOutcome {
        let mut outcome = UpsertOutcome::default();
        for m in batch {
            if m.msg_id.is_empty() {
                continue;
            }
            if self.by_id.insert(m.msg_id.clone(), m.clone()).is_none() {
                self.ordered_ids.push(m.msg_id.clone());
                outcome.inserted += 1;
            }
            outcome.changed = true;
            if m.ts > 0 && self.oldest_ts.is_none_or(|oldest| m.ts < oldest) {
                self.oldest_ts = Some(m.ts);
            }
        }
        if outcome.changed {
            let by_id = &self.by_id;
            self.ordered_ids.sort_by(|a, b| {
                let ta = by_id.get(a).map(|m| m.ts).unwrap_or(0);
                let tb = by_id.get(b).map(|m| m.ts).unwrap_or(0);
                ta.cmp(&tb).then_with(|| a.cmp(b))
            });
        }
        outcome
    }

    /// Empty the store and reset the pagination cursor. Used on
    /// conversation switch.
    pub fn clear(&mut self) {
        self.by_id.clear();
        self.ordered_ids.clear();
        self.oldest_ts = None;
    }

    /// Snapshot of the timeline in `(ts ascending, id ascending)` order.
    pub fn ordered(&self) -> Vec<Message> {
        self.ordered_ids
            .iter()
            .filter_map(|id| self.by_id.get(id))
            .cloned()
            .collect()
    }

    pub fn get(&self, msg_id: &str) -> Option<&Message> {
        self.by_id.get(msg_id)
    }

    /// Minimum origin timestamp among stored messages that have one.
    /// `None` when the store is empty or only holds timestamp-less rows.
    pub fn oldest_ts(&self) -> Option<u64> {
        self.oldest_ts
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}
