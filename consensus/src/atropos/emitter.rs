//! Total-order emitter

use crate::dag::{EventIdx, EventStore};
use std::collections::HashSet;

/// Turns each Atropos into the batch of events it newly finalizes
#[derive(Debug, Default)]
pub struct TotalOrderEmitter {
    emitted: Vec<bool>,
    count: usize,
}

impl TotalOrderEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Events forkless-caused by `atropos` (itself included) not emitted
    /// before, ordered by `(lamport, creator, hash)`
    ///
    /// The walk goes down the parent links and stops at emitted events, so
    /// the cost follows the size of the batch, not of the whole DAG. Calling
    /// it again for the same Atropos yields an empty batch.
    pub fn emit(&mut self, store: &EventStore, atropos: EventIdx) -> Vec<EventIdx> {
        if self.emitted.len() < store.len() {
            self.emitted.resize(store.len(), false);
        }

        let mut batch = Vec::new();
        let mut visited = HashSet::new();
        let mut stack = vec![atropos];
        while let Some(idx) = stack.pop() {
            if self.emitted[idx] || !visited.insert(idx) {
                continue;
            }
            // Observed fork sides are skipped, their ancestors still count
            if store.forkless_cause_idx(atropos, idx) {
                batch.push(idx);
            }
            stack.extend_from_slice(store.parents_of(idx));
        }
        batch.sort_by(|a, b| {
            let (ea, eb) = (store.event(*a), store.event(*b));
            ea.lamport()
                .cmp(&eb.lamport())
                .then(ea.creator().cmp(&eb.creator()))
                .then(ea.hash().cmp(&eb.hash()))
        });

        for idx in &batch {
            self.emitted[*idx] = true;
        }
        self.count += batch.len();
        batch
    }

    pub fn is_emitted(&self, idx: EventIdx) -> bool {
        self.emitted.get(idx).copied().unwrap_or(false)
    }

    /// Number of events emitted so far
    pub fn emitted_count(&self) -> usize {
        self.count
    }
}
