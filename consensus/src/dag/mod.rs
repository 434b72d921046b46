/// Event store: the append-only DAG of validator events
///
/// Events live in an arena addressed by a dense `EventIdx`; parent links
/// are stored as hashes inside the events and as indices in the ancestry
/// index. Derived consensus state (frames, roots, elections) is kept by the
/// components built on top of the store, never inside the events.

pub mod ancestry;
pub mod event;

use crate::crypto::Hash;
use crate::validators::{ValidatorId, Validators};
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, warn};

pub use ancestry::AncestryIndex;
pub use event::{Event, EventBody, Lamport, Seq};

/// Dense arena index of an event, in insertion order
pub type EventIdx = usize;

/// Event store errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DagError {
    #[error("Duplicate event: {0}")]
    DuplicateEvent(Hash),

    #[error("Event {event} references missing parent {parent}")]
    MissingParent { event: Hash, parent: Hash },

    #[error("Invalid event {event}: {reason}")]
    InvalidEvent { event: Hash, reason: String },
}

pub type Result<T> = std::result::Result<T, DagError>;

/// Evidence that a creator reused a sequence number
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ForkEvidence {
    pub creator: ValidatorId,
    pub seq: Seq,
    /// Event previously stored under the same `(creator, seq)`
    pub existing: Hash,
    pub event: Hash,
}

/// Result of a successful insertion
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Inserted {
    pub idx: EventIdx,
    pub fork: Option<ForkEvidence>,
}

/// Per-event bookkeeping resolved at insertion
#[derive(Clone, Debug)]
struct Slot {
    creator: usize,
    self_parent: Option<EventIdx>,
    parents: Vec<EventIdx>,
}

/// Append-only DAG store with an incremental ancestry index
pub struct EventStore {
    validators: Validators,
    events: Vec<Event>,
    slots: Vec<Slot>,
    by_hash: HashMap<Hash, EventIdx>,
    /// Events per `(creator position, seq)`; more than one entry is a fork
    by_seq: HashMap<(usize, Seq), Vec<EventIdx>>,
    /// Insertion-ordered events per creator position
    by_creator: Vec<Vec<EventIdx>>,
    ancestry: AncestryIndex,
}

impl EventStore {
    pub fn new(validators: Validators) -> Self {
        let n = validators.len();
        Self {
            validators,
            events: Vec::new(),
            slots: Vec::new(),
            by_hash: HashMap::new(),
            by_seq: HashMap::new(),
            by_creator: vec![Vec::new(); n],
            ancestry: AncestryIndex::new(n),
        }
    }

    pub fn validators(&self) -> &Validators {
        &self.validators
    }

    /// Insert an event whose parents are all known
    ///
    /// Forks are stored and reported through `Inserted::fork`.
    pub fn insert(&mut self, event: Event) -> Result<Inserted> {
        let hash = event.hash();
        if self.by_hash.contains_key(&hash) {
            return Err(DagError::DuplicateEvent(hash));
        }

        for parent in event.parents() {
            if !self.by_hash.contains_key(&parent) {
                return Err(DagError::MissingParent {
                    event: hash,
                    parent,
                });
            }
        }

        let creator = self.validate(&event)?;
        let self_parent = event.self_parent().map(|h| self.by_hash[&h]);
        let other_parents: Vec<EventIdx> = event
            .other_parents()
            .iter()
            .map(|h| self.by_hash[h])
            .collect();

        let idx = self.events.len();
        let seq = event.seq();
        let siblings = self.by_seq.entry((creator, seq)).or_default();
        let fork = siblings.first().map(|existing| ForkEvidence {
            creator: event.creator(),
            seq,
            existing: self.events[*existing].hash(),
            event: hash,
        });
        siblings.push(idx);

        self.ancestry
            .insert(idx, creator, seq, self_parent, &other_parents);

        let mut parents = Vec::with_capacity(other_parents.len() + 1);
        parents.extend(self_parent);
        parents.extend(other_parents);
        self.slots.push(Slot {
            creator,
            self_parent,
            parents,
        });
        self.by_hash.insert(hash, idx);
        self.by_creator[creator].push(idx);
        self.events.push(event);

        if let Some(ref evidence) = fork {
            warn!(
                "Fork by {} at seq {}: {} conflicts with {}",
                evidence.creator, evidence.seq, evidence.event, evidence.existing
            );
        } else {
            debug!("Inserted event {}", self.events[idx]);
        }

        Ok(Inserted { idx, fork })
    }

    /// Structural checks, returns the creator position
    fn validate(&self, event: &Event) -> Result<usize> {
        let invalid = |reason: String| DagError::InvalidEvent {
            event: event.hash(),
            reason,
        };

        let creator = self
            .validators
            .position(&event.creator())
            .ok_or_else(|| invalid(format!("unknown creator {}", event.creator())))?;

        let mut max_lamport = 0;
        let mut seen = std::collections::HashSet::new();
        for parent in event.parents() {
            if !seen.insert(parent) {
                return Err(invalid(format!("duplicate parent {}", parent)));
            }
            max_lamport = max_lamport.max(self.events[self.by_hash[&parent]].lamport());
        }

        match event.self_parent() {
            Some(sp) => {
                let sp_event = &self.events[self.by_hash[&sp]];
                if sp_event.creator() != event.creator() {
                    return Err(invalid(format!(
                        "self-parent {} created by {}",
                        sp,
                        sp_event.creator()
                    )));
                }
                if event.seq() != sp_event.seq() + 1 {
                    return Err(invalid(format!(
                        "seq {} does not follow self-parent seq {}",
                        event.seq(),
                        sp_event.seq()
                    )));
                }
            }
            None => {
                if event.seq() != 1 {
                    return Err(invalid(format!("first event has seq {}", event.seq())));
                }
            }
        }

        for other in event.other_parents() {
            if self.events[self.by_hash[other]].creator() == event.creator() {
                return Err(invalid(format!("other-parent {} has the same creator", other)));
            }
        }

        if event.lamport() != max_lamport + 1 {
            return Err(invalid(format!(
                "lamport {} expected {}",
                event.lamport(),
                max_lamport + 1
            )));
        }

        Ok(creator)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn contains(&self, hash: &Hash) -> bool {
        self.by_hash.contains_key(hash)
    }

    pub fn get(&self, hash: &Hash) -> Option<&Event> {
        self.by_hash.get(hash).map(|idx| &self.events[*idx])
    }

    pub fn idx_of(&self, hash: &Hash) -> Option<EventIdx> {
        self.by_hash.get(hash).copied()
    }

    pub fn event(&self, idx: EventIdx) -> &Event {
        &self.events[idx]
    }

    /// Creator position of an event
    pub fn creator_pos(&self, idx: EventIdx) -> usize {
        self.slots[idx].creator
    }

    pub fn self_parent_of(&self, idx: EventIdx) -> Option<EventIdx> {
        self.slots[idx].self_parent
    }

    /// Self-parent first, then other parents
    pub fn parents_of(&self, idx: EventIdx) -> &[EventIdx] {
        &self.slots[idx].parents
    }

    /// Events of a creator in insertion order
    pub fn events_by(&self, creator: &ValidatorId) -> Vec<&Event> {
        self.validators
            .position(creator)
            .map(|pos| self.by_creator[pos].iter().map(|i| &self.events[*i]).collect())
            .unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.events.iter()
    }

    pub fn ancestry(&self) -> &AncestryIndex {
        &self.ancestry
    }

    /// `y` is an ancestor of `x` (or `x` itself); false for unknown events
    pub fn sees(&self, x: &Hash, y: &Hash) -> bool {
        match (self.idx_of(x), self.idx_of(y)) {
            (Some(x), Some(y)) => self.ancestry.sees(x, y),
            _ => false,
        }
    }

    /// `x` sees `y` without observing a fork of `y`'s creator
    pub fn forkless_cause(&self, x: &Hash, y: &Hash) -> bool {
        match (self.idx_of(x), self.idx_of(y)) {
            (Some(x), Some(y)) => self.ancestry.forkless_cause(x, y),
            _ => false,
        }
    }

    pub fn sees_idx(&self, x: EventIdx, y: EventIdx) -> bool {
        self.ancestry.sees(x, y)
    }

    pub fn forkless_cause_idx(&self, x: EventIdx, y: EventIdx) -> bool {
        self.ancestry.forkless_cause(x, y)
    }

    /// Validators caught forking so far
    pub fn cheaters(&self) -> Vec<ValidatorId> {
        self.ancestry
            .cheaters()
            .into_iter()
            .map(|pos| self.validators.id_at(pos))
            .collect()
    }

    pub fn is_cheater(&self, id: &ValidatorId) -> bool {
        self.validators
            .position(id)
            .map(|pos| self.ancestry.cheaters().contains(&pos))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(n: u32) -> EventStore {
        EventStore::new(Validators::equal(n).unwrap())
    }

    #[test]
    fn test_insert_and_query() {
        let mut store = store(2);
        let a1 = Event::first(ValidatorId(0), &[], vec![]);
        let b1 = Event::first(ValidatorId(1), &[], vec![]);
        let a2 = Event::child(&a1, &[&b1], vec![]);

        store.insert(a1.clone()).unwrap();
        store.insert(b1.clone()).unwrap();
        let inserted = store.insert(a2.clone()).unwrap();

        assert_eq!(inserted.idx, 2);
        assert!(inserted.fork.is_none());
        assert_eq!(store.len(), 3);
        assert!(store.sees(&a2.hash(), &b1.hash()));
        assert!(store.sees(&a2.hash(), &a2.hash()));
        assert!(!store.sees(&b1.hash(), &a1.hash()));
        assert!(store.forkless_cause(&a2.hash(), &a1.hash()));
        assert_eq!(store.events_by(&ValidatorId(0)).len(), 2);
        assert_eq!(store.parents_of(2), &[0, 1]);
    }

    #[test]
    fn test_duplicate_event() {
        let mut store = store(1);
        let a1 = Event::first(ValidatorId(0), &[], vec![]);
        store.insert(a1.clone()).unwrap();
        assert_eq!(store.insert(a1.clone()), Err(DagError::DuplicateEvent(a1.hash())));
    }

    #[test]
    fn test_missing_parent() {
        let mut store = store(2);
        let a1 = Event::first(ValidatorId(0), &[], vec![]);
        let b1 = Event::first(ValidatorId(1), &[&a1], vec![]);
        assert_eq!(
            store.insert(b1.clone()),
            Err(DagError::MissingParent {
                event: b1.hash(),
                parent: a1.hash()
            })
        );
        assert!(store.is_empty());
    }

    #[test]
    fn test_invalid_events() {
        let mut store = store(2);
        let a1 = Event::first(ValidatorId(0), &[], vec![]);
        store.insert(a1.clone()).unwrap();

        let unknown = Event::first(ValidatorId(9), &[], vec![]);
        assert!(matches!(store.insert(unknown), Err(DagError::InvalidEvent { .. })));

        let bad_seq = Event::new(EventBody {
            creator: ValidatorId(0),
            seq: 5,
            lamport: 2,
            self_parent: Some(a1.hash()),
            other_parents: vec![],
            payload: vec![],
        });
        assert!(matches!(store.insert(bad_seq), Err(DagError::InvalidEvent { .. })));

        let bad_lamport = Event::new(EventBody {
            creator: ValidatorId(0),
            seq: 2,
            lamport: 7,
            self_parent: Some(a1.hash()),
            other_parents: vec![],
            payload: vec![],
        });
        assert!(matches!(store.insert(bad_lamport), Err(DagError::InvalidEvent { .. })));

        let stolen_self_parent = Event::new(EventBody {
            creator: ValidatorId(1),
            seq: 2,
            lamport: 2,
            self_parent: Some(a1.hash()),
            other_parents: vec![],
            payload: vec![],
        });
        assert!(matches!(
            store.insert(stolen_self_parent),
            Err(DagError::InvalidEvent { .. })
        ));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_fork_is_stored_and_reported() {
        let mut store = store(2);
        let a1 = Event::first(ValidatorId(0), &[], vec![]);
        let a2 = Event::child(&a1, &[], vec![vec![1]]);
        let a2_fork = Event::child(&a1, &[], vec![vec![2]]);

        store.insert(a1.clone()).unwrap();
        store.insert(a2.clone()).unwrap();
        let inserted = store.insert(a2_fork.clone()).unwrap();

        let fork = inserted.fork.expect("fork must be reported");
        assert_eq!(fork.creator, ValidatorId(0));
        assert_eq!(fork.seq, 2);
        assert_eq!(fork.existing, a2.hash());
        assert!(store.contains(&a2_fork.hash()));
        assert_eq!(store.cheaters(), vec![ValidatorId(0)]);
        assert!(store.is_cheater(&ValidatorId(0)));
        assert!(!store.is_cheater(&ValidatorId(1)));

        // Observer that merges both branches loses forkless causality on them
        let b1 = Event::first(ValidatorId(1), &[&a2, &a2_fork], vec![]);
        store.insert(b1.clone()).unwrap();
        assert!(store.sees(&b1.hash(), &a2.hash()));
        assert!(!store.forkless_cause(&b1.hash(), &a2.hash()));
        assert!(!store.forkless_cause(&b1.hash(), &a1.hash()));
    }

    #[test]
    fn test_second_first_event_is_fork() {
        let mut store = store(1);
        let a1 = Event::first(ValidatorId(0), &[], vec![vec![1]]);
        let a1_again = Event::first(ValidatorId(0), &[], vec![vec![2]]);
        store.insert(a1).unwrap();
        let inserted = store.insert(a1_again).unwrap();
        assert!(inserted.fork.is_some());
    }
}
