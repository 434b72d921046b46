/// Frame assignment and root detection
///
/// A first event opens frame 1. Any other event inherits the highest frame
/// `F` among its parents and moves to `F + 1` once it forkless-causes frame-`F`
/// roots of a supermajority of stake. An event whose frame is above its
/// self-parent's frame is a root.

pub mod roots;

use crate::dag::{EventIdx, EventStore};
use tracing::debug;

pub use roots::{FrameRoots, RootIndex};

/// Frame number, the first frame is 1
pub type Frame = u32;

/// Frame and root flag of an inserted event
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Assigned {
    pub frame: Frame,
    pub root: bool,
}

/// Derived per-event frame state plus the root index
#[derive(Debug, Default)]
pub struct FrameAssigner {
    assigned: Vec<Assigned>,
    roots: RootIndex,
}

impl FrameAssigner {
    pub fn new(validator_count: usize) -> Self {
        Self {
            assigned: Vec::new(),
            roots: RootIndex::new(validator_count),
        }
    }

    /// Assign the frame of the most recently inserted event
    ///
    /// Events must be assigned in arena order; the result never changes
    /// afterwards.
    pub fn assign(&mut self, store: &EventStore, idx: EventIdx) -> Assigned {
        debug_assert_eq!(idx, self.assigned.len());

        let assigned = match store.self_parent_of(idx) {
            None => Assigned {
                frame: 1,
                root: true,
            },
            Some(sp) => {
                let frame = self.compute_frame(store, idx);
                Assigned {
                    frame,
                    root: frame > self.assigned[sp].frame,
                }
            }
        };

        if assigned.root {
            self.roots
                .insert(assigned.frame, store.creator_pos(idx), idx);
            debug!(
                "Root {} in frame {}",
                store.event(idx).hash(),
                assigned.frame
            );
        }
        self.assigned.push(assigned);
        assigned
    }

    fn compute_frame(&self, store: &EventStore, idx: EventIdx) -> Frame {
        let max_parent = store
            .parents_of(idx)
            .iter()
            .map(|p| self.assigned[*p].frame)
            .max()
            .unwrap_or(1);

        let Some(roots) = self.roots.frame(max_parent) else {
            return max_parent;
        };
        let caused = roots
            .iter()
            .filter(|root| store.forkless_cause_idx(idx, *root))
            .map(|root| store.creator_pos(root));
        if store
            .validators()
            .is_quorum(store.validators().stake_of_positions(caused))
        {
            max_parent + 1
        } else {
            max_parent
        }
    }

    pub fn get(&self, idx: EventIdx) -> Option<Assigned> {
        self.assigned.get(idx).copied()
    }

    pub fn frame_of(&self, idx: EventIdx) -> Option<Frame> {
        self.get(idx).map(|a| a.frame)
    }

    pub fn is_root(&self, idx: EventIdx) -> bool {
        self.get(idx).map_or(false, |a| a.root)
    }

    pub fn roots(&self) -> &RootIndex {
        &self.roots
    }

    /// Highest frame reached so far
    pub fn last_frame(&self) -> Frame {
        self.roots.last_frame()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::Event;
    use crate::validators::{ValidatorId, Validators};

    struct Harness {
        store: EventStore,
        frames: FrameAssigner,
    }

    impl Harness {
        fn new(n: u32) -> Self {
            Self::with(Validators::equal(n).unwrap())
        }

        fn with(validators: Validators) -> Self {
            let n = validators.len();
            Self {
                store: EventStore::new(validators),
                frames: FrameAssigner::new(n),
            }
        }

        fn add(&mut self, event: &Event) -> Assigned {
            let inserted = self.store.insert(event.clone()).unwrap();
            self.frames.assign(&self.store, inserted.idx)
        }
    }

    #[test]
    fn test_first_events_are_frame_one_roots() {
        let mut h = Harness::new(4);
        for i in 0..4 {
            let e = Event::first(ValidatorId(i), &[], vec![]);
            assert_eq!(h.add(&e), Assigned { frame: 1, root: true });
        }
        assert_eq!(h.frames.roots().roots_of(1).len(), 4);
    }

    #[test]
    fn test_frame_advances_on_supermajority() {
        let mut h = Harness::new(4);
        let genesis: Vec<Event> = (0..4)
            .map(|i| Event::first(ValidatorId(i), &[], vec![]))
            .collect();
        for e in &genesis {
            h.add(e);
        }

        // Sees 2 of 4 frame-1 roots: stays in frame 1
        let a2 = Event::child(&genesis[0], &[&genesis[1]], vec![]);
        assert_eq!(h.add(&a2), Assigned { frame: 1, root: false });

        // Sees 3 of 4: opens frame 2
        let a3 = Event::child(&a2, &[&genesis[2]], vec![]);
        assert_eq!(h.add(&a3), Assigned { frame: 2, root: true });

        // Inherits frame 2 from a3 without a quorum of frame-2 roots
        let b2 = Event::child(&genesis[1], &[&a3], vec![]);
        assert_eq!(h.add(&b2), Assigned { frame: 2, root: true });
        let a4 = Event::child(&a3, &[&b2], vec![]);
        assert_eq!(h.add(&a4), Assigned { frame: 2, root: false });

        assert_eq!(h.frames.last_frame(), 2);
        assert_eq!(h.frames.roots().roots_of(2).len(), 2);
        assert!(h.frames.is_root(h.store.idx_of(&b2.hash()).unwrap()));
    }

    #[test]
    fn test_frame_advance_is_stake_weighted() {
        // Total 8: a supermajority needs at least 6
        let mut h = Harness::with(
            Validators::new(vec![
                (ValidatorId(0), 5),
                (ValidatorId(1), 1),
                (ValidatorId(2), 1),
                (ValidatorId(3), 1),
            ])
            .unwrap(),
        );
        let genesis: Vec<Event> = (0..4)
            .map(|i| Event::first(ValidatorId(i), &[], vec![]))
            .collect();
        for e in &genesis {
            h.add(e);
        }

        // Three of four roots but only 3 stake
        let b2 = Event::child(&genesis[1], &[&genesis[2], &genesis[3]], vec![]);
        assert_eq!(h.add(&b2), Assigned { frame: 1, root: false });

        // Two roots holding 6 stake
        let a2 = Event::child(&genesis[0], &[&genesis[1]], vec![]);
        assert_eq!(h.add(&a2), Assigned { frame: 2, root: true });
    }

    #[test]
    fn test_frames_non_decreasing_along_self_parent_chain() {
        let mut h = Harness::new(3);
        let mut tips: Vec<Event> = (0..3)
            .map(|i| Event::first(ValidatorId(i), &[], vec![]))
            .collect();
        for e in &tips {
            h.add(e);
        }
        let mut last = vec![1; 3];
        for round in 0..12 {
            let creator = round % 3;
            let other = (round + 1) % 3;
            let next = Event::child(&tips[creator], &[&tips[other]], vec![]);
            let assigned = h.add(&next);
            assert!(assigned.frame >= last[creator]);
            last[creator] = assigned.frame;
            tips[creator] = next;
        }
        assert!(h.frames.last_frame() > 1);
    }
}
