//! Ancestry / visibility index
//!
//! Every creator's events are split into branches: linear runs of
//! consecutive sequence numbers linked by self-parent edges. An honest
//! creator has exactly one branch; each fork opens another one.
//!
//! Every event carries a vector clock holding, per branch, the highest
//! sequence number it observes on that branch. `sees` is then a single
//! comparison, and the clock of a new event is the element-wise max of its
//! parents' clocks, so the index grows incrementally without re-traversal.

use super::event::Seq;
use super::EventIdx;
use std::collections::BTreeSet;

pub type BranchId = usize;

#[derive(Clone, Debug)]
struct Branch {
    creator: usize,
    start_seq: Seq,
    /// `events[i]` has sequence number `start_seq + i`
    events: Vec<EventIdx>,
}

impl Branch {
    fn at_seq(&self, seq: Seq) -> Option<EventIdx> {
        if seq < self.start_seq {
            return None;
        }
        self.events.get((seq - self.start_seq) as usize).copied()
    }

    fn tail(&self) -> Option<EventIdx> {
        self.events.last().copied()
    }
}

/// Highest observed sequence number per branch, 0 when nothing is observed
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VectorClock(Vec<Seq>);

impl VectorClock {
    pub fn get(&self, branch: BranchId) -> Seq {
        self.0.get(branch).copied().unwrap_or(0)
    }

    fn set(&mut self, branch: BranchId, seq: Seq) {
        if self.0.len() <= branch {
            self.0.resize(branch + 1, 0);
        }
        self.0[branch] = seq;
    }

    fn merge(&mut self, other: &VectorClock) {
        if self.0.len() < other.0.len() {
            self.0.resize(other.0.len(), 0);
        }
        for (mine, theirs) in self.0.iter_mut().zip(other.0.iter()) {
            if *theirs > *mine {
                *mine = *theirs;
            }
        }
    }
}

/// Incremental reachability index over the event arena
#[derive(Debug, Default)]
pub struct AncestryIndex {
    branches: Vec<Branch>,
    /// Branches per creator position
    by_creator: Vec<Vec<BranchId>>,
    /// Per event
    clocks: Vec<VectorClock>,
    branch_of: Vec<BranchId>,
    seq_of: Vec<Seq>,
    /// Creator positions whose fork the event observes, sorted
    observed_forks: Vec<Vec<usize>>,
}

impl AncestryIndex {
    pub fn new(validator_count: usize) -> Self {
        Self {
            by_creator: vec![Vec::new(); validator_count],
            ..Default::default()
        }
    }

    /// Register the next event of the arena; `idx` must equal the number of
    /// events registered so far and all parents must already be registered.
    pub fn insert(
        &mut self,
        idx: EventIdx,
        creator: usize,
        seq: Seq,
        self_parent: Option<EventIdx>,
        other_parents: &[EventIdx],
    ) {
        debug_assert_eq!(idx, self.clocks.len());

        let branch = match self_parent {
            Some(sp) => {
                let sp_branch = self.branch_of[sp];
                if self.branches[sp_branch].tail() == Some(sp) {
                    self.branches[sp_branch].events.push(idx);
                    sp_branch
                } else {
                    self.open_branch(creator, seq, idx)
                }
            }
            None => self.open_branch(creator, seq, idx),
        };

        let mut clock = VectorClock::default();
        let mut forks: BTreeSet<usize> = BTreeSet::new();
        for parent in self_parent.iter().chain(other_parents.iter()) {
            clock.merge(&self.clocks[*parent]);
            forks.extend(self.observed_forks[*parent].iter().copied());
        }
        clock.set(branch, seq);

        self.clocks.push(clock);
        self.branch_of.push(branch);
        self.seq_of.push(seq);

        // A fork can only become visible through a creator owning 2+ branches
        for cheater in self.cheaters() {
            if !forks.contains(&cheater) && self.clock_observes_fork(&self.clocks[idx], cheater) {
                forks.insert(cheater);
            }
        }
        self.observed_forks.push(forks.into_iter().collect());
    }

    fn open_branch(&mut self, creator: usize, seq: Seq, idx: EventIdx) -> BranchId {
        let id = self.branches.len();
        self.branches.push(Branch {
            creator,
            start_seq: seq,
            events: vec![idx],
        });
        self.by_creator[creator].push(id);
        id
    }

    /// Two observed tips of `creator` where neither sees the other
    fn clock_observes_fork(&self, clock: &VectorClock, creator: usize) -> bool {
        let tips: Vec<EventIdx> = self.by_creator[creator]
            .iter()
            .filter_map(|b| {
                let seq = clock.get(*b);
                if seq == 0 {
                    None
                } else {
                    self.branches[*b].at_seq(seq)
                }
            })
            .collect();

        for (i, a) in tips.iter().enumerate() {
            for b in &tips[i + 1..] {
                if !self.sees(*a, *b) && !self.sees(*b, *a) {
                    return true;
                }
            }
        }
        false
    }

    /// `y` is an ancestor of `x`, or `x` itself
    pub fn sees(&self, x: EventIdx, y: EventIdx) -> bool {
        self.clocks[x].get(self.branch_of[y]) >= self.seq_of[y]
    }

    /// `x` sees `y` and has not observed a fork by `y`'s creator
    pub fn forkless_cause(&self, x: EventIdx, y: EventIdx) -> bool {
        let creator = self.branches[self.branch_of[y]].creator;
        self.sees(x, y) && self.observed_forks[x].binary_search(&creator).is_err()
    }

    /// Creator positions with more than one branch
    pub fn cheaters(&self) -> Vec<usize> {
        self.by_creator
            .iter()
            .enumerate()
            .filter(|(_, branches)| branches.len() > 1)
            .map(|(creator, _)| creator)
            .collect()
    }

    pub fn observed_forks(&self, x: EventIdx) -> &[usize] {
        &self.observed_forks[x]
    }

    /// Number of branches known, i.e. vector clock width
    pub fn branch_count(&self) -> usize {
        self.branches.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Builds: creator 0: e0 -> e2 ; creator 1: e1 -> e3(sees e2)
    fn diamond() -> AncestryIndex {
        let mut index = AncestryIndex::new(2);
        index.insert(0, 0, 1, None, &[]);
        index.insert(1, 1, 1, None, &[]);
        index.insert(2, 0, 2, Some(0), &[1]);
        index.insert(3, 1, 2, Some(1), &[2]);
        index
    }

    #[test]
    fn test_sees_is_reflexive_and_transitive() {
        let index = diamond();
        for e in 0..4 {
            assert!(index.sees(e, e));
        }
        assert!(index.sees(3, 0));
        assert!(index.sees(3, 2));
        assert!(index.sees(2, 1));
        assert!(!index.sees(2, 3));
        assert!(!index.sees(0, 1));
        assert_eq!(index.branch_count(), 2);
    }

    #[test]
    fn test_fork_opens_branch_and_is_observed() {
        let mut index = diamond();
        // Creator 0 forks: second event with seq 2 on top of e0
        index.insert(4, 0, 2, Some(0), &[]);
        assert_eq!(index.cheaters(), vec![0]);
        assert_eq!(index.branch_count(), 3);

        // Event of creator 1 seeing both e2 (via e3) and e4
        index.insert(5, 1, 3, Some(3), &[4]);
        assert!(index.sees(5, 2));
        assert!(index.sees(5, 4));
        assert_eq!(index.observed_forks(5), &[0]);
        assert!(!index.forkless_cause(5, 2));
        assert!(!index.forkless_cause(5, 4));
        // Creator 1's own events are unaffected
        assert!(index.forkless_cause(5, 1));

        // e3 saw only one side of the fork
        assert!(index.forkless_cause(3, 2));
        assert!(index.observed_forks(3).is_empty());
    }

    #[test]
    fn test_fork_branch_extension_does_not_reopen() {
        let mut index = AncestryIndex::new(1);
        index.insert(0, 0, 1, None, &[]);
        index.insert(1, 0, 2, Some(0), &[]);
        index.insert(2, 0, 2, Some(0), &[]);
        index.insert(3, 0, 3, Some(2), &[]);
        assert_eq!(index.branch_count(), 2);
        assert!(index.sees(3, 0));
        assert!(!index.sees(3, 1));
        // Sees only one side, so nothing observed
        assert!(index.observed_forks(3).is_empty());
        assert!(index.forkless_cause(3, 2));
        assert!(!index.forkless_cause(3, 1));
    }
}
