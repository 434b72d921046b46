/// Clotho election
///
/// Frames are decided one at a time, lowest first. Every validator is a
/// slot of the frame `F` under election and the question for slot `v` is
/// whether `v`'s root in `F` becomes a Clotho.
///
/// - Roots of `F + 1` cast the first round: yes iff they forkless-cause a
///   frame-`F` root of `v`.
/// - A root of `F + k` (k >= 2) collects the votes of the frame-`F + k - 1`
///   roots it forkless-causes, one per creator, and votes with the stake
///   majority (ties go to yes). Yes votes name the root they refer to, so
///   forked roots of one creator compete with each other. A supermajority for
///   one root, or for no, decides the slot.
///
/// When every slot is decided the frame is finished and the election moves
/// on, replaying roots that already exist above the new frame.

pub mod types;

use crate::dag::{EventIdx, EventStore};
use crate::frame::{Frame, FrameAssigner};
use crate::validators::Stake;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, warn};

pub use types::{ElectionConfig, ElectionStatus, FrameDecision, SlotDecision};
use types::Vote;

pub struct Election {
    config: ElectionConfig,
    /// Frame under election
    frame: Frame,
    slots: Vec<SlotDecision>,
    /// Votes per `(voter, slot)` for the current frame
    votes: HashMap<(EventIdx, usize), Vote>,
    /// Round of the voter that decided each slot
    decided_at: Vec<u32>,
    rounds: u32,
    stall_warned: bool,
}

impl Election {
    pub fn new(validator_count: usize, config: ElectionConfig) -> Self {
        Self {
            config,
            frame: 1,
            slots: vec![SlotDecision::Undecided; validator_count],
            votes: HashMap::new(),
            decided_at: vec![0; validator_count],
            rounds: 0,
            stall_warned: false,
        }
    }

    /// Frame currently under election
    pub fn frame(&self) -> Frame {
        self.frame
    }

    pub fn slots(&self) -> &[SlotDecision] {
        &self.slots
    }

    /// Feed a new root; returns every frame finished as a consequence
    pub fn process_root(
        &mut self,
        store: &EventStore,
        frames: &FrameAssigner,
        root: EventIdx,
    ) -> Vec<FrameDecision> {
        let mut finished = Vec::new();
        self.feed(store, frames, root);

        while self.all_decided() {
            finished.push(self.finish_frame(store, frames));

            'replay: for frame in self.frame + 1..=frames.last_frame() {
                for root in frames.roots().roots_of(frame) {
                    if self.all_decided() {
                        break 'replay;
                    }
                    self.feed(store, frames, root);
                }
            }
        }
        finished
    }

    fn feed(&mut self, store: &EventStore, frames: &FrameAssigner, root: EventIdx) {
        let Some(frame) = frames.frame_of(root) else {
            return;
        };
        if frame <= self.frame {
            return;
        }

        let round = frame - self.frame;
        if round > self.rounds {
            self.rounds = round;
            if round > self.config.stall_warn_rounds && !self.stall_warned {
                self.stall_warned = true;
                warn!(
                    "Election of frame {} still undecided after {} rounds",
                    self.frame, round
                );
            }
        }

        for slot in 0..self.slots.len() {
            if !self.slots[slot].is_decided() {
                self.vote(store, frames, root, slot);
            }
        }
    }

    /// Memoized vote of `voter` on `slot`, deciding the slot when possible
    fn vote(
        &mut self,
        store: &EventStore,
        frames: &FrameAssigner,
        voter: EventIdx,
        slot: usize,
    ) -> Vote {
        if let Some(vote) = self.votes.get(&(voter, slot)) {
            return *vote;
        }

        let voter_frame = frames.frame_of(voter).unwrap_or(0);
        let round = voter_frame.saturating_sub(self.frame);
        let vote = if round <= 1 {
            let subject = frames
                .roots()
                .frame(self.frame)
                .map(|roots| roots.of(slot))
                .unwrap_or(&[])
                .iter()
                .copied()
                .filter(|r| store.forkless_cause_idx(voter, *r))
                .min_by_key(|r| store.event(*r).hash());
            Vote {
                yes: subject.is_some(),
                root: subject,
            }
        } else {
            self.aggregate(store, frames, voter, voter_frame - 1, slot, round)
        };

        self.votes.insert((voter, slot), vote);
        vote
    }

    fn aggregate(
        &mut self,
        store: &EventStore,
        frames: &FrameAssigner,
        voter: EventIdx,
        prev_frame: Frame,
        slot: usize,
        round: u32,
    ) -> Vote {
        // One previous-round root per creator, smallest hash on ties
        let mut prev: BTreeMap<usize, EventIdx> = BTreeMap::new();
        for root in frames.roots().roots_of(prev_frame) {
            if !store.forkless_cause_idx(voter, root) {
                continue;
            }
            let creator = store.creator_pos(root);
            match prev.get(&creator) {
                Some(existing) if store.event(*existing).hash() <= store.event(root).hash() => {}
                _ => {
                    prev.insert(creator, root);
                }
            }
        }

        let validators = store.validators();
        let mut yes_stake: Stake = 0;
        let mut no_stake: Stake = 0;
        let mut per_root: BTreeMap<EventIdx, Stake> = BTreeMap::new();
        for (creator, root) in prev {
            let stake = validators.stake_at(creator);
            let vote = self.vote(store, frames, root, slot);
            match vote.root {
                Some(subject) if vote.yes => {
                    yes_stake += stake;
                    *per_root.entry(subject).or_default() += stake;
                }
                _ => no_stake += stake,
            }
        }

        // Forked roots of one creator compete; only the leading one can win
        let best = per_root.into_iter().max_by(|(a, sa), (b, sb)| {
            sa.cmp(sb)
                .then_with(|| store.event(*b).hash().cmp(&store.event(*a).hash()))
        });
        let best_stake = best.map_or(0, |(_, stake)| stake);
        let yes = best_stake > 0 && best_stake >= yes_stake - best_stake + no_stake;
        let vote = Vote {
            yes,
            root: if yes { best.map(|(root, _)| root) } else { None },
        };

        if !self.slots[slot].is_decided() {
            if validators.is_quorum(best_stake) || validators.is_quorum(no_stake) {
                self.decide(store, slot, vote, round);
            } else if self.config.max_rounds.map_or(false, |max| round >= max) {
                warn!(
                    "Forcing decision of slot {} in frame {} at round {} (yes {}, no {})",
                    validators.id_at(slot),
                    self.frame,
                    round,
                    yes_stake,
                    no_stake
                );
                self.decide(store, slot, vote, round);
            }
        }
        vote
    }

    fn decide(&mut self, store: &EventStore, slot: usize, vote: Vote, round: u32) {
        let decision = match vote.root {
            Some(root) if vote.yes => SlotDecision::Yes(root),
            _ => SlotDecision::No,
        };
        debug!(
            "Frame {} slot {} decided {:?} at round {}",
            self.frame,
            store.validators().id_at(slot),
            decision,
            round
        );
        self.slots[slot] = decision;
        self.decided_at[slot] = round;
    }

    fn all_decided(&self) -> bool {
        self.slots.iter().all(|s| s.is_decided())
    }

    fn finish_frame(&mut self, store: &EventStore, frames: &FrameAssigner) -> FrameDecision {
        let clothos: Vec<EventIdx> = self
            .slots
            .iter()
            .filter_map(|s| match s {
                SlotDecision::Yes(root) => Some(*root),
                _ => None,
            })
            .collect();
        let rejected = frames
            .roots()
            .roots_of(self.frame)
            .into_iter()
            .filter(|r| !clothos.contains(r))
            .collect();
        let decision = FrameDecision {
            frame: self.frame,
            clothos,
            rejected,
            rounds: self.decided_at.iter().copied().max().unwrap_or(0),
        };

        info!(
            "Frame {} finished: {} clothos after {} rounds",
            decision.frame,
            decision.clothos.len(),
            decision.rounds
        );

        let n = store.validators().len();
        self.frame += 1;
        self.slots = vec![SlotDecision::Undecided; n];
        self.decided_at = vec![0; n];
        self.votes.clear();
        self.rounds = 0;
        self.stall_warned = false;
        decision
    }

    pub fn status(&self, store: &EventStore) -> ElectionStatus {
        let validators = store.validators();
        let (decided, undecided): (Vec<usize>, Vec<usize>) =
            (0..self.slots.len()).partition(|s| self.slots[*s].is_decided());
        ElectionStatus {
            frame: self.frame,
            decided: decided.into_iter().map(|s| validators.id_at(s)).collect(),
            undecided: undecided.into_iter().map(|s| validators.id_at(s)).collect(),
            rounds: self.rounds,
            stalled: self.rounds > self.config.stall_warn_rounds,
        }
    }
}
