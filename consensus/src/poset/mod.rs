/// Poset: the synchronous consensus pipeline
///
/// `process_event` runs a new event through the whole pipeline in order:
/// event store, frame assignment, root detection, Clotho election, Atropos
/// stamping and total-order emission. Finalized batches are appended to the
/// block log.

use crate::atropos::{Atropos, AtroposAssigner, Timestamp, TotalOrderEmitter};
use crate::config::ConsensusConfig;
use crate::crypto::Hash;
use crate::dag::{DagError, Event, EventIdx, EventStore, Seq};
use crate::election::{Election, ElectionConfig, ElectionStatus, FrameDecision};
use crate::frame::{Frame, FrameAssigner};
use crate::validators::{ValidatorId, Validators};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, info};


/// Consensus errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConsensusError {
    #[error(transparent)]
    Dag(#[from] DagError),

    /// The event was recorded anyway; its creator is now a known cheater
    #[error("Fork by {creator} at seq {seq}: {event}")]
    ForkConflict {
        creator: ValidatorId,
        seq: Seq,
        event: Hash,
    },
}

pub type Result<T> = std::result::Result<T, ConsensusError>;

/// Election outcome of a root
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClothoState {
    Undecided,
    Clotho,
    Rejected,
    Atropos(Timestamp),
}

/// A finalized batch: the Atropos and every event it newly orders
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizedBlock {
    /// Position in the finalized log, starting at 0
    pub index: u64,
    pub atropos: Hash,
    pub timestamp: Timestamp,
    pub frame: Frame,
    pub events: Vec<Hash>,
}

/// What happened to a submitted event
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProcessedEvent {
    pub hash: Hash,
    pub frame: Frame,
    pub root: bool,
    /// Blocks finalized while processing this event
    pub blocks: Vec<FinalizedBlock>,
}

pub struct Poset {
    store: EventStore,
    frames: FrameAssigner,
    election: Election,
    atropos: AtroposAssigner,
    emitter: TotalOrderEmitter,
    /// Last finished frame, waiting for the next one to stamp its Clothos
    pending: Option<FrameDecision>,
    states: HashMap<EventIdx, ClothoState>,
    blocks: Vec<FinalizedBlock>,
}

impl Poset {
    pub fn new(validators: Validators, election: ElectionConfig) -> Self {
        let n = validators.len();
        Self {
            store: EventStore::new(validators),
            frames: FrameAssigner::new(n),
            election: Election::new(n, election),
            atropos: AtroposAssigner::new(),
            emitter: TotalOrderEmitter::new(),
            pending: None,
            states: HashMap::new(),
            blocks: Vec::new(),
        }
    }

    pub fn from_config(config: &ConsensusConfig) -> Self {
        Self::new(config.validators.clone(), config.election.clone())
    }

    /// Run an event through the pipeline
    ///
    /// A fork is fully processed before `ForkConflict` is returned.
    pub fn process_event(&mut self, event: Event) -> Result<ProcessedEvent> {
        let inserted = self.store.insert(event)?;
        let idx = inserted.idx;
        let assigned = self.frames.assign(&self.store, idx);

        let mut blocks = Vec::new();
        if assigned.root && assigned.frame <= self.last_decided_frame() {
            // Too late for an election that already finished
            debug!("Late root {} in frame {}", self.store.event(idx).hash(), assigned.frame);
            self.states.insert(idx, ClothoState::Rejected);
        } else if assigned.root {
            self.states.insert(idx, ClothoState::Undecided);
            let decisions = self.election.process_root(&self.store, &self.frames, idx);
            for decision in decisions {
                blocks.extend(self.on_frame_decided(decision));
            }
        }

        if let Some(fork) = inserted.fork {
            return Err(ConsensusError::ForkConflict {
                creator: fork.creator,
                seq: fork.seq,
                event: fork.event,
            });
        }

        Ok(ProcessedEvent {
            hash: self.store.event(idx).hash(),
            frame: assigned.frame,
            root: assigned.root,
            blocks,
        })
    }

    fn on_frame_decided(&mut self, decision: FrameDecision) -> Vec<FinalizedBlock> {
        for clotho in &decision.clothos {
            self.states.insert(*clotho, ClothoState::Clotho);
        }
        for rejected in &decision.rejected {
            self.states.insert(*rejected, ClothoState::Rejected);
        }

        let Some(previous) = self.pending.replace(decision) else {
            return Vec::new();
        };
        let Some(current) = self.pending.as_ref() else {
            return Vec::new();
        };

        let atroposes = self.atropos.assign(&self.store, &previous, current);
        atroposes
            .into_iter()
            .map(|atropos| self.finalize(atropos))
            .collect()
    }

    fn finalize(&mut self, atropos: Atropos) -> FinalizedBlock {
        self.states
            .insert(atropos.idx, ClothoState::Atropos(atropos.timestamp));
        let events = self
            .emitter
            .emit(&self.store, atropos.idx)
            .into_iter()
            .map(|idx| self.store.event(idx).hash())
            .collect::<Vec<_>>();

        let block = FinalizedBlock {
            index: self.blocks.len() as u64,
            atropos: self.store.event(atropos.idx).hash(),
            timestamp: atropos.timestamp,
            frame: atropos.frame,
            events,
        };
        info!(
            "Finalized block {} with {} events (atropos {})",
            block.index,
            block.events.len(),
            block.atropos
        );
        self.blocks.push(block.clone());
        block
    }

    pub fn store(&self) -> &EventStore {
        &self.store
    }

    pub fn validators(&self) -> &Validators {
        self.store.validators()
    }

    pub fn frame_of(&self, hash: &Hash) -> Option<Frame> {
        self.store
            .idx_of(hash)
            .and_then(|idx| self.frames.frame_of(idx))
    }

    pub fn is_root(&self, hash: &Hash) -> bool {
        self.store
            .idx_of(hash)
            .map_or(false, |idx| self.frames.is_root(idx))
    }

    /// Election state of a root, `None` for non-roots and unknown events
    pub fn clotho_state(&self, hash: &Hash) -> Option<ClothoState> {
        self.store
            .idx_of(hash)
            .and_then(|idx| self.states.get(&idx).copied())
    }

    /// Roots of a frame in arrival order
    pub fn roots_of(&self, frame: Frame) -> Vec<Hash> {
        self.frames
            .roots()
            .roots_of(frame)
            .into_iter()
            .map(|idx| self.store.event(idx).hash())
            .collect()
    }

    /// Highest frame reached by any event
    pub fn last_frame(&self) -> Frame {
        self.frames.last_frame()
    }

    /// Highest frame whose election is finished, 0 before the first one
    pub fn last_decided_frame(&self) -> Frame {
        self.election.frame() - 1
    }

    pub fn election_status(&self) -> ElectionStatus {
        self.election.status(&self.store)
    }

    /// Finalized blocks starting at `index`
    pub fn blocks_from(&self, index: u64) -> &[FinalizedBlock] {
        let start = (index as usize).min(self.blocks.len());
        &self.blocks[start..]
    }

    pub fn blocks(&self) -> &[FinalizedBlock] {
        &self.blocks
    }

    /// Atropos hashes in consensus order
    pub fn atroposes(&self) -> Vec<Hash> {
        self.blocks.iter().map(|b| b.atropos).collect()
    }

    /// Every finalized event in total order
    pub fn ordered_events(&self) -> Vec<Hash> {
        self.blocks
            .iter()
            .flat_map(|b| b.events.iter().copied())
            .collect()
    }

    pub fn is_finalized(&self, hash: &Hash) -> bool {
        self.store
            .idx_of(hash)
            .map_or(false, |idx| self.emitter.is_emitted(idx))
    }

    pub fn cheaters(&self) -> Vec<ValidatorId> {
        self.store.cheaters()
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}

impl std::fmt::Debug for Poset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Poset")
            .field("events", &self.store.len())
            .field("last_frame", &self.last_frame())
            .field("election_frame", &self.election.frame())
            .field("blocks", &self.blocks.len())
            .finish()
    }
}
