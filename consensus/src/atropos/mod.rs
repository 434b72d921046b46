/// Atropos assignment
///
/// The Clothos of frame `F` get their consensus timestamps once frame
/// `F + 1` is finished. For a Clotho `c` every decided Clotho `r` of `F + 1`
/// that forkless-causes `c` contributes, weighted by its creator's stake, the
/// Lamport time of the earliest event on `r`'s self-parent chain that still
/// forkless-causes `c`. The weighted median of those times is `c`'s
/// timestamp.

pub mod emitter;

use crate::dag::{EventIdx, EventStore, Lamport};
use crate::election::FrameDecision;
use crate::frame::Frame;
use crate::validators::Stake;
use tracing::info;

pub use emitter::TotalOrderEmitter;

/// Consensus timestamp of an Atropos
pub type Timestamp = Lamport;

/// A Clotho promoted to Atropos
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Atropos {
    pub idx: EventIdx,
    pub frame: Frame,
    pub timestamp: Timestamp,
}

/// Stamps decided Clothos; keeps the run-wide timestamp strictly increasing
#[derive(Debug, Default)]
pub struct AtroposAssigner {
    last_timestamp: Timestamp,
}

impl AtroposAssigner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Timestamp of the most recent Atropos, 0 before the first one
    pub fn last_timestamp(&self) -> Timestamp {
        self.last_timestamp
    }

    /// Stamp the Clothos of `decided` using the Clothos of the frame after it
    ///
    /// Returns the Atroposes in consensus order.
    pub fn assign(
        &mut self,
        store: &EventStore,
        decided: &FrameDecision,
        next: &FrameDecision,
    ) -> Vec<Atropos> {
        debug_assert_eq!(decided.frame + 1, next.frame);

        let mut stamped: Vec<(Timestamp, EventIdx)> = decided
            .clothos
            .iter()
            .map(|c| (median_time(store, *c, &next.clothos), *c))
            .collect();
        stamped.sort_by(|(ta, a), (tb, b)| {
            let (ea, eb) = (store.event(*a), store.event(*b));
            ta.cmp(tb)
                .then(ea.lamport().cmp(&eb.lamport()))
                .then(ea.hash().cmp(&eb.hash()))
        });

        let mut atroposes = Vec::with_capacity(stamped.len());
        for (time, idx) in stamped {
            let timestamp = time.max(self.last_timestamp + 1);
            self.last_timestamp = timestamp;
            info!(
                "Atropos {} of frame {} at {}",
                store.event(idx).hash(),
                decided.frame,
                timestamp
            );
            atroposes.push(Atropos {
                idx,
                frame: decided.frame,
                timestamp,
            });
        }
        atroposes
    }
}

/// Stake-weighted median of the first-forkless-caused times of `clotho`
fn median_time(store: &EventStore, clotho: EventIdx, observers: &[EventIdx]) -> Timestamp {
    let mut samples: Vec<(Timestamp, Stake)> = observers
        .iter()
        .filter(|r| store.forkless_cause_idx(**r, clotho))
        .map(|r| {
            let first = first_forkless_caused_by(store, *r, clotho);
            (
                store.event(first).lamport(),
                store.validators().stake_at(store.creator_pos(*r)),
            )
        })
        .collect();
    if samples.is_empty() {
        return store.event(clotho).lamport();
    }

    samples.sort_unstable();
    // Sums of up to u64::MAX stake, doubled
    let total: u128 = samples.iter().map(|(_, s)| *s as u128).sum();
    let mut acc: u128 = 0;
    for (time, stake) in &samples {
        acc += *stake as u128;
        if acc * 2 >= total {
            return *time;
        }
    }
    samples[samples.len() - 1].0
}

/// Walk back along `from`'s self-parent chain while it forkless-causes `target`
fn first_forkless_caused_by(store: &EventStore, from: EventIdx, target: EventIdx) -> EventIdx {
    let mut first = from;
    while let Some(sp) = store.self_parent_of(first) {
        if !store.forkless_cause_idx(sp, target) {
            break;
        }
        first = sp;
    }
    first
}
