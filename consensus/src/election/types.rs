/// Clotho election types

use crate::dag::EventIdx;
use crate::frame::Frame;
use crate::validators::ValidatorId;
use serde::{Deserialize, Serialize};

/// Election tuning
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ElectionConfig {
    /// Round at which an undecided slot is settled by the voter's own
    /// majority. `None` waits for a supermajority indefinitely.
    pub max_rounds: Option<u32>,

    /// Rounds after which a still-running election is logged as stalled
    pub stall_warn_rounds: u32,
}

impl Default for ElectionConfig {
    fn default() -> Self {
        Self {
            max_rounds: None,
            stall_warn_rounds: 16,
        }
    }
}

/// Decision state of one validator slot in the frame under election
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotDecision {
    Undecided,
    /// The slot's root that becomes a Clotho
    Yes(EventIdx),
    No,
}

impl SlotDecision {
    pub fn is_decided(&self) -> bool {
        !matches!(self, SlotDecision::Undecided)
    }
}

/// A voter's opinion on one slot
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Vote {
    pub yes: bool,
    /// Root the yes vote refers to
    pub root: Option<EventIdx>,
}

/// Outcome of a finished frame
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameDecision {
    pub frame: Frame,
    /// Roots decided yes, in validator order
    pub clothos: Vec<EventIdx>,
    /// Every other root of the frame known at decision time
    pub rejected: Vec<EventIdx>,
    /// Round in which the last slot was decided
    pub rounds: u32,
}

/// Progress of the running election, for external monitoring
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionStatus {
    /// Frame under election
    pub frame: Frame,
    pub decided: Vec<ValidatorId>,
    pub undecided: Vec<ValidatorId>,
    /// Highest voting round reached so far
    pub rounds: u32,
    pub stalled: bool,
}
