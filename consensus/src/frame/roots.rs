//! Frame → roots index

use super::Frame;
use crate::dag::EventIdx;

/// Roots of a single frame, grouped by creator position
#[derive(Clone, Debug, Default)]
pub struct FrameRoots {
    by_creator: Vec<Vec<EventIdx>>,
    /// All roots in arrival order
    all: Vec<EventIdx>,
}

impl FrameRoots {
    fn new(validator_count: usize) -> Self {
        Self {
            by_creator: vec![Vec::new(); validator_count],
            all: Vec::new(),
        }
    }

    /// Roots of one creator; more than one only for a forking creator
    pub fn of(&self, creator: usize) -> &[EventIdx] {
        self.by_creator.get(creator).map_or(&[], |r| r.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = EventIdx> + '_ {
        self.all.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.all.len()
    }

    pub fn is_empty(&self) -> bool {
        self.all.is_empty()
    }
}

/// Root index over all frames
#[derive(Clone, Debug, Default)]
pub struct RootIndex {
    validator_count: usize,
    /// `frames[f - 1]` holds frame `f`
    frames: Vec<FrameRoots>,
}

impl RootIndex {
    pub fn new(validator_count: usize) -> Self {
        Self {
            validator_count,
            frames: Vec::new(),
        }
    }

    pub fn insert(&mut self, frame: Frame, creator: usize, idx: EventIdx) {
        debug_assert!(frame >= 1);
        let slot = frame as usize - 1;
        while self.frames.len() <= slot {
            self.frames.push(FrameRoots::new(self.validator_count));
        }
        let roots = &mut self.frames[slot];
        roots.by_creator[creator].push(idx);
        roots.all.push(idx);
    }

    pub fn frame(&self, frame: Frame) -> Option<&FrameRoots> {
        if frame == 0 {
            return None;
        }
        self.frames.get(frame as usize - 1)
    }

    /// Roots of `frame`, empty for frames nobody reached yet
    pub fn roots_of(&self, frame: Frame) -> Vec<EventIdx> {
        self.frame(frame).map(|r| r.all.clone()).unwrap_or_default()
    }

    /// Highest frame holding at least one root, 0 when empty
    pub fn last_frame(&self) -> Frame {
        self.frames.len() as Frame
    }
}
