/// DAG event data structure
///
/// An event is a validator-signed node referencing the events its creator
/// had observed. Its identity is the hash of its canonical encoding.

use crate::crypto::{hash_data, Hash, HASH_SIZE};
use crate::validators::ValidatorId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Per-creator sequence number, first event is 1
pub type Seq = u64;

/// Lamport time: `1 + max(parent lamport)`
pub type Lamport = u64;

/// Hashed part of an event
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventBody {
    pub creator: ValidatorId,
    pub seq: Seq,
    pub lamport: Lamport,
    pub self_parent: Option<Hash>,
    pub other_parents: Vec<Hash>,
    pub payload: Vec<Vec<u8>>,
}

impl EventBody {
    /// Canonical encoding: big-endian integers, every variable-length field
    /// prefixed with its length, so distinct bodies never share an encoding
    pub fn encode(&self) -> Vec<u8> {
        let payload_len: usize = self.payload.iter().map(|p| 8 + p.len()).sum();
        let parents_len = (1 + self.other_parents.len()) * HASH_SIZE;
        let mut out = Vec::with_capacity(4 + 8 + 8 + 1 + 8 + 8 + parents_len + payload_len);
        out.extend_from_slice(&self.creator.0.to_be_bytes());
        out.extend_from_slice(&self.seq.to_be_bytes());
        out.extend_from_slice(&self.lamport.to_be_bytes());
        match &self.self_parent {
            Some(parent) => {
                out.push(1);
                out.extend_from_slice(parent.as_bytes());
            }
            None => out.push(0),
        }
        out.extend_from_slice(&(self.other_parents.len() as u64).to_be_bytes());
        for parent in &self.other_parents {
            out.extend_from_slice(parent.as_bytes());
        }
        out.extend_from_slice(&(self.payload.len() as u64).to_be_bytes());
        for item in &self.payload {
            out.extend_from_slice(&(item.len() as u64).to_be_bytes());
            out.extend_from_slice(item);
        }
        out
    }

    /// Canonical hash of the body
    pub fn hash(&self) -> Hash {
        hash_data(&self.encode())
    }
}

/// Immutable DAG event
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "EventBody", into = "EventBody")]
pub struct Event {
    hash: Hash,
    body: EventBody,
}

impl Event {
    pub fn new(body: EventBody) -> Self {
        let hash = body.hash();
        Self { hash, body }
    }

    /// A validator's first event
    pub fn first(creator: ValidatorId, other_parents: &[&Event], payload: Vec<Vec<u8>>) -> Self {
        let lamport = other_parents.iter().map(|p| p.lamport()).max().unwrap_or(0) + 1;
        Self::new(EventBody {
            creator,
            seq: 1,
            lamport,
            self_parent: None,
            other_parents: other_parents.iter().map(|p| p.hash()).collect(),
            payload,
        })
    }

    /// Next event of `self_parent`'s creator, seq and lamport derived from parents
    pub fn child(self_parent: &Event, other_parents: &[&Event], payload: Vec<Vec<u8>>) -> Self {
        let lamport = other_parents
            .iter()
            .map(|p| p.lamport())
            .chain(std::iter::once(self_parent.lamport()))
            .max()
            .unwrap_or(0)
            + 1;
        Self::new(EventBody {
            creator: self_parent.creator(),
            seq: self_parent.seq() + 1,
            lamport,
            self_parent: Some(self_parent.hash()),
            other_parents: other_parents.iter().map(|p| p.hash()).collect(),
            payload,
        })
    }

    pub fn hash(&self) -> Hash {
        self.hash
    }

    pub fn creator(&self) -> ValidatorId {
        self.body.creator
    }

    pub fn seq(&self) -> Seq {
        self.body.seq
    }

    pub fn lamport(&self) -> Lamport {
        self.body.lamport
    }

    pub fn self_parent(&self) -> Option<Hash> {
        self.body.self_parent
    }

    pub fn other_parents(&self) -> &[Hash] {
        &self.body.other_parents
    }

    pub fn payload(&self) -> &[Vec<u8>] {
        &self.body.payload
    }

    pub fn body(&self) -> &EventBody {
        &self.body
    }

    /// Self-parent first, then other parents in declared order
    pub fn parents(&self) -> impl Iterator<Item = Hash> + '_ {
        self.body
            .self_parent
            .iter()
            .copied()
            .chain(self.body.other_parents.iter().copied())
    }

    pub fn is_first(&self) -> bool {
        self.body.self_parent.is_none()
    }
}

impl From<EventBody> for Event {
    fn from(body: EventBody) -> Self {
        Self::new(body)
    }
}

impl From<Event> for EventBody {
    fn from(event: Event) -> Self {
        event.body
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("hash", &self.hash)
            .field("creator", &self.body.creator)
            .field("seq", &self.body.seq)
            .field("lamport", &self.body.lamport)
            .field("parents", &self.body.other_parents.len())
            .finish()
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}#{} [{}] L{}",
            self.body.creator, self.body.seq, self.hash, self.body.lamport
        )
    }
}
