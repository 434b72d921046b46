/// Content hashing for DAG events (BLAKE3)

use serde::{Deserialize, Serialize};
use std::fmt;

pub const HASH_SIZE: usize = 32;

/// Hash output (32 bytes)
///
/// Ordering is bytewise; it is the last tie-break of every total order in
/// the consensus core.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Hash([u8; HASH_SIZE]);

impl Hash {
    pub fn new(bytes: [u8; HASH_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; HASH_SIZE] {
        &self.0
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0[..8]))
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", hex::encode(&self.0[..8]))
    }
}

/// Hash arbitrary data
pub fn hash_data(data: &[u8]) -> Hash {
    Hash::new(*blake3::hash(data).as_bytes())
}
