/// Cryptography module for the posposet consensus core
///
/// Event signatures are verified upstream; the core only needs
/// content hashing.

pub mod hash;

pub use hash::{hash_data, Hash, HASH_SIZE};
