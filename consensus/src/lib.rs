/// Posposet Consensus Core
///
/// Leaderless asynchronous BFT consensus over a DAG of validator events:
/// - Event store with per-branch vector clocks for O(1) ancestry queries
/// - Frame assignment and root detection by forkless causality
/// - Stake-weighted multi-round Clotho election
/// - Atropos timestamps and deterministic total-order emission
/// - Async engine actor with snapshots and a finalized block log

pub mod atropos;
pub mod config;
pub mod crypto;
pub mod dag;
pub mod election;
pub mod engine;
pub mod frame;
pub mod poset;
pub mod validators;

pub use config::{ConfigError, ConsensusConfig, EngineConfig};
pub use crypto::Hash;
pub use dag::{DagError, Event, EventBody, EventStore};
pub use election::{ElectionConfig, ElectionStatus};
pub use engine::{BlockCursor, ConsensusEngine, EngineError, EngineHandle, FinalitySink, PosetSnapshot};
pub use frame::Frame;
pub use poset::{ClothoState, ConsensusError, FinalizedBlock, Poset, ProcessedEvent};
pub use validators::{Stake, ValidatorId, Validators, ValidatorsError};
