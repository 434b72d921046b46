/// Testing utilities for Posposet
///
/// Provides:
/// - ASCII DAG scheme parser
/// - Seeded random DAG generators and delivery orders

pub mod fixtures;
pub mod generators;

pub use fixtures::{parse_scheme, Scheme, SchemeError, ScriptedEvent};
pub use generators::*;
