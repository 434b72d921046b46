/// Transaction storm: signed transfer load generator
///
/// Produces a steady, rate-limited stream of signed value transfers between a
/// range of deterministic test accounts.

pub mod account;
pub mod config;
pub mod generator;

pub use account::{Account, Address, SignedTransfer, Transfer};
pub use config::{AccountsConfig, ConfigError, TxStormConfig};
pub use generator::{
    Generator, GeneratorError, GeneratorStats, RateHandle, Transaction, TxInfo, TxStream,
};
