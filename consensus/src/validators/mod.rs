/// Validator set and stake arithmetic
///
/// The stake table is injected read-only; it defines the supermajority
/// threshold used by frame assignment and the Clotho election.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Stake weight of a validator
pub type Stake = u64;

/// Validator identifier
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ValidatorId(pub u32);

impl fmt::Display for ValidatorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ValidatorsError {
    #[error("Validator set is empty")]
    Empty,

    #[error("Validator {0} has zero stake")]
    ZeroStake(ValidatorId),

    #[error("Validator {0} listed twice")]
    Duplicate(ValidatorId),

    #[error("Total stake overflows")]
    Overflow,
}

pub type Result<T> = std::result::Result<T, ValidatorsError>;

/// One entry of a serialized stake table
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorEntry {
    pub id: ValidatorId,
    pub stake: Stake,
}

/// Fixed validator stake table
///
/// Validators are kept sorted by id, each gets a dense position that the
/// ancestry index and the election use as a slot number.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<ValidatorEntry>", into = "Vec<ValidatorEntry>")]
pub struct Validators {
    ids: Vec<ValidatorId>,
    stakes: Vec<Stake>,
    positions: BTreeMap<ValidatorId, usize>,
    total: Stake,
}

impl Validators {
    /// Build a stake table from `(id, stake)` pairs
    pub fn new<I>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (ValidatorId, Stake)>,
    {
        let mut sorted: BTreeMap<ValidatorId, Stake> = BTreeMap::new();
        for (id, stake) in entries {
            if stake == 0 {
                return Err(ValidatorsError::ZeroStake(id));
            }
            if sorted.insert(id, stake).is_some() {
                return Err(ValidatorsError::Duplicate(id));
            }
        }
        if sorted.is_empty() {
            return Err(ValidatorsError::Empty);
        }

        let mut total: Stake = 0;
        let mut ids = Vec::with_capacity(sorted.len());
        let mut stakes = Vec::with_capacity(sorted.len());
        let mut positions = BTreeMap::new();
        for (pos, (id, stake)) in sorted.into_iter().enumerate() {
            total = total.checked_add(stake).ok_or(ValidatorsError::Overflow)?;
            ids.push(id);
            stakes.push(stake);
            positions.insert(id, pos);
        }

        Ok(Self {
            ids,
            stakes,
            positions,
            total,
        })
    }

    /// `n` validators `0..n` with stake 1 each
    pub fn equal(n: u32) -> Result<Self> {
        Self::new((0..n).map(|i| (ValidatorId(i), 1)))
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn total_stake(&self) -> Stake {
        self.total
    }

    /// Dense position of a validator
    pub fn position(&self, id: &ValidatorId) -> Option<usize> {
        self.positions.get(id).copied()
    }

    pub fn contains(&self, id: &ValidatorId) -> bool {
        self.positions.contains_key(id)
    }

    pub fn id_at(&self, position: usize) -> ValidatorId {
        self.ids[position]
    }

    pub fn stake_at(&self, position: usize) -> Stake {
        self.stakes[position]
    }

    pub fn stake_of(&self, id: &ValidatorId) -> Stake {
        self.position(id).map_or(0, |pos| self.stakes[pos])
    }

    /// Validators in ascending id order
    pub fn ids(&self) -> &[ValidatorId] {
        &self.ids
    }

    /// Supermajority test: strictly more than 2/3 of total stake
    pub fn is_quorum(&self, stake: Stake) -> bool {
        (stake as u128) * 3 > (self.total as u128) * 2
    }

    /// Stake sum over a set of positions; each position counted once
    pub fn stake_of_positions<I>(&self, positions: I) -> Stake
    where
        I: IntoIterator<Item = usize>,
    {
        let mut seen = vec![false; self.len()];
        let mut sum = 0;
        for pos in positions {
            if !seen[pos] {
                seen[pos] = true;
                sum += self.stakes[pos];
            }
        }
        sum
    }
}

impl TryFrom<Vec<ValidatorEntry>> for Validators {
    type Error = ValidatorsError;

    fn try_from(entries: Vec<ValidatorEntry>) -> Result<Self> {
        Self::new(entries.into_iter().map(|e| (e.id, e.stake)))
    }
}

impl From<Validators> for Vec<ValidatorEntry> {
    fn from(validators: Validators) -> Self {
        validators
            .ids
            .iter()
            .zip(validators.stakes.iter())
            .map(|(id, stake)| ValidatorEntry {
                id: *id,
                stake: *stake,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equal_stake_quorum() {
        let validators = Validators::equal(5).unwrap();
        assert_eq!(validators.total_stake(), 5);
        assert!(validators.is_quorum(4));
        assert!(!validators.is_quorum(3));
    }

    #[test]
    fn test_quorum_matches_threshold_for_four_validators() {
        let validators = Validators::equal(4).unwrap();
        assert!(validators.is_quorum(3));
        assert!(!validators.is_quorum(2));
    }

    #[test]
    fn test_quorum_near_stake_limit() {
        let validators = Validators::new(vec![
            (ValidatorId(0), 1),
            (ValidatorId(1), 1),
            (ValidatorId(2), 1),
            (ValidatorId(3), u64::MAX - 3),
        ])
        .unwrap();
        assert_eq!(validators.total_stake(), u64::MAX);
        assert!(validators.is_quorum(u64::MAX - 3));
        assert!(!validators.is_quorum(3));
        assert_eq!(validators.stake_of_positions([0, 1, 2, 3]), u64::MAX);

        assert_eq!(
            Validators::new(vec![(ValidatorId(0), u64::MAX), (ValidatorId(1), 1)]),
            Err(ValidatorsError::Overflow)
        );
    }

    #[test]
    fn test_weighted_quorum() {
        let validators = Validators::new(vec![
            (ValidatorId(7), 50),
            (ValidatorId(1), 30),
            (ValidatorId(3), 20),
        ])
        .unwrap();

        // Sorted by id
        assert_eq!(validators.ids(), &[ValidatorId(1), ValidatorId(3), ValidatorId(7)]);
        assert_eq!(validators.position(&ValidatorId(7)), Some(2));

        // 50 + 20 = 70 > 66.6
        assert!(validators.is_quorum(70));
        // 50 + 10 would not be, exactly 2/3 is not enough either
        assert!(!validators.is_quorum(60));
        assert_eq!(validators.stake_of_positions([0, 0, 1]), 50);
    }

    #[test]
    fn test_invalid_tables() {
        assert_eq!(Validators::new(vec![]), Err(ValidatorsError::Empty));
        assert_eq!(
            Validators::new(vec![(ValidatorId(0), 0)]),
            Err(ValidatorsError::ZeroStake(ValidatorId(0)))
        );
        assert_eq!(
            Validators::new(vec![(ValidatorId(0), 1), (ValidatorId(0), 2)]),
            Err(ValidatorsError::Duplicate(ValidatorId(0)))
        );
    }

    #[test]
    fn test_deserialize_stake_table() {
        let json = r#"[{"id":2,"stake":10},{"id":1,"stake":5}]"#;
        let validators: Validators = serde_json::from_str(json).unwrap();
        assert_eq!(validators.len(), 2);
        assert_eq!(validators.stake_of(&ValidatorId(2)), 10);

        let bad = r#"[{"id":1,"stake":0}]"#;
        assert!(serde_json::from_str::<Validators>(bad).is_err());
    }
}
