/// Test data generators
///
/// Random DAG schemes are reproducible from a seed and use the same
/// `Scheme` shape as the ASCII fixtures.

use crate::fixtures::{Scheme, ScriptedEvent};
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

/// Shape of a random DAG
#[derive(Clone, Debug)]
pub struct RandomDag {
    pub validators: usize,
    /// Events created after the first event of every validator
    pub events: usize,
    /// Upper bound on other-parents per event
    pub max_parents: usize,
    /// The first `cheaters` validators fork now and then
    pub cheaters: usize,
}

impl Default for RandomDag {
    fn default() -> Self {
        Self {
            validators: 4,
            events: 60,
            max_parents: 3,
            cheaters: 0,
        }
    }
}

impl RandomDag {
    pub fn generate(&self, seed: u64) -> Scheme {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut columns: Vec<Vec<usize>> = vec![Vec::new(); self.validators];
        let mut scheme = Scheme {
            validators: self.validators,
            events: Vec::new(),
        };

        for creator in 0..self.validators {
            push(&mut scheme, &mut columns, creator, None, Vec::new());
        }

        for _ in 0..self.events {
            let creator = rng.gen_range(0..self.validators);
            let own = &columns[creator];
            let forks = creator < self.cheaters && own.len() >= 2 && rng.gen_bool(0.2);
            let self_parent = if forks {
                own[own.len() - 2]
            } else {
                own[own.len() - 1]
            };

            let mut others: Vec<usize> = (0..self.validators).filter(|c| *c != creator).collect();
            others.shuffle(&mut rng);
            let count = rng.gen_range(1..=self.max_parents.max(1)).min(others.len());
            let other_parents = others[..count]
                .iter()
                .map(|c| columns[*c][columns[*c].len() - 1])
                .collect();

            push(&mut scheme, &mut columns, creator, Some(self_parent), other_parents);
        }
        scheme
    }
}

fn push(
    scheme: &mut Scheme,
    columns: &mut [Vec<usize>],
    creator: usize,
    self_parent: Option<usize>,
    other_parents: Vec<usize>,
) {
    let idx = scheme.events.len();
    scheme.events.push(ScriptedEvent {
        name: format!("{}{}", column_letter(creator), columns[creator].len() + 1),
        creator,
        self_parent,
        other_parents,
    });
    columns[creator].push(idx);
}

fn column_letter(column: usize) -> char {
    char::from(b'a' + (column % 26) as u8)
}

/// Random delivery order in which every event comes after its parents
pub fn topological_shuffle(scheme: &Scheme, seed: u64) -> Vec<usize> {
    let mut rng = StdRng::seed_from_u64(seed);
    let n = scheme.events.len();
    let mut children: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut missing = vec![0usize; n];
    for (idx, event) in scheme.events.iter().enumerate() {
        for parent in event.self_parent.iter().chain(event.other_parents.iter()) {
            children[*parent].push(idx);
            missing[idx] += 1;
        }
    }

    let mut ready: Vec<usize> = (0..n).filter(|i| missing[*i] == 0).collect();
    let mut order = Vec::with_capacity(n);
    while !ready.is_empty() {
        let pick = rng.gen_range(0..ready.len());
        let idx = ready.swap_remove(pick);
        order.push(idx);
        for child in &children[idx] {
            missing[*child] -= 1;
            if missing[*child] == 0 {
                ready.push(*child);
            }
        }
    }
    order
}

/// `(scheme, delivery order)` pairs for property tests
pub fn dag_with_orders(
    shape: RandomDag,
    orders: usize,
) -> impl Strategy<Value = (Scheme, Vec<Vec<usize>>)> {
    (any::<u64>(), prop::collection::vec(any::<u64>(), orders)).prop_map(
        move |(seed, order_seeds)| {
            let scheme = shape.generate(seed);
            let orders = order_seeds
                .into_iter()
                .map(|s| topological_shuffle(&scheme, s))
                .collect();
            (scheme, orders)
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_is_reproducible() {
        let shape = RandomDag::default();
        assert_eq!(shape.generate(7), shape.generate(7));
        assert_ne!(shape.generate(7), shape.generate(8));
        assert_eq!(shape.generate(7).events.len(), 64);
    }

    #[test]
    fn test_parents_precede_children() {
        let scheme = RandomDag {
            cheaters: 1,
            ..Default::default()
        }
        .generate(3);
        for (idx, event) in scheme.events.iter().enumerate() {
            for parent in event.self_parent.iter().chain(event.other_parents.iter()) {
                assert!(*parent < idx);
            }
            for other in &event.other_parents {
                assert_ne!(scheme.events[*other].creator, event.creator);
            }
        }
    }

    #[test]
    fn test_topological_shuffle_respects_parents() {
        let scheme = RandomDag::default().generate(11);
        let order = topological_shuffle(&scheme, 5);
        assert_eq!(order.len(), scheme.events.len());

        let mut position = vec![0; order.len()];
        for (pos, idx) in order.iter().enumerate() {
            position[*idx] = pos;
        }
        for (idx, event) in scheme.events.iter().enumerate() {
            for parent in event.self_parent.iter().chain(event.other_parents.iter()) {
                assert!(position[*parent] < position[idx]);
            }
        }
    }
}
