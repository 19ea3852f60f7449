//! Bipartite propagation closure.
//!
//! The graph alternates *conjuncts* and *disjuncts*: a conjunct activates
//! when all of its inputs are active (an empty input set activates it
//! immediately), a disjunct when any input is. Epsilon-deriving symbols,
//! well-founded symbols, and FIRST-style set propagation are all instances.
//! Linear in the total number of edges.

use handloom_runtime::definition::TerminalIDSet;

use crate::types::get_two_mut;

/// The boolean form. Disjuncts are caller-numbered slots; conjuncts are
/// added one at a time with their input multiset and single output.
#[derive(Debug, Default)]
pub struct Closure {
    n_disjuncts: usize,
    conjunct_inputs: Vec<u32>,
    conjunct_output: Vec<usize>,
    /// For each disjunct, the conjuncts depending on it, once per mention.
    dependents: Vec<Vec<usize>>,
}

impl Closure {
    pub fn new(n_disjuncts: usize) -> Self {
        Self {
            n_disjuncts,
            conjunct_inputs: Vec::new(),
            conjunct_output: Vec::new(),
            dependents: vec![Vec::new(); n_disjuncts],
        }
    }

    /// Multiset semantics: a disjunct listed twice must be counted twice.
    pub fn conjunct(&mut self, inputs: &[usize], output: usize) {
        let ix = self.conjunct_inputs.len();
        self.conjunct_inputs.push(inputs.len() as u32);
        self.conjunct_output.push(output);
        for &d in inputs {
            self.dependents[d].push(ix);
        }
    }

    /// Propagate from the seed disjuncts; returns the active set.
    pub fn solve(&self, seeds: impl IntoIterator<Item = usize>) -> Vec<bool> {
        let mut active = vec![false; self.n_disjuncts];
        let mut remain = self.conjunct_inputs.clone();
        let mut disjunct_work: Vec<usize> = seeds.into_iter().collect();
        let mut conjunct_work: Vec<usize> = (0..remain.len()).filter(|&c| remain[c] == 0).collect();
        loop {
            if let Some(d) = disjunct_work.pop() {
                if active[d] {
                    continue;
                }
                active[d] = true;
                for &c in &self.dependents[d] {
                    remain[c] -= 1;
                    if remain[c] == 0 {
                        conjunct_work.push(c);
                    }
                }
                continue;
            }
            if let Some(c) = conjunct_work.pop() {
                let d = self.conjunct_output[c];
                if !active[d] {
                    disjunct_work.push(d);
                }
                continue;
            }
            break;
        }
        active
    }
}

/// The set-lifted form: union-propagation of terminal sets along OR-edges.
/// `flows_into[n]` lists the slots whose sets must absorb slot `n`'s.
/// Runs to fixpoint; order-independent.
pub fn propagate_sets(sets: &mut [TerminalIDSet], flows_into: &[Vec<usize>]) {
    let mut work: Vec<usize> = (0..sets.len()).collect();
    while let Some(n) = work.pop() {
        for &t in &flows_into[n] {
            if t == n {
                continue;
            }
            let (source, target) = get_two_mut(sets, n, t);
            let before = target.len();
            target.union_with(source);
            if target.len() != before {
                work.push(t);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use handloom_runtime::definition::TerminalID;

    #[test]
    fn empty_conjunct_fires_immediately() {
        let mut c = Closure::new(2);
        c.conjunct(&[], 0);
        c.conjunct(&[0], 1);
        let active = c.solve([]);
        assert_eq!(active, vec![true, true]);
    }

    #[test]
    fn multiset_inputs_count_twice() {
        // Conjunct needs disjunct 0 twice; a single activation event still
        // decrements twice because the dependency edge is listed twice.
        let mut c = Closure::new(2);
        c.conjunct(&[0, 0], 1);
        let active = c.solve([0]);
        assert_eq!(active, vec![true, true]);
    }

    #[test]
    fn idempotent() {
        let mut c = Closure::new(4);
        c.conjunct(&[0, 1], 2);
        c.conjunct(&[2], 3);
        let once = c.solve([0, 1]);
        let twice = c.solve([0, 1]);
        assert_eq!(once, twice);
        assert_eq!(once, vec![true, true, true, true]);
    }

    #[test]
    fn inactive_stays_inactive() {
        let mut c = Closure::new(3);
        c.conjunct(&[0, 1], 2);
        let active = c.solve([0]);
        assert_eq!(active, vec![true, false, false]);
    }

    #[test]
    fn set_propagation_reaches_fixpoint() {
        let t = |n| TerminalID::from_raw(n);
        let mut sets = vec![
            [t(1)].into_iter().collect::<TerminalIDSet>(),
            TerminalIDSet::default(),
            TerminalIDSet::default(),
        ];
        // 0 flows into 1, 1 flows into 2 and back into 0.
        let flows = vec![vec![1], vec![2, 0], vec![]];
        propagate_sets(&mut sets, &flows);
        assert!(sets[1].contains(t(1)));
        assert!(sets[2].contains(t(1)));
    }
}
