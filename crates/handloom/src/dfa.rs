//! Determinization and minimization of scanner automata.
//!
//! Subset construction keys states on the epsilon-closed NFA subset plus a
//! *rank floor*: once a subset contains an accept of some rank, nodes of
//! lower rank drop out of play, which is exactly the promised tie-break
//! (highest rank wins; longest match and earliest rule follow naturally).
//! Then Moore partition refinement shrinks the state set, and column
//! equivalence shrinks the alphabet.

use handloom_runtime::definition::ScanRuleID;

use crate::nfa::Nfa;
use crate::types::{Bft, Map, Set};

#[derive(Debug, Clone)]
pub struct Dfa {
    /// Split points of the code-point partition, ascending; the first
    /// interval starts at the sentinel (-1).
    pub bounds: Vec<i32>,
    /// Interval index -> alphabet class.
    pub class_of_interval: Vec<u16>,
    pub n_classes: usize,
    /// `delta[state][class]`, -1 for the jam state.
    pub delta: Vec<Vec<i32>>,
    /// Condition name -> (mid-line entry, begin-line entry).
    pub initial: Map<String, (u32, u32)>,
    pub accept: Vec<Option<ScanRuleID>>,
}

impl Dfa {
    pub fn classify(&self, cp: i32) -> u16 {
        let interval = self.bounds.partition_point(|&b| b <= cp);
        self.class_of_interval[interval]
    }

    pub fn state_count(&self) -> usize {
        self.delta.len()
    }
}

type SubsetKey = (Vec<usize>, i32);

/// The standard plan: a deterministic state is a distinct subset of NFA
/// states, discovered breadth-first.
pub fn subset_construct(nfa: &Nfa) -> Dfa {
    let span = tracing::trace_span!("subset_construct");
    let _entered = span.enter();

    // The alphabet partition: intersect every character class any pattern
    // uses, by collecting all their toggle points.
    let mut bound_set: Set<i32> = Set::default();
    for node in &nfa.nodes {
        for (label, _) in &node.edges {
            bound_set.extend(label.bounds().iter().copied());
        }
    }
    let mut bounds: Vec<i32> = bound_set.into_iter().filter(|&b| b > -1).collect();
    bounds.sort_unstable();
    let n_classes = bounds.len() + 1;
    // A representative code point per interval.
    let reps: Vec<i32> = std::iter::once(-1).chain(bounds.iter().copied()).collect();

    // Precompute, per node, which classes each edge covers.
    let edge_classes: Vec<Vec<(Vec<bool>, usize)>> = nfa
        .nodes
        .iter()
        .map(|node| {
            node.edges
                .iter()
                .map(|(label, target)| {
                    let mask: Vec<bool> = reps.iter().map(|&r| label.contains(r)).collect();
                    (mask, *target)
                })
                .collect()
        })
        .collect();

    let close = |seed: &[usize], floor: i32| -> SubsetKey {
        let mut reached: Set<usize> = Set::default();
        let mut stack: Vec<usize> = seed.to_vec();
        while let Some(n) = stack.pop() {
            if !reached.insert(n) {
                continue;
            }
            for &e in &nfa.nodes[n].epsilons {
                if !reached.contains(&e) {
                    stack.push(e);
                }
            }
        }
        let mut subset: Vec<usize> = reached
            .into_iter()
            .filter(|&n| nfa.nodes[n].rank >= floor)
            .collect();
        subset.sort_unstable();
        let key_rank = subset.iter().map(|&n| nfa.nodes[n].rank).min().unwrap_or(0);
        (subset, key_rank)
    };

    let mut bft: Bft<SubsetKey, ()> = Bft::default();
    let mut initial: Map<String, (u32, u32)> = Map::default();
    for (name, &(mid, bol)) in &nfa.initial {
        let m = bft.lookup(close(&[mid], i32::MIN), None) as u32;
        let b = bft.lookup(close(&[bol], i32::MIN), None) as u32;
        initial.insert(name.clone(), (m, b));
    }

    let mut delta: Vec<Vec<i32>> = Vec::new();
    let mut accept: Vec<Option<ScanRuleID>> = Vec::new();
    bft.execute(|bft, (subset, mut floor)| {
        let finals: Vec<usize> = subset
            .iter()
            .copied()
            .filter(|n| nfa.accept.contains_key(n))
            .collect();
        let mut label = None;
        if !finals.is_empty() {
            floor = finals.iter().map(|&n| nfa.nodes[n].rank).max().unwrap_or(0);
            label = finals
                .iter()
                .filter(|&&n| nfa.nodes[n].rank == floor)
                .map(|&n| nfa.accept[&n])
                .min();
        }
        accept.push(label);

        let mut row = Vec::with_capacity(n_classes);
        let mut prior: Option<Vec<usize>> = None;
        let mut prior_successor = -1;
        for class in 0..n_classes {
            let mut register: Vec<usize> = Vec::new();
            for &n in &subset {
                if nfa.nodes[n].rank < floor {
                    continue;
                }
                for (mask, target) in &edge_classes[n] {
                    if mask[class] {
                        register.push(*target);
                    }
                }
            }
            // Adjacent classes often reach the same register; skip the
            // closure work when they do.
            let cached = prior.as_ref().map_or(false, |p| *p == register);
            if !cached {
                prior_successor = if register.is_empty() {
                    -1
                } else {
                    bft.lookup(close(&register, floor), None) as i32
                };
                prior = Some(register);
            }
            row.push(prior_successor);
        }
        delta.push(row);
    });

    tracing::trace!(states = delta.len(), classes = n_classes, "raw DFA");
    Dfa {
        bounds,
        class_of_interval: (0..n_classes as u16).collect(),
        n_classes,
        delta,
        initial,
        accept,
    }
}

impl Dfa {
    /// Moore's algorithm: partition states by accept label, refine against
    /// per-class successors until stable, then keep one state per block.
    pub fn minimize_states(&self) -> Dfa {
        let mut buckets: Vec<Vec<usize>> = Vec::new();
        let mut partition_of: Vec<usize> = Vec::with_capacity(self.delta.len());
        {
            let mut by_label: Map<Option<ScanRuleID>, usize> = Map::default();
            for q in 0..self.delta.len() {
                let b = *by_label.entry(self.accept[q]).or_insert_with(|| {
                    buckets.push(Vec::new());
                    buckets.len() - 1
                });
                partition_of.push(b);
                buckets[b].push(q);
            }
        }

        let translate = |q: usize, partition_of: &[usize]| -> Vec<i32> {
            self.delta[q]
                .iter()
                .map(|&s| if s < 0 { -1 } else { partition_of[s as usize] as i32 })
                .collect()
        };

        loop {
            let mut split_happened = false;
            for b in 0..buckets.len() {
                if buckets[b].len() < 2 {
                    continue;
                }
                let exemplar = translate(buckets[b][0], &partition_of);
                let (same, different): (Vec<usize>, Vec<usize>) = buckets[b]
                    .iter()
                    .partition(|&&q| translate(q, &partition_of) == exemplar);
                if !different.is_empty() {
                    buckets[b] = same;
                    let fresh = buckets.len();
                    for &q in &different {
                        partition_of[q] = fresh;
                    }
                    buckets.push(different);
                    split_happened = true;
                }
            }
            if !split_happened {
                break;
            }
        }

        let remap = |q: u32| partition_of[q as usize] as u32;
        let minimized = Dfa {
            bounds: self.bounds.clone(),
            class_of_interval: self.class_of_interval.clone(),
            n_classes: self.n_classes,
            delta: buckets
                .iter()
                .map(|bucket| translate(bucket[0], &partition_of))
                .collect(),
            initial: self
                .initial
                .iter()
                .map(|(name, &(m, b))| (name.clone(), (remap(m), remap(b))))
                .collect(),
            accept: buckets.iter().map(|bucket| self.accept[bucket[0]]).collect(),
        };
        tracing::trace!(
            before = self.delta.len(),
            after = minimized.delta.len(),
            "state minimization"
        );
        minimized
    }

    /// Merge alphabet classes whose delta columns are identical.
    pub fn minimize_alphabet(&self) -> Dfa {
        let mut catalog: Map<Vec<i32>, u16> = Map::default();
        let mut remap: Vec<u16> = Vec::with_capacity(self.n_classes);
        let mut columns: Vec<Vec<i32>> = Vec::new();
        for class in 0..self.n_classes {
            let column: Vec<i32> = self.delta.iter().map(|row| row[class]).collect();
            let id = *catalog.entry(column.clone()).or_insert_with(|| {
                columns.push(column);
                (columns.len() - 1) as u16
            });
            remap.push(id);
        }
        let delta: Vec<Vec<i32>> = (0..self.delta.len())
            .map(|q| columns.iter().map(|col| col[q]).collect())
            .collect();
        tracing::trace!(
            before = self.n_classes,
            after = columns.len(),
            "alphabet compaction"
        );
        Dfa {
            bounds: self.bounds.clone(),
            class_of_interval: self
                .class_of_interval
                .iter()
                .map(|&c| remap[c as usize])
                .collect(),
            n_classes: columns.len(),
            delta,
            initial: self.initial.clone(),
            accept: self.accept.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::{parse_pattern, PatternEnv};

    fn rule(id: u16) -> ScanRuleID {
        ScanRuleID::from_raw(id)
    }

    fn single_rule_dfa(pattern: &str) -> Dfa {
        let env = PatternEnv::default();
        let mut nfa = Nfa::default();
        nfa.condition("INITIAL");
        let p = parse_pattern(pattern, &env).unwrap();
        nfa.add_rule(&["INITIAL".to_owned()], &p, rule(0), 0);
        subset_construct(&nfa).minimize_states().minimize_alphabet()
    }

    fn run(dfa: &Dfa, text: &str) -> Option<ScanRuleID> {
        let (_, mut q) = dfa.initial["INITIAL"];
        for c in text.chars() {
            let class = dfa.classify(c as i32);
            let next = dfa.delta[q as usize][class as usize];
            if next < 0 {
                return None;
            }
            q = next as u32;
        }
        dfa.accept[q as usize]
    }

    #[test]
    fn recognizes_a_keyword() {
        let dfa = single_rule_dfa("foo");
        assert_eq!(run(&dfa, "foo"), Some(rule(0)));
        assert_eq!(run(&dfa, "fo"), None);
        assert_eq!(run(&dfa, "fox"), None);
    }

    #[test]
    fn star_and_class() {
        let dfa = single_rule_dfa("[a-z]+");
        assert_eq!(run(&dfa, "abc"), Some(rule(0)));
        assert_eq!(run(&dfa, "a"), Some(rule(0)));
        assert_eq!(run(&dfa, ""), None);
        assert_eq!(run(&dfa, "aB"), None);
    }

    #[test]
    fn minimization_shrinks_equivalent_tails() {
        // Two branches with identical two-character tails must share states.
        let fat = {
            let env = PatternEnv::default();
            let mut nfa = Nfa::default();
            nfa.condition("INITIAL");
            let p = parse_pattern("axy|bxy", &env).unwrap();
            nfa.add_rule(&["INITIAL".to_owned()], &p, rule(0), 0);
            subset_construct(&nfa)
        };
        let slim = fat.minimize_states();
        assert!(slim.delta.len() < fat.delta.len());
    }

    #[test]
    fn higher_rank_beats_longer_subset_presence() {
        // "foo" at rank 1 and [a-z]+ at rank 0 compete; in the state where
        // both could accept, the rank-1 rule owns the label.
        let env = PatternEnv::default();
        let mut nfa = Nfa::default();
        nfa.condition("INITIAL");
        let keyword = parse_pattern("foo", &env).unwrap();
        let word = parse_pattern("[a-z]+", &env).unwrap();
        nfa.add_rule(&["INITIAL".to_owned()], &keyword, rule(0), 1);
        nfa.add_rule(&["INITIAL".to_owned()], &word, rule(1), 0);
        let dfa = subset_construct(&nfa).minimize_states().minimize_alphabet();
        assert_eq!(run(&dfa, "foo"), Some(rule(0)));
        assert_eq!(run(&dfa, "fo"), Some(rule(1)));
        assert_eq!(run(&dfa, "bar"), Some(rule(1)));
    }
}
